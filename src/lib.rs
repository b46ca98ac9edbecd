// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! lilith-vault: a reusable data security core.
//!
//! This library masks sensitive values under configurable policies,
//! validates structured records against declarative schemas and keeps a
//! tamper-evident audit ledger backed by a SHA-256 hash chain.

pub mod config;
pub mod engine;
pub mod engine_core;
pub mod utils;

pub use config::Config;
pub use engine::batch::{BatchCoordinator, BatchHandle, BatchOutcome};
pub use engine::masking::{MaskingEngine, MaskingPolicy, MaskingRule, MaskingStrategy, PolicyHandle};
pub use engine::validator::{Schema, SchemaDefinition, SchemaHandle, SchemaValidator, ValidationResult};
pub use engine_core::canonical::PayloadValue;
pub use engine_core::errors::CoreError;
pub use engine_core::ledger::{AuditEvent, AuditLedger, ChainVerification, LedgerBundle, LedgerEntry};
pub use engine_core::security_core::SecurityCore;
