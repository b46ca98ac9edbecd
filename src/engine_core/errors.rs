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

//! Error types for the vault core.
//!
//! Load-time failures (policies, schemas) and ledger failures are typed
//! errors. Schema violations are *not* errors: they are returned as data in
//! `ValidationResult`.

use thiserror::Error;

/// Masking policy failed to load. No partial policy is ever created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Policy id cannot be empty")]
    EmptyPolicyId,

    #[error("Policy '{policy}' has no rules")]
    NoRules { policy: String },

    #[error("Policy '{policy}', rule #{index}: rule id cannot be empty")]
    EmptyRuleId { policy: String, index: usize },

    #[error("Policy '{policy}': duplicate rule id '{rule}'")]
    DuplicateRuleId { policy: String, rule: String },

    #[error("Policy '{policy}', rule '{rule}': pattern cannot be empty")]
    EmptyPattern { policy: String, rule: String },

    #[error("Policy '{policy}', rule '{rule}': invalid pattern: {reason}")]
    InvalidPattern {
        policy: String,
        rule: String,
        reason: String,
    },

    /// `rule` matches text emitted by `emitter` (possibly itself), so
    /// re-masking would not be a no-op.
    #[error("Policy '{policy}', rule '{rule}': pattern matches the masked output of rule '{emitter}'")]
    SelfMatchingRule {
        policy: String,
        rule: String,
        emitter: String,
    },

    #[error("Policy '{policy}': invalid option: {reason}")]
    InvalidOption { policy: String, reason: String },

    #[error("Policy '{policy}' is already loaded")]
    AlreadyLoaded { policy: String },

    #[error("Failed to read policy source: {0}")]
    Source(String),
}

/// Schema definition failed to load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Schema id cannot be empty")]
    EmptySchemaId,

    #[error("Schema '{schema}' is already loaded")]
    AlreadyLoaded { schema: String },

    #[error("Schema '{schema}', field #{index}: field name cannot be empty")]
    EmptyFieldName { schema: String, index: usize },

    #[error("Schema '{schema}': duplicate field '{field}'")]
    DuplicateField { schema: String, field: String },

    #[error("Schema '{schema}', field '{field}': invalid cardinality: {reason}")]
    InvalidCardinality {
        schema: String,
        field: String,
        reason: String,
    },

    #[error("Schema '{schema}', field '{field}': {reason}")]
    InvalidField {
        schema: String,
        field: String,
        reason: String,
    },

    #[error("Schema '{schema}', invariant '{invariant}': {reason}")]
    InvalidInvariant {
        schema: String,
        invariant: String,
        reason: String,
    },

    #[error("Failed to read schema source: {0}")]
    Source(String),
}

/// Audit payload could not be converted to canonical bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    #[error("Non-finite number at '{path}' cannot be canonicalized")]
    NonFiniteNumber { path: String },

    #[error("Failed to encode canonical payload: {0}")]
    Encoding(String),
}

/// Ledger operation failures. Every variant leaves the chain in its
/// last-known-good state.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Another append held the writer past the wait bound. Retryable.
    #[error("Ledger append contention: writer busy after {waited_ms} ms")]
    Contention { waited_ms: u64 },

    #[error("Invalid ledger range {from}..={to} (ledger holds {len} entries)")]
    InvalidRange { from: u64, to: u64, len: u64 },
}

/// Cryptographic operation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid key material: {0}")]
    InvalidKey(String),
}

/// Umbrella error for callers that drive several components.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A batch could not be scheduled, e.g. no tokio runtime is running.
    #[error("Batch error: {0}")]
    Batch(String),
}

impl CoreError {
    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Ledger(LedgerError::Contention { .. }))
    }

    /// Get user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Policy(e) => format!("Masking policy rejected: {}", e),
            CoreError::Schema(e) => format!("Schema rejected: {}", e),
            CoreError::Ledger(LedgerError::Contention { .. }) => {
                "Audit ledger busy, retry".to_string()
            }
            CoreError::Ledger(LedgerError::Serialization(e)) => {
                format!("Audit event rejected: {}", e)
            }
            CoreError::Ledger(_) => "Audit ledger error".to_string(),
            CoreError::Configuration(_) => "Internal error".to_string(),
            CoreError::Batch(_) => "Internal error".to_string(),
        }
    }
}
