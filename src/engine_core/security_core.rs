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

//! Security Core.
//!
//! Caller-owned entry point bundling the policy and schema registries with
//! one audit ledger. There is no global state: each `SecurityCore` (for
//! example one per tenant) is fully isolated from the others.

use ed25519_dalek::{SigningKey, VerifyingKey};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::engine::batch::BatchCoordinator;
use crate::engine::masking::{
    MaskOutcome, MaskingEngine, MaskingPolicy, MaskingRule, PolicyFile, PolicyHandle,
    PolicyOptions, RecordMaskOutcome,
};
use crate::engine::validator::{
    Schema, SchemaDefinition, SchemaHandle, SchemaValidator, ValidationResult,
};
use crate::engine_core::errors::{LedgerError, PolicyError, SchemaError};
use crate::engine_core::ledger::{AuditEvent, AuditLedger, ChainVerification, LedgerBundle, LedgerEntry};

pub struct SecurityCore {
    pub config: Arc<Config>,
    policies: RwLock<HashMap<String, PolicyHandle>>,
    schemas: RwLock<HashMap<String, SchemaHandle>>,
    ledger: AuditLedger,
    batch: BatchCoordinator,
}

impl SecurityCore {
    pub fn new(config: Arc<Config>) -> Self {
        let ledger = AuditLedger::new().with_append_wait(config.append_wait());
        Self::with_ledger(config, ledger)
    }

    /// Core whose ledger signs every entry with `key`.
    pub fn with_signer(config: Arc<Config>, key: SigningKey) -> Self {
        let ledger = AuditLedger::new()
            .with_append_wait(config.append_wait())
            .with_signer(key);
        Self::with_ledger(config, ledger)
    }

    fn with_ledger(config: Arc<Config>, ledger: AuditLedger) -> Self {
        let batch = BatchCoordinator::new(config.batch_workers);
        Self {
            config,
            policies: RwLock::new(HashMap::new()),
            schemas: RwLock::new(HashMap::new()),
            ledger,
            batch,
        }
    }

    /// Load a policy with default options.
    pub fn load_policy(&self, id: &str, rules: &[MaskingRule]) -> Result<PolicyHandle, PolicyError> {
        self.load_policy_with(id, rules, PolicyOptions::default())
    }

    pub fn load_policy_with(
        &self,
        id: &str,
        rules: &[MaskingRule],
        mut options: PolicyOptions,
    ) -> Result<PolicyHandle, PolicyError> {
        if self.policies.read().contains_key(id) {
            return Err(PolicyError::AlreadyLoaded {
                policy: id.to_string(),
            });
        }
        if options.seed.is_none() {
            options.seed = self.config.policy_seed.clone();
        }
        let policy = MaskingPolicy::from_rules(id, rules, options)?;
        self.register_policy(policy)
    }

    pub fn load_policy_file(&self, def: &PolicyFile) -> Result<PolicyHandle, PolicyError> {
        self.load_policy_with(&def.id, &def.rules, def.options.clone())
    }

    fn register_policy(&self, policy: MaskingPolicy) -> Result<PolicyHandle, PolicyError> {
        let mut policies = self.policies.write();
        if policies.contains_key(policy.id()) {
            return Err(PolicyError::AlreadyLoaded {
                policy: policy.id().to_string(),
            });
        }
        let handle = Arc::new(policy);
        policies.insert(handle.id().to_string(), Arc::clone(&handle));
        info!(policy = handle.id(), rules = handle.rules().len(), "Masking policy loaded");
        Ok(handle)
    }

    pub fn policy(&self, id: &str) -> Option<PolicyHandle> {
        self.policies.read().get(id).cloned()
    }

    pub fn mask(&self, text: &str, policy: &PolicyHandle) -> MaskOutcome {
        MaskingEngine::mask(text, policy)
    }

    pub fn mask_record(&self, record: &Value, policy: &PolicyHandle) -> RecordMaskOutcome {
        MaskingEngine::mask_record(record, policy)
    }

    pub fn load_schema(
        &self,
        id: &str,
        definition: SchemaDefinition,
    ) -> Result<SchemaHandle, SchemaError> {
        let schema = Schema::load(id, definition)?;
        let mut schemas = self.schemas.write();
        if schemas.contains_key(id) {
            return Err(SchemaError::AlreadyLoaded {
                schema: id.to_string(),
            });
        }
        let handle = Arc::new(schema);
        schemas.insert(id.to_string(), Arc::clone(&handle));
        info!(schema = id, "Schema loaded");
        Ok(handle)
    }

    pub fn schema(&self, id: &str) -> Option<SchemaHandle> {
        self.schemas.read().get(id).cloned()
    }

    pub fn validate(&self, record: &Value, schema: &SchemaHandle) -> ValidationResult {
        SchemaValidator::validate(record, schema)
    }

    /// Worker pool sized from the configuration.
    pub fn batch(&self) -> &BatchCoordinator {
        &self.batch
    }

    pub fn append_audit(&self, event: AuditEvent) -> Result<LedgerEntry, LedgerError> {
        self.ledger.append(event)
    }

    pub fn export_ledger(
        &self,
        from: u64,
        to: u64,
        key: Option<&SigningKey>,
    ) -> Result<LedgerBundle, LedgerError> {
        self.ledger.export_range(from, to, key)
    }

    pub fn verify_ledger(
        &self,
        bundle: &LedgerBundle,
        key: Option<&VerifyingKey>,
    ) -> ChainVerification {
        AuditLedger::verify_bundle(bundle, key)
    }

    pub fn ledger(&self) -> &AuditLedger {
        &self.ledger
    }
}
