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

//! lilith-vault Constants - Single source of truth for all configuration values.
//!
//! This module centralizes fixed markers, error codes, and configuration
//! constants to ensure consistency and maintainability.

/// Masking defaults
pub mod masking {
    /// Marker character used by the simple masking strategy
    pub const DEFAULT_MARKER: char = '*';
    /// Literal tag used by the structural redaction strategy
    pub const DEFAULT_REDACTION_TAG: &str = "[REDACTED]";
    /// Longest marker run probed when checking a rule against its own output
    pub const SELF_MATCH_PROBE_LEN: usize = 64;
}

/// Stable validation issue codes
pub mod codes {
    pub const REQUIRED_MISSING: &str = "required-missing";
    pub const CARDINALITY_VIOLATION: &str = "cardinality-violation";
    pub const TYPE_MISMATCH: &str = "type-mismatch";
    pub const BINDING_VIOLATION: &str = "binding-violation";
    pub const INVARIANT_VIOLATION: &str = "invariant-violation";
    pub const UNKNOWN_FIELD: &str = "unknown-field";
}

/// Ledger constants
pub mod ledger {
    /// Digest length in bytes (SHA-256)
    pub const HASH_LENGTH: usize = 32;
    /// prevHash of the genesis entry: 32 zero bytes, hex encoded
    pub const GENESIS_HASH: &str =
        "0000000000000000000000000000000000000000000000000000000000000000";
    /// Default bound on waiting for the single ledger writer
    pub const DEFAULT_APPEND_WAIT_MS: u64 = 250;
    /// Bundle format version recorded in export headers
    pub const BUNDLE_VERSION: &str = "1";
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_LOG_LEVEL: &str = "LILITH_VAULT_LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LILITH_VAULT_LOG_FORMAT";
    pub const ENV_BATCH_WORKERS: &str = "LILITH_VAULT_BATCH_WORKERS";
    pub const ENV_APPEND_WAIT_MS: &str = "LILITH_VAULT_APPEND_WAIT_MS";
    pub const ENV_POLICY_SEED: &str = "LILITH_VAULT_POLICY_SEED";
}
