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

//! Tamper-evident audit ledger.
//!
//! Each entry commits to its predecessor:
//! `event_hash = SHA-256(prev_hash || canonical_payload)`, where `prev_hash`
//! is taken as 32 raw bytes and the first entry links to [`GENESIS_HASH`].
//! Appends are serialized through a single writer; readers work on
//! snapshots and never observe a partially written entry.

use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine_core::canonical::{canonicalize, canonicalize_json, PayloadValue};
use crate::engine_core::constants::ledger::{
    BUNDLE_VERSION, DEFAULT_APPEND_WAIT_MS, GENESIS_HASH, HASH_LENGTH,
};
use crate::engine_core::crypto::{
    decode_digest, digest256, sign_hex, verify_hex, Digest256, LedgerSigner,
};
use crate::engine_core::errors::{LedgerError, SerializationError};
use crate::utils::time;

/// Caller-supplied description of an action.
///
/// The ledger records time at millisecond precision. `new`, `at` and
/// deserialization truncate the timestamp, so it always equals what the
/// appended entry commits to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor: String,
    pub subject: String,
    pub action: String,
    #[serde(default = "time::now", deserialize_with = "time::deserialize_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: PayloadValue,
}

impl AuditEvent {
    /// New event stamped with the current time.
    pub fn new(actor: &str, subject: &str, action: &str, payload: PayloadValue) -> Self {
        Self {
            actor: actor.to_string(),
            subject: subject.to_string(),
            action: action.to_string(),
            timestamp: time::now(),
            payload,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = time::truncate_millis(timestamp);
        self
    }
}

/// One immutable ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct LedgerEntry {
    pub sequence_id: u64,
    pub timestamp: String,
    pub prev_hash: String,
    pub event_hash: String,
    pub canonical_payload: String,
    /// Hex Ed25519 signature over the raw `event_hash` bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct BundleHeader {
    pub bundle_id: String,
    pub version: String,
    pub from_seq: u64,
    pub to_seq: u64,
    /// `prev_hash` of the first exported entry.
    pub anchor_hash: String,
    /// `event_hash` of the last exported entry.
    pub tail_hash: String,
    pub entry_count: u64,
    pub exported_at: String,
}

impl BundleHeader {
    /// Digest covered by the bundle signature.
    fn digest(&self) -> Result<Digest256, SerializationError> {
        let value =
            serde_json::to_value(self).map_err(|e| SerializationError::Encoding(e.to_string()))?;
        Ok(digest256(&[canonicalize_json(&value)?.as_slice()]))
    }
}

/// Exported, self-describing slice of the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct LedgerBundle {
    pub header: BundleHeader,
    pub entries: Vec<LedgerEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Why a chain or bundle failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub enum IntegrityFailure {
    SequenceGap { expected: u64, found: u64 },
    BrokenLink { expected: String, found: String },
    HashMismatch { expected: String, found: String },
    /// Entry metadata disagrees with what the canonical payload committed to.
    FieldMismatch { field: String },
    BadSignature { sequence_id: u64 },
    BadBundleSignature,
    HeaderMismatch { reason: String },
}

impl std::fmt::Display for IntegrityFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityFailure::SequenceGap { expected, found } => {
                write!(f, "sequence gap: expected {}, found {}", expected, found)
            }
            IntegrityFailure::BrokenLink { expected, found } => {
                write!(f, "broken link: expected prevHash {}, found {}", expected, found)
            }
            IntegrityFailure::HashMismatch { expected, found } => {
                write!(f, "hash mismatch: recomputed {}, stored {}", expected, found)
            }
            IntegrityFailure::FieldMismatch { field } => {
                write!(f, "field '{}' does not match the canonical payload", field)
            }
            IntegrityFailure::BadSignature { sequence_id } => {
                write!(f, "invalid signature on entry {}", sequence_id)
            }
            IntegrityFailure::BadBundleSignature => write!(f, "invalid bundle signature"),
            IntegrityFailure::HeaderMismatch { reason } => write!(f, "header mismatch: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ChainVerification {
    pub ok: bool,
    /// Position (within the verified slice) of the first bad entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<IntegrityFailure>,
}

impl ChainVerification {
    pub fn valid() -> Self {
        Self {
            ok: true,
            divergence_index: None,
            failure: None,
        }
    }

    fn diverged(index: usize, failure: IntegrityFailure) -> Self {
        warn!(index, %failure, "Ledger integrity failure");
        Self {
            ok: false,
            divergence_index: Some(index),
            failure: Some(failure),
        }
    }

    fn rejected(failure: IntegrityFailure) -> Self {
        warn!(%failure, "Ledger bundle rejected");
        Self {
            ok: false,
            divergence_index: None,
            failure: Some(failure),
        }
    }
}

/// Writer-side state. Only touched while the writer lock is held.
struct ChainTail {
    next_sequence: u64,
    hash: Digest256,
}

pub struct AuditLedger {
    writer: Mutex<ChainTail>,
    entries: RwLock<Vec<LedgerEntry>>,
    signer: Option<LedgerSigner>,
    append_wait: Duration,
}

impl Default for AuditLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLedger {
    pub fn new() -> Self {
        Self {
            writer: Mutex::new(ChainTail {
                next_sequence: 0,
                hash: [0u8; HASH_LENGTH],
            }),
            entries: RwLock::new(Vec::new()),
            signer: None,
            append_wait: Duration::from_millis(DEFAULT_APPEND_WAIT_MS),
        }
    }

    /// Sign every appended entry's hash with `key`.
    pub fn with_signer(mut self, key: SigningKey) -> Self {
        self.signer = Some(LedgerSigner::from_signing_key(key));
        self
    }

    /// Bound on how long `append` waits for the writer.
    pub fn with_append_wait(mut self, wait: Duration) -> Self {
        self.append_wait = wait;
        self
    }

    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        self.signer.as_ref().map(LedgerSigner::verifying_key)
    }

    /// Append one event. On any error the sequence and tail are unchanged.
    pub fn append(&self, event: AuditEvent) -> Result<LedgerEntry, LedgerError> {
        let Some(mut tail) = self.writer.try_lock_for(self.append_wait) else {
            let waited_ms = self.append_wait.as_millis() as u64;
            warn!(waited_ms, "Ledger append contention");
            return Err(LedgerError::Contention { waited_ms });
        };

        let sequence_id = tail.next_sequence;
        let timestamp = time::format_timestamp(&event.timestamp);
        let canonical = Self::canonical_record(&event, sequence_id, &timestamp)?;
        let event_hash = digest256(&[tail.hash.as_slice(), canonical.as_bytes()]);

        let entry = LedgerEntry {
            sequence_id,
            timestamp,
            prev_hash: hex::encode(tail.hash),
            event_hash: hex::encode(event_hash),
            canonical_payload: canonical,
            signature: self.signer.as_ref().map(|s| s.sign_hex(&event_hash)),
        };

        self.entries.write().push(entry.clone());
        tail.next_sequence += 1;
        tail.hash = event_hash;

        info!(
            target: "audit",
            sequence_id,
            event_hash = %entry.event_hash,
            signed = entry.signature.is_some(),
            "LEDGER_APPEND"
        );
        Ok(entry)
    }

    /// Canonical bytes committed by an entry, as UTF-8 text.
    fn canonical_record(
        event: &AuditEvent,
        sequence_id: u64,
        timestamp: &str,
    ) -> Result<String, SerializationError> {
        let record = PayloadValue::map([
            ("action", PayloadValue::from(event.action.as_str())),
            ("actor", PayloadValue::from(event.actor.as_str())),
            ("payload", event.payload.clone()),
            ("sequence_id", PayloadValue::UInt(sequence_id)),
            ("subject", PayloadValue::from(event.subject.as_str())),
            ("timestamp", PayloadValue::from(timestamp)),
        ]);
        String::from_utf8(canonicalize(&record)?)
            .map_err(|e| SerializationError::Encoding(e.to_string()))
    }

    /// Consistent copy of all entries at call time.
    pub fn snapshot(&self) -> Vec<LedgerEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hex hash the next entry will link to.
    pub fn tail_hash(&self) -> String {
        self.entries
            .read()
            .last()
            .map_or_else(|| GENESIS_HASH.to_string(), |e| e.event_hash.clone())
    }

    /// Verify the live ledger, including signatures when signing is enabled.
    pub fn verify(&self) -> ChainVerification {
        let entries = self.snapshot();
        let key = self.verifying_key();
        verify_links(&entries, GENESIS_HASH, 0, key.as_ref())
    }

    /// Recompute a full chain from genesis.
    pub fn verify_chain(entries: &[LedgerEntry]) -> ChainVerification {
        verify_links(entries, GENESIS_HASH, 0, None)
    }

    /// Export sequence ids `from..=to` as a bundle, signed when `key` is given.
    pub fn export_range(
        &self,
        from: u64,
        to: u64,
        key: Option<&SigningKey>,
    ) -> Result<LedgerBundle, LedgerError> {
        let snapshot = self.snapshot();
        let len = snapshot.len() as u64;
        if from > to || to >= len {
            return Err(LedgerError::InvalidRange { from, to, len });
        }

        let entries = snapshot[from as usize..=to as usize].to_vec();
        let (anchor_hash, tail_hash) = match (entries.first(), entries.last()) {
            (Some(first), Some(last)) => (first.prev_hash.clone(), last.event_hash.clone()),
            _ => return Err(LedgerError::InvalidRange { from, to, len }),
        };
        let header = BundleHeader {
            bundle_id: Uuid::new_v4().to_string(),
            version: BUNDLE_VERSION.to_string(),
            from_seq: from,
            to_seq: to,
            anchor_hash,
            tail_hash,
            entry_count: entries.len() as u64,
            exported_at: time::format_timestamp(&time::now()),
        };
        let signature = match key {
            Some(key) => Some(sign_hex(key, &header.digest()?)),
            None => None,
        };

        debug!(
            bundle_id = %header.bundle_id,
            from,
            to,
            signed = signature.is_some(),
            "Ledger range exported"
        );
        Ok(LedgerBundle {
            header,
            entries,
            signature,
        })
    }

    /// Check header consistency and chain continuity from the anchor. With a
    /// `key`, every entry and the bundle itself must carry a valid signature.
    pub fn verify_bundle(bundle: &LedgerBundle, key: Option<&VerifyingKey>) -> ChainVerification {
        let header = &bundle.header;
        let mismatch = |reason: String| {
            ChainVerification::rejected(IntegrityFailure::HeaderMismatch { reason })
        };

        if header.version != BUNDLE_VERSION {
            return mismatch(format!("unsupported bundle version '{}'", header.version));
        }
        if header.entry_count != bundle.entries.len() as u64 {
            return mismatch(format!(
                "header declares {} entries, bundle holds {}",
                header.entry_count,
                bundle.entries.len()
            ));
        }
        let span = header
            .to_seq
            .checked_sub(header.from_seq)
            .and_then(|d| d.checked_add(1));
        if span != Some(header.entry_count) {
            return mismatch(format!(
                "range {}..={} does not match entry count {}",
                header.from_seq, header.to_seq, header.entry_count
            ));
        }

        let chain = verify_links(&bundle.entries, &header.anchor_hash, header.from_seq, key);
        if !chain.ok {
            return chain;
        }

        let last_hash = bundle.entries.last().map(|e| e.event_hash.as_str());
        if last_hash != Some(header.tail_hash.as_str()) {
            return mismatch("tail hash does not match last entry".to_string());
        }

        if let Some(key) = key {
            let signed = match (bundle.signature.as_deref(), header.digest()) {
                (Some(signature), Ok(digest)) => verify_hex(key, &digest, signature),
                _ => false,
            };
            if !signed {
                return ChainVerification::rejected(IntegrityFailure::BadBundleSignature);
            }
        }
        ChainVerification::valid()
    }
}

/// Walk `entries` starting from `anchor` and `first_sequence`, reporting the
/// first entry whose sequence, linkage, hash, metadata or signature is off.
/// With a `key`, an unsigned entry counts as a bad signature.
fn verify_links(
    entries: &[LedgerEntry],
    anchor: &str,
    first_sequence: u64,
    key: Option<&VerifyingKey>,
) -> ChainVerification {
    let mut expected_prev = anchor.to_string();

    for (index, entry) in entries.iter().enumerate() {
        let expected_sequence = first_sequence + index as u64;
        if entry.sequence_id != expected_sequence {
            return ChainVerification::diverged(
                index,
                IntegrityFailure::SequenceGap {
                    expected: expected_sequence,
                    found: entry.sequence_id,
                },
            );
        }

        let prev_raw = match decode_digest(&entry.prev_hash) {
            Some(raw) if entry.prev_hash == expected_prev => raw,
            _ => {
                return ChainVerification::diverged(
                    index,
                    IntegrityFailure::BrokenLink {
                        expected: expected_prev,
                        found: entry.prev_hash.clone(),
                    },
                );
            }
        };

        let recomputed = digest256(&[prev_raw.as_slice(), entry.canonical_payload.as_bytes()]);
        let recomputed_hex = hex::encode(recomputed);
        if recomputed_hex != entry.event_hash {
            return ChainVerification::diverged(
                index,
                IntegrityFailure::HashMismatch {
                    expected: recomputed_hex,
                    found: entry.event_hash.clone(),
                },
            );
        }

        if let Some(field) = metadata_mismatch(entry) {
            return ChainVerification::diverged(
                index,
                IntegrityFailure::FieldMismatch {
                    field: field.to_string(),
                },
            );
        }

        if let Some(key) = key {
            let signed = entry
                .signature
                .as_deref()
                .is_some_and(|signature| verify_hex(key, &recomputed, signature));
            if !signed {
                return ChainVerification::diverged(
                    index,
                    IntegrityFailure::BadSignature {
                        sequence_id: entry.sequence_id,
                    },
                );
            }
        }

        expected_prev = entry.event_hash.clone();
    }
    ChainVerification::valid()
}

/// The unhashed `sequenceId` and `timestamp` must echo the committed payload.
fn metadata_mismatch(entry: &LedgerEntry) -> Option<&'static str> {
    let Ok(committed) = serde_json::from_str::<serde_json::Value>(&entry.canonical_payload) else {
        return Some("canonicalPayload");
    };
    if committed.get("sequence_id").and_then(|v| v.as_u64()) != Some(entry.sequence_id) {
        return Some("sequenceId");
    }
    if committed.get("timestamp").and_then(|v| v.as_str()) != Some(entry.timestamp.as_str()) {
        return Some("timestamp");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn event(n: i64) -> AuditEvent {
        AuditEvent::new(
            "user-1",
            "record-9",
            "read",
            PayloadValue::map([("n", PayloadValue::Int(n))]),
        )
    }

    #[test]
    fn test_genesis_and_linkage() {
        let ledger = AuditLedger::new();
        let first = ledger.append(event(0)).unwrap();
        let second = ledger.append(event(1)).unwrap();
        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(first.sequence_id, 0);
        assert_eq!(second.prev_hash, first.event_hash);
        assert_eq!(ledger.tail_hash(), second.event_hash);
        assert!(ledger.verify().ok);
    }

    #[test]
    fn test_non_finite_payload_leaves_ledger_unchanged() {
        let ledger = AuditLedger::new();
        ledger.append(event(0)).unwrap();
        let tail = ledger.tail_hash();

        let bad = AuditEvent::new("u", "s", "a", PayloadValue::map([("x", f64::NAN)]));
        assert!(matches!(
            ledger.append(bad),
            Err(LedgerError::Serialization(SerializationError::NonFiniteNumber { .. }))
        ));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.tail_hash(), tail);

        let next = ledger.append(event(1)).unwrap();
        assert_eq!(next.sequence_id, 1);
    }

    #[test]
    fn test_event_timestamp_matches_entry() {
        let precise = Utc
            .timestamp_opt(1_700_000_000, 987_654_321)
            .single()
            .unwrap();
        let event = event(0).at(precise);
        assert_eq!(event.timestamp.timestamp_subsec_nanos(), 987_000_000);

        let ledger = AuditLedger::new();
        let entry = ledger.append(event.clone()).unwrap();
        assert_eq!(entry.timestamp, time::format_timestamp(&event.timestamp));
        assert_eq!(
            DateTime::parse_from_rfc3339(&entry.timestamp)
                .unwrap()
                .with_timezone(&Utc),
            event.timestamp
        );

        let parsed: AuditEvent = serde_json::from_str(
            r#"{"actor":"a","subject":"s","action":"x","timestamp":"2026-01-01T00:00:00.123456Z"}"#,
        )
        .unwrap();
        assert_eq!(parsed.timestamp.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_contention_is_reported() {
        let ledger = Arc::new(AuditLedger::new().with_append_wait(Duration::from_millis(10)));
        let guard = ledger.writer.lock();
        let err = ledger.append(event(0)).unwrap_err();
        assert!(matches!(err, LedgerError::Contention { waited_ms: 10 }));
        drop(guard);
        assert!(ledger.append(event(0)).is_ok());
    }

    #[test]
    fn test_metadata_tampering_detected() {
        let ledger = AuditLedger::new();
        ledger.append(event(0)).unwrap();
        let mut entries = ledger.snapshot();
        entries[0].timestamp = "1999-01-01T00:00:00.000Z".to_string();
        let result = AuditLedger::verify_chain(&entries);
        assert_eq!(result.divergence_index, Some(0));
        assert!(matches!(
            result.failure,
            Some(IntegrityFailure::FieldMismatch { .. })
        ));
    }

    #[test]
    fn test_signed_entries_verify() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let ledger = AuditLedger::new().with_signer(key.clone());
        for n in 0..3 {
            ledger.append(event(n)).unwrap();
        }
        assert!(ledger.verify().ok);

        let mut entries = ledger.snapshot();
        let other = SigningKey::from_bytes(&[8u8; 32]);
        let forged = hex::decode(&entries[1].event_hash).unwrap();
        entries[1].signature = Some(sign_hex(&other, &forged));
        let result = verify_links(&entries, GENESIS_HASH, 0, Some(&key.verifying_key()));
        assert_eq!(result.divergence_index, Some(1));
        assert_eq!(
            result.failure,
            Some(IntegrityFailure::BadSignature { sequence_id: 1 })
        );
    }

    #[test]
    fn test_invalid_export_range() {
        let ledger = AuditLedger::new();
        assert!(matches!(
            ledger.export_range(0, 0, None),
            Err(LedgerError::InvalidRange { len: 0, .. })
        ));
        ledger.append(event(0)).unwrap();
        assert!(ledger.export_range(1, 0, None).is_err());
        assert!(ledger.export_range(0, 0, None).is_ok());
    }
}
