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

//! PII masking engine.
//!
//! A `MaskingPolicy` is compiled once (see `utils::policy_validator`) and is
//! immutable afterwards. `MaskingEngine::mask` is a pure function over the
//! policy and never fails.
//!
//! Overlapping matches are resolved left to right: the earliest start wins,
//! then the longest span, then the first rule in declared order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::engine_core::constants::masking;
use crate::engine_core::crypto::{hmac256, sha256_hex};
use crate::engine_core::errors::PolicyError;
use crate::utils::policy_validator::PolicyValidator;

/// Shared, immutable handle to a loaded policy.
pub type PolicyHandle = Arc<MaskingPolicy>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub enum MaskingStrategy {
    /// Every character of the span becomes the marker character.
    Simple,
    /// The span becomes the fixed redaction tag.
    Structural,
    /// The span becomes the hex SHA-256 of its bytes.
    Hash,
    /// Digits are replaced by pseudo-random digits; everything else is kept.
    FormatPreserving,
}

/// Declarative rule, as written in policy files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskingRule {
    pub id: String,
    pub pattern: String,
    /// Falls back to the policy's default strategy when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<MaskingStrategy>,
}

impl MaskingRule {
    pub fn new(id: &str, pattern: &str, strategy: MaskingStrategy) -> Self {
        Self {
            id: id.to_string(),
            pattern: pattern.to_string(),
            strategy: Some(strategy),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOptions {
    pub default_strategy: MaskingStrategy,
    pub marker: char,
    pub redaction_tag: String,
    /// Seed for reproducible format-preserving output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
}

impl Default for PolicyOptions {
    fn default() -> Self {
        Self {
            default_strategy: MaskingStrategy::Simple,
            marker: masking::DEFAULT_MARKER,
            redaction_tag: masking::DEFAULT_REDACTION_TAG.to_string(),
            seed: None,
        }
    }
}

/// On-disk policy format (YAML or JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyFile {
    pub id: String,
    pub rules: Vec<MaskingRule>,
    #[serde(default)]
    pub options: PolicyOptions,
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: String,
    pub regex: Regex,
    pub strategy: MaskingStrategy,
}

/// A loaded, compiled masking policy.
#[derive(Debug, Clone)]
pub struct MaskingPolicy {
    pub(crate) id: String,
    pub(crate) rules: Vec<CompiledRule>,
    pub(crate) options: PolicyOptions,
}

impl MaskingPolicy {
    pub fn from_rules(
        id: &str,
        rules: &[MaskingRule],
        options: PolicyOptions,
    ) -> Result<Self, PolicyError> {
        PolicyValidator::compile(id, rules, options)
    }

    pub fn from_file_def(def: &PolicyFile) -> Result<Self, PolicyError> {
        PolicyValidator::compile(&def.id, &def.rules, def.options.clone())
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, PolicyError> {
        let def: PolicyFile =
            serde_yaml_ng::from_str(source).map_err(|e| PolicyError::Source(e.to_string()))?;
        Self::from_file_def(&def)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, PolicyError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| PolicyError::Source(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&source)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn options(&self) -> &PolicyOptions {
        &self.options
    }
}

/// One detected span. Offsets are byte offsets into the original text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct PiiMatch {
    pub rule_id: String,
    pub start: usize,
    pub end: usize,
    pub matched: String,
    pub strategy: MaskingStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct MaskOutcome {
    pub masked_text: String,
    pub matches: Vec<PiiMatch>,
}

/// A match inside a structured record, located by JSON path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub path: String,
    #[serde(flatten)]
    pub matched: PiiMatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMaskOutcome {
    pub record: Value,
    pub matches: Vec<FieldMatch>,
}

pub struct MaskingEngine;

impl MaskingEngine {
    /// Detect and transform every sensitive span in `text`.
    pub fn mask(text: &str, policy: &MaskingPolicy) -> MaskOutcome {
        let matches = Self::detect(text, policy);
        if matches.is_empty() {
            return MaskOutcome {
                masked_text: text.to_string(),
                matches,
            };
        }

        let mut masked = String::with_capacity(text.len());
        let mut cursor = 0;
        for m in &matches {
            masked.push_str(&text[cursor..m.start]);
            masked.push_str(&Self::transform(&m.matched, m.strategy, policy));
            cursor = m.end;
        }
        masked.push_str(&text[cursor..]);

        MaskOutcome {
            masked_text: masked,
            matches,
        }
    }

    /// Non-overlapping matches in text order.
    pub fn detect(text: &str, policy: &MaskingPolicy) -> Vec<PiiMatch> {
        // Next candidate per rule; a candidate stays valid while it starts at
        // or after the cursor.
        let mut candidates: Vec<Option<(usize, usize)>> = policy
            .rules
            .iter()
            .map(|rule| first_non_empty(&rule.regex, text, 0))
            .collect();

        let mut matches = Vec::new();
        let mut pos = 0;
        loop {
            let mut best: Option<(usize, usize, usize)> = None;
            for (idx, slot) in candidates.iter_mut().enumerate() {
                if let Some((start, _)) = *slot {
                    if start < pos {
                        *slot = first_non_empty(&policy.rules[idx].regex, text, pos);
                    }
                }
                let Some((start, end)) = *slot else {
                    continue;
                };
                let better = match best {
                    None => true,
                    Some((b_start, b_end, _)) => {
                        start < b_start || (start == b_start && end - start > b_end - b_start)
                    }
                };
                if better {
                    best = Some((start, end, idx));
                }
            }

            let Some((start, end, idx)) = best else {
                break;
            };
            let rule = &policy.rules[idx];
            matches.push(PiiMatch {
                rule_id: rule.id.clone(),
                start,
                end,
                matched: text[start..end].to_string(),
                strategy: rule.strategy,
            });
            pos = end;
        }
        matches
    }

    /// Mask every string leaf of a JSON record. Object keys are left intact.
    pub fn mask_record(record: &Value, policy: &MaskingPolicy) -> RecordMaskOutcome {
        let mut matches = Vec::new();
        let record = Self::mask_value(record, policy, "", &mut matches);
        RecordMaskOutcome { record, matches }
    }

    fn mask_value(
        value: &Value,
        policy: &MaskingPolicy,
        path: &str,
        out: &mut Vec<FieldMatch>,
    ) -> Value {
        match value {
            Value::String(s) => {
                let outcome = Self::mask(s, policy);
                out.extend(outcome.matches.into_iter().map(|m| FieldMatch {
                    path: path.to_string(),
                    matched: m,
                }));
                Value::String(outcome.masked_text)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| {
                        Self::mask_value(item, policy, &format!("{}[{}]", path, idx), out)
                    })
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| {
                        let child = if path.is_empty() {
                            key.clone()
                        } else {
                            format!("{}.{}", path, key)
                        };
                        (key.clone(), Self::mask_value(item, policy, &child, out))
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn transform(span: &str, strategy: MaskingStrategy, policy: &MaskingPolicy) -> String {
        match strategy {
            MaskingStrategy::Simple => {
                policy
                    .options
                    .marker
                    .to_string()
                    .repeat(span.chars().count())
            }
            MaskingStrategy::Structural => policy.options.redaction_tag.clone(),
            MaskingStrategy::Hash => sha256_hex(span.as_bytes()),
            MaskingStrategy::FormatPreserving => match &policy.options.seed {
                Some(seed) => {
                    let key = hmac256(
                        seed.as_bytes(),
                        &[policy.id.as_bytes(), &[0u8][..], span.as_bytes()],
                    );
                    substitute_digits(span, &mut StdRng::from_seed(key))
                }
                None => substitute_digits(span, &mut rand::rng()),
            },
        }
    }
}

/// First non-empty match starting at or after `at`.
fn first_non_empty(regex: &Regex, text: &str, mut at: usize) -> Option<(usize, usize)> {
    while at <= text.len() {
        let m = regex.find_at(text, at)?;
        if m.end() > m.start() {
            return Some((m.start(), m.end()));
        }
        at = m.end() + text[m.end()..].chars().next().map_or(1, char::len_utf8);
    }
    None
}

fn substitute_digits<R: Rng>(span: &str, rng: &mut R) -> String {
    span.chars()
        .map(|c| {
            if c.is_ascii_digit() {
                char::from(b'0' + rng.random_range(0..10u8))
            } else {
                c
            }
        })
        .collect()
}
