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

// Masking policy validation - fail-fast at policy load time

use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

use crate::engine::masking::{
    CompiledRule, MaskingPolicy, MaskingRule, MaskingStrategy, PolicyOptions,
};
use crate::engine_core::constants::masking::SELF_MATCH_PROBE_LEN;
use crate::engine_core::errors::PolicyError;

/// Validates and compiles masking policies. A policy that passes is never
/// rejected later: `mask` cannot fail on it.
pub struct PolicyValidator;

impl PolicyValidator {
    /// Validate all rules, compile their patterns and build the policy.
    pub fn compile(
        id: &str,
        rules: &[MaskingRule],
        options: PolicyOptions,
    ) -> Result<MaskingPolicy, PolicyError> {
        if id.trim().is_empty() {
            return Err(PolicyError::EmptyPolicyId);
        }
        if rules.is_empty() {
            return Err(PolicyError::NoRules {
                policy: id.to_string(),
            });
        }
        Self::validate_options(id, &options)?;

        let mut seen = HashSet::new();
        let mut compiled = Vec::with_capacity(rules.len());
        for (idx, rule) in rules.iter().enumerate() {
            if rule.id.trim().is_empty() {
                return Err(PolicyError::EmptyRuleId {
                    policy: id.to_string(),
                    index: idx + 1,
                });
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(PolicyError::DuplicateRuleId {
                    policy: id.to_string(),
                    rule: rule.id.clone(),
                });
            }
            compiled.push(Self::compile_rule(id, rule, &options)?);
        }
        Self::check_idempotent(id, &compiled, &options)?;

        debug!(policy = id, rules = compiled.len(), "Masking policy compiled");
        Ok(MaskingPolicy {
            id: id.to_string(),
            rules: compiled,
            options,
        })
    }

    fn validate_options(id: &str, options: &PolicyOptions) -> Result<(), PolicyError> {
        let invalid = |reason: &str| PolicyError::InvalidOption {
            policy: id.to_string(),
            reason: reason.to_string(),
        };

        if options.marker.is_alphanumeric() || options.marker.is_whitespace() {
            return Err(invalid("marker must be a non-alphanumeric, visible character"));
        }
        if options.redaction_tag.is_empty() {
            return Err(invalid("redaction tag cannot be empty"));
        }
        if options.redaction_tag.chars().all(|c| c == options.marker) {
            return Err(invalid("redaction tag cannot consist only of marker characters"));
        }
        if options.seed.as_deref().is_some_and(str::is_empty) {
            return Err(invalid("seed cannot be empty when set"));
        }
        Ok(())
    }

    fn compile_rule(
        policy: &str,
        rule: &MaskingRule,
        options: &PolicyOptions,
    ) -> Result<CompiledRule, PolicyError> {
        if rule.pattern.is_empty() {
            return Err(PolicyError::EmptyPattern {
                policy: policy.to_string(),
                rule: rule.id.clone(),
            });
        }

        let regex = Regex::new(&rule.pattern).map_err(|e| PolicyError::InvalidPattern {
            policy: policy.to_string(),
            rule: rule.id.clone(),
            reason: e.to_string(),
        })?;

        Ok(CompiledRule {
            id: rule.id.clone(),
            regex,
            strategy: rule.strategy.unwrap_or(options.default_strategy),
        })
    }

    /// Re-applying simple or structural masking must be a no-op, so no rule
    /// in the policy may match the marker runs or the tag any rule emits.
    fn check_idempotent(
        policy: &str,
        rules: &[CompiledRule],
        options: &PolicyOptions,
    ) -> Result<(), PolicyError> {
        for emitter in rules {
            let outputs = Self::emitted_outputs(emitter.strategy, options);
            for rule in rules {
                let hit = outputs
                    .iter()
                    .any(|out| rule.regex.find_iter(out).any(|m| !m.is_empty()));
                if hit {
                    return Err(PolicyError::SelfMatchingRule {
                        policy: policy.to_string(),
                        rule: rule.id.clone(),
                        emitter: emitter.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn emitted_outputs(strategy: MaskingStrategy, options: &PolicyOptions) -> Vec<String> {
        match strategy {
            MaskingStrategy::Simple => (1..=SELF_MATCH_PROBE_LEN)
                .map(|len| options.marker.to_string().repeat(len))
                .collect(),
            MaskingStrategy::Structural => vec![options.redaction_tag.clone()],
            // Hash and format-preserving output is not idempotent by construction.
            MaskingStrategy::Hash | MaskingStrategy::FormatPreserving => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, pattern: &str, strategy: MaskingStrategy) -> MaskingRule {
        MaskingRule::new(id, pattern, strategy)
    }

    #[test]
    fn test_invalid_pattern_fails_at_load() {
        let err = PolicyValidator::compile(
            "p",
            &[rule("bad", "([a-z", MaskingStrategy::Simple)],
            PolicyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidPattern { ref rule, .. } if rule == "bad"));
    }

    #[test]
    fn test_duplicate_and_empty_ids() {
        let err = PolicyValidator::compile(
            "p",
            &[
                rule("a", "x", MaskingStrategy::Simple),
                rule("a", "y", MaskingStrategy::Simple),
            ],
            PolicyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::DuplicateRuleId { .. }));

        let err = PolicyValidator::compile(
            "p",
            &[rule(" ", "x", MaskingStrategy::Simple)],
            PolicyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::EmptyRuleId { index: 1, .. }));

        assert_eq!(
            PolicyValidator::compile("", &[], PolicyOptions::default()).unwrap_err(),
            PolicyError::EmptyPolicyId
        );
    }

    #[test]
    fn test_self_matching_rules_rejected() {
        // \S+ would match its own "****" output.
        let err = PolicyValidator::compile(
            "p",
            &[rule("greedy", "\\S+", MaskingStrategy::Simple)],
            PolicyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::SelfMatchingRule { .. }));

        let err = PolicyValidator::compile(
            "p",
            &[rule("tag", "REDACTED", MaskingStrategy::Structural)],
            PolicyOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PolicyError::SelfMatchingRule {
                policy: "p".to_string(),
                rule: "tag".to_string(),
                emitter: "tag".to_string(),
            }
        );

        // Hashing is exempt: it is not idempotent by construction.
        assert!(PolicyValidator::compile(
            "p",
            &[rule("any", "\\S+", MaskingStrategy::Hash)],
            PolicyOptions::default(),
        )
        .is_ok());
    }

    #[test]
    fn test_rule_matching_another_rules_tag_rejected() {
        // "[REDACTED]" from the email rule would be re-masked by the code rule.
        let err = PolicyValidator::compile(
            "p",
            &[
                rule("email", "[a-z]+@[a-z]+\\.com", MaskingStrategy::Structural),
                rule("code", "[A-Z]{3,}", MaskingStrategy::Simple),
            ],
            PolicyOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            PolicyError::SelfMatchingRule {
                policy: "p".to_string(),
                rule: "code".to_string(),
                emitter: "email".to_string(),
            }
        );
    }

    #[test]
    fn test_hash_rule_matching_marker_run_rejected() {
        let err = PolicyValidator::compile(
            "p",
            &[
                rule("digits", "[0-9]{4}", MaskingStrategy::Simple),
                rule("stars", "\\*{2,}", MaskingStrategy::Hash),
            ],
            PolicyOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PolicyError::SelfMatchingRule { ref rule, ref emitter, .. }
                if rule == "stars" && emitter == "digits"
        ));
    }

    #[test]
    fn test_invalid_options() {
        let options = PolicyOptions {
            marker: 'x',
            ..PolicyOptions::default()
        };
        let err = PolicyValidator::compile(
            "p",
            &[rule("a", "[0-9]+", MaskingStrategy::Simple)],
            options,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidOption { .. }));
    }

    #[test]
    fn test_default_strategy_applies() {
        let options = PolicyOptions {
            default_strategy: MaskingStrategy::Structural,
            ..PolicyOptions::default()
        };
        let policy = PolicyValidator::compile(
            "p",
            &[MaskingRule {
                id: "digits".to_string(),
                pattern: "[0-9]+".to_string(),
                strategy: None,
            }],
            options,
        )
        .unwrap();
        assert_eq!(policy.rules()[0].strategy, MaskingStrategy::Structural);
    }
}
