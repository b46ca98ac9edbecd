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

use crate::engine_core::constants::config::{
    ENV_APPEND_WAIT_MS, ENV_BATCH_WORKERS, ENV_LOG_FORMAT, ENV_LOG_LEVEL, ENV_POLICY_SEED,
};
use crate::engine_core::constants::ledger::DEFAULT_APPEND_WAIT_MS;
use crate::engine_core::errors::CoreError;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse_safe(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub batch_workers: usize,
    pub append_wait_ms: u64,
    /// Fallback seed for format-preserving masking when a policy sets none.
    pub policy_seed: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            log_level: lookup(ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            log_format: lookup(ENV_LOG_FORMAT)
                .map(|v| LogFormat::parse_safe(&v))
                .unwrap_or(defaults.log_format),
            batch_workers: match lookup(ENV_BATCH_WORKERS) {
                Some(v) => parse_number::<usize>(ENV_BATCH_WORKERS, &v)?.max(1),
                None => defaults.batch_workers,
            },
            append_wait_ms: match lookup(ENV_APPEND_WAIT_MS) {
                Some(v) => parse_number(ENV_APPEND_WAIT_MS, &v)?,
                None => defaults.append_wait_ms,
            },
            policy_seed: lookup(ENV_POLICY_SEED).filter(|s| !s.is_empty()),
        })
    }

    pub fn append_wait(&self) -> Duration {
        Duration::from_millis(self.append_wait_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, CoreError> {
    raw.trim()
        .parse()
        .map_err(|_| CoreError::Configuration(format!("{} must be a non-negative integer, got '{}'", key, raw)))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            batch_workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
            append_wait_ms: DEFAULT_APPEND_WAIT_MS,
            policy_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.append_wait_ms, DEFAULT_APPEND_WAIT_MS);
        assert!(config.batch_workers >= 1);
        assert!(config.policy_seed.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            (ENV_LOG_FORMAT, "JSON"),
            (ENV_BATCH_WORKERS, "0"),
            (ENV_APPEND_WAIT_MS, "1000"),
            (ENV_POLICY_SEED, "fixture"),
        ]))
        .unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.batch_workers, 1);
        assert_eq!(config.append_wait(), Duration::from_secs(1));
        assert_eq!(config.policy_seed.as_deref(), Some("fixture"));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = Config::from_lookup(lookup(&[(ENV_APPEND_WAIT_MS, "soon")])).unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }
}
