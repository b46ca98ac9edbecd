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

// Main entry point for the lilith-vault CLI
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

use lilith_vault::config::{Config, LogFormat};
use lilith_vault::engine::masking::PolicyFile;
use lilith_vault::engine::validator::SchemaDefinition;
use lilith_vault::engine_core::crypto::{parse_verifying_key, LedgerSigner};
use lilith_vault::engine_core::ledger::{AuditEvent, AuditLedger, LedgerBundle};
use lilith_vault::SecurityCore;

const EXIT_VIOLATION: u8 = 1;
const EXIT_LOAD_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mask sensitive spans in text read from a file or stdin
    Mask {
        /// Path to policy YAML file
        #[arg(long)]
        policy: PathBuf,
        /// Input file (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Mask each line independently on the worker pool
        #[arg(long)]
        lines: bool,
        /// Print matches as JSON instead of the masked text
        #[arg(long)]
        json: bool,
    },
    /// Validate a JSON record against a schema
    Validate {
        /// Path to schema YAML file
        #[arg(long)]
        schema: PathBuf,
        /// Path to the JSON record
        #[arg(long)]
        record: PathBuf,
    },
    /// Build a ledger from JSON-lines audit events and export it as a bundle
    Seal {
        /// File with one audit event per line
        #[arg(long)]
        events: PathBuf,
        /// Hex Ed25519 secret key for entry and bundle signatures
        #[arg(long)]
        secret_key: Option<String>,
    },
    /// Verify an exported ledger bundle
    Verify {
        #[arg(long)]
        bundle: PathBuf,
        /// Hex Ed25519 public key; signatures are checked only when given
        #[arg(long)]
        public_key: Option<String>,
    },
    /// Generate an Ed25519 key pair for ledger signing
    Keygen,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    install_panic_hook();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!(
            "Warning: Failed to load config from env, using defaults: {}",
            e
        );
        Config::default()
    });
    init_tracing(&config);

    match run(cli.command, Arc::new(config)).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_LOAD_ERROR)
        }
    }
}

async fn run(command: Command, config: Arc<Config>) -> Result<ExitCode> {
    match command {
        Command::Mask {
            policy,
            input,
            lines,
            json,
        } => mask(config, &policy, input.as_deref(), lines, json).await,
        Command::Validate { schema, record } => validate(config, &schema, &record),
        Command::Seal { events, secret_key } => seal(config, &events, secret_key.as_deref()),
        Command::Verify { bundle, public_key } => verify(&bundle, public_key.as_deref()),
        Command::Keygen => keygen(),
    }
}

async fn mask(
    config: Arc<Config>,
    policy_path: &Path,
    input: Option<&Path>,
    lines: bool,
    json: bool,
) -> Result<ExitCode> {
    let core = SecurityCore::new(config);
    let def: PolicyFile = serde_yaml_ng::from_str(&read_file(policy_path)?)
        .with_context(|| format!("Invalid policy file {}", policy_path.display()))?;
    let policy = core.load_policy_file(&def)?;

    let text = match input {
        Some(path) => read_file(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };

    let outcomes = if lines {
        let items: Vec<String> = text.lines().map(str::to_string).collect();
        let outcome = core.batch().mask_batch(items, policy)?.join().await;
        debug!(completed = outcome.completed(), "Line batch finished");
        outcome.results.into_iter().flatten().collect()
    } else {
        vec![core.mask(&text, &policy)]
    };

    if json {
        print_json(&outcomes)?;
    } else {
        let masked: Vec<&str> = outcomes.iter().map(|o| o.masked_text.as_str()).collect();
        print!("{}", masked.join("\n"));
        if lines && !masked.is_empty() {
            println!();
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn validate(config: Arc<Config>, schema_path: &Path, record_path: &Path) -> Result<ExitCode> {
    let core = SecurityCore::new(config);
    let definition = SchemaDefinition::from_yaml_file(schema_path)?;
    let id = schema_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "schema".to_string());
    let schema = core.load_schema(&id, definition)?;

    let record: serde_json::Value = serde_json::from_str(&read_file(record_path)?)
        .with_context(|| format!("Invalid JSON record {}", record_path.display()))?;
    let result = core.validate(&record, &schema);
    print_json(&result)?;
    Ok(exit_for(result.valid))
}

fn seal(config: Arc<Config>, events_path: &Path, secret_key: Option<&str>) -> Result<ExitCode> {
    let signer = secret_key.map(LedgerSigner::from_hex).transpose()?;
    let core = match &signer {
        Some(signer) => SecurityCore::with_signer(config, signer.signing_key().clone()),
        None => SecurityCore::new(config),
    };

    let source = read_file(events_path)?;
    for (line_no, line) in source.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: AuditEvent = serde_json::from_str(line)
            .with_context(|| format!("Invalid audit event on line {}", line_no + 1))?;
        core.append_audit(event)?;
    }

    let len = core.ledger().len() as u64;
    if len == 0 {
        anyhow::bail!("No audit events in {}", events_path.display());
    }
    let bundle = core.export_ledger(0, len - 1, signer.as_ref().map(LedgerSigner::signing_key))?;
    info!(entries = len, bundle_id = %bundle.header.bundle_id, "Ledger sealed");
    print_json(&bundle)?;
    Ok(ExitCode::SUCCESS)
}

fn verify(bundle_path: &Path, public_key: Option<&str>) -> Result<ExitCode> {
    let bundle: LedgerBundle = serde_json::from_str(&read_file(bundle_path)?)
        .with_context(|| format!("Invalid bundle {}", bundle_path.display()))?;
    let key = public_key.map(parse_verifying_key).transpose()?;
    let result = AuditLedger::verify_bundle(&bundle, key.as_ref());
    print_json(&result)?;
    Ok(exit_for(result.ok))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeyPair {
    secret_key: String,
    public_key: String,
}

fn keygen() -> Result<ExitCode> {
    let signer = LedgerSigner::generate();
    print_json(&KeyPair {
        secret_key: signer.secret_hex(),
        public_key: hex::encode(signer.verifying_key().as_bytes()),
    })?;
    Ok(ExitCode::SUCCESS)
}

fn exit_for(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_VIOLATION)
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        _ => subscriber.init(),
    }
}
