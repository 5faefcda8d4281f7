use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand};
use crossterm::{
    terminal::{disable_raw_mode, enable_raw_mode},
    tty::IsTty,
};
use keyprint::{
    capture::{capture_phrase, CrosstermEventSource},
    config::{Config, ConfigStore, FileConfigStore},
    enrollment::Enrollment,
    keystroke::{KeystrokeRecorder, TypingSample},
    login::{LoginGate, LoginRequest},
    store::{PatternStore, SqlitePatternStore},
    KeyprintError,
};
use serde::Serialize;
use std::{
    fs,
    io::{self, stdin},
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};
use tracing_subscriber::EnvFilter;

const CAPTURE_IDLE_SECS: u64 = 60;

/// keystroke-dynamics enrollment and verification
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Enroll a typing rhythm as a compact fingerprint and verify later samples against it. Samples are read from JSON files or captured from the terminal."
)]
pub struct Cli {
    /// config file to use instead of the default location
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// pattern database to use instead of the configured one
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// record and store a reference typing pattern
    Enroll {
        #[clap(long)]
        customer: String,
        /// JSON sample file; captured from the terminal when omitted
        #[clap(long)]
        sample: Option<PathBuf>,
    },
    /// check a typing sample against the enrolled pattern
    Verify {
        #[clap(long)]
        customer: String,
        #[clap(long)]
        sample: Option<PathBuf>,
        /// attempt number echoed from the previous response
        #[clap(long)]
        attempt: Option<u32>,
        /// standalone comparison without a retry budget
        #[clap(long)]
        manual: bool,
    },
    /// compare two sample or pattern files directly
    Compare { reference: PathBuf, candidate: PathBuf },
    /// score a sample's enrollment quality without storing it
    Assess {
        #[clap(long)]
        sample: PathBuf,
    },
    /// list enrolled patterns and recent auth events
    History {
        #[clap(long)]
        customer: String,
        #[clap(long, default_value_t = 10)]
        limit: u32,
    },
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            eprintln!("{}", e.user_message());
            ExitCode::from(2)
        }
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("KEYPRINT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Returns whether the command succeeded in the domain sense (accepted, valid, matched).
fn run(cli: Cli) -> keyprint::Result<bool> {
    let config = cli
        .config
        .as_ref()
        .map(FileConfigStore::with_path)
        .unwrap_or_default()
        .load();

    match cli.command {
        Command::Enroll { customer, sample } => {
            let store = open_store(cli.db.as_deref(), &config)?;
            let sample = match sample {
                Some(path) => read_sample(&path)?,
                None => capture_interactive(&format!(
                    "Type a phrase of at least {} characters.",
                    config.min_phrase_chars
                ))?,
            };
            let receipt = Enrollment::new(&store, &store, &config).enroll(&customer, &sample)?;
            emit(&receipt)?;
            Ok(true)
        }
        Command::Verify {
            customer,
            sample,
            attempt,
            manual,
        } => {
            let store = open_store(cli.db.as_deref(), &config)?;
            let sample = match sample {
                Some(path) => read_sample(&path)?,
                None => {
                    let phrase = store
                        .latest_pattern(&customer)?
                        .map(|p| p.pattern.text)
                        .ok_or_else(|| KeyprintError::NoEnrolledPattern {
                            customer_id: customer.clone(),
                        })?;
                    capture_interactive(&format!("Type: {phrase}"))?
                }
            };
            let gate = LoginGate::new(&store, &store, &config);
            if manual {
                let result = gate.verify_manual(&customer, &sample)?;
                emit(&result)?;
                Ok(result.is_match)
            } else {
                let mut request = LoginRequest::new(customer).with_sample(sample);
                request.attempt_number = attempt;
                let response = gate.verify(&request)?;
                emit(&response)?;
                Ok(response.accepted)
            }
        }
        Command::Compare {
            reference,
            candidate,
        } => {
            let reference = read_sample(&reference)?;
            let candidate = read_sample(&candidate)?;
            let reference = keyprint::generate_pattern(&reference.keystrokes, &reference.text)?;
            let candidate = keyprint::generate_pattern(&candidate.keystrokes, &candidate.text)?;
            let result = keyprint::compare_patterns(&reference, &candidate);
            emit(&result)?;
            Ok(result.is_match)
        }
        Command::Assess { sample } => {
            let sample = read_sample(&sample)?;
            let pattern = keyprint::generate_pattern(&sample.keystrokes, &sample.text)?;
            let assessment = keyprint::assess_quality(&pattern);
            emit(&assessment)?;
            Ok(assessment.is_valid)
        }
        Command::History { customer, limit } => {
            let store = open_store(cli.db.as_deref(), &config)?;
            let patterns: Vec<serde_json::Value> = store
                .pattern_history(&customer)?
                .into_iter()
                .take(limit as usize)
                .map(|p| {
                    serde_json::json!({
                        "id": p.id,
                        "createdAt": p.created_at.to_rfc3339(),
                        "quality": p.quality,
                        "kind": p.kind,
                        "keystrokes": p.pattern.keystrokes.len(),
                        "averageInterval": p.pattern.average_interval,
                        "patternHash": p.pattern.pattern_hash,
                    })
                })
                .collect();
            let events = store.recent_auth_events(&customer, limit)?;
            emit(&serde_json::json!({ "patterns": patterns, "events": events }))?;
            Ok(true)
        }
    }
}

fn open_store(db: Option<&Path>, config: &Config) -> keyprint::Result<SqlitePatternStore> {
    match db {
        Some(path) => SqlitePatternStore::open(path),
        None => SqlitePatternStore::open(config.resolved_database_path()),
    }
}

/// Accepts either a bare sample or a full pattern; both carry `keystrokes` and `text`.
fn read_sample(path: &Path) -> keyprint::Result<TypingSample> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn capture_interactive(prompt: &str) -> keyprint::Result<TypingSample> {
    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(
            ErrorKind::Io,
            "stdin must be a tty to capture typing (or pass --sample)",
        )
        .exit();
    }

    eprintln!("{prompt}");
    eprintln!("Press Enter when done, Esc to cancel. Input is not echoed.");

    enable_raw_mode()?;
    let source = CrosstermEventSource::new();
    let mut recorder = KeystrokeRecorder::start();
    let captured = capture_phrase(
        &source,
        &mut recorder,
        Duration::from_secs(CAPTURE_IDLE_SECS),
    );
    disable_raw_mode()?;
    eprintln!();

    tracing::debug!(keystrokes = recorder.len(), "capture finished");
    captured
}

fn emit<T: Serialize>(value: &T) -> keyprint::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
