//! Mailsift CLI entry point.
//!
//! Reads Message or Thread JSON from a file or stdin and prints the result
//! as JSON on stdout. Logs go to stderr (and a rotated file when
//! `[logging] dir` is set).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};

use mailsift::config::Config;
use mailsift::logging;
use mailsift::patterns::{CompiledLibrary, PatternLibrary};
use mailsift::pipeline::ClassificationPipeline;
use mailsift::providers::HttpIntentService;
use mailsift::types::{Message, Thread};

/// Mailsift: explainable email triage.
#[derive(Parser)]
#[command(name = "mailsift", version, about)]
struct Cli {
    /// Config file (default: `$MAILSIFT_CONFIG_PATH` or `~/.mailsift/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter, overridden by `RUST_LOG`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pretty: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Classify one Message JSON.
    Classify {
        /// Input file, or `-` for stdin.
        input: String,
    },
    /// Extract thread context from a Thread JSON.
    Thread {
        /// Input file, or `-` for stdin.
        input: String,
        /// Also classify the last message with the thread's context.
        #[arg(long)]
        classify: bool,
    },
    /// Classify a JSON array of messages concurrently.
    Batch {
        /// Input file, or `-` for stdin.
        input: String,
    },
    /// Parse, compile and validate a pattern library.
    CheckPatterns {
        /// Library file (default: the built-in library).
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    let _logging_guard = match &config.logging.dir {
        Some(dir) => Some(logging::init_production(dir, &config.logging.level)?),
        None => {
            logging::init_cli(&config.logging.level);
            None
        }
    };

    match cli.command {
        Command::Classify { input } => handle_classify(&config, &input, cli.pretty).await,
        Command::Thread { input, classify } => handle_thread(&config, &input, classify, cli.pretty),
        Command::Batch { input } => handle_batch(&config, &input, cli.pretty).await,
        Command::CheckPatterns { file } => handle_check_patterns(file.as_deref(), cli.pretty),
    }
}

/// Classify one message, through the intent service when configured.
async fn handle_classify(config: &Config, input: &str, pretty: bool) -> anyhow::Result<()> {
    let message: Message = read_json(input)?;
    let pipeline = Arc::new(ClassificationPipeline::from_config(config)?);
    let now = Utc::now();

    let result = match &config.service.url {
        Some(url) => {
            let service =
                HttpIntentService::new(url, Duration::from_millis(config.service.timeout_ms))
                    .context("invalid intent service configuration")?;
            pipeline.classify_with_service(&message, now, &service).await
        }
        None => match config.pipeline.timeout_ms {
            Some(ms) => {
                pipeline
                    .classify_with_timeout(message, now, Duration::from_millis(ms))
                    .await
            }
            None => pipeline.classify(&message, now),
        },
    };
    info!(
        intent = %result.final_classification.intent,
        category = result.final_classification.category.as_str(),
        "classification complete"
    );
    print_json(&result, pretty)
}

/// Thread context, or a thread-aware classification.
fn handle_thread(config: &Config, input: &str, classify: bool, pretty: bool) -> anyhow::Result<()> {
    let thread: Thread = read_json(input)?;
    let pipeline = ClassificationPipeline::from_config(config)?;
    let now = Utc::now();
    if classify {
        print_json(&pipeline.classify_thread(&thread, now), pretty)
    } else {
        print_json(&pipeline.extract_thread(&thread, now), pretty)
    }
}

/// Classify many messages, output in input order.
async fn handle_batch(config: &Config, input: &str, pretty: bool) -> anyhow::Result<()> {
    let messages: Vec<Message> = read_json(input)?;
    let count = messages.len();
    let pipeline = Arc::new(ClassificationPipeline::from_config(config)?);
    let results = pipeline.classify_batch(messages, Utc::now()).await;
    info!(messages = count, "batch complete");
    print_json(&results, pretty)
}

/// Report the library version and sizes, or fail with the load error.
fn handle_check_patterns(file: Option<&Path>, pretty: bool) -> anyhow::Result<()> {
    let library = match file {
        Some(path) => CompiledLibrary::from_path(path)
            .with_context(|| format!("invalid pattern library {}", path.display()))?,
        None => PatternLibrary::builtin()
            .and_then(|raw| raw.compile())
            .context("invalid built-in pattern library")?,
    };

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct PatternReport<'a> {
        version: &'a str,
        intents: usize,
        patterns: usize,
        rules: usize,
    }

    let report = PatternReport {
        version: &library.version,
        intents: library.intents.len(),
        patterns: library.intents.iter().map(|i| i.patterns.len()).sum(),
        rules: library.rules.len(),
    };
    print_json(&report, pretty)
}

fn read_json<T: serde::de::DeserializeOwned>(input: &str) -> anyhow::Result<T> {
    let text = if input == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read stdin")?;
        buffer
    } else {
        std::fs::read_to_string(input).with_context(|| format!("failed to read {input}"))?
    };
    debug!(bytes = text.len(), "input read");
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {input}"))
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}
