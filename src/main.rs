//! llm-council - put one question to every council member
//!
//! Loads the council configuration, sends the prompt to all members at once
//! and prints each member's answer (or `null` when it failed) as JSON.

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use llm_council::{ChatMessage, Config, Council};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Question to put to the council
    #[arg(short, long)]
    prompt: String,

    /// Optional system prompt sent before the question
    #[arg(short, long)]
    system: Option<String>,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Per-member timeout in seconds (overrides the config file)
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(secs) = args.timeout {
        config.council.timeout_secs = secs;
        config.validate()?;
    }

    let council = Council::from_config(&config)?;
    info!(
        "Council: {} (chairman {})",
        council
            .members()
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        council.chairman()
    );

    let mut messages = Vec::new();
    if let Some(system) = args.system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(args.prompt));

    let results = council.query(&messages).await;

    let absent = results.absent();
    if !absent.is_empty() {
        warn!(
            "{} of {} council members did not answer",
            absent.len(),
            results.len()
        );
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
