//! Command-line client for a binary poll contract.
//!
//! ```bash
//! poll --config poll.toml status
//! POLL_PRIVATE_KEY=0x... poll vote yes
//! poll create "Is this test passing?"
//! poll watch
//! ```

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use commands::Commands;
use output::{describe, Display};
use poll_config::Config;
use poll_core::{EventBus, PollError, PollSession};
use std::path::PathBuf;

/// Command-line arguments for the poll client.
#[derive(Parser, Debug)]
#[command(name = "poll", author, version, about, long_about = None)]
struct Args {
	/// Path to the configuration file
	#[arg(short, long, env = "POLL_CONFIG", default_value = "poll.toml")]
	config: PathBuf,

	/// Private key for the alloy ledger, overriding the configuration file
	#[arg(long, env = "POLL_PRIVATE_KEY", hide_env_values = true)]
	private_key: Option<String>,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	#[command(subcommand)]
	command: Commands,
}

#[tokio::main]
async fn main() {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_target(true)
		.with_writer(std::io::stderr)
		.init();

	if let Err(e) = run(args).await {
		report(&e);
		std::process::exit(1);
	}
}

async fn run(args: Args) -> Result<()> {
	let mut config = Config::from_file(&args.config)
		.await
		.with_context(|| format!("Failed to load configuration {}", args.config.display()))?;

	if let Some(key) = args.private_key {
		let alloy = poll_ledger::implementations::evm::alloy::NAME;
		if config.ledger.primary == alloy {
			config.set_ledger_value(alloy, "private_key", key)?;
		} else {
			tracing::warn!(
				ledger = %config.ledger.primary,
				"Ignoring private key: ledger does not sign locally"
			);
		}
	}

	let artifact = config
		.load_artifact()
		.await
		.context("Failed to load contract artifact")?;

	let (name, settings) = config.primary_ledger()?;
	let ledger = poll_ledger::create_ledger(name, settings).map_err(PollError::from)?;

	let mut session =
		PollSession::connect(&ledger, &artifact, config.poll_interval(), EventBus::default())
			.await?;

	let result = commands::execute(args.command, &session).await;
	session.shutdown().await;
	result
}

fn report(error: &anyhow::Error) {
	match error.downcast_ref::<PollError>() {
		Some(e) => {
			Display::error(&describe(e));
			if e.is_retryable() {
				Display::info("You can try again.");
			}
		},
		None => Display::error(&format!("{:#}", error)),
	}
}
