//! Configuration module for the binary poll client.
//!
//! Configuration is a single TOML file with three sections: which ledger
//! implementation to use (and its raw settings), where the compiled contract
//! artifact lives, and how often the sync engine polls. `${VAR}` and
//! `${VAR:-default}` references are resolved from the environment before
//! parsing.

use poll_types::{ArtifactError, ContractArtifact};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
	/// The contract artifact could not be parsed.
	#[error("Artifact error: {0}")]
	Artifact(#[from] ArtifactError),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Ledger implementation selection and settings.
	pub ledger: LedgerConfig,
	/// Location of the compiled contract artifact.
	pub contract: ContractConfig,
	/// Sync engine settings.
	#[serde(default)]
	pub sync: SyncConfig,
}

/// Configuration for the ledger connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of ledger implementation names to their configurations.
	/// Each implementation validates its own table.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the poll contract.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContractConfig {
	/// Path to the Truffle-style artifact JSON.
	pub artifact: PathBuf,
}

/// Configuration for the sync engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
	/// Interval between `hasVoted` polls, in milliseconds.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			poll_interval_ms: default_poll_interval_ms(),
		}
	}
}

fn default_poll_interval_ms() -> u64 {
	1000
}

/// Resolves `${VAR_NAME}` and `${VAR_NAME:-default}` from the environment.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {e}")))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file with async environment variable
	/// resolution.
	///
	/// A relative artifact path is resolved against the directory that
	/// contains the configuration file.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = tokio::fs::read_to_string(path).await?;
		let mut config: Config = content.parse()?;

		if config.contract.artifact.is_relative() {
			if let Some(base_dir) = path.parent() {
				config.contract.artifact = base_dir.join(&config.contract.artifact);
			}
		}

		tracing::debug!(
			path = %path.display(),
			ledger = %config.ledger.primary,
			artifact = %config.contract.artifact.display(),
			"Loaded configuration"
		);
		Ok(config)
	}

	/// Validates the configuration.
	///
	/// - The primary ledger must name a configured implementation
	/// - The artifact path must not be empty
	/// - The poll interval must be positive
	fn validate(&self) -> Result<(), ConfigError> {
		if self.ledger.primary.is_empty() {
			return Err(ConfigError::Validation(
				"Ledger primary implementation cannot be empty".into(),
			));
		}
		if !self
			.ledger
			.implementations
			.contains_key(&self.ledger.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary ledger '{}' has no entry in [ledger.implementations]",
				self.ledger.primary
			)));
		}

		if self.contract.artifact.as_os_str().is_empty() {
			return Err(ConfigError::Validation(
				"Contract artifact path cannot be empty".into(),
			));
		}

		if self.sync.poll_interval_ms == 0 {
			return Err(ConfigError::Validation(
				"sync.poll_interval_ms must be greater than 0".into(),
			));
		}

		Ok(())
	}

	/// Settings table of the primary ledger implementation.
	pub fn primary_ledger(&self) -> Result<(&str, &toml::Value), ConfigError> {
		let name = self.ledger.primary.as_str();
		self.ledger
			.implementations
			.get(name)
			.map(|table| (name, table))
			.ok_or_else(|| {
				ConfigError::Validation(format!("Ledger implementation '{}' not configured", name))
			})
	}

	/// Overrides one key of an implementation's settings table.
	///
	/// Used for secrets passed on the command line or through the
	/// environment instead of the file.
	pub fn set_ledger_value(
		&mut self,
		implementation: &str,
		key: &str,
		value: impl Into<toml::Value>,
	) -> Result<(), ConfigError> {
		let table = self
			.ledger
			.implementations
			.get_mut(implementation)
			.and_then(|v| v.as_table_mut())
			.ok_or_else(|| {
				ConfigError::Validation(format!(
					"Ledger implementation '{}' not configured",
					implementation
				))
			})?;
		table.insert(key.to_string(), value.into());
		Ok(())
	}

	/// Poll interval of the sync engine.
	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.sync.poll_interval_ms)
	}

	/// Reads and parses the contract artifact.
	pub async fn load_artifact(&self) -> Result<ContractArtifact, ConfigError> {
		let json = tokio::fs::read_to_string(&self.contract.artifact).await?;
		let artifact = ContractArtifact::from_json_str(&json)?;

		tracing::debug!(
			contract = artifact.name().unwrap_or("<unnamed>"),
			networks = ?artifact.networks(),
			"Loaded contract artifact"
		);
		Ok(artifact)
	}
}

impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
