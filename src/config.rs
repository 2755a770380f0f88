use serde::{Deserialize, Serialize};
use simple_error::bail;
use std::boxed::Box;
use std::error::Error;
use std::fs;
use std::path::Path;

use crate::delivery::{DEFAULT_ATTEMPTS, DEFAULT_TIMEOUT_SECS};

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct Config<'a> {
	#[serde(borrow)]
	pub output: OutputConfig<'a>,

	#[serde(borrow)]
	pub delivery: DeliveryConfig<'a>
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct OutputConfig<'a> {
	/// One of kv, csv or gzip-json.
	pub style: &'a str,

	/// Where gzip-json reports are written when they are not delivered.
	pub directory: &'a str
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct DeliveryConfig<'a> {
	pub enabled: bool,
	pub method: &'a str,
	pub destination: &'a str,
	pub attempts: u32,
	pub timeout_secs: u64,

	/// Keep an undeliverable report on disk instead of dropping it.
	pub spool_on_failure: bool
}

pub const DEFAULT: Config = Config{
	output: OutputConfig{
		style: "kv",
		directory: "."
	},
	delivery: DeliveryConfig{
		enabled: false,
		method: "http",
		destination: "",
		attempts: DEFAULT_ATTEMPTS,
		timeout_secs: DEFAULT_TIMEOUT_SECS,
		spool_on_failure: true
	}
};

impl<'a> Config<'a> {
	pub fn from_toml(text: &'a str) -> Result<Self, Box<dyn Error>> {
		let config: Config = toml::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), Box<dyn Error>> {
		if self.delivery.enabled {
			self.delivery.check(self.delivery.destination)?;
		}
		Ok(())
	}
}

impl<'a> DeliveryConfig<'a> {
	/// Checks the settings delivery needs, whether it was enabled here or on the command line.
	pub fn check(&self, destination: &str) -> Result<(), Box<dyn Error>> {
		if self.method != "http" {
			bail!("unsupported delivery method '{}' (only http is available)", self.method);
		}
		if destination.trim().is_empty() {
			bail!("delivery is enabled but no destination is configured");
		}
		Ok(())
	}
}

/// Reads the config file at `path` into a String, creating it with the defaults first if it does not exist.
pub fn read_or_create(path: &Path) -> Result<String, Box<dyn Error>> {
	if !path.exists() {
		tracing::info!(path = %path.display(), "could not find config, creating default");
		fs::write(path, toml::to_string(&DEFAULT)?)?;
	}

	Ok(fs::read_to_string(path)?)
}
