use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Tuning shared by cells and registries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
	/// Threshold used by [`Cell::is_stale`](crate::Cell::is_stale), in milliseconds.
	#[serde(default = "default_stale_after_ms")]
	pub stale_after_ms: u64,
}

fn default_stale_after_ms() -> u64 {
	30_000
}

impl Default for StoreConfig {
	fn default() -> Self {
		Self {
			stale_after_ms: default_stale_after_ms(),
		}
	}
}

impl StoreConfig {
	/// Parses and validates a TOML document.
	///
	/// ```toml
	/// stale_after_ms = 5000
	/// ```
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(source)?;
		config.validate()?;
		Ok(config)
	}

	/// Rejects values the store cannot run with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.stale_after_ms == 0 {
			return Err(ConfigError::Invalid("stale_after_ms must be > 0".to_string()));
		}
		Ok(())
	}

	/// Staleness threshold as a [`Duration`].
	pub fn stale_after(&self) -> Duration {
		Duration::from_millis(self.stale_after_ms)
	}
}
