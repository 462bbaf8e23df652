//! Error types for store setup.

use thiserror::Error;

/// Errors raised while wiring diagnostics into a store tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
	/// Nodes whose path and sink had already been assigned.
	///
	/// Every other node reached by the walk is still wired.
	#[error("store nodes already initialized: {}", .paths.join(", "))]
	AlreadyInitialized {
		/// Paths at which the already-assigned nodes were reached.
		paths: Vec<String>,
	},

	/// A node was registered under an empty path.
	#[error("store node registered with an empty path")]
	EmptyPath,
}

/// Errors that can occur when loading store configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or field types.
	#[error("TOML parse error: {0}")]
	Parse(#[from] toml::de::Error),

	/// A field holds a value the store cannot run with.
	#[error("invalid store configuration: {0}")]
	Invalid(String),
}
