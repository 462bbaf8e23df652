//! Diagnostic identity shared by every addressable store node.

use std::fmt;
use std::sync::{Arc, OnceLock};

/// Receives formatted diagnostic lines of the form `[<path>] <message> // <reason>`.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

struct Assignment {
	path: String,
	sink: Option<LogSink>,
}

/// Write-once path and log sink of a store node.
///
/// Both are assigned together by the tree initializer and never change
/// afterwards. An unassigned node still traces its transitions, but nothing
/// reaches a [`LogSink`].
#[derive(Default)]
pub struct Diagnostics {
	assignment: OnceLock<Assignment>,
}

impl Diagnostics {
	/// Dotted path of this node, once initialized.
	pub fn path(&self) -> Option<&str> {
		self.assignment.get().map(|a| a.path.as_str())
	}

	/// Returns true if a log sink was installed with the path.
	pub fn has_sink(&self) -> bool {
		self.assignment.get().is_some_and(|a| a.sink.is_some())
	}

	/// Assigns path and sink. Returns false if the node was already assigned.
	pub(crate) fn assign(&self, path: String, sink: Option<LogSink>) -> bool {
		self.assignment.set(Assignment { path, sink }).is_ok()
	}

	/// Emits one diagnostic line.
	pub fn log(&self, message: &str, reason: Option<&str>) {
		let path = self.path().unwrap_or("<unassigned>");
		tracing::trace!(store.path = path, reason, "{message}");

		let Some(Assignment { path, sink: Some(sink) }) = self.assignment.get() else {
			return;
		};
		sink(&format_line(path, message, reason));
	}
}

fn format_line(path: &str, message: &str, reason: Option<&str>) -> String {
	match reason {
		Some(reason) => format!("[{path}] {message} // {reason}"),
		None => format!("[{path}] {message}"),
	}
}

impl fmt::Debug for Diagnostics {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Diagnostics")
			.field("path", &self.path())
			.field("has_sink", &self.has_sink())
			.finish()
	}
}

/// A node of the store tree that carries [`Diagnostics`].
pub trait StoreElement {
	/// Returns this node's diagnostics.
	fn diagnostics(&self) -> &Diagnostics;

	/// Dotted path of this node, once initialized.
	fn path(&self) -> Option<&str> {
		self.diagnostics().path()
	}
}
