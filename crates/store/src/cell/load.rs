use std::fmt;
use std::future::Future;

use cellar_worker::TaskClass;
use tokio::task::JoinHandle;

use super::Cell;

/// How an asynchronous load settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
	/// The loaded value was stored in the cell.
	Stored,
	/// The load failed; the cell's pending marker was reset.
	Failed,
	/// The load failed after a newer load had started. The newer load keeps
	/// the cell pending.
	Superseded,
	/// The load panicked or its runtime shut down before it settled.
	Aborted,
}

/// Handle to the continuation of one asynchronous load.
///
/// Dropping it detaches the continuation; the load still runs to completion.
#[derive(Debug)]
pub struct LoadHandle {
	task: JoinHandle<LoadOutcome>,
}

impl LoadHandle {
	/// Waits for the load to settle.
	pub async fn settled(self) -> LoadOutcome {
		self.task.await.unwrap_or(LoadOutcome::Aborted)
	}

	/// Returns true once the continuation has run.
	pub fn is_finished(&self) -> bool {
		self.task.is_finished()
	}
}

/// Pending marker of one started load.
///
/// Releases the marker when dropped unsettled, which covers a panicking
/// factory, a panicking load and runtime shutdown. A newer load's marker is
/// never touched.
pub(super) struct PendingGuard<T: Clone + Send + 'static> {
	cell: Cell<T>,
	generation: u64,
	armed: bool,
}

impl<T: Clone + Send + 'static> PendingGuard<T> {
	pub(super) fn new(cell: Cell<T>, generation: u64) -> Self {
		Self {
			cell,
			generation,
			armed: true,
		}
	}

	fn settle<E: fmt::Display>(mut self, result: Result<T, E>) -> LoadOutcome {
		self.armed = false;
		let cell = &self.cell;
		let diagnostics = &cell.shared.diagnostics;
		let mut state = cell.shared.state.lock();
		match result {
			Ok(value) => {
				cell.apply(&mut state, Some(value));
				drop(state);
				diagnostics.log("put_from_async_load(...)", None);
				LoadOutcome::Stored
			}
			Err(err) if state.load_generation != self.generation => {
				drop(state);
				tracing::debug!(store.path = diagnostics.path(), generation = self.generation, error = %err, "store.load.superseded");
				LoadOutcome::Superseded
			}
			Err(err) => {
				state.pending_since = None;
				drop(state);
				tracing::debug!(store.path = diagnostics.path(), error = %err, "store.load.failed");
				diagnostics.log("put_from_async_load failed", Some(&err.to_string()));
				LoadOutcome::Failed
			}
		}
	}
}

impl<T: Clone + Send + 'static> Drop for PendingGuard<T> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}
		let mut state = self.cell.shared.state.lock();
		if state.load_generation == self.generation {
			state.pending_since = None;
			tracing::debug!(store.path = self.cell.shared.diagnostics.path(), generation = self.generation, "store.load.abandoned");
		}
	}
}

impl<T: Clone + Send + 'static> Cell<T> {
	pub(super) fn spawn_load<F, E>(&self, guard: PendingGuard<T>, load: F) -> LoadHandle
	where
		F: Future<Output = Result<T, E>> + Send + 'static,
		E: fmt::Display + Send + 'static,
	{
		let task = cellar_worker::spawn(TaskClass::Load, self.shared.diagnostics.path(), async move {
			let result = load.await;
			guard.settle(result)
		});
		LoadHandle { task }
	}
}
