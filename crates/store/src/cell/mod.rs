//! Single-slot reactive cell.
//!
//! A [`Cell`] holds at most one value and tracks when it was last populated
//! and when an asynchronous load was last started. Producers call
//! [`Cell::put`], [`Cell::clear`] or [`Cell::put_from_async_load`];
//! consumers take a [`Subscription`] to the value or clear streams.
//!
//! # Ordering
//!
//! Every emission happens while the cell's state lock is held, so both streams
//! observe mutations in exactly the order they were applied. For a registry
//! member the aggregate key emission follows the member-local one.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cellar_worker::{Scope, TaskClass};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::StoreConfig;
use crate::diagnostics::{Diagnostics, StoreElement};
use crate::registry::MemberLink;
use crate::subscription::{Fanout, Subscription};

mod load;

use load::PendingGuard;
pub use load::{LoadHandle, LoadOutcome};

struct CellState<T> {
	value: Option<T>,
	value_at: Option<Instant>,
	pending_since: Option<Instant>,
	/// Bumped by every load start. Only the newest load may release the
	/// pending marker.
	load_generation: u64,
}

impl<T> CellState<T> {
	const fn new() -> Self {
		Self {
			value: None,
			value_at: None,
			pending_since: None,
			load_generation: 0,
		}
	}
}

struct CellShared<T> {
	state: Mutex<CellState<T>>,
	changes: Fanout<T>,
	cleared: Fanout<()>,
	diagnostics: Diagnostics,
	stale_after: Duration,
	member: Option<MemberLink>,
}

/// Reactive single-value holder.
///
/// Cloning yields another handle to the same cell.
pub struct Cell<T> {
	shared: Arc<CellShared<T>>,
}

impl<T> Clone for Cell<T> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<T: Clone + Send + 'static> Default for Cell<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Clone + Send + 'static> Cell<T> {
	/// Creates an empty, pristine cell with default configuration.
	pub fn new() -> Self {
		Self::with_config(&StoreConfig::default())
	}

	/// Creates an empty, pristine cell.
	pub fn with_config(config: &StoreConfig) -> Self {
		Self::build(config, None)
	}

	pub(crate) fn build(config: &StoreConfig, member: Option<MemberLink>) -> Self {
		Self {
			shared: Arc::new(CellShared {
				state: Mutex::new(CellState::new()),
				changes: Fanout::default(),
				cleared: Fanout::default(),
				diagnostics: Diagnostics::default(),
				stale_after: config.stale_after(),
				member,
			}),
		}
	}

	/// Returns true if the cell has neither a value nor a load in flight.
	pub fn is_pristine(&self) -> bool {
		let state = self.shared.state.lock();
		state.value_at.is_none() && state.pending_since.is_none()
	}

	/// Returns true if both the value and the pending load are older than
	/// `threshold`. A missing timestamp counts as infinitely old.
	pub fn is_stale_beyond(&self, threshold: Duration) -> bool {
		let now = Instant::now();
		let state = self.shared.state.lock();
		older_than(state.value_at, threshold, now) && older_than(state.pending_since, threshold, now)
	}

	/// [`Self::is_stale_beyond`] with the configured threshold.
	pub fn is_stale(&self) -> bool {
		self.is_stale_beyond(self.shared.stale_after)
	}

	/// Returns true if a value is present.
	pub fn has_value(&self) -> bool {
		self.shared.state.lock().value.is_some()
	}

	/// Returns the current value, if any, without side effects.
	pub fn peek(&self) -> Option<T> {
		self.shared.state.lock().value.clone()
	}

	/// Empties the cell and resets both timestamps.
	pub fn clear(&self) {
		self.clear_inner(None);
	}

	/// [`Self::clear`] with a reason recorded in the diagnostics line.
	pub fn clear_with_reason(&self, reason: &str) {
		self.clear_inner(Some(reason));
	}

	/// Stores `value` and emits it to value subscribers.
	///
	/// A pending load is left untouched.
	pub fn put(&self, value: T) {
		self.put_inner(value, None);
	}

	/// [`Self::put`] with a reason recorded in the diagnostics line.
	pub fn put_with_reason(&self, value: T, reason: &str) {
		self.put_inner(value, Some(reason));
	}

	fn clear_inner(&self, reason: Option<&str>) {
		self.shared.diagnostics.log("clear()", reason);
		let mut state = self.shared.state.lock();
		self.apply(&mut state, None);
	}

	fn put_inner(&self, value: T, reason: Option<&str>) {
		self.shared.diagnostics.log("put(...)", reason);
		let mut state = self.shared.state.lock();
		self.apply(&mut state, Some(value));
	}

	/// Applies one transition and emits it. Must run under the state lock.
	fn apply(&self, state: &mut CellState<T>, value: Option<T>) {
		match value {
			Some(value) => {
				state.value = Some(value.clone());
				state.value_at = Some(Instant::now());
				self.shared.changes.send(value);
			}
			None => {
				state.value = None;
				state.value_at = None;
				state.pending_since = None;
				self.shared.cleared.send(());
			}
		}
		if let Some(member) = &self.shared.member {
			member.notify();
		}
	}

	/// Clears the cell and populates it from `load` once it resolves.
	///
	/// The pending-load timestamp keeps the cell non-pristine while the load
	/// is outstanding. A failed load resets it, leaving the cell pristine so
	/// a later call may retry. The load always runs to completion and a
	/// successful result is always stored, even if another load or `put`
	/// happened in between. Dropping the returned handle does not cancel it.
	pub fn put_from_async_load<F, E>(&self, load: F) -> LoadHandle
	where
		F: Future<Output = Result<T, E>> + Send + 'static,
		E: fmt::Display + Send + 'static,
	{
		let guard = self.begin_load();
		self.spawn_load(guard, load)
	}

	/// Starts a load from `factory` only if the cell is pristine.
	///
	/// The pristine check and the pending-load stamp happen under one lock, so
	/// at most one load is ever started for a pristine cell. `factory` runs
	/// after the stamp; if it panics the stamp is released again.
	pub fn put_from_async_load_if_pristine<F, E>(&self, factory: impl FnOnce() -> F) -> Option<LoadHandle>
	where
		F: Future<Output = Result<T, E>> + Send + 'static,
		E: fmt::Display + Send + 'static,
	{
		let guard = {
			let mut state = self.shared.state.lock();
			if state.value_at.is_some() || state.pending_since.is_some() {
				return None;
			}
			self.stamp_load(&mut state)
		};
		self.log_load_started();
		let load = factory();
		Some(self.spawn_load(guard, load))
	}

	fn begin_load(&self) -> PendingGuard<T> {
		let guard = {
			let mut state = self.shared.state.lock();
			self.stamp_load(&mut state)
		};
		self.log_load_started();
		guard
	}

	/// Clears the cell and marks a new load as pending.
	fn stamp_load(&self, state: &mut CellState<T>) -> PendingGuard<T> {
		self.apply(state, None);
		state.pending_since = Some(Instant::now());
		state.load_generation = state.load_generation.wrapping_add(1);
		PendingGuard::new(self.clone(), state.load_generation)
	}

	fn log_load_started(&self) {
		self.shared.diagnostics.log("clear()", Some("async load started"));
	}

	/// Waits for the next present value.
	///
	/// A value already held by the cell satisfies the wait immediately.
	pub async fn await_value(&self) -> T {
		let mut values = self.subscribe(None);
		if let Some(value) = values.recv().await {
			return value;
		}
		// `self` keeps the sender alive, so the stream cannot close here.
		std::future::pending().await
	}

	/// Subscribes to present values, replaying the current one if any.
	///
	/// Without a scope the caller owns the subscription's lifetime.
	pub fn subscribe(&self, scope: Option<&Scope>) -> Subscription<T> {
		let state = self.shared.state.lock();
		self.shared.changes.subscribe(state.value.clone(), scope)
	}

	/// Subscribes to clear events.
	pub fn subscribe_cleared(&self, scope: Option<&Scope>) -> Subscription<()> {
		let _state = self.shared.state.lock();
		self.shared.cleared.subscribe(None, scope)
	}

	/// Invokes `callback` for every present value until `scope` ends.
	pub fn observe(&self, scope: Option<&Scope>, mut callback: impl FnMut(T) + Send + 'static) -> JoinHandle<()> {
		let mut values = self.subscribe(scope);
		cellar_worker::spawn(TaskClass::Observer, self.shared.diagnostics.path(), async move {
			while let Some(value) = values.recv().await {
				callback(value);
			}
		})
	}

	/// Invokes `callback` for every clear event until `scope` ends.
	pub fn observe_cleared(&self, scope: Option<&Scope>, mut callback: impl FnMut() + Send + 'static) -> JoinHandle<()> {
		let mut cleared = self.subscribe_cleared(scope);
		cellar_worker::spawn(TaskClass::Observer, self.shared.diagnostics.path(), async move {
			while cleared.recv().await.is_some() {
				callback();
			}
		})
	}
}

impl<T> Cell<T> {
	/// Returns true if both handles refer to the same cell.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}

	pub(crate) fn member_link(&self) -> Option<&MemberLink> {
		self.shared.member.as_ref()
	}
}

impl<T> StoreElement for Cell<T> {
	fn diagnostics(&self) -> &Diagnostics {
		&self.shared.diagnostics
	}
}

impl<T> fmt::Debug for Cell<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.shared.state.lock();
		f.debug_struct("Cell")
			.field("path", &self.shared.diagnostics.path())
			.field("has_value", &state.value.is_some())
			.field("pending", &state.pending_since.is_some())
			.finish()
	}
}

fn older_than(at: Option<Instant>, threshold: Duration, now: Instant) -> bool {
	at.is_none_or(|at| now.saturating_duration_since(at) > threshold)
}
