//! Keyed registry of lazily created cells.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use cellar_worker::{Scope, TaskClass};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::cell::Cell;
use crate::config::StoreConfig;
use crate::diagnostics::{Diagnostics, StoreElement};
use crate::subscription::{Fanout, Subscription};

/// Aggregate stream shared by a registry and its members.
struct ChangeFeed {
	changes: Fanout<String>,
	/// Bumped by `clear_all`; links from older epochs are orphaned.
	epoch: AtomicU64,
}

/// A member's association with its owning registry.
pub(crate) struct MemberLink {
	key: String,
	feed: Weak<ChangeFeed>,
	epoch: u64,
}

impl MemberLink {
	fn is_attached(&self) -> bool {
		self.feed
			.upgrade()
			.is_some_and(|feed| feed.epoch.load(Ordering::Acquire) == self.epoch)
	}

	/// Emits this member's key on the aggregate stream.
	pub(crate) fn notify(&self) {
		let Some(feed) = self.feed.upgrade() else {
			return;
		};
		if feed.epoch.load(Ordering::Acquire) != self.epoch {
			return;
		}
		tracing::trace!(key = %self.key, "store.registry.changed");
		feed.changes.send(self.key.clone());
	}
}

/// A cell owned by a [`Registry`] under one key.
///
/// Dereferences to its [`Cell`]; every `put`, `clear` and load transition
/// additionally emits the key on the registry's aggregate stream. Once the
/// registry is reset with [`Registry::clear_all`] the member behaves as a
/// standalone cell.
pub struct Member<T> {
	key: Arc<str>,
	cell: Cell<T>,
}

impl<T> Clone for Member<T> {
	fn clone(&self) -> Self {
		Self {
			key: Arc::clone(&self.key),
			cell: self.cell.clone(),
		}
	}
}

impl<T> Member<T> {
	/// Key under which the registry holds this member.
	pub fn key(&self) -> &str {
		&self.key
	}

	/// The underlying cell.
	pub fn cell(&self) -> &Cell<T> {
		&self.cell
	}

	/// Returns true if both handles refer to the same member.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		self.cell.ptr_eq(&other.cell)
	}

	/// Returns false once the registry has discarded this member.
	pub fn is_attached(&self) -> bool {
		self.cell.member_link().is_some_and(MemberLink::is_attached)
	}
}

impl<T> Deref for Member<T> {
	type Target = Cell<T>;

	fn deref(&self) -> &Cell<T> {
		&self.cell
	}
}

impl<T> StoreElement for Member<T> {
	fn diagnostics(&self) -> &Diagnostics {
		self.cell.diagnostics()
	}
}

impl<T> fmt::Debug for Member<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Member").field("key", &self.key).field("cell", &self.cell).finish()
	}
}

struct RegistryShared<T> {
	members: Mutex<HashMap<String, Member<T>>>,
	feed: Arc<ChangeFeed>,
	diagnostics: Diagnostics,
	config: StoreConfig,
}

/// Lazily populated map of key to [`Member`] with one aggregate change stream.
///
/// Cloning yields another handle to the same registry.
pub struct Registry<T> {
	shared: Arc<RegistryShared<T>>,
}

impl<T> Clone for Registry<T> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<T: Clone + Send + 'static> Default for Registry<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Clone + Send + 'static> Registry<T> {
	/// Creates an empty registry with default configuration.
	pub fn new() -> Self {
		Self::with_config(&StoreConfig::default())
	}

	/// Creates an empty registry; members inherit `config`.
	pub fn with_config(config: &StoreConfig) -> Self {
		Self {
			shared: Arc::new(RegistryShared {
				members: Mutex::new(HashMap::new()),
				feed: Arc::new(ChangeFeed {
					changes: Fanout::default(),
					epoch: AtomicU64::new(0),
				}),
				diagnostics: Diagnostics::default(),
				config: config.clone(),
			}),
		}
	}

	/// Returns the member for `key`, creating it on first request.
	///
	/// Repeated calls with the same key return the same member.
	pub fn get(&self, key: &str) -> Member<T> {
		let mut members = self.shared.members.lock();
		if let Some(member) = members.get(key) {
			return member.clone();
		}

		let link = MemberLink {
			key: key.to_string(),
			feed: Arc::downgrade(&self.shared.feed),
			epoch: self.shared.feed.epoch.load(Ordering::Acquire),
		};
		let member = Member {
			key: Arc::from(key),
			cell: Cell::build(&self.shared.config, Some(link)),
		};
		members.insert(key.to_string(), member.clone());
		drop(members);

		self.shared.diagnostics.log(&format!("get({key}) created member"), None);
		member
	}

	/// Discards every member without notifying anyone.
	///
	/// Existing member handles keep working as standalone cells but no longer
	/// feed the aggregate stream; the next `get` allocates fresh members.
	pub fn clear_all(&self) {
		self.shared.diagnostics.log("clear_all()", None);
		let mut members = self.shared.members.lock();
		self.shared.feed.epoch.fetch_add(1, Ordering::AcqRel);
		members.clear();
	}

	/// Subscribes to the keys of mutated members, one item per mutation.
	pub fn subscribe(&self, scope: Option<&Scope>) -> Subscription<String> {
		self.shared.feed.changes.subscribe(None, scope)
	}

	/// Invokes `callback` with each mutated member's key until `scope` ends.
	pub fn observe(&self, scope: Option<&Scope>, mut callback: impl FnMut(String) + Send + 'static) -> JoinHandle<()> {
		let mut keys = self.subscribe(scope);
		cellar_worker::spawn(TaskClass::Observer, self.shared.diagnostics.path(), async move {
			while let Some(key) = keys.recv().await {
				callback(key);
			}
		})
	}

	/// Number of members currently held.
	pub fn len(&self) -> usize {
		self.shared.members.lock().len()
	}

	/// Returns true if no member is held.
	pub fn is_empty(&self) -> bool {
		self.shared.members.lock().is_empty()
	}

	/// Returns true if a member exists for `key`, without creating one.
	pub fn contains(&self, key: &str) -> bool {
		self.shared.members.lock().contains_key(key)
	}

	/// Keys of the held members, sorted.
	pub fn keys(&self) -> Vec<String> {
		let mut keys: Vec<_> = self.shared.members.lock().keys().cloned().collect();
		keys.sort();
		keys
	}
}

impl<T> StoreElement for Registry<T> {
	fn diagnostics(&self) -> &Diagnostics {
		&self.shared.diagnostics
	}
}

impl<T> fmt::Debug for Registry<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Registry")
			.field("path", &self.shared.diagnostics.path())
			.field("members", &self.shared.members.lock().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn get_is_idempotent_per_key() {
		let registry = Registry::<u32>::new();
		let a = registry.get("a");
		assert!(a.ptr_eq(&registry.get("a")));
		assert!(!a.ptr_eq(&registry.get("b")));
		assert_eq!(a.key(), "a");
		assert_eq!(registry.keys(), vec!["a", "b"]);
	}

	#[test]
	fn aggregate_stream_reports_every_mutation_in_order() {
		let registry = Registry::<u32>::new();
		let mut keys = registry.subscribe(None);

		registry.get("a").put(1);
		registry.get("b").put(2);
		registry.get("a").clear();
		registry.get("a").put(3);
		registry.get("a").put(3);

		assert_eq!(keys.drain(), vec!["a", "b", "a", "a", "a"]);
	}

	#[test]
	fn bulk_fill_reports_every_key() {
		let registry = Registry::<u32>::new();
		let mut keys = registry.subscribe(None);

		for i in 0..500u32 {
			registry.get(&i.to_string()).put(i);
		}

		let expected: Vec<String> = (0..500).map(|i| i.to_string()).collect();
		assert_eq!(keys.drain(), expected);
	}

	#[tokio::test]
	async fn observer_sees_every_key_of_a_bulk_fill() {
		let registry = Registry::<u32>::new();
		let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
		let _task = registry.observe(None, move |key| {
			let _ = tx.send(key);
		});

		for i in 0..200u32 {
			registry.get(&format!("wp-{i}")).put(i);
		}

		for i in 0..200u32 {
			assert_eq!(rx.recv().await, Some(format!("wp-{i}")));
		}
	}

	#[test]
	fn member_emission_precedes_aggregate_emission() {
		let registry = Registry::<u32>::new();
		let member = registry.get("a");
		let mut values = member.subscribe(None);
		let mut keys = registry.subscribe(None);

		member.put(7);

		// Both are visible once put returns: the member-local send ran first.
		assert_eq!(values.try_recv(), Some(7));
		assert_eq!(keys.try_recv().as_deref(), Some("a"));
	}

	#[test]
	fn clear_all_is_silent_and_orphans_members() {
		let registry = Registry::<u32>::new();
		let old = registry.get("a");
		old.put(1);
		let mut keys = registry.subscribe(None);
		let mut cleared = old.subscribe_cleared(None);

		registry.clear_all();
		assert!(registry.is_empty());
		assert!(!old.is_attached());
		assert_eq!(keys.try_recv(), None);
		assert_eq!(cleared.try_recv(), None);

		// The orphan still works as a cell but no longer feeds the registry.
		assert_eq!(old.peek(), Some(1));
		old.put(2);
		assert_eq!(old.peek(), Some(2));
		assert_eq!(keys.try_recv(), None);

		let fresh = registry.get("a");
		assert!(!fresh.ptr_eq(&old));
		assert!(fresh.is_attached());
		assert!(!fresh.has_value());
		fresh.put(3);
		assert_eq!(keys.drain(), vec!["a"]);
	}

	#[test]
	fn contains_does_not_allocate() {
		let registry = Registry::<u32>::new();
		assert!(!registry.contains("a"));
		assert_eq!(registry.len(), 0);
		let _ = registry.get("a");
		assert!(registry.contains("a"));
		assert_eq!(registry.len(), 1);
	}

	#[tokio::test]
	async fn async_load_on_member_notifies_twice() {
		let registry = Registry::<u32>::new();
		let mut keys = registry.subscribe(None);

		let outcome = registry.get("a").put_from_async_load(async { Ok::<_, String>(5) }).settled().await;

		assert_eq!(outcome, crate::LoadOutcome::Stored);
		// One for the clear at load start, one for the stored value.
		assert_eq!(keys.drain(), vec!["a", "a"]);
		assert_eq!(registry.get("a").peek(), Some(5));
	}

	#[tokio::test]
	async fn scoped_registry_subscription_stops_at_scope_end() {
		let registry = Registry::<u32>::new();
		let scope = Scope::new();
		let mut keys = registry.subscribe(Some(&scope));

		registry.get("a").put(1);
		assert_eq!(keys.recv().await.as_deref(), Some("a"));

		scope.end();
		registry.get("b").put(2);
		assert_eq!(keys.recv().await, None);
	}

	#[tokio::test]
	async fn observe_forwards_keys_until_scope_ends() {
		let registry = Registry::<u32>::new();
		let scope = Scope::new();
		let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
		let task = registry.observe(Some(&scope), move |key| {
			let _ = tx.send(key);
		});

		registry.get("x").put(1);
		assert_eq!(rx.recv().await.as_deref(), Some("x"));

		scope.end();
		task.await.unwrap();
		registry.get("y").put(2);
		assert_eq!(rx.recv().await, None);
	}
}
