use tokio_util::sync::{CancellationToken, DropGuard};

/// Lifecycle token bounding a set of subscriptions.
///
/// Clones share the same lifetime: ending any clone ends them all. Child
/// scopes end with their parent but may also be ended on their own.
#[derive(Debug, Clone, Default)]
pub struct Scope {
	cancel: CancellationToken,
}

impl Scope {
	/// Creates a live scope.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a scope that ends no later than this one.
	pub fn child(&self) -> Self {
		Self {
			cancel: self.cancel.child_token(),
		}
	}

	/// Ends the scope, releasing every subscription bound to it.
	pub fn end(&self) {
		self.cancel.cancel();
	}

	/// Returns true once the scope (or an ancestor) has ended.
	pub fn is_ended(&self) -> bool {
		self.cancel.is_cancelled()
	}

	/// Future resolving when the scope ends.
	pub async fn ended(&self) {
		self.cancel.cancelled().await;
	}

	/// Returns a guard that ends the scope when dropped.
	pub fn drop_guard(&self) -> ScopeGuard {
		ScopeGuard {
			_guard: self.cancel.clone().drop_guard(),
		}
	}
}

/// Ends its [`Scope`] on drop.
#[derive(Debug)]
pub struct ScopeGuard {
	_guard: DropGuard,
}
