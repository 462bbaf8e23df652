//! Worker primitives shared by the cellar store.
//!
//! * [`spawn`] runs store tasks inside a `cellar.task` span naming their class
//!   and origin path, on the active tokio runtime or a one-worker fallback.
//! * [`Scope`] is the lifecycle token consumers hand to subscriptions; ending
//!   the scope releases every subscription tied to it.

mod class;
mod scope;
mod spawn;

pub use class::TaskClass;
pub use scope::{Scope, ScopeGuard};
pub use spawn::spawn;
