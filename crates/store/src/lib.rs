//! Reactive state store.
//!
//! * [`Cell`] - single-slot value holder with staleness tracking and
//!   single-flight asynchronous population.
//! * [`Registry`] - lazily created keyed [`Member`] cells plus one aggregate
//!   stream naming whichever member last changed.
//! * [`initialize`] - one-shot walk over a [`StoreTree`] assigning each cell and
//!   registry its dotted diagnostic path and the shared [`LogSink`].
//!
//! Consumers read through [`Subscription`]s, optionally bound to a [`Scope`]
//! whose end releases them.

extern crate self as cellar_store;

mod cell;
mod config;
mod diagnostics;
mod error;
mod registry;
mod subscription;
mod tree;

pub use cell::{Cell, LoadHandle, LoadOutcome};
pub use cellar_macros::StoreTree;
pub use cellar_worker::{Scope, ScopeGuard};
pub use config::StoreConfig;
pub use diagnostics::{Diagnostics, LogSink, StoreElement};
pub use error::{ConfigError, InitError};
pub use registry::{Member, Registry};
pub use subscription::Subscription;
pub use tree::{StoreTree, TreeWalker, initialize, initialize_paths};
