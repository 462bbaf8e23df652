//! One-shot wiring of diagnostic paths into a store tree.
//!
//! A store tree is any value implementing [`StoreTree`]. Containers describe
//! their children by name through a [`TreeWalker`]; cells and registries are
//! leaves that receive the dotted path of names leading to them, plus the
//! shared [`LogSink`]. Structs get the container impl from
//! `#[derive(StoreTree)]`:
//!
//! ```ignore
//! #[derive(StoreTree)]
//! struct Users {
//!     detail: Cell<User>,
//!     #[store(rename = "byId")]
//!     by_id: Registry<User>,
//!     #[store(skip)]
//!     api: ApiClient,
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::cell::Cell;
use crate::diagnostics::{LogSink, StoreElement};
use crate::error::InitError;
use crate::registry::{Member, Registry};

/// Typed description of a store tree's children.
pub trait StoreTree {
	/// Reports this node to `walker`: leaves call [`TreeWalker::element`],
	/// containers call [`TreeWalker::field`] once per child.
	fn walk(&self, walker: &mut TreeWalker);
}

/// Depth-first visitor assigning paths during [`initialize`].
pub struct TreeWalker {
	segments: Vec<String>,
	sink: Option<LogSink>,
	assigned: usize,
	already_initialized: Vec<String>,
	empty_path: bool,
}

impl TreeWalker {
	fn new(sink: Option<LogSink>) -> Self {
		Self {
			segments: Vec::new(),
			sink,
			assigned: 0,
			already_initialized: Vec::new(),
			empty_path: false,
		}
	}

	/// Visits `child` one level below the current path, under `name`.
	pub fn field<S: StoreTree + ?Sized>(&mut self, name: &str, child: &S) {
		self.segments.push(name.to_string());
		child.walk(self);
		self.segments.pop();
	}

	/// Wires a leaf node at the current path.
	pub fn element(&mut self, node: &(impl StoreElement + ?Sized)) {
		let path = self.path();
		self.assign(path, node);
	}

	/// Dotted path of the node currently being visited.
	pub fn path(&self) -> String {
		self.segments.join(".")
	}

	fn assign(&mut self, path: String, node: &(impl StoreElement + ?Sized)) {
		if path.is_empty() {
			self.empty_path = true;
			return;
		}
		if node.diagnostics().assign(path.clone(), self.sink.clone()) {
			tracing::trace!(store.path = %path, "store.tree.assigned");
			self.assigned += 1;
		} else {
			self.already_initialized.push(path);
		}
	}

	fn finish(self) -> Result<usize, InitError> {
		if self.empty_path {
			return Err(InitError::EmptyPath);
		}
		if !self.already_initialized.is_empty() {
			return Err(InitError::AlreadyInitialized {
				paths: self.already_initialized,
			});
		}
		Ok(self.assigned)
	}
}

/// Assigns every cell and registry reachable from `root` its dotted path and
/// installs `sink`. Returns the number of nodes wired.
///
/// Meant to run once per tree at startup. Nodes that were already wired keep
/// their first assignment and are reported in [`InitError::AlreadyInitialized`]
/// after the rest of the tree has been wired.
pub fn initialize<R: StoreTree + ?Sized>(root: &R, sink: Option<LogSink>) -> Result<usize, InitError> {
	let mut walker = TreeWalker::new(sink);
	root.walk(&mut walker);
	let result = walker.finish();
	tracing::debug!(?result, "store.tree.initialized");
	result
}

/// Wires an explicit list of `(path, node)` pairs.
pub fn initialize_paths<'a, I>(entries: I, sink: Option<LogSink>) -> Result<usize, InitError>
where
	I: IntoIterator<Item = (&'a str, &'a dyn StoreElement)>,
{
	let mut walker = TreeWalker::new(sink);
	for (path, node) in entries {
		walker.assign(path.to_string(), node);
	}
	walker.finish()
}

impl<T> StoreTree for Cell<T> {
	fn walk(&self, walker: &mut TreeWalker) {
		walker.element(self);
	}
}

impl<T> StoreTree for Registry<T> {
	fn walk(&self, walker: &mut TreeWalker) {
		walker.element(self);
	}
}

impl<T> StoreTree for Member<T> {
	fn walk(&self, walker: &mut TreeWalker) {
		walker.element(self);
	}
}

impl<S: StoreTree + ?Sized> StoreTree for &S {
	fn walk(&self, walker: &mut TreeWalker) {
		(**self).walk(walker);
	}
}

impl<S: StoreTree + ?Sized> StoreTree for Box<S> {
	fn walk(&self, walker: &mut TreeWalker) {
		(**self).walk(walker);
	}
}

impl<S: StoreTree + ?Sized> StoreTree for Arc<S> {
	fn walk(&self, walker: &mut TreeWalker) {
		(**self).walk(walker);
	}
}

impl<S: StoreTree> StoreTree for Option<S> {
	fn walk(&self, walker: &mut TreeWalker) {
		if let Some(inner) = self {
			inner.walk(walker);
		}
	}
}

impl<S: StoreTree> StoreTree for Vec<S> {
	fn walk(&self, walker: &mut TreeWalker) {
		for (index, child) in self.iter().enumerate() {
			walker.field(&index.to_string(), child);
		}
	}
}

impl<S: StoreTree> StoreTree for BTreeMap<String, S> {
	fn walk(&self, walker: &mut TreeWalker) {
		for (name, child) in self {
			walker.field(name, child);
		}
	}
}

impl<S: StoreTree, H> StoreTree for HashMap<String, S, H> {
	fn walk(&self, walker: &mut TreeWalker) {
		let mut children: Vec<_> = self.iter().collect();
		children.sort_by(|a, b| a.0.cmp(b.0));
		for (name, child) in children {
			walker.field(name, child);
		}
	}
}
