//! Procedural macros for the cellar store.
//!
//! * `#[derive(StoreTree)]` - describes a struct's fields to the tree initializer

use proc_macro::TokenStream;

mod store_tree;

/// Derives `cellar_store::StoreTree` for a struct.
///
/// Every field is visited under its own name, so a cell reached through
/// `users.detail` is assigned the path `"users.detail"`. Tuple fields are
/// visited under their index.
///
/// Field attributes:
/// * `#[store(skip)]` - Field is not part of the store tree
/// * `#[store(rename = "name")]` - Use `name` as the path segment
///
/// ```ignore
/// #[derive(StoreTree)]
/// struct Session {
///     user: Cell<User>,
///     #[store(rename = "workPackages")]
///     work_packages: Registry<WorkPackage>,
///     #[store(skip)]
///     client: ApiClient,
/// }
/// ```
#[proc_macro_derive(StoreTree, attributes(store))]
pub fn derive_store_tree(input: TokenStream) -> TokenStream {
	store_tree::derive_store_tree(input)
}
