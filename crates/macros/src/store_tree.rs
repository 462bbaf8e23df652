//! StoreTree derive macro.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, parse_macro_input, parse_quote};

/// Per-field `#[store(...)]` options.
#[derive(Default)]
struct FieldOptions {
	skip: bool,
	rename: Option<LitStr>,
}

fn field_options(field: &syn::Field) -> syn::Result<FieldOptions> {
	let mut options = FieldOptions::default();
	for attr in &field.attrs {
		if !attr.path().is_ident("store") {
			continue;
		}
		attr.parse_nested_meta(|meta| {
			if meta.path.is_ident("skip") {
				options.skip = true;
				Ok(())
			} else if meta.path.is_ident("rename") {
				options.rename = Some(meta.value()?.parse()?);
				Ok(())
			} else {
				Err(meta.error("expected `skip` or `rename = \"...\"`"))
			}
		})?;
	}
	Ok(options)
}

pub fn derive_store_tree(input: TokenStream) -> TokenStream {
	let input = parse_macro_input!(input as DeriveInput);
	match expand(input) {
		Ok(tokens) => tokens.into(),
		Err(err) => err.to_compile_error().into(),
	}
}

fn expand(mut input: DeriveInput) -> syn::Result<TokenStream2> {
	let Data::Struct(data) = &input.data else {
		return Err(syn::Error::new_spanned(&input.ident, "StoreTree can only be derived for structs"));
	};

	let mut visits = Vec::new();
	let mut bounded_types = Vec::new();
	for (index, field) in data.fields.iter().enumerate() {
		let options = field_options(field)?;
		if options.skip {
			continue;
		}

		let (name, access) = match (&field.ident, &data.fields) {
			(Some(ident), Fields::Named(_)) => {
				let ident_str = ident.to_string();
				let name = ident_str.strip_prefix("r#").unwrap_or(&ident_str).to_string();
				(name, quote! { #ident })
			}
			_ => {
				let member = syn::Index::from(index);
				(index.to_string(), quote! { #member })
			}
		};
		let name = options.rename.map(|lit| lit.value()).unwrap_or(name);
		if name.is_empty() || name.contains('.') {
			return Err(syn::Error::new_spanned(field, "store path segments must be non-empty and must not contain '.'"));
		}

		visits.push(quote! {
			walker.field(#name, &self.#access);
		});
		bounded_types.push(field.ty.clone());
	}

	if !input.generics.params.is_empty() {
		let where_clause = input.generics.make_where_clause();
		for ty in bounded_types {
			where_clause.predicates.push(parse_quote!(#ty: ::cellar_store::StoreTree));
		}
	}

	let name = &input.ident;
	let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
	Ok(quote! {
		impl #impl_generics ::cellar_store::StoreTree for #name #ty_generics #where_clause {
			#[allow(unused_variables)]
			fn walk(&self, walker: &mut ::cellar_store::TreeWalker) {
				#(#visits)*
			}
		}
	})
}
