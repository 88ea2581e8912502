use proc_macro::TokenStream;
use proc_macro2::{Literal, TokenStream as TokenStream2};
use quote::quote;
use syn::ext::IdentExt;
use syn::{parse_macro_input, Data, DeriveInput, Field, Fields, LitStr};

/// Derive macro for structs decoded from result rows.
///
/// Generates three impls on the annotated struct:
///
/// - `rowscan::schema::Record`: a static field schema plus `assign`, which
///   writes one column buffer to the field at a resolved path.
/// - `rowscan::FromRow`: the struct as an element of a collection.
/// - `rowscan::Destination`: the struct as a single-row destination,
///   decoded in place.
///
/// The struct must implement `Default`. Leaf field types must implement
/// `rowscan::FromColumn`.
///
/// # Field attributes
///
/// - `#[row(rename = "col")]`: column name instead of the field name.
/// - `#[row(nested)]`: struct field addressed as `field.column`.
/// - `#[row(flatten)]`: embedded struct whose fields are promoted.
/// - `#[row(skip)]`: never written.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug, Default, FromRow)]
/// pub struct User {
///     pub id: i64,
///     #[row(rename = "user_name")]
///     pub name: String,
///     #[row(nested)]
///     pub address: Address,
/// }
/// ```
#[proc_macro_derive(FromRow, attributes(row))]
pub fn derive_from_row(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

enum Kind {
    Leaf,
    Nested,
    Flatten,
}

struct RowAttrs {
    rename: Option<String>,
    kind: Kind,
    skip: bool,
}

fn row_attrs(field: &Field) -> Result<RowAttrs, syn::Error> {
    let mut attrs = RowAttrs { rename: None, kind: Kind::Leaf, skip: false };
    for attr in &field.attrs {
        if !attr.path().is_ident("row") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.rename = Some(value.value());
            } else if meta.path.is_ident("nested") || meta.path.is_ident("flatten") {
                if !matches!(attrs.kind, Kind::Leaf) {
                    return Err(meta.error("`nested` and `flatten` are mutually exclusive"));
                }
                attrs.kind =
                    if meta.path.is_ident("nested") { Kind::Nested } else { Kind::Flatten };
            } else if meta.path.is_ident("skip") {
                attrs.skip = true;
            } else {
                return Err(meta.error("unknown row attribute (expected rename, nested, flatten or skip)"));
            }
            Ok(())
        })?;
    }
    Ok(attrs)
}

fn derive_impl(input: &DeriveInput) -> Result<TokenStream2, syn::Error> {
    let name = &input.ident;
    let name_str = name.unraw().to_string();

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "FromRow does not support generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "FromRow only supports structs with named fields",
                ))
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "FromRow only supports structs")),
    };

    let mut descriptor_tokens = Vec::new();
    let mut assign_tokens = Vec::new();

    for field in fields {
        let attrs = row_attrs(field)?;
        if attrs.skip {
            continue;
        }
        let field_name = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new_spanned(field, "expected named field"))?;
        let field_name_str = field_name.unraw().to_string();
        let field_ty = &field.ty;
        let index = Literal::usize_unsuffixed(descriptor_tokens.len());

        let rename = match &attrs.rename {
            Some(rename) => quote! { ::core::option::Option::Some(#rename) },
            None => quote! { ::core::option::Option::None },
        };
        let kind = match attrs.kind {
            Kind::Leaf => quote! { ::rowscan::schema::FieldKind::Leaf },
            Kind::Nested => quote! {
                ::rowscan::schema::FieldKind::Nested(<#field_ty as ::rowscan::schema::Record>::schema)
            },
            Kind::Flatten => quote! {
                ::rowscan::schema::FieldKind::Flatten(<#field_ty as ::rowscan::schema::Record>::schema)
            },
        };

        descriptor_tokens.push(quote! {
            ::rowscan::schema::FieldDescriptor {
                name: #field_name_str,
                rename: #rename,
                type_name: ::core::stringify!(#field_ty),
                kind: #kind,
            }
        });

        assign_tokens.push(match attrs.kind {
            Kind::Leaf => quote! {
                [#index] => {
                    self.#field_name = <#field_ty as ::rowscan::convert::FromColumn>::from_column(raw)
                        .map_err(|e| e.with_context(#field_name_str))?;
                    ::core::result::Result::Ok(())
                }
            },
            Kind::Nested | Kind::Flatten => quote! {
                [#index, rest @ ..] => {
                    <#field_ty as ::rowscan::schema::Record>::assign(&mut self.#field_name, rest, raw)
                }
            },
        });
    }

    let expanded = quote! {
        impl ::rowscan::schema::Record for #name {
            fn schema() -> &'static ::rowscan::schema::Schema {
                static SCHEMA: ::rowscan::schema::Schema = ::rowscan::schema::Schema {
                    type_name: #name_str,
                    fields: &[
                        #(#descriptor_tokens),*
                    ],
                };
                &SCHEMA
            }

            #[allow(unused_variables)]
            fn assign(
                &mut self,
                path: &[usize],
                raw: &[u8],
            ) -> ::core::result::Result<(), ::rowscan::error::ConversionError> {
                match path {
                    #(#assign_tokens)*
                    _ => ::core::result::Result::Err(::rowscan::schema::unknown_path(#name_str, path)),
                }
            }
        }

        impl ::rowscan::decode::FromRow for #name {
            fn shape() -> ::rowscan::decode::RowShape {
                ::rowscan::decode::RowShape::Struct(<Self as ::rowscan::schema::Record>::schema())
            }

            fn from_row_ref(
                plan: &::rowscan::decode::RowPlan,
                columns: &::rowscan::row::ColumnSet,
                row: &::rowscan::row::RawRow,
            ) -> ::core::result::Result<Self, ::rowscan::error::RowError> {
                ::rowscan::decode::record_from_row(plan, columns, row)
            }
        }

        impl ::rowscan::dispatch::Destination for #name {
            fn capacity(&mut self) -> ::rowscan::row::Limit {
                ::rowscan::row::Limit::Rows(1)
            }

            fn fill(
                &mut self,
                stream: &mut ::rowscan::cursor::RowStream,
                ctx: &::rowscan::dispatch::DecodeContext<'_>,
            ) -> ::core::result::Result<::rowscan::dispatch::ScanOutcome, ::rowscan::error::ScanError> {
                ::rowscan::dispatch::fill_record(self, stream, ctx)
            }
        }
    };

    Ok(expanded)
}
