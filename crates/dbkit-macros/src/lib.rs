//! Procedural macros for dbkit.
//!
//! `dbkit-macros` is the compile-time codegen layer. `#[derive(Record)]`
//! turns a struct into a table-bound record: it generates the static field
//! and relation metadata, row hydration, and the runtime field and relation
//! access used by path lookups and cascading saves.
//!
//! The macro is used by application crates via the `dbkit` facade.

use proc_macro::TokenStream;
use quote::quote;

mod parse;

use parse::{RecordDef, RelationDef, RelationKindAttr, WrapperKind, parse_record};

/// Derive macro for the `Record` and `Entity` traits.
///
/// # Attributes
///
/// On the struct:
///
/// - `#[record(table = "name")]` - The table name (required)
/// - `#[record(alias = "p")]` - Short table alias
/// - `#[record(primary_key = "field")]` - Primary key field (defaults to `id`)
/// - `#[record(validate = "path::to::fn")]` - Extra validation run before saves,
///   a `fn(&Self) -> Result<(), ValidationError>`
///
/// On fields:
///
/// - `#[record(column = "name")]` - Override column name
/// - `#[record(nullable)]` - Mark field as nullable (inferred for `Option<T>`)
/// - `#[record(auto_increment)]` / `#[record(auto_increment = false)]`
/// - `#[record(skip)]` - Not persisted; filled with `Default` on load
/// - `#[record(relation(...))]` - Relation options on a `Related<T>` or
///   `RelatedMany<T>` field: `kind`, `local_key`, `remote_key`, `link_table`,
///   `link_local`, `link_remote`, `conditions` and `defaults(field = literal, ...)`
///
/// # Example
///
/// ```ignore
/// use dbkit::prelude::*;
///
/// #[derive(Record, Debug, Default)]
/// #[record(table = "posts")]
/// struct Post {
///     id: Option<i64>,
///     title: String,
///     author_id: Option<i64>,
///
///     #[record(relation(defaults(status = "active")))]
///     author: Related<Author>,
///
///     comments: RelatedMany<Comment>,
/// }
/// ```
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);

    let record = match parse_record(&input) {
        Ok(r) => r,
        Err(e) => return e.to_compile_error().into(),
    };

    let record_impl = generate_record_impl(&record);
    let entity_impl = generate_entity_impl(&record);
    quote! {
        #record_impl
        #entity_impl
    }
    .into()
}

/// Generate the `Record` implementation.
fn generate_record_impl(record: &RecordDef) -> proc_macro2::TokenStream {
    let name = &record.name;
    let (impl_generics, ty_generics, where_clause) = record.generics.split_for_impl();

    let table_name = &record.table_name;
    let primary_key = &record.primary_key;
    let alias = match &record.alias {
        Some(alias) => quote! { ::core::option::Option::Some(#alias) },
        None => quote! { ::core::option::Option::None },
    };
    let field_infos = generate_field_infos(record);
    let relation_infos = generate_relation_infos(record);
    let from_row = generate_from_row(record);

    quote! {
        #[automatically_derived]
        impl #impl_generics ::dbkit_core::Record for #name #ty_generics #where_clause {
            const TABLE: &'static str = #table_name;
            const ALIAS: ::core::option::Option<&'static str> = #alias;
            const PRIMARY_KEY: &'static str = #primary_key;
            const RELATIONS: &'static [::dbkit_core::RelationInfo] = &[#(#relation_infos),*];

            fn fields() -> &'static [::dbkit_core::FieldInfo] {
                static FIELDS: &[::dbkit_core::FieldInfo] = &[#(#field_infos),*];
                FIELDS
            }

            #from_row
        }
    }
}

fn generate_field_infos(record: &RecordDef) -> Vec<proc_macro2::TokenStream> {
    record
        .fields
        .iter()
        .map(|field| {
            let field_name = field.name.to_string();
            let column_name = &field.column_name;
            let nullable = field.nullable;
            let primary_key = field.primary_key.then(|| quote! { .primary_key(true) });
            let auto_increment = field
                .auto_increment
                .map(|value| quote! { .auto_increment(#value) });
            quote! {
                ::dbkit_core::FieldInfo::new(#field_name)
                    .column(#column_name)
                    .nullable(#nullable)
                    #primary_key
                    #auto_increment
            }
        })
        .collect()
}

fn generate_relation_infos(record: &RecordDef) -> Vec<proc_macro2::TokenStream> {
    record
        .relations
        .iter()
        .map(|relation| {
            let relation_name = relation.name.to_string();
            let target = &relation.target;
            let kind = match relation.kind {
                RelationKindAttr::BelongsTo => quote! { ::dbkit_core::RelationKind::BelongsTo },
                RelationKindAttr::HasOne => quote! { ::dbkit_core::RelationKind::HasOne },
                RelationKindAttr::HasMany => quote! { ::dbkit_core::RelationKind::HasMany },
                RelationKindAttr::HasManyToMany => {
                    quote! { ::dbkit_core::RelationKind::HasManyToMany }
                }
            };
            let local_key = &relation.local_key;
            let remote_key = &relation.remote_key;

            let link_table = relation.link_table.as_ref().map(|link| {
                let table = &link.table;
                let local = &link.local_column;
                let remote = &link.remote_column;
                quote! {
                    .link_table(::dbkit_core::LinkTableInfo::new(#table, #local, #remote))
                }
            });
            let conditions = relation
                .conditions
                .as_ref()
                .map(|sql| quote! { .conditions(#sql) });
            let defaults = generate_relation_defaults(relation);

            quote! {
                ::dbkit_core::RelationInfo::new(
                    #relation_name,
                    <#target as ::dbkit_core::Record>::TABLE,
                    #kind,
                )
                .local_key(#local_key)
                .remote_key(#remote_key)
                #link_table
                #conditions
                #defaults
            }
        })
        .collect()
}

fn generate_relation_defaults(relation: &RelationDef) -> Option<proc_macro2::TokenStream> {
    if relation.defaults.is_empty() {
        return None;
    }
    let entries = relation.defaults.iter().map(|(field, lit)| {
        let value = match lit {
            syn::Lit::Str(s) => quote! { ::dbkit_core::DefaultValue::Text(#s) },
            syn::Lit::Int(i) => {
                let digits = i.base10_digits();
                let value: proc_macro2::TokenStream =
                    digits.parse().unwrap_or_else(|_| quote! { 0 });
                quote! { ::dbkit_core::DefaultValue::Int(#value) }
            }
            syn::Lit::Float(f) => {
                let digits = f.base10_digits();
                let value: proc_macro2::TokenStream =
                    digits.parse().unwrap_or_else(|_| quote! { 0.0 });
                quote! { ::dbkit_core::DefaultValue::Float(#value as f64) }
            }
            syn::Lit::Bool(b) => quote! { ::dbkit_core::DefaultValue::Bool(#b) },
            other => {
                return syn::Error::new_spanned(other, "unsupported relation default")
                    .to_compile_error();
            }
        };
        quote! { ::dbkit_core::RelationDefault::new(#field, #value) }
    });
    Some(quote! {
        .defaults({
            const DEFAULTS: &[::dbkit_core::RelationDefault] = &[#(#entries),*];
            DEFAULTS
        })
    })
}

/// Generate `from_row`. Missing `Option` columns hydrate as `None`; other
/// fields must be present. Skipped and relation fields start from `Default`.
fn generate_from_row(record: &RecordDef) -> proc_macro2::TokenStream {
    let name = &record.name;

    let field_extractions = record.fields.iter().map(|field| {
        let field_name = &field.name;
        let column_name = &field.column_name;
        let ty = &field.ty;
        if parse::is_option_type(ty) {
            quote! {
                #field_name: match row.get_by_name(#column_name) {
                    ::core::option::Option::Some(value) => {
                        <#ty as ::dbkit_core::FromValue>::from_value(value)?
                    }
                    ::core::option::Option::None => ::core::option::Option::None,
                }
            }
        } else {
            quote! {
                #field_name: row.get_named::<#ty>(#column_name)?
            }
        }
    });
    let defaulted = record
        .relations
        .iter()
        .map(|r| &r.name)
        .chain(record.skipped.iter())
        .map(|field_name| quote! { #field_name: ::core::default::Default::default() });

    quote! {
        fn from_row(row: &::dbkit_core::Row) -> ::dbkit_core::Result<Self> {
            ::core::result::Result::Ok(#name {
                #(#field_extractions,)*
                #(#defaulted,)*
            })
        }
    }
}

/// Generate the `Entity` implementation.
fn generate_entity_impl(record: &RecordDef) -> proc_macro2::TokenStream {
    let name = &record.name;
    let type_name = name.to_string();
    let (impl_generics, ty_generics, where_clause) = record.generics.split_for_impl();

    let field_patterns: Vec<proc_macro2::TokenStream> = record
        .fields
        .iter()
        .map(|field| {
            let field_name = field.name.to_string();
            let column_name = &field.column_name;
            if *column_name == field_name {
                quote! { #field_name }
            } else {
                quote! { #field_name | #column_name }
            }
        })
        .collect();

    let get_arms = record.fields.iter().zip(&field_patterns).map(|(field, pattern)| {
        let field_name = &field.name;
        quote! {
            #pattern => ::core::option::Option::Some(::dbkit_core::Value::from(
                ::core::clone::Clone::clone(&self.#field_name),
            ))
        }
    });
    let set_arms = record.fields.iter().zip(&field_patterns).map(|(field, pattern)| {
        let field_name = &field.name;
        let ty = &field.ty;
        quote! {
            #pattern => {
                self.#field_name = <#ty as ::dbkit_core::FromValue>::from_value(&value)?;
                ::core::result::Result::Ok(())
            }
        }
    });

    let related_arms = record.relations.iter().map(|relation| {
        let field_name = &relation.name;
        let relation_name = field_name.to_string();
        match relation.wrapper {
            WrapperKind::Single => quote! {
                #relation_name => ::core::option::Option::Some(
                    self.#field_name
                        .get()
                        .map(|r| r as &dyn ::dbkit_core::Entity)
                        .into_iter()
                        .collect(),
                )
            },
            WrapperKind::Many => quote! {
                #relation_name => ::core::option::Option::Some(
                    self.#field_name
                        .iter()
                        .map(|r| r as &dyn ::dbkit_core::Entity)
                        .collect(),
                )
            },
        }
    });
    let related_mut_arms = record.relations.iter().map(|relation| {
        let field_name = &relation.name;
        let relation_name = field_name.to_string();
        match relation.wrapper {
            WrapperKind::Single => quote! {
                #relation_name => ::core::option::Option::Some(
                    self.#field_name
                        .get_mut()
                        .map(|r| r as &mut dyn ::dbkit_core::Entity)
                        .into_iter()
                        .collect(),
                )
            },
            WrapperKind::Many => quote! {
                #relation_name => ::core::option::Option::Some(
                    self.#field_name
                        .iter_mut()
                        .map(|r| r as &mut dyn ::dbkit_core::Entity)
                        .collect(),
                )
            },
        }
    });
    let load_arms = record.relations.iter().map(|relation| {
        let field_name = &relation.name;
        let relation_name = field_name.to_string();
        let target = &relation.target;
        match relation.wrapper {
            WrapperKind::Single => quote! {
                #relation_name => {
                    let record = rows
                        .first()
                        .map(<#target as ::dbkit_core::Record>::from_row)
                        .transpose()?;
                    self.#field_name.set_loaded(record);
                    ::core::result::Result::Ok(())
                }
            },
            WrapperKind::Many => quote! {
                #relation_name => {
                    let records = rows
                        .iter()
                        .map(<#target as ::dbkit_core::Record>::from_row)
                        .collect::<::dbkit_core::Result<::std::vec::Vec<_>>>()?;
                    self.#field_name.set_loaded(records);
                    ::core::result::Result::Ok(())
                }
            },
        }
    });
    let unset_arms = record.relations.iter().map(|relation| {
        let field_name = &relation.name;
        let relation_name = field_name.to_string();
        let detach = match relation.wrapper {
            WrapperKind::Single => quote! { self.#field_name.take(); },
            WrapperKind::Many => quote! { self.#field_name.clear(); },
        };
        quote! {
            #relation_name => {
                #detach
                true
            }
        }
    });

    let validate = record.validate.as_ref().map(|path| {
        quote! {
            fn validate(&self) -> ::core::result::Result<(), ::dbkit_core::ValidationError> {
                #path(self)
            }
        }
    });

    quote! {
        #[automatically_derived]
        impl #impl_generics ::dbkit_core::Entity for #name #ty_generics #where_clause {
            fn table(&self) -> &'static str {
                <Self as ::dbkit_core::Record>::TABLE
            }

            fn type_name(&self) -> &'static str {
                #type_name
            }

            fn primary_key(&self) -> &'static str {
                <Self as ::dbkit_core::Record>::PRIMARY_KEY
            }

            fn field_infos(&self) -> &'static [::dbkit_core::FieldInfo] {
                <Self as ::dbkit_core::Record>::fields()
            }

            fn relations(&self) -> &'static [::dbkit_core::RelationInfo] {
                <Self as ::dbkit_core::Record>::RELATIONS
            }

            fn get_field(&self, name: &str) -> ::core::option::Option<::dbkit_core::Value> {
                match name {
                    #(#get_arms,)*
                    _ => ::core::option::Option::None,
                }
            }

            fn set_field(
                &mut self,
                name: &str,
                value: ::dbkit_core::Value,
            ) -> ::dbkit_core::Result<()> {
                match name {
                    #(#set_arms)*
                    _ => ::core::result::Result::Err(::dbkit_core::Error::Argument(
                        ::dbkit_core::ArgumentError::new(
                            "set_field",
                            ::std::format!("{} has no field '{}'", #type_name, name),
                        ),
                    )),
                }
            }

            fn related(
                &self,
                relation: &str,
            ) -> ::core::option::Option<::std::vec::Vec<&dyn ::dbkit_core::Entity>> {
                match relation {
                    #(#related_arms,)*
                    _ => ::core::option::Option::None,
                }
            }

            fn related_mut(
                &mut self,
                relation: &str,
            ) -> ::core::option::Option<::std::vec::Vec<&mut dyn ::dbkit_core::Entity>> {
                match relation {
                    #(#related_mut_arms,)*
                    _ => ::core::option::Option::None,
                }
            }

            fn load_related(
                &mut self,
                relation: &str,
                rows: &[::dbkit_core::Row],
            ) -> ::dbkit_core::Result<()> {
                match relation {
                    #(#load_arms)*
                    _ => {
                        let _ = rows;
                        ::core::result::Result::Err(::dbkit_core::Error::Argument(
                            ::dbkit_core::ArgumentError::new(
                                "load_related",
                                ::std::format!("{} has no relation '{}'", #type_name, relation),
                            ),
                        ))
                    }
                }
            }

            fn unset_related(&mut self, relation: &str) -> bool {
                match relation {
                    #(#unset_arms)*
                    _ => false,
                }
            }

            #validate
        }
    }
}
