//! Parsing logic for the Record derive macro.
//!
//! This module extracts struct-level and field-level `#[record(...)]`
//! attributes from the derive input to build the `RecordDef` and `FieldDef`
//! structures used for code generation.

use quote::ToTokens;
use syn::{
    Attribute, Data, DeriveInput, Error, Field, Fields, GenericArgument, Generics, Ident, Lit,
    LitStr, Path, PathArguments, Result, Type,
};

/// Parsed record definition from a struct with `#[derive(Record)]`.
#[derive(Debug)]
pub struct RecordDef {
    /// The struct name.
    pub name: Ident,
    /// The table name (required).
    pub table_name: String,
    /// Optional short alias for the table.
    pub alias: Option<String>,
    /// The primary key field name.
    pub primary_key: String,
    /// Path of a `fn(&Self) -> Result<(), ValidationError>` run before saves.
    pub validate: Option<Path>,
    /// Persisted fields, in declaration order.
    pub fields: Vec<FieldDef>,
    /// Relation fields, in declaration order.
    pub relations: Vec<RelationDef>,
    /// Fields excluded from persistence.
    pub skipped: Vec<Ident>,
    /// Generic parameters.
    pub generics: Generics,
}

/// A persisted field.
#[derive(Debug)]
pub struct FieldDef {
    pub name: Ident,
    pub column_name: String,
    pub ty: Type,
    pub nullable: bool,
    pub primary_key: bool,
    /// `None` leaves the primary key default (auto increment) in place.
    pub auto_increment: Option<bool>,
}

/// Relation kinds accepted in `relation(kind = "...")`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKindAttr {
    BelongsTo,
    HasOne,
    HasMany,
    HasManyToMany,
}

impl RelationKindAttr {
    fn parse(kind: &str) -> Option<Self> {
        match kind {
            "belongs_to" => Some(Self::BelongsTo),
            "has_one" => Some(Self::HasOne),
            "has_many" => Some(Self::HasMany),
            "has_many_to_many" => Some(Self::HasManyToMany),
            _ => None,
        }
    }

    pub const fn is_collection(self) -> bool {
        matches!(self, Self::HasMany | Self::HasManyToMany)
    }
}

/// Relation field wrapper type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperKind {
    /// `Related<T>`
    Single,
    /// `RelatedMany<T>`
    Many,
}

/// A relation field with its keys resolved.
#[derive(Debug)]
pub struct RelationDef {
    pub name: Ident,
    pub kind: RelationKindAttr,
    pub wrapper: WrapperKind,
    /// The related record type (`T` in `Related<T>`).
    pub target: Type,
    pub local_key: String,
    pub remote_key: String,
    pub link_table: Option<LinkTableDef>,
    pub conditions: Option<String>,
    pub defaults: Vec<(String, Lit)>,
}

/// Junction table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTableDef {
    pub table: String,
    pub local_column: String,
    pub remote_column: String,
}

/// Parse a `#[derive(Record)]` input.
pub fn parse_record(input: &DeriveInput) -> Result<RecordDef> {
    let name = input.ident.clone();
    let struct_attrs = parse_struct_attrs(&input.attrs, &name)?;

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        Data::Enum(_) => {
            return Err(Error::new_spanned(
                input,
                "Record can only be derived for structs, not enums",
            ));
        }
        Data::Union(_) => {
            return Err(Error::new_spanned(
                input,
                "Record can only be derived for structs, not unions",
            ));
        }
    };
    let Fields::Named(named) = fields else {
        return Err(Error::new_spanned(
            input,
            "Record can only be derived for structs with named fields",
        ));
    };

    let owner = to_snake_case(&name.to_string());
    let mut record = RecordDef {
        name,
        table_name: struct_attrs.table_name,
        alias: struct_attrs.alias,
        primary_key: struct_attrs.primary_key,
        validate: struct_attrs.validate,
        fields: Vec::new(),
        relations: Vec::new(),
        skipped: Vec::new(),
        generics: input.generics.clone(),
    };

    for field in &named.named {
        match parse_field(field, &owner)? {
            ParsedField::Column(mut def) => {
                def.primary_key = def.name == record.primary_key;
                record.fields.push(def);
            }
            ParsedField::Relation(def) => record.relations.push(def),
            ParsedField::Skipped(ident) => record.skipped.push(ident),
        }
    }

    if !record.fields.iter().any(|f| f.primary_key) {
        return Err(Error::new_spanned(
            &record.name,
            format!(
                "primary key field `{}` not found; set #[record(primary_key = \"...\")]",
                record.primary_key
            ),
        ));
    }

    Ok(record)
}

struct StructAttrs {
    table_name: String,
    alias: Option<String>,
    primary_key: String,
    validate: Option<Path>,
}

/// Parse struct-level `#[record(...)]` attributes.
///
/// Supported keys:
/// - `table = "name"` (required)
/// - `alias = "a"`
/// - `primary_key = "field"` (defaults to `id`)
/// - `validate = "path::to::fn"`
fn parse_struct_attrs(attrs: &[Attribute], struct_name: &Ident) -> Result<StructAttrs> {
    let mut table_name: Option<String> = None;
    let mut alias: Option<String> = None;
    let mut primary_key: Option<String> = None;
    let mut validate: Option<Path> = None;

    for attr in attrs {
        if !attr.path().is_ident("record") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                table_name = Some(string_value(&meta, "table name")?);
            } else if meta.path.is_ident("alias") {
                alias = Some(string_value(&meta, "table alias")?);
            } else if meta.path.is_ident("primary_key") {
                primary_key = Some(string_value(&meta, "primary key field")?);
            } else if meta.path.is_ident("validate") {
                let lit: LitStr = meta.value()?.parse()?;
                validate = Some(lit.parse()?);
            } else {
                return Err(meta.error(format!(
                    "unknown record attribute `{}`",
                    meta.path.to_token_stream()
                )));
            }
            Ok(())
        })?;
    }

    let Some(table_name) = table_name.filter(|t| !t.is_empty()) else {
        return Err(Error::new_spanned(
            struct_name,
            "a record must name its table: #[record(table = \"...\")]",
        ));
    };

    Ok(StructAttrs {
        table_name,
        alias,
        primary_key: primary_key.unwrap_or_else(|| "id".to_string()),
        validate,
    })
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>, what: &str) -> Result<String> {
    let value: Lit = meta.value()?.parse()?;
    match value {
        Lit::Str(lit_str) => Ok(lit_str.value()),
        other => Err(Error::new_spanned(
            other,
            format!("expected string literal for {what}"),
        )),
    }
}

enum ParsedField {
    Column(FieldDef),
    Relation(RelationDef),
    Skipped(Ident),
}

/// Intermediate struct for collecting field attributes.
#[derive(Default)]
struct FieldAttrs {
    column: Option<String>,
    nullable: Option<bool>,
    auto_increment: Option<bool>,
    skip: bool,
    relation: Option<RelationAttr>,
}

#[derive(Default)]
struct RelationAttr {
    kind: Option<RelationKindAttr>,
    local_key: Option<String>,
    remote_key: Option<String>,
    link_table: Option<String>,
    link_local: Option<String>,
    link_remote: Option<String>,
    conditions: Option<String>,
    defaults: Vec<(String, Lit)>,
}

fn parse_field(field: &Field, owner: &str) -> Result<ParsedField> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| Error::new_spanned(field, "expected named field"))?;
    let attrs = parse_field_attrs(&field.attrs)?;

    if attrs.skip {
        return Ok(ParsedField::Skipped(name));
    }

    if let Some((wrapper, target)) = detect_relation_wrapper(&field.ty) {
        let relation = attrs.relation.unwrap_or_default();
        return resolve_relation(name, wrapper, target, relation, owner).map(ParsedField::Relation);
    }

    if attrs.relation.is_some() {
        return Err(Error::new_spanned(
            &field.ty,
            "relation fields must be Related<T> or RelatedMany<T>",
        ));
    }

    let column_name = attrs.column.unwrap_or_else(|| name.to_string());
    Ok(ParsedField::Column(FieldDef {
        name,
        column_name,
        ty: field.ty.clone(),
        nullable: attrs.nullable.unwrap_or_else(|| is_option_type(&field.ty)),
        primary_key: false,
        auto_increment: attrs.auto_increment,
    }))
}

/// Parse all `#[record(...)]` attributes on a field.
fn parse_field_attrs(attrs: &[Attribute]) -> Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("record") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let path = &meta.path;
            if path.is_ident("skip") {
                result.skip = true;
            } else if path.is_ident("nullable") {
                result.nullable = Some(true);
            } else if path.is_ident("auto_increment") {
                result.auto_increment = Some(bool_flag(&meta)?);
            } else if path.is_ident("column") {
                result.column = Some(string_value(&meta, "column name")?);
            } else if path.is_ident("relation") {
                let mut relation = RelationAttr::default();
                meta.parse_nested_meta(|inner| parse_relation_content(&inner, &mut relation))?;
                result.relation = Some(relation);
            } else {
                return Err(meta.error(format!(
                    "unknown record field attribute `{}`",
                    path.to_token_stream()
                )));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

/// `flag` alone means true; `flag = false` is accepted too.
fn bool_flag(meta: &syn::meta::ParseNestedMeta<'_>) -> Result<bool> {
    if meta.input.peek(syn::Token![=]) {
        let value: Lit = meta.value()?.parse()?;
        match value {
            Lit::Bool(b) => Ok(b.value),
            other => Err(Error::new_spanned(other, "expected true or false")),
        }
    } else {
        Ok(true)
    }
}

fn parse_relation_content(
    meta: &syn::meta::ParseNestedMeta<'_>,
    relation: &mut RelationAttr,
) -> Result<()> {
    let path = &meta.path;
    if path.is_ident("kind") {
        let lit: LitStr = meta.value()?.parse()?;
        let kind = RelationKindAttr::parse(&lit.value()).ok_or_else(|| {
            Error::new_spanned(
                &lit,
                "relation kind must be one of belongs_to, has_one, has_many, has_many_to_many",
            )
        })?;
        relation.kind = Some(kind);
    } else if path.is_ident("local_key") {
        relation.local_key = Some(string_value(meta, "local key")?);
    } else if path.is_ident("remote_key") {
        relation.remote_key = Some(string_value(meta, "remote key")?);
    } else if path.is_ident("link_table") {
        relation.link_table = Some(string_value(meta, "link table")?);
    } else if path.is_ident("link_local") {
        relation.link_local = Some(string_value(meta, "link table local column")?);
    } else if path.is_ident("link_remote") {
        relation.link_remote = Some(string_value(meta, "link table remote column")?);
    } else if path.is_ident("conditions") {
        relation.conditions = Some(string_value(meta, "relation conditions")?);
    } else if path.is_ident("defaults") {
        meta.parse_nested_meta(|default| {
            let field = default
                .path
                .get_ident()
                .ok_or_else(|| default.error("expected a field name"))?
                .to_string();
            let value: Lit = default.value()?.parse()?;
            match value {
                Lit::Str(_) | Lit::Int(_) | Lit::Float(_) | Lit::Bool(_) => {
                    relation.defaults.push((field, value));
                    Ok(())
                }
                other => Err(Error::new_spanned(
                    other,
                    "relation defaults must be string, integer, float or bool literals",
                )),
            }
        })?;
    } else {
        return Err(meta.error(format!(
            "unknown relation attribute `{}`",
            path.to_token_stream()
        )));
    }
    Ok(())
}

/// Fill in the keys a relation leaves implicit.
///
/// - belongs-to: `{field}_id` on this record points at the related `id`
/// - has-one / has-many: `{owner}_id` on the related record points at `id`
/// - many-to-many: the link table joins `{owner}_id` to `{target}_id`
fn resolve_relation(
    name: Ident,
    wrapper: WrapperKind,
    target: Type,
    attr: RelationAttr,
    owner: &str,
) -> Result<RelationDef> {
    let kind = attr.kind.unwrap_or(match wrapper {
        WrapperKind::Single => RelationKindAttr::BelongsTo,
        WrapperKind::Many => RelationKindAttr::HasMany,
    });

    if kind.is_collection() != (wrapper == WrapperKind::Many) {
        return Err(Error::new_spanned(
            &name,
            "collection relations (has_many, has_many_to_many) need RelatedMany<T>, \
             single relations (belongs_to, has_one) need Related<T>",
        ));
    }

    let (local_key, remote_key) = match kind {
        RelationKindAttr::BelongsTo => (
            attr.local_key.unwrap_or_else(|| format!("{name}_id")),
            attr.remote_key.unwrap_or_else(|| "id".to_string()),
        ),
        RelationKindAttr::HasOne | RelationKindAttr::HasMany => (
            attr.local_key.unwrap_or_else(|| "id".to_string()),
            attr.remote_key.unwrap_or_else(|| format!("{owner}_id")),
        ),
        RelationKindAttr::HasManyToMany => (
            attr.local_key.unwrap_or_else(|| "id".to_string()),
            attr.remote_key.unwrap_or_else(|| "id".to_string()),
        ),
    };

    let link_table = if kind == RelationKindAttr::HasManyToMany {
        let Some(table) = attr.link_table else {
            return Err(Error::new_spanned(
                &name,
                "has_many_to_many relations need link_table = \"...\"",
            ));
        };
        let target_name = type_name(&target).map(|n| to_snake_case(&n));
        let remote_column = match (attr.link_remote, target_name) {
            (Some(column), _) => column,
            (None, Some(target_name)) => format!("{target_name}_id"),
            (None, None) => {
                return Err(Error::new_spanned(
                    &target,
                    "cannot derive link_remote from this type; set it explicitly",
                ));
            }
        };
        Some(LinkTableDef {
            table,
            local_column: attr.link_local.unwrap_or_else(|| format!("{owner}_id")),
            remote_column,
        })
    } else {
        if attr.link_table.is_some() {
            return Err(Error::new_spanned(
                &name,
                "link_table only applies to has_many_to_many relations",
            ));
        }
        None
    };

    Ok(RelationDef {
        name,
        kind,
        wrapper,
        target,
        local_key,
        remote_key,
        link_table,
        conditions: attr.conditions,
        defaults: attr.defaults,
    })
}

/// Detect a relation wrapper and return its target type.
pub fn detect_relation_wrapper(ty: &Type) -> Option<(WrapperKind, Type)> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    let wrapper = if segment.ident == "Related" {
        WrapperKind::Single
    } else if segment.ident == "RelatedMany" {
        WrapperKind::Many
    } else {
        return None;
    };
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(target) => Some((wrapper, target.clone())),
        _ => None,
    })
}

/// Check if a type is `Option<T>`.
pub fn is_option_type(ty: &Type) -> bool {
    if let Type::Path(type_path) = ty {
        if let Some(segment) = type_path.path.segments.last() {
            return segment.ident == "Option";
        }
    }
    false
}

fn type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string()),
        _ => None,
    }
}

/// Convert a `PascalCase` identifier to `snake_case`.
pub fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && chars[i - 1].is_lowercase();
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) {
                result.push('_');
            }
            result.extend(c.to_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("Post"), "post");
        assert_eq!(to_snake_case("BlogPost"), "blog_post");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
    }

    #[test]
    fn test_parse_basic_record() {
        let input: DeriveInput = parse_quote! {
            #[record(table = "posts", alias = "p")]
            struct Post {
                id: Option<i64>,
                #[record(column = "post_title")]
                title: String,
                #[record(skip)]
                cache: Vec<u8>,
            }
        };
        let def = parse_record(&input).unwrap();
        assert_eq!(def.table_name, "posts");
        assert_eq!(def.alias.as_deref(), Some("p"));
        assert_eq!(def.primary_key, "id");
        assert_eq!(def.fields.len(), 2);
        assert!(def.fields[0].primary_key);
        assert!(def.fields[0].nullable);
        assert_eq!(def.fields[1].column_name, "post_title");
        assert!(!def.fields[1].nullable);
        assert_eq!(def.skipped.len(), 1);
    }

    #[test]
    fn test_missing_table_is_an_error() {
        let input: DeriveInput = parse_quote! {
            struct Post {
                id: i64,
            }
        };
        let err = parse_record(&input).unwrap_err();
        assert!(err.to_string().contains("table"));
    }

    #[test]
    fn test_missing_primary_key_is_an_error() {
        let input: DeriveInput = parse_quote! {
            #[record(table = "tags", primary_key = "slug")]
            struct Tag {
                name: String,
            }
        };
        assert!(parse_record(&input).is_err());
    }

    #[test]
    fn test_relation_key_defaults() {
        let input: DeriveInput = parse_quote! {
            #[record(table = "posts")]
            struct BlogPost {
                id: Option<i64>,
                author_id: Option<i64>,
                #[record(relation(defaults(status = "active", rank = 1)))]
                author: Related<Author>,
                comments: RelatedMany<Comment>,
                #[record(relation(kind = "has_many_to_many", link_table = "post_tags"))]
                tags: RelatedMany<Tag>,
            }
        };
        let def = parse_record(&input).unwrap();
        assert_eq!(def.fields.len(), 2);

        let author = &def.relations[0];
        assert_eq!(author.kind, RelationKindAttr::BelongsTo);
        assert_eq!(author.local_key, "author_id");
        assert_eq!(author.remote_key, "id");
        assert_eq!(author.defaults.len(), 2);
        assert_eq!(author.defaults[0].0, "status");

        let comments = &def.relations[1];
        assert_eq!(comments.kind, RelationKindAttr::HasMany);
        assert_eq!(comments.local_key, "id");
        assert_eq!(comments.remote_key, "blog_post_id");

        let tags = &def.relations[2];
        assert_eq!(
            tags.link_table,
            Some(LinkTableDef {
                table: "post_tags".to_string(),
                local_column: "blog_post_id".to_string(),
                remote_column: "tag_id".to_string(),
            })
        );
    }

    #[test]
    fn test_relation_kind_must_match_wrapper() {
        let input: DeriveInput = parse_quote! {
            #[record(table = "posts")]
            struct Post {
                id: i64,
                #[record(relation(kind = "has_many"))]
                author: Related<Author>,
            }
        };
        assert!(parse_record(&input).is_err());
    }

    #[test]
    fn test_many_to_many_needs_link_table() {
        let input: DeriveInput = parse_quote! {
            #[record(table = "posts")]
            struct Post {
                id: i64,
                #[record(relation(kind = "has_many_to_many"))]
                tags: RelatedMany<Tag>,
            }
        };
        assert!(parse_record(&input).is_err());
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let input: DeriveInput = parse_quote! {
            #[record(table = "posts")]
            struct Post {
                #[record(colour = "red")]
                id: i64,
            }
        };
        assert!(parse_record(&input).is_err());
    }

    #[test]
    fn test_detect_relation_wrapper() {
        let ty: Type = parse_quote!(dbkit::Related<Author>);
        let (wrapper, target) = detect_relation_wrapper(&ty).unwrap();
        assert_eq!(wrapper, WrapperKind::Single);
        assert_eq!(type_name(&target).as_deref(), Some("Author"));
        let ty: Type = parse_quote!(Vec<Author>);
        assert!(detect_relation_wrapper(&ty).is_none());
    }

    #[test]
    fn test_auto_increment_flag() {
        let input: DeriveInput = parse_quote! {
            #[record(table = "codes", primary_key = "code")]
            struct Code {
                #[record(auto_increment = false)]
                code: String,
            }
        };
        let def = parse_record(&input).unwrap();
        assert_eq!(def.fields[0].auto_increment, Some(false));
        assert!(def.fields[0].primary_key);
    }
}
