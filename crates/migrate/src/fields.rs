//! Field extraction from model declarations
//!
//! Model sources are parsed with `syn`; each struct with named fields becomes
//! a candidate table. Column attributes are inferred from field names and can
//! be overridden with `#[migrate(...)]` annotations:
//!
//! ```ignore
//! #[migrate(table = "catalog_variants")]
//! pub struct Variant {
//!     pub id: i32,                               // primary key
//!     pub product_id: i32,                       // references products(id)
//!     #[migrate(foreign = "skus(code)")]
//!     pub sku: String,
//!     #[migrate(default = 0, not_null)]
//!     pub stock: i32,
//!     #[migrate(skip)]
//!     pub cached_label: String,
//! }
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use syn::ext::IdentExt;

use crate::error::{MigrateError, MigrateResult};
use crate::naming::NamingStrategy;

static REFERENCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*([A-Za-z_][A-Za-z0-9_]*)\s*\)\s*$")
        .expect("reference pattern is valid")
});

/// A persisted column inferred from a model field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    /// Rust type as written in the declaration
    pub source_type: String,
    pub sql_type: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default = "default_nullable")]
    pub is_nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub is_foreign_key: bool,
    /// `table(column)` for foreign keys, empty otherwise
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reference: String,
}

fn default_nullable() -> bool {
    true
}

impl Field {
    /// Plain nullable column with the SQL type derived from `source_type`
    pub fn new(name: impl Into<String>, source_type: impl Into<String>) -> Self {
        let source_type = source_type.into();
        Self {
            name: name.into(),
            sql_type: sql_type_for(&source_type).to_string(),
            source_type,
            is_primary: false,
            is_nullable: true,
            default_value: None,
            is_foreign_key: false,
            reference: String::new(),
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self.is_nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn references(mut self, reference: impl Into<String>) -> Self {
        self.is_foreign_key = true;
        self.reference = reference.into();
        self
    }

    /// `<name> <type>[ PRIMARY KEY| NOT NULL][ DEFAULT <value>]`
    pub fn column_definition(&self) -> String {
        let mut definition = format!("{} {}", self.name, self.sql_type);
        if self.is_primary {
            definition.push_str(" PRIMARY KEY");
        } else if !self.is_nullable {
            definition.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default_value {
            definition.push_str(" DEFAULT ");
            definition.push_str(default);
        }
        definition
    }

    /// Referenced table of a foreign key
    pub fn reference_table(&self) -> Option<&str> {
        if !self.is_foreign_key {
            return None;
        }
        self.reference
            .split('(')
            .next()
            .map(str::trim)
            .filter(|table| !table.is_empty())
    }

    /// Named constraint `fk_<table>_<field>_<referenced table>`
    pub fn constraint_name(&self, table: &str) -> Option<String> {
        self.reference_table()
            .map(|referenced| format!("fk_{}_{}_{}", table, self.name, referenced))
    }

    /// Whether both fields carry the same foreign key
    pub fn same_foreign_key(&self, other: &Field) -> bool {
        self.is_foreign_key == other.is_foreign_key
            && (!self.is_foreign_key || self.reference.eq_ignore_ascii_case(&other.reference))
    }
}

/// Map a Rust type to its SQL column type; unknown types become `TEXT`
pub fn sql_type_for(source_type: &str) -> &'static str {
    known_sql_type(source_type).unwrap_or("TEXT")
}

/// SQL type of a recognized scalar, matched on the last path segment so
/// `chrono::NaiveDateTime` maps like `NaiveDateTime`
fn known_sql_type(source_type: &str) -> Option<&'static str> {
    let base = last_segment(base_type_name(unwrap_option(source_type)));

    let sql_type = match base {
        "String" | "str" | "char" => "VARCHAR",
        "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
        | "u128" | "usize" => "INTEGER",
        "f32" => "FLOAT",
        "f64" => "DOUBLE PRECISION",
        "bool" => "BOOLEAN",
        "NaiveDateTime" | "DateTime" | "SystemTime" | "OffsetDateTime" | "PrimitiveDateTime" => {
            "TIMESTAMP"
        }
        _ => return None,
    };
    Some(sql_type)
}

/// An unrecognized path-qualified type such as `audit::Trail` is an
/// embedded value, not a column
fn is_embedded_type(source_type: &str) -> bool {
    known_sql_type(source_type).is_none()
        && base_type_name(unwrap_option(source_type)).contains("::")
}

fn option_inner(source_type: &str) -> Option<&str> {
    let (outer, rest) = source_type.split_once('<')?;
    if last_segment(outer) != "Option" {
        return None;
    }
    rest.strip_suffix('>')
}

fn unwrap_option(source_type: &str) -> &str {
    option_inner(source_type).unwrap_or(source_type)
}

fn base_type_name(source_type: &str) -> &str {
    let stripped = source_type.trim_start_matches('&');
    let stripped = stripped.strip_prefix("mut ").unwrap_or(stripped);
    stripped.split('<').next().unwrap_or(stripped).trim()
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path).trim()
}

/// Render a type the way it is written, without token spacing
fn render_type(ty: &syn::Type) -> String {
    match ty {
        syn::Type::Path(type_path) if type_path.qself.is_none() => type_path
            .path
            .segments
            .iter()
            .map(|segment| {
                let ident = segment.ident.to_string();
                match &segment.arguments {
                    syn::PathArguments::AngleBracketed(args) => {
                        let rendered: Vec<String> = args
                            .args
                            .iter()
                            .map(|arg| match arg {
                                syn::GenericArgument::Type(inner) => render_type(inner),
                                other => compact_tokens(&quote::quote!(#other).to_string()),
                            })
                            .collect();
                        format!("{}<{}>", ident, rendered.join(", "))
                    }
                    _ => ident,
                }
            })
            .collect::<Vec<_>>()
            .join("::"),
        syn::Type::Reference(reference) => {
            let mutability = if reference.mutability.is_some() { "mut " } else { "" };
            format!("&{}{}", mutability, render_type(&reference.elem))
        }
        syn::Type::Paren(paren) => render_type(&paren.elem),
        syn::Type::Group(group) => render_type(&group.elem),
        other => compact_tokens(&quote::quote!(#other).to_string()),
    }
}

fn compact_tokens(tokens: &str) -> String {
    tokens
        .replace(" < ", "<")
        .replace(" >", ">")
        .replace("< ", "<")
        .replace(" ,", ",")
        .replace(" :: ", "::")
        .replace("& ", "&")
}

/// Column annotations collected from `#[migrate(...)]`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct FieldTags {
    primary: bool,
    not_null: bool,
    skip: bool,
    default_value: Option<String>,
    foreign: Option<String>,
}

/// Struct annotations collected from `#[migrate(...)]`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StructTags {
    pub table: Option<String>,
    pub skip: bool,
}

/// Literal value of a tag, either quoted or bare (`default = 0`)
fn literal_value(lit: &syn::Lit) -> Option<String> {
    match lit {
        syn::Lit::Str(s) => Some(s.value()),
        syn::Lit::Int(i) => Some(i.base10_digits().to_string()),
        syn::Lit::Float(f) => Some(f.base10_digits().to_string()),
        syn::Lit::Bool(b) => Some(b.value.to_string()),
        _ => None,
    }
}

fn parse_field_tags(attrs: &[syn::Attribute]) -> syn::Result<FieldTags> {
    let mut tags = FieldTags::default();

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("migrate")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("primary") {
                tags.primary = true;
            } else if meta.path.is_ident("not_null") {
                tags.not_null = true;
            } else if meta.path.is_ident("skip") {
                tags.skip = true;
            } else if meta.path.is_ident("default") {
                let lit: syn::Lit = meta.value()?.parse()?;
                let value = literal_value(&lit)
                    .ok_or_else(|| meta.error("default must be a string, number or bool"))?;
                tags.default_value = Some(value);
            } else if meta.path.is_ident("foreign") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                let value = lit.value();
                let captures = REFERENCE_PATTERN.captures(&value).ok_or_else(|| {
                    meta.error(format!("foreign must look like table(column), got `{}`", value))
                })?;
                tags.foreign = Some(format!("{}({})", &captures[1], &captures[2]));
            } else {
                return Err(meta.error("unsupported migrate attribute"));
            }
            Ok(())
        })?;
    }

    Ok(tags)
}

pub fn parse_struct_tags(attrs: &[syn::Attribute]) -> syn::Result<StructTags> {
    let mut tags = StructTags::default();

    for attr in attrs.iter().filter(|attr| attr.path().is_ident("migrate")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                tags.skip = true;
            } else if meta.path.is_ident("table") {
                let lit: syn::LitStr = meta.value()?.parse()?;
                tags.table = Some(lit.value());
            } else {
                return Err(meta.error("unsupported migrate attribute on struct"));
            }
            Ok(())
        })?;
    }

    Ok(tags)
}

/// A struct declaration with named fields
#[derive(Debug, Clone)]
pub struct ParsedStruct {
    pub name: String,
    pub tags: StructTags,
    pub fields: Vec<Field>,
}

/// Turns model declarations into column lists
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldExtractor {
    naming: NamingStrategy,
}

impl FieldExtractor {
    pub fn new(naming: NamingStrategy) -> Self {
        Self { naming }
    }

    /// Parse every struct with named fields in a source file
    pub fn parse_file(&self, path: &Path) -> MigrateResult<Vec<ParsedStruct>> {
        let source = fs::read_to_string(path)
            .map_err(|e| MigrateError::extraction(path, format!("Failed to read file: {}", e)))?;
        self.parse_source(path, &source)
    }

    /// Parse every struct with named fields in `source`
    pub fn parse_source(&self, path: &Path, source: &str) -> MigrateResult<Vec<ParsedStruct>> {
        let ast = syn::parse_file(source).map_err(|e| {
            MigrateError::extraction(path, format!("Failed to parse Rust file: {}", e))
        })?;

        let mut structs = Vec::new();
        self.collect_structs(path, &ast.items, &mut structs)?;
        Ok(structs)
    }

    fn collect_structs(
        &self,
        path: &Path,
        items: &[syn::Item],
        out: &mut Vec<ParsedStruct>,
    ) -> MigrateResult<()> {
        for item in items {
            match item {
                syn::Item::Struct(item_struct) => {
                    if let syn::Fields::Named(named) = &item_struct.fields {
                        let tags = parse_struct_tags(&item_struct.attrs)
                            .map_err(|e| MigrateError::extraction(path, e))?;
                        let fields = self.extract_fields(path, named)?;
                        out.push(ParsedStruct {
                            name: item_struct.ident.unraw().to_string(),
                            tags,
                            fields,
                        });
                    }
                }
                syn::Item::Mod(module) => {
                    if let Some((_, nested)) = &module.content {
                        self.collect_structs(path, nested, out)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn extract_fields(&self, path: &Path, named: &syn::FieldsNamed) -> MigrateResult<Vec<Field>> {
        let mut fields = Vec::new();

        for field in &named.named {
            let Some(ident) = &field.ident else {
                continue;
            };
            let name = ident.unraw().to_string();

            let tags = parse_field_tags(&field.attrs).map_err(|e| {
                MigrateError::extraction(path, format!("field {}: {}", name, e))
            })?;
            if tags.skip {
                continue;
            }

            let source_type = render_type(&field.ty);
            if is_embedded_type(&source_type) {
                tracing::debug!("Skipping embedded field {}: {}", name, source_type);
                continue;
            }

            fields.push(self.build_field(name, source_type, tags));
        }

        Ok(fields)
    }

    fn build_field(&self, name: String, source_type: String, tags: FieldTags) -> Field {
        let is_optional = option_inner(&source_type).is_some();
        let is_primary = tags.primary || name.eq_ignore_ascii_case("id");
        let is_nullable = !is_primary && (is_optional || !tags.not_null);

        let reference = tags.foreign.or_else(|| {
            self.naming
                .referenced_table(&name)
                .map(|table| format!("{}(id)", table))
        });

        Field {
            sql_type: sql_type_for(&source_type).to_string(),
            name,
            source_type,
            is_primary,
            is_nullable,
            default_value: tags.default_value,
            is_foreign_key: reference.is_some(),
            reference: reference.unwrap_or_default(),
        }
    }
}
