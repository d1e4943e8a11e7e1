//! Names of generated types, fields and methods
//!
//! Table names are turned into entity names with acronym aware PascalCase
//! and into collection names with a deliberately naive English plural. The
//! rules are kept stable because downstream code depends on the exact names.

use heck::{ToSnakeCase, ToUpperCamelCase};
use once_cell::sync::Lazy;
use proc_macro2::{Ident, Span};
use std::collections::HashSet;

/// Initialisms rendered in upper case inside type names
static INITIALISMS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "ACL", "API", "ASCII", "CPU", "CSS", "DNS", "EAV", "EOF", "GUID", "HTML", "HTTP", "HTTPS",
        "ID", "IP", "JSON", "LHS", "QPS", "RAM", "RHS", "RPC", "SKU", "SLA", "SMTP", "SQL", "SSH",
        "TCP", "TLS", "TTL", "UDP", "UI", "UID", "UUID", "URI", "URL", "UTF8", "VM", "XML",
        "XMPP", "XSRF", "XSS",
    ]
    .into_iter()
    .collect()
});

const RUST_KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in",
    "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe", "unsized",
    "use", "virtual", "where", "while", "yield",
];

/// Keywords that cannot be raw identifiers
const RESERVED_PATH_KEYWORDS: &[&str] = &["self", "Self", "super", "crate", "_"];

/// PascalCase a table or column name, upper casing known initialisms
///
/// `catalog_product_entity_url` becomes `CatalogProductEntityURL`.
pub fn pascal_case(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|segment| {
            let upper = segment.to_ascii_uppercase();
            if INITIALISMS.contains(upper.as_str()) {
                upper
            } else {
                segment.to_upper_camel_case()
            }
        })
        .collect()
}

/// Name of the entity struct of a table
pub fn entity_name(table: &str) -> String {
    pascal_case(table)
}

/// Name of the collection struct of a table
///
/// The table name is pluralized before casing, so initialisms at the end
/// follow the same rules as plain words: `admin_xss` becomes
/// `AdminXSSCollection`.
pub fn collection_name(table: &str) -> String {
    pascal_case(&pluralize(&table.to_snake_case()))
}

/// Naive English plural of a snake_case name
///
/// `y` becomes `ies`, `ch` and `x` take `es`, `us` becomes `i`, `um` becomes
/// `en`, a trailing `s` takes `_collection`, anything else takes `s`.
pub fn pluralize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix('y') {
        format!("{}ies", stem)
    } else if name.ends_with("ch") || name.ends_with('x') {
        format!("{}es", name)
    } else if let Some(stem) = name.strip_suffix("us") {
        format!("{}i", stem)
    } else if let Some(stem) = name.strip_suffix("um") {
        format!("{}en", stem)
    } else if name.ends_with('s') {
        format!("{}_collection", name)
    } else {
        format!("{}s", name)
    }
}

/// snake_case name of a struct field for a column, without raw prefix
pub fn field_name(column: &str) -> String {
    let name = column.to_snake_case();
    if RESERVED_PATH_KEYWORDS.contains(&name.as_str()) {
        format!("{}_", name)
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", name)
    } else {
        name
    }
}

/// Identifier for a snake_case name, raw when it collides with a keyword
pub fn ident(name: &str) -> Ident {
    if RUST_KEYWORDS.contains(&name) {
        Ident::new_raw(name, Span::call_site())
    } else {
        Ident::new(name, Span::call_site())
    }
}

/// Identifier of the struct field for a column
pub fn field_ident(column: &str) -> Ident {
    ident(&field_name(column))
}

/// Identifier of a type name
pub fn type_ident(name: &str) -> Ident {
    Ident::new(name, Span::call_site())
}

/// SCREAMING_SNAKE_CASE constant name for a column
pub fn const_name(column: &str) -> String {
    let name = column.to_snake_case().to_ascii_uppercase();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", name)
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_names() {
        assert_eq!(entity_name("core_config_data"), "CoreConfigData");
        assert_eq!(entity_name("catalog_product_entity_url"), "CatalogProductEntityURL");
        assert_eq!(entity_name("customer_entity"), "CustomerEntity");
        assert_eq!(entity_name("eav_attribute"), "EAVAttribute");
        assert_eq!(entity_name("sales_order_status_state"), "SalesOrderStatusState");
        assert_eq!(entity_name("store_website"), "StoreWebsite");
    }

    #[test]
    fn test_pluralize_rules() {
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("batch"), "batches");
        assert_eq!(pluralize("tax"), "taxes");
        assert_eq!(pluralize("status"), "stati");
        assert_eq!(pluralize("bonus"), "boni");
        assert_eq!(pluralize("museum"), "museen");
        assert_eq!(pluralize("customer_address"), "customer_address_collection");
        assert_eq!(pluralize("store_website"), "store_websites");
        assert_eq!(collection_name("core_config_data"), "CoreConfigDatas");
        assert_eq!(collection_name("sales_order_status"), "SalesOrderStati");
        assert_eq!(collection_name("customer_address"), "CustomerAddressCollection");
        assert_eq!(collection_name("catalog_category"), "CatalogCategories");
    }

    #[test]
    fn test_collection_names_with_trailing_initialism() {
        assert_eq!(entity_name("admin_xss"), "AdminXSS");
        assert_eq!(collection_name("admin_xss"), "AdminXSSCollection");
        assert_eq!(collection_name("eav_attribute"), "EAVAttributes");
        assert_eq!(collection_name("customer_entity_index"), "CustomerEntityIndexes");
    }

    #[test]
    fn test_field_names() {
        assert_eq!(field_name("config_id"), "config_id");
        assert_eq!(field_name("ConfigID"), "config_id");
        assert_eq!(field_name("self"), "self_");
        assert_eq!(field_name("1st_line"), "_1st_line");
        assert_eq!(field_ident("type").to_string(), "r#type");
        assert_eq!(field_ident("path").to_string(), "path");
        assert_eq!(const_name("scope_id"), "SCOPE_ID");
    }
}
