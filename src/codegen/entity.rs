//! Entity generation
//!
//! The entity is the struct holding one row. Its definition is emitted in
//! the first pass so that relationship fields of other entities can refer to
//! it; its methods follow in the second pass.

use crate::codegen::column::FieldSpec;
use crate::codegen::{derives, doc, relation};
use crate::feature::Feature;
use crate::naming;
use crate::table::{Encoder, Table};
use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote};
use std::collections::HashMap;

/// Method names an accessor must not shadow
const RESERVED_METHODS: &[&str] = &[
    "new",
    "empty",
    "copy",
    "write_to",
    "validate",
    "to_json",
    "assign_last_insert_id",
    "map_columns",
];

/// The entity struct definition
pub fn struct_def(
    table: &Table,
    specs: &[FieldSpec<'_>],
    tables: &HashMap<String, Table>,
) -> TokenStream {
    let entity = naming::type_ident(&table.entity_name());
    let mut text = format!(
        "{} represents a single row for DB table {}. Auto generated.",
        entity, table.name
    );
    if !table.comment.is_empty() {
        text.push('\n');
        text.push_str(&table.comment);
    }
    if table.is_view {
        text.push_str("\nThe table is a view.");
    }
    let docs = doc(&text);
    let derives = derives(table.has_serde());
    let serde = table.has_serde();

    let fields = specs.iter().map(|s| {
        let field_doc = doc(&s.doc());
        let ident = &s.ident;
        let ty = &s.ty;
        let attr = if serde { s.serde_attr() } else { TokenStream::new() };
        let vis = if s.private { TokenStream::new() } else { quote!(pub) };
        quote! {
            #field_doc
            #attr
            #vis #ident: #ty
        }
    });
    let rels = relation::fields(table, tables);

    quote! {
        #docs
        #derives
        pub struct #entity {
            #(#fields,)*
            #(#rels,)*
        }
    }
}

/// The inherent methods of the entity
pub fn methods(table: &Table, specs: &[FieldSpec<'_>]) -> TokenStream {
    let entity = naming::type_ident(&table.entity_name());
    let mut items = vec![quote! {
        /// Creates an entity with all fields set to their defaults.
        pub fn new() -> Self {
            Self::default()
        }
    }];

    let tagged: Vec<_> = specs
        .iter()
        .filter(|s| !s.column.struct_tag.is_empty())
        .map(|s| {
            let field = &s.column.field;
            let tag = &s.column.struct_tag;
            quote!((#field, #tag))
        })
        .collect();
    if !tagged.is_empty() {
        items.push(quote! {
            /// Struct tags per column as configured for the table.
            pub const STRUCT_TAGS: &'static [(&'static str, &'static str)] = &[#(#tagged),*];
        });
    }

    if table.has(Feature::EntityEmpty) {
        items.push(quote! {
            /// Resets all fields to their defaults.
            pub fn empty(&mut self) -> &mut Self {
                *self = Self::default();
                self
            }
        });
    }

    if table.has(Feature::EntityCopy) {
        let owner = quote!(self);
        let assigns = specs.iter().map(|s| {
            let ident = &s.ident;
            let value = s.value_of(&owner);
            quote!(#ident: #value)
        });
        items.push(quote! {
            /// Copies the column fields into a new entity. Relationships are
            /// not copied.
            pub fn copy(&self) -> Self {
                Self {
                    #(#assigns,)*
                    ..Default::default()
                }
            }
        });
    }

    if table.has(Feature::EntityGetSetPrivateFields) {
        items.extend(specs.iter().filter(|s| s.private).map(accessors));
    }

    if table.has(Feature::EntityWriteTo) && !specs.is_empty() {
        let fmt = specs
            .iter()
            .map(|s| if s.is_option() || s.is_bytes() { "{:?}" } else { "{}" })
            .collect::<Vec<_>>()
            .join("\t");
        let args = specs.iter().map(|s| {
            let ident = &s.ident;
            quote!(self.#ident)
        });
        items.push(quote! {
            /// Writes the column values as one tab separated line.
            pub fn write_to(&self, w: &mut impl std::io::Write) -> std::io::Result<()> {
                writeln!(w, #fmt, #(#args),*)
            }
        });
    }

    if table.has(Feature::EntityValidate) {
        let checks = specs
            .iter()
            .filter(|s| s.is_string())
            .filter_map(|s| s.column.char_max_length.filter(|l| *l > 0).map(|l| (s, l)))
            .map(|(s, max)| {
                let ident = &s.ident;
                let msg = format!("{}.{} exceeds {} characters", table.name, s.column.field, max);
                let max = Literal::usize_unsuffixed(max as usize);
                if s.is_option() {
                    quote! {
                        if let Some(v) = &self.#ident {
                            if v.chars().count() > #max {
                                return Err(dml::Error::not_valid(#msg));
                            }
                        }
                    }
                } else {
                    quote! {
                        if self.#ident.chars().count() > #max {
                            return Err(dml::Error::not_valid(#msg));
                        }
                    }
                }
            });
        items.push(quote! {
            /// Checks the length limits of the string columns.
            pub fn validate(&self) -> Result<(), dml::Error> {
                #(#checks)*
                Ok(())
            }
        });
    }

    if table.encoders().any(|e| e == Encoder::Json) {
        items.push(quote! {
            /// Serializes the entity as JSON.
            pub fn to_json(&self) -> serde_json::Result<String> {
                serde_json::to_string(self)
            }
        });
    }

    quote! {
        impl #entity {
            #(#items)*
        }
    }
}

fn accessors(s: &FieldSpec<'_>) -> TokenStream {
    let ident = &s.ident;
    let ty = &s.ty;
    let getter = if RESERVED_METHODS.contains(&s.name.as_str()) {
        format_ident!("get_{}", s.name)
    } else {
        s.ident.clone()
    };
    let setter = format_ident!("set_{}", s.name);
    let get_doc = format!(" Returns the value of column {}.", s.column.field);
    let set_doc = format!(" Sets the value of column {}.", s.column.field);

    let get = if s.is_copy() {
        quote!(pub fn #getter(&self) -> #ty { self.#ident })
    } else if s.rust_type == "String" {
        quote!(pub fn #getter(&self) -> &str { &self.#ident })
    } else if s.rust_type == "Option<String>" {
        quote!(pub fn #getter(&self) -> Option<&str> { self.#ident.as_deref() })
    } else if s.is_bytes() {
        quote!(pub fn #getter(&self) -> &[u8] { &self.#ident })
    } else {
        quote!(pub fn #getter(&self) -> &#ty { &self.#ident })
    };

    quote! {
        #[doc = #get_doc]
        #get

        #[doc = #set_doc]
        pub fn #setter(&mut self, value: #ty) -> &mut Self {
            self.#ident = value;
            self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::column::field_specs;
    use crate::codegen::emitter::format_source;
    use crate::schema::Column;
    use crate::types::TypeMapper;

    fn table() -> Table {
        let mut t = Table::new(
            "core_config_data",
            vec![
                Column::new("config_id", "int")
                    .column_type("int(10) unsigned")
                    .primary()
                    .auto_increment(),
                Column::new("scope", "varchar").max_length(8),
                Column::new("path", "varchar").max_length(255),
                Column::new("value", "text").nullable().max_length(65535),
            ],
        );
        t.private_fields.insert("path".to_string());
        t
    }

    fn render(t: &Table) -> String {
        let specs = field_specs(t, &TypeMapper::default()).unwrap();
        let mut src = struct_def(t, &specs, &HashMap::new()).to_string();
        src.push_str(&methods(t, &specs).to_string());
        format_source(src).unwrap()
    }

    #[test]
    fn test_struct_and_methods() {
        let out = render(&table());
        assert!(out.contains("pub struct CoreConfigData {"));
        assert!(out.contains("/// CoreConfigData represents a single row for DB table core_config_data."));
        assert!(out.contains("pub config_id: u32,"));
        assert!(out.contains("    path: String,"));
        assert!(out.contains("pub value: Option<String>,"));
        assert!(out.contains("pub fn empty(&mut self) -> &mut Self"));
        assert!(out.contains("pub fn copy(&self) -> Self"));
        assert!(out.contains("pub fn path(&self) -> &str"));
        assert!(out.contains("pub fn set_path(&mut self, value: String) -> &mut Self"));
        assert!(out.contains("pub fn write_to("));
        assert!(out.contains("\"{}\\t{}\\t{}\\t{:?}\""));
        assert!(out.contains("core_config_data.scope exceeds 8 characters"));
        assert!(out.contains("if let Some(v) = &self.value"));
        assert!(!out.contains("Serialize"));
        assert!(!out.contains("to_json"));
        assert!(!out.contains("STRUCT_TAGS"));
    }

    #[test]
    fn test_feature_exclusion() {
        let mut t = table();
        t.features_exclude = Feature::EntityCopy | Feature::EntityWriteTo;
        let out = render(&t);
        assert!(!out.contains("fn copy"));
        assert!(!out.contains("fn write_to"));
        assert!(out.contains("fn empty"));
    }

    #[test]
    fn test_serde_and_struct_tags() {
        let mut t = table();
        t.encoders.insert(Encoder::Json);
        t.columns[1].struct_tag = "json:\"scope,omitempty\"".to_string();
        let out = render(&t);
        assert!(out.contains("#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]"));
        assert!(out.contains("#[serde(skip_serializing_if = \"String::is_empty\")]"));
        assert!(out.contains("#[serde(skip)]"));
        assert!(out.contains("pub fn to_json(&self)"));
        assert!(out.contains("(\"scope\", \"json:\\\"scope,omitempty\\\"\")"));
    }

    #[test]
    fn test_reserved_accessor_names() {
        let mut t = Table::new("item", vec![Column::new("copy", "int")]);
        t.private_fields.insert("copy".to_string());
        let out = render(&t);
        assert!(out.contains("pub fn get_copy(&self) -> i32"));
        assert!(out.contains("pub fn set_copy(&mut self, value: i32)"));
    }
}
