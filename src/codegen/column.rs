//! Per column field generation
//!
//! A [`FieldSpec`] bundles everything the emitters need to know about one
//! column: identifier, resolved type, column map accessor and the field
//! attributes derived from the struct tag.

use crate::naming;
use crate::schema::Column;
use crate::table::{struct_tag_value, Table};
use crate::types::{accessor_from_type, is_copy_type, is_string_type, split_option, TypeMapper};
use crate::GeneratorError;
use proc_macro2::{Ident, TokenStream};
use quote::quote;

/// A column as a struct field
#[derive(Debug, Clone)]
pub struct FieldSpec<'a> {
    /// The column
    pub column: &'a Column,
    /// Field name without raw prefix
    pub name: String,
    /// Field identifier
    pub ident: Ident,
    /// Resolved Rust type
    pub rust_type: String,
    /// Resolved Rust type, parsed
    pub ty: syn::Type,
    /// `ColumnMap` method moving the value
    pub accessor: Ident,
    /// Generated without `pub`, with accessors
    pub private: bool,
}

impl FieldSpec<'_> {
    /// Wrapped in `Option`
    pub fn is_option(&self) -> bool {
        split_option(&self.rust_type).1
    }

    /// Values can be copied out of a borrow
    pub fn is_copy(&self) -> bool {
        is_copy_type(&self.rust_type)
    }

    /// `String` or `Option<String>`
    pub fn is_string(&self) -> bool {
        is_string_type(&self.rust_type)
    }

    /// `Vec<u8>`
    pub fn is_bytes(&self) -> bool {
        self.rust_type == "Vec<u8>"
    }

    /// Expression reading the field of `owner` by value
    pub fn value_of(&self, owner: &TokenStream) -> TokenStream {
        let ident = &self.ident;
        if self.is_copy() {
            quote!(#owner.#ident)
        } else {
            quote!(#owner.#ident.clone())
        }
    }

    /// Doc line describing the column, similar to `SHOW COLUMNS`
    pub fn doc(&self) -> String {
        let c = self.column;
        let mut parts = vec![c.field.clone(), c.column_type.clone()];
        parts.push(if c.null { "NULL" } else { "NOT NULL" }.to_string());
        let key = c.key.as_str();
        if !key.is_empty() {
            parts.push(key.to_string());
        }
        if let Some(d) = &c.default {
            parts.push(format!("DEFAULT '{}'", d));
        }
        if !c.extra.is_empty() {
            parts.push(c.extra.clone());
        }
        if !c.comment.is_empty() {
            parts.push(format!("\"{}\"", c.comment));
        }
        parts.join(" ")
    }

    /// `#[serde(...)]` attribute derived from the `json` struct tag and the
    /// column aliases
    pub fn serde_attr(&self) -> TokenStream {
        if self.private {
            return quote!(#[serde(skip)]);
        }
        let (wire, omitempty) = match struct_tag_value(&self.column.struct_tag, "json") {
            Some(v) => {
                let mut parts = v.split(',');
                let name = parts.next().unwrap_or_default().to_string();
                (name, parts.any(|p| p == "omitempty"))
            }
            None => (String::new(), false),
        };
        if wire == "-" {
            return quote!(#[serde(skip)]);
        }
        let wire = if wire.is_empty() {
            self.column.field.clone()
        } else {
            wire
        };

        let mut args = Vec::new();
        if wire != self.name {
            args.push(quote!(rename = #wire));
        }
        if omitempty {
            let check = if self.is_option() {
                Some("Option::is_none")
            } else if self.is_string() {
                Some("String::is_empty")
            } else if self.is_bytes() {
                Some("Vec::is_empty")
            } else {
                None
            };
            if let Some(check) = check {
                args.push(quote!(skip_serializing_if = #check));
            }
        }
        for alias in &self.column.aliases {
            args.push(quote!(alias = #alias));
        }
        if args.is_empty() {
            TokenStream::new()
        } else {
            quote!(#[serde(#(#args),*)])
        }
    }
}

/// Field specs of all columns of a table in column order
pub fn field_specs<'a>(
    table: &'a Table,
    mapper: &TypeMapper,
) -> Result<Vec<FieldSpec<'a>>, GeneratorError> {
    table
        .columns
        .iter()
        .map(|column| {
            let rust_type = mapper.rust_type(column, true)?;
            let ty = syn::parse_str::<syn::Type>(&rust_type).map_err(|e| {
                GeneratorError::NotSupported(format!("type {} of {}: {}", rust_type, column.field, e))
            })?;
            let name = naming::field_name(&column.field);
            Ok(FieldSpec {
                column,
                ident: naming::ident(&name),
                name,
                accessor: naming::ident(&accessor_from_type(&rust_type)),
                ty,
                rust_type,
                private: table.is_private(&column.field),
            })
        })
        .collect()
}
