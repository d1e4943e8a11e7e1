//! Relationship fields of entities
//!
//! A forward or one-to-one edge becomes `Option<Box<Entity>>`, a reversed
//! one-to-many edge `Option<Collection>`. Fields are only emitted when the
//! type they point at is generated as well.

use crate::codegen::doc;
use crate::feature::Feature;
use crate::naming;
use crate::relation::Relationship;
use crate::table::Table;
use proc_macro2::TokenStream;
use quote::quote;
use std::collections::HashMap;

/// Whether the target type of `rel` is generated
pub fn target_exists(rel: &Relationship, tables: &HashMap<String, Table>) -> bool {
    let Some(other) = tables.get(&rel.other_table) else {
        return false;
    };
    if rel.is_collection() {
        other.has_all(Feature::EntityStruct | Feature::CollectionStruct)
    } else {
        other.has(Feature::EntityStruct)
    }
}

/// Type of the generated field
pub fn field_type(rel: &Relationship) -> TokenStream {
    if rel.is_collection() {
        let coll = naming::type_ident(&naming::collection_name(&rel.other_table));
        quote!(Option<#coll>)
    } else {
        let entity = naming::type_ident(&naming::entity_name(&rel.other_table));
        quote!(Option<Box<#entity>>)
    }
}

/// Doc line of the generated field
pub fn describe(table: &str, rel: &Relationship) -> String {
    format!(
        "{} {}.{} => {}.{}",
        rel.label(),
        table,
        rel.column,
        rel.other_table,
        rel.other_column
    )
}

/// Relationship fields of `table`, empty when the feature is disabled
pub fn fields(table: &Table, tables: &HashMap<String, Table>) -> Vec<TokenStream> {
    if !table.has(Feature::EntityRelationships) {
        return Vec::new();
    }
    let serde = table.has_serde();
    table
        .relationships()
        .iter()
        .filter(|rel| target_exists(rel, tables))
        .map(|rel| {
            let docs = doc(&describe(&table.name, rel));
            let ident = naming::ident(&rel.field_name);
            let ty = field_type(rel);
            let skip = if serde {
                quote!(#[serde(skip)])
            } else {
                TokenStream::new()
            };
            quote! {
                #docs
                #skip
                pub #ident: #ty
            }
        })
        .collect()
}
