//! Collection generation
//!
//! A collection wraps `Vec<Entity>` and adds the bulk operations selected by
//! the collection features.

use crate::codegen::column::FieldSpec;
use crate::codegen::{derives, doc};
use crate::feature::Feature;
use crate::naming;
use crate::table::{Encoder, Table};
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

/// Whether the collection of `table` is generated
pub fn is_generated(table: &Table) -> bool {
    table.has_all(Feature::EntityStruct | Feature::CollectionStruct)
}

/// The collection struct definition
pub fn struct_def(table: &Table) -> TokenStream {
    let entity = naming::type_ident(&table.entity_name());
    let coll = naming::type_ident(&table.collection_name());
    let docs = doc(&format!(
        "{} represents a collection type for DB table {}. Not thread safe. Auto generated.",
        coll, table.name
    ));
    let derives = derives(table.has_serde());
    quote! {
        #docs
        #derives
        pub struct #coll {
            /// The entities in insertion order.
            pub data: Vec<#entity>,
        }
    }
}

/// The inherent methods of the collection
pub fn methods(table: &Table, specs: &[FieldSpec<'_>]) -> TokenStream {
    let entity = naming::type_ident(&table.entity_name());
    let coll = naming::type_ident(&table.collection_name());

    let mut items = vec![quote! {
        /// Creates an empty collection.
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of entities.
        pub fn len(&self) -> usize {
            self.data.len()
        }

        /// Whether the collection holds no entity.
        pub fn is_empty(&self) -> bool {
            self.data.is_empty()
        }
    }];

    if table.has(Feature::CollectionAppend) {
        items.push(quote! {
            /// Appends entities at the end.
            pub fn append(&mut self, items: impl IntoIterator<Item = #entity>) -> &mut Self {
                self.data.extend(items);
                self
            }
        });
    }

    if table.has(Feature::CollectionCut) {
        items.push(quote! {
            /// Removes the entities in `i..j`. Out of range bounds are clamped.
            pub fn cut(&mut self, i: usize, j: usize) -> &mut Self {
                let j = j.min(self.data.len());
                if i < j {
                    self.data.drain(i..j);
                }
                self
            }
        });
    }

    if table.has(Feature::CollectionDelete) {
        items.push(quote! {
            /// Removes the entity at index `i`, if any.
            pub fn delete(&mut self, i: usize) -> &mut Self {
                if i < self.data.len() {
                    self.data.remove(i);
                }
                self
            }
        });
    }

    if table.has(Feature::CollectionEach) {
        items.push(quote! {
            /// Calls `f` for every entity.
            pub fn each(&mut self, f: impl FnMut(&mut #entity)) -> &mut Self {
                self.data.iter_mut().for_each(f);
                self
            }
        });
    }

    if table.has(Feature::CollectionFilter) {
        items.push(quote! {
            /// Returns a new collection with the entities `f` accepts.
            pub fn filter(&self, mut f: impl FnMut(&#entity) -> bool) -> Self {
                Self {
                    data: self.data.iter().filter(|e| f(e)).cloned().collect(),
                }
            }
        });
    }

    if table.has(Feature::CollectionInsert) {
        items.push(quote! {
            /// Inserts an entity at index `i`, appending when `i` is past the end.
            pub fn insert(&mut self, e: #entity, i: usize) -> &mut Self {
                let i = i.min(self.data.len());
                self.data.insert(i, e);
                self
            }
        });
    }

    if table.has(Feature::CollectionSwap) {
        items.push(quote! {
            /// Swaps the entities at `i` and `j`.
            pub fn swap(&mut self, i: usize, j: usize) {
                self.data.swap(i, j);
            }
        });
    }

    if table.has(Feature::CollectionUniqueGetters) {
        let owner = quote!(e);
        for s in specs.iter().filter(|s| table.is_unique_column(&s.column.field)) {
            let name = format_ident!("{}s", s.name);
            let ty = &s.ty;
            let value = s.value_of(&owner);
            let text = format!(" Returns all values of the unique column {}.", s.column.field);
            items.push(quote! {
                #[doc = #text]
                pub fn #name(&self) -> Vec<#ty> {
                    self.data.iter().map(|e| #value).collect()
                }
            });
        }
    }

    if table.has(Feature::CollectionUniquifiedGetters) {
        let owner = quote!(e);
        for s in specs.iter().filter(|s| s.column.uniquified) {
            let name = format_ident!("unique_{}s", s.name);
            let ty = &s.ty;
            let value = s.value_of(&owner);
            let text = format!(
                " Returns the values of column {} without duplicates, in first seen order.",
                s.column.field
            );
            items.push(quote! {
                #[doc = #text]
                pub fn #name(&self) -> Vec<#ty> {
                    let mut seen = HashSet::with_capacity(self.data.len());
                    let mut out = Vec::with_capacity(self.data.len());
                    for e in &self.data {
                        let v = #value;
                        if seen.insert(v.clone()) {
                            out.push(v);
                        }
                    }
                    out
                }
            });
        }
    }

    if table.has_all(Feature::CollectionValidate | Feature::EntityValidate) {
        items.push(quote! {
            /// Validates every entity, stopping at the first error.
            pub fn validate(&self) -> Result<(), dml::Error> {
                self.data.iter().try_for_each(|e| e.validate())
            }
        });
    }

    if table.encoders().any(|e| e == Encoder::Json) {
        items.push(quote! {
            /// Serializes the collection as JSON.
            pub fn to_json(&self) -> serde_json::Result<String> {
                serde_json::to_string(self)
            }
        });
    }

    quote! {
        impl #coll {
            #(#items)*
        }
    }
}
