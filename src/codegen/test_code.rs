//! Generated unit tests
//!
//! The test output is meant to live in a child module of the main output,
//! hence the `use super::*` at its top. Each table gets a smoke test per
//! generated type, exercising exactly the features that were emitted.

use crate::codegen::collection;
use crate::codegen::column::FieldSpec;
use crate::codegen::dbm;
use crate::feature::Feature;
use crate::naming;
use crate::table::Table;
use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote};

/// Tests for the entity of `table`
pub fn entity_test(table: &Table) -> TokenStream {
    let entity = naming::type_ident(&table.entity_name());
    let name = format_ident!("test_{}_entity", naming::field_name(&table.name));
    let mut body = Vec::new();

    if table.has(Feature::EntityCopy) {
        body.push(quote! {
            let c = e.copy();
            assert_eq!(c, e);
        });
    }
    if table.has(Feature::EntityWriteTo) && !table.columns.is_empty() {
        body.push(quote! {
            let mut buf = Vec::new();
            e.write_to(&mut buf).unwrap();
            assert!(buf.ends_with(b"\n"));
        });
    }
    if table.has(Feature::EntityValidate) {
        body.push(quote! {
            assert!(e.validate().is_ok());
        });
    }
    if table.has(Feature::EntityEmpty) {
        body.push(quote! {
            e.empty();
            assert_eq!(e, #entity::default());
        });
    }
    if table.has(Feature::DB) {
        let table_name = &table.name;
        let n = Literal::usize_unsuffixed(table.columns.len());
        body.push(quote! {
            assert_eq!(#entity::TABLE, #table_name);
            assert_eq!(#entity::COLUMNS.len(), #n);
        });
        for (stmt, sql) in dbm::statements(table) {
            let ident = format_ident!("{}", stmt);
            let prefix = sql.split_whitespace().next().unwrap_or_default().to_string();
            body.push(quote! {
                assert!(#entity::#ident.starts_with(#prefix));
            });
        }
    }

    let binding = if body.is_empty() {
        quote!(let e = #entity::new();)
    } else {
        quote!(let mut e = #entity::new();)
    };
    quote! {
        #[test]
        fn #name() {
            #binding
            #(#body)*
            let _ = e;
        }
    }
}

/// Tests for the collection of `table`, empty when it is not generated
pub fn collection_test(table: &Table, specs: &[FieldSpec<'_>]) -> TokenStream {
    if !collection::is_generated(table) {
        return TokenStream::new();
    }
    let entity = naming::type_ident(&table.entity_name());
    let coll = naming::type_ident(&table.collection_name());
    let name = format_ident!("test_{}_collection", naming::field_name(&table.name));
    let mut body = Vec::new();
    let mut len = 0usize;

    if table.has(Feature::CollectionAppend) {
        body.push(quote! {
            c.append([#entity::new(), #entity::new(), #entity::new()]);
            assert_eq!(c.len(), 3);
        });
        len = 3;
    }
    if table.has(Feature::CollectionInsert) {
        body.push(quote! {
            c.insert(#entity::new(), 1);
        });
        len += 1;
        let n = Literal::usize_unsuffixed(len);
        body.push(quote!(assert_eq!(c.len(), #n);));
    }
    if table.has(Feature::CollectionSwap) && len >= 2 {
        body.push(quote! {
            c.swap(0, 1);
        });
    }
    if table.has(Feature::CollectionEach) {
        let n = Literal::usize_unsuffixed(len);
        body.push(quote! {
            let mut seen = 0;
            c.each(|_| seen += 1);
            assert_eq!(seen, #n);
        });
    }
    if table.has(Feature::CollectionFilter) {
        body.push(quote! {
            assert!(c.filter(|_| false).is_empty());
        });
    }
    if table.has(Feature::CollectionUniqueGetters) {
        for s in specs.iter().filter(|s| table.is_unique_column(&s.column.field)) {
            let getter = format_ident!("{}s", s.name);
            body.push(quote! {
                assert_eq!(c.#getter().len(), c.len());
            });
        }
    }
    if table.has(Feature::CollectionUniquifiedGetters) {
        for s in specs.iter().filter(|s| s.column.uniquified) {
            let getter = format_ident!("unique_{}s", s.name);
            body.push(quote! {
                assert!(c.#getter().len() <= 1);
            });
        }
    }
    if table.has(Feature::CollectionDelete) && len > 0 {
        body.push(quote! {
            c.delete(0);
        });
        len -= 1;
        let n = Literal::usize_unsuffixed(len);
        body.push(quote!(assert_eq!(c.len(), #n);));
    }
    if table.has(Feature::CollectionCut) {
        body.push(quote! {
            c.cut(0, usize::MAX);
            assert!(c.is_empty());
        });
    }

    quote! {
        #[test]
        fn #name() {
            let mut c = #coll::new();
            assert!(c.is_empty());
            #(#body)*
            let _ = &mut c;
        }
    }
}
