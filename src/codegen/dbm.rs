//! Database mapping glue
//!
//! SQL statements as associated constants, last insert id assignment and
//! the `ColumnMapper` implementations moving values between a result row and
//! the entity fields through `dml::ColumnMap`.

use crate::codegen::collection;
use crate::codegen::column::FieldSpec;
use crate::feature::Feature;
use crate::naming;
use crate::table::Table;
use crate::types::split_option;
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

/// Name of the table name constant, e.g. `TABLE_NAME_CORE_CONFIG_DATA`
pub fn table_const_name(table: &str) -> String {
    format!("TABLE_NAME_{}", naming::const_name(table))
}

fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn column_list<'a>(cols: impl Iterator<Item = &'a str>) -> String {
    cols.map(quote_ident).collect::<Vec<_>>().join(", ")
}

fn where_pk(table: &Table) -> String {
    table
        .primary_keys()
        .map(|c| format!("{} = ?", quote_ident(&c.field)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// SQL statements of a table as `(constant name, statement)` pairs
///
/// Views only get select statements. Statements needing a primary key are
/// skipped for tables without one.
pub fn statements(table: &Table) -> Vec<(&'static str, String)> {
    let name = quote_ident(&table.name);
    let all = column_list(table.columns.iter().map(|c| c.field.as_str()));
    let has_pk = table.primary_keys().next().is_some();
    let mut out = Vec::new();
    if table.columns.is_empty() {
        return out;
    }

    if table.has(Feature::DBSelect) {
        out.push(("SQL_SELECT", format!("SELECT {} FROM {}", all, name)));
        if has_pk {
            out.push((
                "SQL_SELECT_BY_PK",
                format!("SELECT {} FROM {} WHERE {}", all, name, where_pk(table)),
            ));
        }
    }
    if table.is_view {
        return out;
    }

    let insertable: Vec<&str> = table
        .columns
        .iter()
        .filter(|c| !c.is_auto_increment())
        .map(|c| c.field.as_str())
        .collect();
    let placeholders = vec!["?"; insertable.len()].join(", ");
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        name,
        column_list(insertable.iter().copied()),
        placeholders
    );
    let non_pk: Vec<&str> = table
        .non_primary_columns()
        .map(|c| c.field.as_str())
        .collect();

    if table.has(Feature::DBInsert) && !insertable.is_empty() {
        out.push(("SQL_INSERT", insert.clone()));
    }
    if table.has(Feature::DBUpdate) && has_pk && !non_pk.is_empty() {
        let set = non_pk
            .iter()
            .map(|c| format!("{} = ?", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        out.push((
            "SQL_UPDATE_BY_PK",
            format!("UPDATE {} SET {} WHERE {}", name, set, where_pk(table)),
        ));
    }
    if table.has(Feature::DBUpsert) && !insertable.is_empty() && !non_pk.is_empty() {
        let update = non_pk
            .iter()
            .map(|c| format!("{0} = VALUES({0})", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        out.push((
            "SQL_UPSERT",
            format!("{} ON DUPLICATE KEY UPDATE {}", insert, update),
        ));
    }
    if table.has(Feature::DBDelete) && has_pk {
        out.push((
            "SQL_DELETE_BY_PK",
            format!("DELETE FROM {} WHERE {}", name, where_pk(table)),
        ));
    }
    out
}

/// Associated constants and last insert id assignment of the entity
pub fn entity_items(table: &Table, specs: &[FieldSpec<'_>]) -> TokenStream {
    let entity = naming::type_ident(&table.entity_name());
    let table_const = format_ident!("{}", table_const_name(&table.name));
    let columns = table.columns.iter().map(|c| &c.field);
    let stmts = statements(table).into_iter().map(|(name, sql)| {
        let ident = format_ident!("{}", name);
        quote!(pub const #ident: &'static str = #sql;)
    });
    let assign = assign_last_insert_id(table, specs);

    quote! {
        impl #entity {
            /// Name of the table.
            pub const TABLE: &'static str = #table_const;
            /// Column names in ordinal order.
            pub const COLUMNS: &'static [&'static str] = &[#(#columns),*];
            #(#stmts)*
            #assign
        }
    }
}

fn assign_last_insert_id(table: &Table, specs: &[FieldSpec<'_>]) -> TokenStream {
    if table.is_view || !table.has(Feature::DBAssignLastInsertID) {
        return TokenStream::new();
    }
    let Some(col) = table.auto_increment_column() else {
        return TokenStream::new();
    };
    let Some(spec) = specs.iter().find(|s| s.column.field == col.field) else {
        return TokenStream::new();
    };
    let (inner, wrapped) = split_option(&spec.rust_type);
    if !matches!(inner, "u8" | "u16" | "u32" | "u64" | "i8" | "i16" | "i32" | "i64") {
        return TokenStream::new();
    }
    let ident = &spec.ident;
    let inner_ty = format_ident!("{}", inner);
    let value = if inner == "u64" {
        quote!(id)
    } else {
        quote!(id as #inner_ty)
    };
    let value = if wrapped { quote!(Some(#value)) } else { value };
    quote! {
        /// Sets the auto increment column after an insert.
        pub fn assign_last_insert_id(&mut self, id: u64) -> &mut Self {
            self.#ident = #value;
            self
        }
    }
}

/// Last insert id assignment for the collection, consecutive ids per entity
pub fn collection_items(table: &Table, specs: &[FieldSpec<'_>]) -> TokenStream {
    if assign_last_insert_id(table, specs).is_empty() {
        return TokenStream::new();
    }
    let coll = naming::type_ident(&table.collection_name());
    quote! {
        impl #coll {
            /// Assigns consecutive ids starting at `id`, as returned by a
            /// multi row insert.
            pub fn assign_last_insert_id(&mut self, id: u64) -> &mut Self {
                for (i, e) in self.data.iter_mut().enumerate() {
                    e.assign_last_insert_id(id + i as u64);
                }
                self
            }
        }
    }
}

/// `ColumnMapper` for the entity
///
/// Result set columns are matched by name and by every alias of the column.
pub fn entity_mapper(table: &Table, specs: &[FieldSpec<'_>]) -> TokenStream {
    if specs.is_empty() {
        return TokenStream::new();
    }
    let entity = naming::type_ident(&table.entity_name());
    let chain = specs.iter().map(|s| {
        let accessor = &s.accessor;
        let ident = &s.ident;
        quote!(.#accessor(&mut self.#ident))
    });
    let arms = specs.iter().map(|s| {
        let accessor = &s.accessor;
        let ident = &s.ident;
        let names = std::iter::once(&s.column.field).chain(s.column.aliases.iter());
        quote! {
            #(#names)|* => {
                cm.#accessor(&mut self.#ident);
            }
        }
    });

    quote! {
        impl ColumnMapper for #entity {
            fn map_columns(&mut self, cm: &mut ColumnMap) -> Result<(), dml::Error> {
                if cm.mode() == ColumnMapMode::EntireRow {
                    cm #(#chain)*;
                    return cm.err();
                }
                while cm.next() {
                    let column = cm.column().to_owned();
                    match column.as_str() {
                        #(#arms)*
                        _ => return Err(dml::Error::column_not_found(&column)),
                    }
                }
                cm.err()
            }
        }
    }
}

/// `ColumnMapper` for the collection
///
/// Scanning appends one entity per row; collecting primary keys reads the
/// key columns of every entity; any other mode maps every entity in turn.
pub fn collection_mapper(table: &Table, specs: &[FieldSpec<'_>]) -> TokenStream {
    if specs.is_empty() || !collection::is_generated(table) {
        return TokenStream::new();
    }
    let entity = naming::type_ident(&table.entity_name());
    let coll = naming::type_ident(&table.collection_name());
    let pk: Vec<_> = specs
        .iter()
        .filter(|s| s.column.is_primary())
        .map(|s| {
            let accessor = &s.accessor;
            let ident = &s.ident;
            quote!(cm.#accessor(&mut e.#ident);)
        })
        .collect();
    let pk_arm = if pk.is_empty() {
        TokenStream::new()
    } else {
        quote! {
            ColumnMapMode::CollectPrimaryKeys => {
                for e in &mut self.data {
                    #(#pk)*
                }
            }
        }
    };

    quote! {
        impl ColumnMapper for #coll {
            fn map_columns(&mut self, cm: &mut ColumnMap) -> Result<(), dml::Error> {
                match cm.mode() {
                    ColumnMapMode::Scan => {
                        let mut e = #entity::default();
                        e.map_columns(cm)?;
                        self.data.push(e);
                    }
                    #pk_arm
                    _ => {
                        for e in &mut self.data {
                            e.map_columns(cm)?;
                        }
                    }
                }
                cm.err()
            }
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
    use pretty_assertions::assert_eq;

    fn table() -> Table {
        Table::new(
            "core_config_data",
            vec![
                Column::new("config_id", "int")
                    .column_type("int(10) unsigned")
                    .primary()
                    .auto_increment(),
                Column::new("scope", "varchar"),
                Column::new("path", "varchar"),
            ],
        )
    }

    #[test]
    fn test_statements() {
        let stmts = statements(&table());
        let get = |n: &str| stmts.iter().find(|(k, _)| *k == n).map(|(_, v)| v.as_str());
        assert_eq!(
            get("SQL_SELECT_BY_PK"),
            Some("SELECT `config_id`, `scope`, `path` FROM `core_config_data` WHERE `config_id` = ?")
        );
        assert_eq!(
            get("SQL_INSERT"),
            Some("INSERT INTO `core_config_data` (`scope`, `path`) VALUES (?, ?)")
        );
        assert_eq!(
            get("SQL_UPDATE_BY_PK"),
            Some("UPDATE `core_config_data` SET `scope` = ?, `path` = ? WHERE `config_id` = ?")
        );
        assert_eq!(
            get("SQL_UPSERT"),
            Some(
                "INSERT INTO `core_config_data` (`scope`, `path`) VALUES (?, ?) \
                 ON DUPLICATE KEY UPDATE `scope` = VALUES(`scope`), `path` = VALUES(`path`)"
            )
        );
        assert_eq!(
            get("SQL_DELETE_BY_PK"),
            Some("DELETE FROM `core_config_data` WHERE `config_id` = ?")
        );
    }

    #[test]
    fn test_views_only_select() {
        let mut t = table();
        t.is_view = true;
        let names: Vec<_> = statements(&t).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["SQL_SELECT", "SQL_SELECT_BY_PK"]);
        let specs = field_specs(&t, &TypeMapper::default()).unwrap();
        assert!(collection_items(&t, &specs).is_empty());
    }

    #[test]
    fn test_mapper_with_aliases() {
        let mut t = table();
        t.columns[1].aliases = vec!["store_scope".to_string()];
        let specs = field_specs(&t, &TypeMapper::default()).unwrap();
        let mut src = entity_mapper(&t, &specs).to_string();
        src.push_str(&collection_mapper(&t, &specs).to_string());
        src.push_str(&entity_items(&t, &specs).to_string());
        let out = format_source(src).unwrap();
        assert!(out.contains("impl ColumnMapper for CoreConfigData {"));
        assert!(out.contains("\"scope\" | \"store_scope\" => {"));
        assert!(out.contains("cm.string(&mut self.scope);"));
        assert!(out.contains("impl ColumnMapper for CoreConfigDatas {"));
        assert!(out.contains("ColumnMapMode::CollectPrimaryKeys => {"));
        assert!(out.contains("self.config_id = id as u32;"));
        assert!(out.contains("pub const TABLE: &'static str = TABLE_NAME_CORE_CONFIG_DATA;"));
    }
}
