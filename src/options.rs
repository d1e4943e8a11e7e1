//! Options configuring a [`Generator`]
//!
//! An option is one typed configuration step. Callers pass them in any order;
//! [`Generator::new`] sorts them by priority so that tables are loaded before
//! they are configured, and configured before relationships are resolved.
//!
//! Two kinds of failure exist. A malformed option list (an odd number of
//! custom struct tag entries, unbalanced relationship rules, column specific
//! settings in a default config) is a programming error and panics when the
//! option is constructed. A well formed option that does not fit the loaded
//! tables (unknown table or column, unsupported tag kind) returns an error
//! when it is applied.

use crate::cancel::Cancel;
use crate::feature::FeatureSet;
use crate::generator::Generator;
use crate::relation::{self, KeyUsage, RelationRules};
use crate::schema::{Column, SchemaSource};
use crate::serializer::Serializer;
use crate::table::{Encoder, Table};
use crate::GeneratorError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Load tables from a schema source
pub const PRIORITY_TABLES_FROM_SCHEMA: u16 = 1;
/// Literal table definition
pub const PRIORITY_TABLE: u16 = 10;
/// Serializer choice
pub const PRIORITY_SERIALIZER: u16 = 110;
/// Build tag lines
pub const PRIORITY_BUILD_TAGS: u16 = 112;
/// Custom code snippets
pub const PRIORITY_CUSTOM_CODE: u16 = 113;
/// Default table configuration
pub const PRIORITY_TABLE_CONFIG_DEFAULT: u16 = 149;
/// Per table configuration
pub const PRIORITY_TABLE_CONFIG: u16 = 150;
/// Column aliases derived from foreign keys
pub const PRIORITY_COLUMN_ALIASES_FROM_FOREIGN_KEYS: u16 = 205;
/// Relationship resolution, always last
pub const PRIORITY_FOREIGN_KEY_RELATIONSHIPS: u16 = 210;

/// Per table settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Encoders: `serde` or `json`
    pub encoders: Vec<String>,
    /// Struct tag kinds in output order: `bson`, `db`, `env`, `json`, `toml`,
    /// `yaml`, `xml`, `max_len`, `protobuf`
    pub struct_tags: Vec<String>,
    /// Flat `column, tag, column, tag, ..` list replacing generated tags
    pub custom_struct_tags: Vec<String>,
    /// Comment for the entity struct
    pub comment: String,
    /// Column -> additional result set names
    pub column_aliases: BTreeMap<String, Vec<String>>,
    /// Columns getting a deduplicating collection getter
    pub uniquified_columns: Vec<String>,
    /// Columns generated as private fields with accessors
    pub private_fields: Vec<String>,
    /// Features to include, empty means all
    pub features_include: FeatureSet,
    /// Features to exclude
    pub features_exclude: FeatureSet,
}

impl TableConfig {
    /// Panics on an odd custom struct tag list
    fn assert_balanced(&self) {
        if self.custom_struct_tags.len() % 2 == 1 {
            panic!(
                "custom struct tags must be balanced (column, tag, ..), got {} entries: {:?}",
                self.custom_struct_tags.len(),
                self.custom_struct_tags
            );
        }
    }

    pub(crate) fn has_column_settings(&self) -> bool {
        !self.custom_struct_tags.is_empty()
            || !self.column_aliases.is_empty()
            || !self.uniquified_columns.is_empty()
            || !self.private_fields.is_empty()
    }

    /// Apply the table-independent settings
    fn apply_general(&self, t: &mut Table, g: &Generator) -> Result<(), GeneratorError> {
        if !self.encoders.is_empty() {
            t.encoders = self
                .encoders
                .iter()
                .map(|e| Encoder::from_name(e))
                .collect::<Result<_, _>>()?;
        }
        if !self.struct_tags.is_empty() {
            t.apply_struct_tags(&self.struct_tags, &g.type_mapper())?;
        }
        if !self.comment.is_empty() {
            t.comment = self.comment.clone();
        }
        if !self.features_include.is_empty() {
            t.features_include = self.features_include;
        }
        if !self.features_exclude.is_empty() {
            t.features_exclude = self.features_exclude;
        }
        Ok(())
    }

    /// Apply the column specific settings, every column must exist
    fn apply_columns(&self, t: &mut Table) -> Result<(), GeneratorError> {
        if !self.custom_struct_tags.is_empty() {
            for pair in self.custom_struct_tags.chunks(2) {
                t.column_mut(&pair[0])?;
                t.custom_struct_tags
                    .insert(pair[0].clone(), pair[1].clone());
            }
            t.apply_custom_struct_tags();
        }

        for (column, aliases) in &self.column_aliases {
            let col = t.column_mut(column)?;
            for alias in aliases {
                if !col.aliases.contains(alias) {
                    col.aliases.push(alias.clone());
                }
            }
        }

        for column in &self.uniquified_columns {
            let table = t.name.clone();
            let col = t.column_mut(column)?;
            let binary_float = matches!(col.data_type_lower().as_str(), "float" | "double" | "real")
                && !col.is_money();
            if col.is_blob_or_text() || binary_float {
                return Err(GeneratorError::NotAllowed(format!(
                    "uniquified column {}.{} of type {}",
                    table, column, col.column_type
                )));
            }
            col.uniquified = true;
        }

        for column in &self.private_fields {
            t.column_mut(column)?;
            t.private_fields.insert(column.clone());
        }
        Ok(())
    }
}

/// What a table option does when the table already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableAction {
    /// Replace columns with the same name, append new ones
    #[default]
    Merge,
    /// Replace all columns
    Overwrite,
    /// Replace all columns and mark the table as view
    View,
}

enum Step {
    TablesFromSchema {
        source: Arc<dyn SchemaSource>,
        cancel: Cancel,
        tables: Vec<String>,
    },
    Table {
        name: String,
        columns: Vec<Column>,
        action: TableAction,
    },
    Serializer(Serializer),
    BuildTags(Vec<String>),
    CustomCode {
        marker: String,
        code: String,
    },
    TableConfigDefault(TableConfig),
    TableConfig {
        name: String,
        config: TableConfig,
    },
    ColumnAliasesFromForeignKeys {
        source: Arc<dyn SchemaSource>,
        cancel: Cancel,
    },
    ForeignKeyRelationships {
        source: Arc<dyn SchemaSource>,
        cancel: Cancel,
        rules: RelationRules,
    },
}

/// One configuration step for a [`Generator`]
pub struct Opt {
    priority: u16,
    step: Step,
}

impl fmt::Debug for Opt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opt")
            .field("name", &self.name())
            .field("priority", &self.priority)
            .finish()
    }
}

impl Opt {
    fn new(priority: u16, step: Step) -> Self {
        Opt { priority, step }
    }

    /// Load the named tables, all tables when `tables` is empty
    pub fn tables_from_schema(
        source: Arc<dyn SchemaSource>,
        cancel: Cancel,
        tables: Vec<String>,
    ) -> Self {
        Self::new(
            PRIORITY_TABLES_FROM_SCHEMA,
            Step::TablesFromSchema {
                source,
                cancel,
                tables,
            },
        )
    }

    /// Define a table literally, merging into an already loaded one
    pub fn table(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self::table_with_action(name, columns, TableAction::Merge)
    }

    /// Define a table literally with an explicit action
    pub fn table_with_action(
        name: impl Into<String>,
        columns: Vec<Column>,
        action: TableAction,
    ) -> Self {
        Self::new(
            PRIORITY_TABLE,
            Step::Table {
                name: name.into(),
                columns,
                action,
            },
        )
    }

    /// Choose the serializer; also decides the narrowest integer width
    pub fn serializer(serializer: Serializer) -> Self {
        Self::new(PRIORITY_SERIALIZER, Step::Serializer(serializer))
    }

    /// Lines written verbatim at the top of both outputs, below the header
    pub fn build_tags<S: Into<String>>(lines: impl IntoIterator<Item = S>) -> Self {
        Self::new(
            PRIORITY_BUILD_TAGS,
            Step::BuildTags(lines.into_iter().map(Into::into).collect()),
        )
    }

    /// Insert code at a marker
    ///
    /// Markers are an entity name (after its methods), a collection name
    /// (after its methods), `main` and `test` (end of the respective output).
    pub fn custom_code(marker: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(
            PRIORITY_CUSTOM_CODE,
            Step::CustomCode {
                marker: marker.into(),
                code: code.into(),
            },
        )
    }

    /// Configuration applied to every table before per table configuration
    ///
    /// # Panics
    ///
    /// Panics if the config carries column specific settings, which cannot
    /// hold for every table.
    pub fn table_config_default(config: TableConfig) -> Self {
        if config.has_column_settings() {
            panic!(
                "default table config must not contain custom struct tags, column aliases, \
                 uniquified columns or private fields"
            );
        }
        Self::new(
            PRIORITY_TABLE_CONFIG_DEFAULT,
            Step::TableConfigDefault(config),
        )
    }

    /// Configuration of one table
    ///
    /// # Panics
    ///
    /// Panics if `custom_struct_tags` has an odd length.
    pub fn table_config(name: impl Into<String>, config: TableConfig) -> Self {
        config.assert_balanced();
        Self::new(
            PRIORITY_TABLE_CONFIG,
            Step::TableConfig {
                name: name.into(),
                config,
            },
        )
    }

    /// Add `ref_table.ref_column` as alias to every foreign key column
    pub fn column_aliases_from_foreign_keys(source: Arc<dyn SchemaSource>, cancel: Cancel) -> Self {
        Self::new(
            PRIORITY_COLUMN_ALIASES_FROM_FOREIGN_KEYS,
            Step::ColumnAliasesFromForeignKeys { source, cancel },
        )
    }

    /// Resolve relationship fields from foreign keys
    ///
    /// `include` and `exclude` are flat pair lists, see [`RelationRules`].
    ///
    /// # Panics
    ///
    /// Panics if either list has an odd length.
    pub fn foreign_key_relationships<S: AsRef<str>>(
        source: Arc<dyn SchemaSource>,
        cancel: Cancel,
        include: &[S],
        exclude: &[S],
    ) -> Self {
        Self::new(
            PRIORITY_FOREIGN_KEY_RELATIONSHIPS,
            Step::ForeignKeyRelationships {
                source,
                cancel,
                rules: RelationRules::new(include, exclude),
            },
        )
    }

    /// Priority, lower runs first
    pub fn priority(&self) -> u16 {
        self.priority
    }

    /// Name of the step, used in error context
    pub fn name(&self) -> &'static str {
        match &self.step {
            Step::TablesFromSchema { .. } => "tables_from_schema",
            Step::Table { .. } => "table",
            Step::Serializer(_) => "serializer",
            Step::BuildTags(_) => "build_tags",
            Step::CustomCode { .. } => "custom_code",
            Step::TableConfigDefault(_) => "table_config_default",
            Step::TableConfig { .. } => "table_config",
            Step::ColumnAliasesFromForeignKeys { .. } => "column_aliases_from_foreign_keys",
            Step::ForeignKeyRelationships { .. } => "foreign_key_relationships",
        }
    }

    pub(crate) fn apply(self, g: &mut Generator) -> Result<(), GeneratorError> {
        let name = self.name();
        tracing::debug!(option = name, priority = self.priority, "applying option");
        self.apply_step(g).map_err(|e| GeneratorError::InOption {
            option: name,
            source: Box::new(e),
        })
    }

    fn apply_step(self, g: &mut Generator) -> Result<(), GeneratorError> {
        match self.step {
            Step::TablesFromSchema {
                source,
                cancel,
                tables,
            } => {
                let loaded = source.load_columns(&cancel, &tables)?;
                for (name, columns) in loaded {
                    g.tables.insert(name.clone(), Table::new(name, columns));
                }
                Ok(())
            }
            Step::Table {
                name,
                columns,
                action,
            } => {
                let table = g
                    .tables
                    .entry(name.clone())
                    .or_insert_with(|| Table::new(name, Vec::new()));
                match action {
                    TableAction::Merge => {
                        for col in columns {
                            match table.columns.iter_mut().find(|c| c.field == col.field) {
                                Some(existing) => *existing = col,
                                None => table.columns.push(col),
                            }
                        }
                    }
                    TableAction::Overwrite => table.columns = columns,
                    TableAction::View => {
                        table.columns = columns;
                        table.is_view = true;
                    }
                }
                Ok(())
            }
            Step::Serializer(s) => {
                g.serializer = s;
                Ok(())
            }
            Step::BuildTags(lines) => {
                g.build_tags.extend(lines);
                Ok(())
            }
            Step::CustomCode { marker, code } => {
                let entry = g.custom_code.entry(marker).or_default();
                if !entry.is_empty() {
                    entry.push('\n');
                }
                entry.push_str(&code);
                Ok(())
            }
            Step::TableConfigDefault(config) => {
                for name in g.sorted_table_names() {
                    let mut t = g.tables.remove(&name).unwrap_or_default();
                    let res = config.apply_general(&mut t, g);
                    g.tables.insert(name.clone(), t);
                    res.map_err(|e| e.in_table(&name))?;
                }
                Ok(())
            }
            Step::TableConfig { name, config } => {
                let mut t = g
                    .tables
                    .remove(&name)
                    .ok_or_else(|| GeneratorError::TableNotFound {
                        table: name.clone(),
                    })?;
                let res = config
                    .apply_columns(&mut t)
                    .and_then(|_| config.apply_general(&mut t, g));
                g.tables.insert(name.clone(), t);
                res.map_err(|e| e.in_table(&name))
            }
            Step::ColumnAliasesFromForeignKeys { source, cancel } => {
                let names = g.sorted_table_names();
                let rows = source.load_key_column_usage(&cancel, &names)?;
                for row in rows {
                    if !g.tables.contains_key(&row.referenced_table_name) {
                        continue;
                    }
                    let Some(t) = g.tables.get_mut(&row.table_name) else {
                        continue;
                    };
                    let alias = format!(
                        "{}.{}",
                        row.referenced_table_name, row.referenced_column_name
                    );
                    let col = t
                        .column_mut(&row.column_name)
                        .map_err(|e| e.in_table(&row.table_name))?;
                    if !col.aliases.contains(&alias) {
                        col.aliases.push(alias);
                    }
                }
                Ok(())
            }
            Step::ForeignKeyRelationships {
                source,
                cancel,
                rules,
            } => {
                let names = g.sorted_table_names();
                let rows = source.load_key_column_usage(&cancel, &names)?;
                let usage = KeyUsage::new(&rows);
                let resolved: Vec<_> = names
                    .iter()
                    .map(|name| (name.clone(), relation::resolve(name, &g.tables, &usage, &rules)))
                    .collect();
                for (name, rels) in resolved {
                    if let Some(t) = g.tables.get_mut(&name) {
                        tracing::debug!(table = %name, count = rels.len(), "resolved relationships");
                        t.relationships = rels;
                    }
                }
                g.key_usage = usage;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priorities_order_steps() {
        let mut opts = [
            Opt::table_config("a", TableConfig::default()),
            Opt::serializer(Serializer::Protobuf),
            Opt::table("a", vec![]),
            Opt::table_config_default(TableConfig::default()),
        ];
        opts.sort_by_key(Opt::priority);
        let names: Vec<_> = opts.iter().map(Opt::name).collect();
        assert_eq!(
            names,
            vec!["table", "serializer", "table_config_default", "table_config"]
        );
    }

    #[test]
    #[should_panic(expected = "balanced")]
    fn test_odd_custom_struct_tags_panic() {
        Opt::table_config(
            "does_not_matter",
            TableConfig {
                custom_struct_tags: vec!["path".to_string()],
                ..Default::default()
            },
        );
    }

    #[test]
    #[should_panic(expected = "default table config")]
    fn test_default_config_with_columns_panics() {
        Opt::table_config_default(TableConfig {
            private_fields: vec!["path".to_string()],
            ..Default::default()
        });
    }

    #[test]
    fn test_table_config_from_json() {
        let cfg: TableConfig = serde_json::from_str(
            r#"{
                "struct_tags": ["json", "db"],
                "features_exclude": ["DBDelete", "CollectionSwap"],
                "column_aliases": {"scope_id": ["website_id"]}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.struct_tags, vec!["json", "db"]);
        assert_eq!(
            cfg.features_exclude.names(),
            vec!["CollectionSwap", "DBDelete"]
        );
        assert_eq!(cfg.column_aliases["scope_id"], vec!["website_id"]);
    }
}
