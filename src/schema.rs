//! Table metadata consumed by the generator
//!
//! A [`Column`] mirrors one row of `information_schema.COLUMNS` and a
//! [`KeyColumnUsage`] one row of `information_schema.KEY_COLUMN_USAGE`.
//! Where these rows come from is up to a [`SchemaSource`]; the crate ships
//! [`StaticSchema`] for literal definitions and JSON input.

use crate::cancel::Cancel;
use crate::GeneratorError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key classification of a column, `COLUMN_KEY` in the information schema
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKey {
    /// Not part of an index
    #[default]
    #[serde(rename = "")]
    None,
    /// Part of the primary key
    #[serde(rename = "PRI")]
    Primary,
    /// Unique index
    #[serde(rename = "UNI")]
    Unique,
    /// Non-unique index
    #[serde(rename = "MUL")]
    Multiple,
}

impl ColumnKey {
    /// The information schema spelling
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnKey::None => "",
            ColumnKey::Primary => "PRI",
            ColumnKey::Unique => "UNI",
            ColumnKey::Multiple => "MUL",
        }
    }
}

/// One database column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Column {
    /// Column name
    pub field: String,
    /// Ordinal position, starting at 1
    pub pos: u32,
    /// Default value as written in the schema
    pub default: Option<String>,
    /// `IS_NULLABLE = 'YES'`
    pub null: bool,
    /// Base data type, e.g. `int` or `varchar`
    pub data_type: String,
    /// Full column type, e.g. `int(10) unsigned`
    pub column_type: String,
    /// Numeric precision
    pub precision: Option<u64>,
    /// Numeric scale
    pub scale: Option<u64>,
    /// Maximum length in characters for string types
    pub char_max_length: Option<u64>,
    /// Key classification
    pub key: ColumnKey,
    /// Extra information, e.g. `auto_increment`
    pub extra: String,
    /// Column comment
    pub comment: String,
    /// Additional names under which the column can appear in a result set
    pub aliases: Vec<String>,
    /// Generate a deduplicating getter for this column
    pub uniquified: bool,
    /// Struct tag string assembled from the configured tag kinds
    pub struct_tag: String,
}

const MONEY_WORDS: &[&str] = &[
    "price", "amount", "total", "tax", "discount", "cost", "fee", "balance", "refunded",
    "invoiced", "paid",
];

impl Column {
    /// Start a column definition with a name and a base data type
    pub fn new(field: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        Column {
            field: field.into(),
            column_type: data_type.clone(),
            data_type,
            ..Default::default()
        }
    }

    /// Set the full column type, e.g. `int(10) unsigned`
    pub fn column_type(mut self, column_type: impl Into<String>) -> Self {
        self.column_type = column_type.into();
        self
    }

    /// Mark the column nullable
    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Mark the column as (part of) the primary key
    pub fn primary(mut self) -> Self {
        self.key = ColumnKey::Primary;
        self
    }

    /// Mark the column as unique
    pub fn unique(mut self) -> Self {
        self.key = ColumnKey::Unique;
        self
    }

    /// Mark the column as part of a non-unique index
    pub fn indexed(mut self) -> Self {
        self.key = ColumnKey::Multiple;
        self
    }

    /// Mark the column auto increment
    pub fn auto_increment(mut self) -> Self {
        self.extra = "auto_increment".to_string();
        self
    }

    /// Set the maximum character length
    pub fn max_length(mut self, len: u64) -> Self {
        self.char_max_length = Some(len);
        self
    }

    /// Set numeric precision and scale
    pub fn precision(mut self, precision: u64, scale: u64) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Set the default value
    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set the column comment
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Part of the primary key
    pub fn is_primary(&self) -> bool {
        self.key == ColumnKey::Primary
    }

    /// Carries a unique index
    pub fn is_unique(&self) -> bool {
        self.key == ColumnKey::Unique
    }

    /// Auto increment column
    pub fn is_auto_increment(&self) -> bool {
        self.extra.to_ascii_lowercase().contains("auto_increment")
    }

    /// Unsigned numeric column
    pub fn is_unsigned(&self) -> bool {
        self.column_type.to_ascii_lowercase().contains("unsigned")
    }

    /// Lower case base data type
    pub fn data_type_lower(&self) -> String {
        self.data_type.to_ascii_lowercase()
    }

    /// Boolean shaped column: `tinyint(1)`, `bit(1)`, `bool` or an
    /// `is_`/`has_` prefixed small integer.
    pub fn is_bool(&self) -> bool {
        let dt = self.data_type_lower();
        let ct = self.column_type.to_ascii_lowercase();
        match dt.as_str() {
            "bool" | "boolean" => true,
            "bit" => ct.starts_with("bit(1)") || self.precision == Some(1),
            "tinyint" | "smallint" => {
                ct.starts_with("tinyint(1)")
                    || self.field.starts_with("is_")
                    || self.field.starts_with("has_")
            }
            _ => false,
        }
    }

    /// Floating point or decimal column
    pub fn is_float(&self) -> bool {
        matches!(
            self.data_type_lower().as_str(),
            "float" | "double" | "real" | "decimal" | "numeric"
        )
    }

    /// Floating point or decimal column holding a monetary value
    pub fn is_money(&self) -> bool {
        if !self.is_float() {
            return false;
        }
        if self.precision == Some(12) && self.scale == Some(4) {
            return true;
        }
        let name = self.field.to_ascii_lowercase();
        MONEY_WORDS.iter().any(|w| name.contains(w))
    }

    /// Text, blob or binary column of arbitrary size
    pub fn is_blob_or_text(&self) -> bool {
        matches!(
            self.data_type_lower().as_str(),
            "tinytext"
                | "text"
                | "mediumtext"
                | "longtext"
                | "json"
                | "binary"
                | "varbinary"
                | "tinyblob"
                | "blob"
                | "mediumblob"
                | "longblob"
        )
    }

    /// The length limit used by `max_len` tags and generated validation
    pub fn max_len(&self) -> u64 {
        match self.char_max_length {
            Some(l) if l > 0 => l,
            _ => self.precision.unwrap_or(0),
        }
    }
}

/// A foreign key column, one row of `KEY_COLUMN_USAGE`
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyColumnUsage {
    /// Referencing table
    pub table_name: String,
    /// Referencing column
    pub column_name: String,
    /// Referenced table
    pub referenced_table_name: String,
    /// Referenced column
    pub referenced_column_name: String,
}

impl KeyColumnUsage {
    /// Build a row `table.column` referencing `ref_table.ref_column`
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Self {
        KeyColumnUsage {
            table_name: table.into(),
            column_name: column.into(),
            referenced_table_name: ref_table.into(),
            referenced_column_name: ref_column.into(),
        }
    }
}

/// A provider of table metadata, usually an information schema query
///
/// Both calls are blocking. Implementations should check `cancel` before and
/// between round trips.
pub trait SchemaSource {
    /// Columns of the requested tables in ordinal order, keyed by table.
    /// An empty `tables` slice requests every table.
    fn load_columns(
        &self,
        cancel: &Cancel,
        tables: &[String],
    ) -> Result<BTreeMap<String, Vec<Column>>, GeneratorError>;

    /// Foreign key rows where either side is one of the requested tables
    fn load_key_column_usage(
        &self,
        cancel: &Cancel,
        tables: &[String],
    ) -> Result<Vec<KeyColumnUsage>, GeneratorError>;
}

/// An in-memory schema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticSchema {
    /// Columns keyed by table name
    pub tables: BTreeMap<String, Vec<Column>>,
    /// Foreign key rows
    pub key_column_usage: Vec<KeyColumnUsage>,
}

impl StaticSchema {
    /// Add a table, builder style
    pub fn table(mut self, name: impl Into<String>, columns: Vec<Column>) -> Self {
        self.tables.insert(name.into(), columns);
        self
    }

    /// Add a foreign key row, builder style
    pub fn foreign_key(mut self, kcu: KeyColumnUsage) -> Self {
        self.key_column_usage.push(kcu);
        self
    }
}

impl SchemaSource for StaticSchema {
    fn load_columns(
        &self,
        cancel: &Cancel,
        tables: &[String],
    ) -> Result<BTreeMap<String, Vec<Column>>, GeneratorError> {
        cancel.check()?;
        if tables.is_empty() {
            return Ok(self.tables.clone());
        }
        let mut out = BTreeMap::new();
        for name in tables {
            let columns = self
                .tables
                .get(name)
                .ok_or_else(|| GeneratorError::TableNotFound {
                    table: name.clone(),
                })?;
            out.insert(name.clone(), columns.clone());
        }
        Ok(out)
    }

    fn load_key_column_usage(
        &self,
        cancel: &Cancel,
        tables: &[String],
    ) -> Result<Vec<KeyColumnUsage>, GeneratorError> {
        cancel.check()?;
        let mut rows: Vec<KeyColumnUsage> = self
            .key_column_usage
            .iter()
            .filter(|k| {
                tables.is_empty()
                    || tables.contains(&k.table_name)
                    || tables.contains(&k.referenced_table_name)
            })
            .cloned()
            .collect();
        rows.sort();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_predicates() {
        let id = Column::new("config_id", "int")
            .column_type("int(10) unsigned")
            .primary()
            .auto_increment();
        assert!(id.is_primary());
        assert!(id.is_unsigned());
        assert!(id.is_auto_increment());
        assert!(!id.is_bool());

        assert!(Column::new("is_active", "tinyint").is_bool());
        assert!(Column::new("flag", "tinyint").column_type("tinyint(1)").is_bool());
        assert!(Column::new("flag", "bit").column_type("bit(1)").is_bool());
        assert!(!Column::new("flags", "bit").column_type("bit(8)").is_bool());
    }

    #[test]
    fn test_money_detection() {
        assert!(Column::new("base_price", "decimal").is_money());
        assert!(Column::new("weight", "decimal").precision(12, 4).is_money());
        assert!(Column::new("grand_total", "double").is_money());
        assert!(!Column::new("weight", "float").is_money());
        assert!(!Column::new("price_label", "varchar").is_money());
    }

    #[test]
    fn test_max_len_falls_back_to_precision() {
        assert_eq!(Column::new("path", "varchar").max_length(255).max_len(), 255);
        assert_eq!(Column::new("qty", "decimal").precision(12, 4).max_len(), 12);
        assert_eq!(Column::new("id", "int").max_len(), 0);
    }

    #[test]
    fn test_static_schema_filters() {
        let schema = StaticSchema::default()
            .table("a", vec![Column::new("id", "int")])
            .table("b", vec![Column::new("a_id", "int")])
            .table("c", vec![Column::new("id", "int")])
            .foreign_key(KeyColumnUsage::new("b", "a_id", "a", "id"));
        let cancel = Cancel::new();

        let cols = schema.load_columns(&cancel, &["a".to_string()]).unwrap();
        assert_eq!(cols.keys().collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(schema.load_columns(&cancel, &[]).unwrap().len(), 3);

        let err = schema.load_columns(&cancel, &["zz".to_string()]).unwrap_err();
        assert!(err.is_not_found());

        assert_eq!(
            schema
                .load_key_column_usage(&cancel, &["a".to_string()])
                .unwrap()
                .len(),
            1
        );
        assert!(schema
            .load_key_column_usage(&cancel, &["c".to_string()])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_static_schema_cancelled() {
        let cancel = Cancel::new();
        cancel.cancel();
        let err = StaticSchema::default()
            .load_columns(&cancel, &[])
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_column_key_from_json() {
        let col: Column =
            serde_json::from_str(r#"{"field":"email","data_type":"varchar","key":"UNI"}"#)
                .unwrap();
        assert!(col.is_unique());
        assert!(!col.null);
    }
}
