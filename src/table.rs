//! In-memory model of one database table

use crate::feature::{self, Feature, FeatureSet, Mode};
use crate::naming;
use crate::relation::Relationship;
use crate::schema::Column;
use crate::types::TypeMapper;
use crate::GeneratorError;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Whether a table has an auto increment column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutoIncrement {
    /// No columns loaded yet
    #[default]
    Unknown,
    /// View, or no auto increment column
    No,
    /// One column is auto increment
    Yes,
}

/// Serialization support added to generated entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Encoder {
    /// Derive `serde::Serialize` and `serde::Deserialize`
    Serde,
    /// Serde derives plus `to_json` helpers
    Json,
}

impl Encoder {
    /// Parse an encoder name
    pub fn from_name(name: &str) -> Result<Encoder, GeneratorError> {
        match name {
            "serde" => Ok(Encoder::Serde),
            "json" => Ok(Encoder::Json),
            other => Err(GeneratorError::NotSupported(format!(
                "encoder {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoder::Serde => f.write_str("serde"),
            Encoder::Json => f.write_str("json"),
        }
    }
}

/// One table and everything the generator knows about it
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Comment emitted above the entity
    pub comment: String,
    /// Columns in ordinal order
    pub columns: Vec<Column>,
    /// Views get no write statements and never auto increment
    pub is_view: bool,
    pub(crate) features_include: FeatureSet,
    pub(crate) features_exclude: FeatureSet,
    pub(crate) encoders: BTreeSet<Encoder>,
    pub(crate) private_fields: BTreeSet<String>,
    pub(crate) custom_struct_tags: BTreeMap<String, String>,
    pub(crate) relationships: Vec<Relationship>,
}

impl Table {
    /// Create a table from its columns
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Table {
            name: name.into(),
            columns,
            ..Default::default()
        }
    }

    /// Name of the generated entity struct
    pub fn entity_name(&self) -> String {
        naming::entity_name(&self.name)
    }

    /// Name of the generated collection struct
    pub fn collection_name(&self) -> String {
        naming::collection_name(&self.name)
    }

    /// Whether the requested feature(s) should be emitted for this table
    pub fn has_feature(&self, requested: impl Into<FeatureSet>, mode: Mode) -> bool {
        feature::has(
            self.features_include,
            self.features_exclude,
            requested,
            mode,
        )
    }

    /// Shorthand for a single feature
    pub fn has(&self, f: Feature) -> bool {
        self.has_feature(f, Mode::Or)
    }

    /// Shorthand for requiring all of the given features
    pub fn has_all(&self, features: impl Into<FeatureSet>) -> bool {
        self.has_feature(features, Mode::And)
    }

    /// Included features
    pub fn features_include(&self) -> FeatureSet {
        self.features_include
    }

    /// Excluded features
    pub fn features_exclude(&self) -> FeatureSet {
        self.features_exclude
    }

    /// Configured encoders
    pub fn encoders(&self) -> impl Iterator<Item = Encoder> + '_ {
        self.encoders.iter().copied()
    }

    /// Whether any serde based encoder is configured
    pub fn has_serde(&self) -> bool {
        !self.encoders.is_empty()
    }

    /// Whether the field is generated private with accessors
    pub fn is_private(&self, column: &str) -> bool {
        self.private_fields.contains(column)
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.field == name)
    }

    pub(crate) fn column_mut(&mut self, name: &str) -> Result<&mut Column, GeneratorError> {
        let table = self.name.clone();
        self.columns
            .iter_mut()
            .find(|c| c.field == name)
            .ok_or(GeneratorError::ColumnNotFound {
                table,
                column: name.to_string(),
            })
    }

    /// Primary key columns
    pub fn primary_keys(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_primary())
    }

    /// Columns whose values are unique per row: a single column primary key
    /// or a unique index
    pub fn unique_columns(&self) -> impl Iterator<Item = &Column> {
        let single_pk = self.primary_keys().count() == 1;
        self.columns
            .iter()
            .filter(move |c| c.is_unique() || (single_pk && c.is_primary()))
    }

    /// Whether a column identifies a single row on its own
    pub fn is_unique_column(&self, name: &str) -> bool {
        self.unique_columns().any(|c| c.field == name)
    }

    /// Columns marked uniquified
    pub fn uniquified_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.uniquified)
    }

    /// Columns that are not part of the primary key
    pub fn non_primary_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.is_primary())
    }

    /// Auto increment status
    pub fn auto_increment(&self) -> AutoIncrement {
        if self.is_view {
            return AutoIncrement::No;
        }
        if self.columns.is_empty() {
            return AutoIncrement::Unknown;
        }
        if self.columns.iter().any(|c| c.is_auto_increment()) {
            AutoIncrement::Yes
        } else {
            AutoIncrement::No
        }
    }

    /// The auto increment column, if any
    pub fn auto_increment_column(&self) -> Option<&Column> {
        if self.auto_increment() != AutoIncrement::Yes {
            return None;
        }
        self.columns.iter().find(|c| c.is_auto_increment())
    }

    /// Resolved relationships
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Assemble the struct tag of every column from the requested kinds, then
    /// apply custom tags on top.
    pub(crate) fn apply_struct_tags(
        &mut self,
        kinds: &[String],
        mapper: &TypeMapper,
    ) -> Result<(), GeneratorError> {
        for (idx, col) in self.columns.iter_mut().enumerate() {
            let mut fragments = Vec::with_capacity(kinds.len());
            for kind in kinds {
                if let Some(fragment) = struct_tag_fragment(kind, col, idx + 1, mapper)? {
                    fragments.push(fragment);
                }
            }
            col.struct_tag = fragments.join(" ");
        }
        self.apply_custom_struct_tags();
        Ok(())
    }

    pub(crate) fn apply_custom_struct_tags(&mut self) {
        for col in self.columns.iter_mut() {
            if let Some(tag) = self.custom_struct_tags.get(&col.field) {
                col.struct_tag = tag.clone();
            }
        }
    }
}

/// Build one tag fragment for a column
///
/// `pos` is the 1-based position used as protobuf field number. Returns
/// `None` when the kind has nothing to say about the column.
pub fn struct_tag_fragment(
    kind: &str,
    col: &Column,
    pos: usize,
    mapper: &TypeMapper,
) -> Result<Option<String>, GeneratorError> {
    let field = &col.field;
    let fragment = match kind {
        "bson" => format!("bson:\"{},omitempty\"", field),
        "db" => format!("db:\"{}\"", field),
        "env" => format!("env:\"{}\"", field),
        "json" => format!("json:\"{},omitempty\"", field),
        "toml" => format!("toml:\"{}\"", field),
        "yaml" => format!("yaml:\"{},omitempty\"", field),
        "xml" => format!("xml:\"{},omitempty\"", field),
        "max_len" => match col.max_len() {
            0 => return Ok(None),
            l => format!("max_len:\"{}\"", l),
        },
        "protobuf" => {
            let ty = mapper.rust_type(col, true)?;
            format!(
                "protobuf:\"{},{},opt,name={},proto3\"",
                protobuf_wire_type(&ty),
                pos,
                field
            )
        }
        other => {
            return Err(GeneratorError::NotSupported(format!(
                "struct tag kind {:?}",
                other
            )))
        }
    };
    Ok(Some(fragment))
}

fn protobuf_wire_type(ty: &str) -> &'static str {
    match crate::types::split_option(ty).0 {
        "u8" | "u16" | "u32" | "u64" | "i8" | "i16" | "i32" | "i64" | "bool" => "varint",
        "f32" => "fixed32",
        "f64" => "fixed64",
        _ => "bytes",
    }
}

/// Split a struct tag into `(key, value)` pairs
///
/// `json:"scope_id,omitempty" db:"scope_id"` yields
/// `[("json", "scope_id,omitempty"), ("db", "scope_id")]`.
pub fn parse_struct_tag(tag: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = tag.trim_start();
    while !rest.is_empty() {
        let Some(colon) = rest.find(':') else { break };
        let key = rest[..colon].trim().to_string();
        let after = &rest[colon + 1..];
        let Some(value_part) = after.strip_prefix('"') else {
            break;
        };
        let Some(end) = value_part.find('"') else { break };
        pairs.push((key, value_part[..end].to_string()));
        rest = value_part[end + 1..].trim_start();
    }
    pairs
}

/// Value of one key inside a struct tag
pub fn struct_tag_value(tag: &str, key: &str) -> Option<String> {
    parse_struct_tag(tag)
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}
