//! JSON request protocol of the `dmlgen` binary
//!
//! A [`GenerateRequest`] carries the table metadata and every option the
//! library accepts as plain data. The binary reads one from stdin and writes
//! the [`GenerateResponse`] to stdout, the same shape a protoc plugin uses.

use crate::cancel::Cancel;
use crate::generator::Generator;
use crate::options::{Opt, TableConfig};
use crate::schema::StaticSchema;
use crate::serializer::Serializer;
use crate::GeneratorError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Relationship filters as flat `"table.column", "ref_table.ref_column"`
/// pair lists
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelationshipRequest {
    /// Edges to keep; empty keeps everything not excluded
    pub include: Vec<String>,
    /// Edges to drop
    pub exclude: Vec<String>,
}

/// Everything needed for one generation run
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    /// Package name, also the base name of the output files
    pub package: String,
    /// Table metadata and foreign keys
    pub schema: StaticSchema,
    /// Tables to generate, empty means all tables of `schema`
    pub tables: Vec<String>,
    /// Serialization schema to produce
    pub serializer: Serializer,
    /// Lines written below the header of every output
    pub build_tags: Vec<String>,
    /// Configuration applied to every table
    pub table_config_default: Option<TableConfig>,
    /// Configuration per table
    pub table_configs: BTreeMap<String, TableConfig>,
    /// Code inserted at markers, see [`Opt::custom_code`]
    pub custom_code: BTreeMap<String, String>,
    /// Add `ref_table.ref_column` aliases to foreign key columns
    pub column_aliases_from_foreign_keys: bool,
    /// Resolve relationship fields, absent means no relationships
    pub relationships: Option<RelationshipRequest>,
}

/// One output file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseFile {
    /// File name relative to the output directory
    pub name: String,
    /// File content
    pub content: String,
}

/// The result of a run; either `files` or `error` is set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerateResponse {
    /// Generated files
    pub files: Vec<ResponseFile>,
    /// Error message of a failed run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateResponse {
    /// A response carrying only an error
    pub fn from_error(err: &GeneratorError) -> Self {
        GenerateResponse {
            files: Vec::new(),
            error: Some(err.to_string()),
        }
    }
}

fn balanced(what: &str, list: &[String]) -> Result<(), GeneratorError> {
    if list.len() % 2 == 1 {
        return Err(GeneratorError::InvalidConfig(format!(
            "{} must be a list of pairs, got {} entries",
            what,
            list.len()
        )));
    }
    Ok(())
}

impl GenerateRequest {
    /// Reject input that would make an option constructor panic
    pub fn validate(&self) -> Result<(), GeneratorError> {
        if self.package.is_empty() {
            return Err(GeneratorError::InvalidConfig(
                "package must not be empty".to_string(),
            ));
        }
        if let Some(cfg) = &self.table_config_default {
            if cfg.has_column_settings() {
                return Err(GeneratorError::InvalidConfig(
                    "table_config_default must not contain column settings".to_string(),
                ));
            }
        }
        for (table, cfg) in &self.table_configs {
            balanced(
                &format!("custom_struct_tags of table {}", table),
                &cfg.custom_struct_tags,
            )?;
        }
        if let Some(rel) = &self.relationships {
            balanced("relationships.include", &rel.include)?;
            balanced("relationships.exclude", &rel.exclude)?;
        }
        Ok(())
    }

    /// The options describing this request
    pub fn into_opts(self, cancel: &Cancel) -> Result<(String, Vec<Opt>), GeneratorError> {
        self.validate()?;
        let source = Arc::new(self.schema);
        let mut opts = vec![
            Opt::tables_from_schema(source.clone(), cancel.clone(), self.tables),
            Opt::serializer(self.serializer),
        ];
        if !self.build_tags.is_empty() {
            opts.push(Opt::build_tags(self.build_tags));
        }
        for (marker, code) in self.custom_code {
            opts.push(Opt::custom_code(marker, code));
        }
        if let Some(cfg) = self.table_config_default {
            opts.push(Opt::table_config_default(cfg));
        }
        for (table, cfg) in self.table_configs {
            opts.push(Opt::table_config(table, cfg));
        }
        if self.column_aliases_from_foreign_keys {
            opts.push(Opt::column_aliases_from_foreign_keys(
                source.clone(),
                cancel.clone(),
            ));
        }
        if let Some(rel) = self.relationships {
            opts.push(Opt::foreign_key_relationships(
                source,
                cancel.clone(),
                rel.include.as_slice(),
                rel.exclude.as_slice(),
            ));
        }
        Ok((self.package, opts))
    }
}

/// Run a request: `<package>.rs`, `<package>_test.rs` and the schema file
pub fn generate(request: GenerateRequest) -> Result<GenerateResponse, GeneratorError> {
    let (package, opts) = request.into_opts(&Cancel::new())?;
    let g = Generator::new(package, opts)?;
    let code = g.generate_code()?;

    let mut files = vec![
        ResponseFile {
            name: format!("{}.rs", g.package()),
            content: code.main,
        },
        ResponseFile {
            name: format!("{}_test.rs", g.package()),
            content: code.test,
        },
    ];
    if let Some(schema) = g.generate_serializer()? {
        files.push(ResponseFile {
            name: schema.name,
            content: schema.content,
        });
    }
    Ok(GenerateResponse { files, error: None })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> GenerateRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_odd_pairs_are_invalid_config() {
        let req = request(
            r#"{
                "package": "store",
                "table_configs": {"store": {"custom_struct_tags": ["code"]}}
            }"#,
        );
        assert!(matches!(
            req.validate().unwrap_err(),
            GeneratorError::InvalidConfig(_)
        ));

        let req = request(r#"{"package": "store", "relationships": {"include": ["a.b.c.d"]}}"#);
        assert!(matches!(
            req.validate().unwrap_err(),
            GeneratorError::InvalidConfig(_)
        ));
    }

    #[test]
    fn test_default_config_with_columns_is_invalid() {
        let req = request(
            r#"{"package": "store", "table_config_default": {"private_fields": ["x"]}}"#,
        );
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_generate_file_names() {
        let req = request(
            r#"{
                "package": "store",
                "serializer": "protobuf",
                "schema": {"tables": {"store": [
                    {"field": "store_id", "data_type": "smallint", "column_type": "smallint(5) unsigned", "key": "PRI", "extra": "auto_increment"},
                    {"field": "code", "data_type": "varchar", "null": true}
                ]}}
            }"#,
        );
        let resp = generate(req).unwrap();
        let names: Vec<_> = resp.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["store.rs", "store_test.rs", "store.proto"]);
        assert!(resp.files[0].content.contains("pub struct Store {"));
        assert!(resp.error.is_none());
    }
}
