//! Generator orchestration
//!
//! A [`Generator`] is built once per run from a list of [`Opt`]s and then
//! walked read-only. Tables are always visited in lexical order so that the
//! output is byte for byte reproducible.

use crate::codegen::column::{field_specs, FieldSpec};
use crate::codegen::emitter::{
    format_source, imports_for, with_header, Emitter, CANDIDATE_IMPORTS,
};
use crate::codegen::{collection, dbm, entity, test_code};
use crate::feature::Feature;
use crate::options::Opt;
use crate::relation::KeyUsage;
use crate::serializer::{self, SchemaFile, Serializer};
use crate::table::Table;
use crate::types::TypeMapper;
use crate::GeneratorError;
use std::collections::{BTreeMap, HashMap};

/// Custom code marker at the end of the main output
pub const MARKER_MAIN: &str = "main";
/// Custom code marker at the end of the test output
pub const MARKER_TEST: &str = "test";

/// The two generated sources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedCode {
    /// Entities, collections and database glue
    pub main: String,
    /// Unit tests for `main`, to be placed in a child module of it
    pub test: String,
}

/// The root of a generation run
#[derive(Debug, Default)]
pub struct Generator {
    package: String,
    pub(crate) tables: HashMap<String, Table>,
    pub(crate) serializer: Serializer,
    pub(crate) build_tags: Vec<String>,
    pub(crate) custom_code: BTreeMap<String, String>,
    pub(crate) key_usage: KeyUsage,
}

impl Generator {
    /// Build a generator by applying `opts` in priority order
    ///
    /// Options with the same priority keep the order they were passed in.
    pub fn new(package: impl Into<String>, mut opts: Vec<Opt>) -> Result<Self, GeneratorError> {
        opts.sort_by_key(Opt::priority);
        let mut g = Generator {
            package: package.into(),
            ..Default::default()
        };
        for opt in opts {
            opt.apply(&mut g)?;
        }
        tracing::debug!(
            package = %g.package,
            tables = g.tables.len(),
            serializer = %g.serializer,
            "generator configured"
        );
        Ok(g)
    }

    /// Package name, used for the module doc and schema package
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Look up a table
    pub fn table(&self, name: &str) -> Result<&Table, GeneratorError> {
        self.tables
            .get(name)
            .ok_or_else(|| GeneratorError::TableNotFound {
                table: name.to_string(),
            })
    }

    /// Table names in lexical order
    pub fn sorted_table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Tables in lexical order of their names
    pub fn sorted_tables(&self) -> Vec<&Table> {
        let mut tables: Vec<&Table> = self.tables.values().collect();
        tables.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        tables
    }

    /// The chosen serializer
    pub fn serializer(&self) -> Serializer {
        self.serializer
    }

    /// Type mapper honouring the serializer's integer widths
    pub fn type_mapper(&self) -> TypeMapper {
        TypeMapper::new(self.serializer)
    }

    /// Build tag lines written below the header
    pub fn build_tags(&self) -> &[String] {
        &self.build_tags
    }

    /// Custom code registered for a marker
    pub fn custom_code(&self, marker: &str) -> Option<&str> {
        self.custom_code.get(marker).map(String::as_str)
    }

    /// Foreign keys loaded by relationship resolution
    pub fn key_usage(&self) -> &KeyUsage {
        &self.key_usage
    }

    fn emit_custom(&self, e: &mut Emitter, marker: &str) {
        if let Some(code) = self.custom_code(marker) {
            e.raw(code);
        }
    }

    /// Generate the main and the test source
    ///
    /// Structs of all tables are written first, then the methods. Imports
    /// are derived from the identifiers the body actually uses.
    pub fn generate_code(&self) -> Result<GeneratedCode, GeneratorError> {
        let mapper = self.type_mapper();
        let tables = self.sorted_tables();
        let specs: Vec<Vec<FieldSpec<'_>>> = tables
            .iter()
            .map(|t| field_specs(t, &mapper).map_err(|e| e.in_table(&t.name)))
            .collect::<Result<_, _>>()?;

        let mut body = Emitter::new();
        let names: Vec<(String, &str)> = tables
            .iter()
            .filter(|t| t.has(Feature::DB))
            .map(|t| (dbm::table_const_name(&t.name), t.name.as_str()))
            .collect();
        body.const_block(
            "Names of the tables.",
            names.iter().map(|(c, n)| (c.as_str(), *n)),
        );

        // First pass: every struct exists before any method refers to it
        for (t, specs) in tables.iter().zip(&specs) {
            if !t.has(Feature::EntityStruct) {
                tracing::debug!(table = %t.name, "entity excluded");
                continue;
            }
            body.tokens(entity::struct_def(t, specs, &self.tables));
            if collection::is_generated(t) {
                body.tokens(collection::struct_def(t));
            }
        }

        let mut tests = Emitter::new();
        for (t, specs) in tables.iter().zip(&specs) {
            if !t.has(Feature::EntityStruct) {
                continue;
            }
            body.tokens(entity::methods(t, specs));
            if t.has(Feature::DB) {
                body.tokens(dbm::entity_items(t, specs));
                if t.has(Feature::DBMapColumns) {
                    body.tokens(dbm::entity_mapper(t, specs));
                }
            }
            self.emit_custom(&mut body, &t.entity_name());

            if collection::is_generated(t) {
                body.tokens(collection::methods(t, specs));
                if t.has(Feature::DB) {
                    body.tokens(dbm::collection_items(t, specs));
                    if t.has(Feature::DBMapColumns) {
                        body.tokens(dbm::collection_mapper(t, specs));
                    }
                }
                self.emit_custom(&mut body, &t.collection_name());
            }

            tests.tokens(test_code::entity_test(t));
            tests.tokens(test_code::collection_test(t, specs));
        }
        self.emit_custom(&mut body, MARKER_MAIN);
        self.emit_custom(&mut tests, MARKER_TEST);

        let main = self.assemble(body.finish(), true)?;
        let test = self.assemble(tests.finish(), false)?;
        tracing::info!(
            package = %self.package,
            tables = tables.len(),
            main_bytes = main.len(),
            test_bytes = test.len(),
            "generated code"
        );
        Ok(GeneratedCode { main, test })
    }

    fn assemble(&self, body: String, main: bool) -> Result<String, GeneratorError> {
        let mut e = Emitter::new();
        if main {
            e.module_doc(&format!(
                "Entities and collections of package {}.",
                self.package
            ));
            e.pln("");
        } else {
            e.pln("use super::*;");
        }
        for import in imports_for(&body, CANDIDATE_IMPORTS) {
            e.pln(import);
        }
        e.pln("");
        e.raw(&body);
        let formatted = format_source(e.finish())?;
        Ok(with_header(&formatted, &self.build_tags))
    }

    /// Generate the schema file of the chosen serializer
    ///
    /// Returns `None` without a serializer.
    pub fn generate_serializer(&self) -> Result<Option<SchemaFile>, GeneratorError> {
        let tables: Vec<&Table> = self
            .sorted_tables()
            .into_iter()
            .filter(|t| t.has(Feature::EntityStruct))
            .collect();
        serializer::schema_file(self.serializer, &self.package, &tables, &self.type_mapper())
    }
}
