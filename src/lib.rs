//! dmlgen library
//!
//! This crate generates Rust entity code from MySQL table metadata: one
//! entity struct per table row, a collection struct with bulk operations,
//! database mapping glue against `dml::ColumnMap`, generated unit tests and
//! optional protobuf or flatbuffers schemas.
//!
//! ```no_run
//! use dmlgen::generator::Generator;
//! use dmlgen::options::Opt;
//! use dmlgen::schema::Column;
//!
//! let g = Generator::new(
//!     "store",
//!     vec![Opt::table(
//!         "store_website",
//!         vec![Column::new("website_id", "smallint").primary().auto_increment()],
//!     )],
//! )?;
//! let code = g.generate_code()?;
//! println!("{}", code.main);
//! # Ok::<(), dmlgen::GeneratorError>(())
//! ```

#![deny(warnings)]
#![deny(missing_docs)]

pub mod cancel;
pub mod codegen;
pub mod feature;
pub mod generator;
pub mod naming;
pub mod options;
pub mod protoc;
pub mod relation;
pub mod request;
pub mod schema;
pub mod serializer;
pub mod table;
pub mod types;

use codegen::emitter::FormatError;
use request::{GenerateRequest, GenerateResponse};
use thiserror::Error;

/// Errors that can occur during code generation
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// A table is neither loaded nor defined
    #[error("table {table:?} not found")]
    TableNotFound {
        /// Table name
        table: String,
    },

    /// A configuration names a column the table does not have
    #[error("column {column:?} not found in table {table:?}")]
    ColumnNotFound {
        /// Table name
        table: String,
        /// Column name
        column: String,
    },

    /// The data type of a column has no Rust mapping
    #[error("type {data_type:?} of column {column:?} not found")]
    TypeNotFound {
        /// Column name
        column: String,
        /// Declared data type
        data_type: String,
    },

    /// No `.proto` files below the directory
    #[error("no .proto files found in {dir}")]
    ProtoFilesNotFound {
        /// Searched directory
        dir: String,
    },

    /// Unsupported encoder, struct tag kind or serializer
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A configuration is valid in shape but not allowed for the column
    #[error("not allowed: {0}")]
    NotAllowed(String),

    /// The emitted code did not parse
    #[error(transparent)]
    Format(#[from] FormatError),

    /// `protoc` failed or printed anything but warnings
    #[error("protoc failed: {command}\n{output}")]
    Protoc {
        /// Full command line
        command: String,
        /// Captured stdout and stderr
        output: String,
    },

    /// The generated serialization schema is invalid
    #[error("invalid schema: {0}")]
    Schema(String),

    /// Invalid request or configuration input
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to decode the request
    #[error("decode error: {0}")]
    DecodeError(String),

    /// The run was cancelled
    #[error("generation cancelled")]
    Cancelled,

    /// Context: the table being processed
    #[error("table {table}: {source}")]
    InTable {
        /// Table name
        table: String,
        /// Underlying error
        source: Box<GeneratorError>,
    },

    /// Context: the option being applied
    #[error("option {option}: {source}")]
    InOption {
        /// Option name
        option: &'static str,
        /// Underlying error
        source: Box<GeneratorError>,
    },

    /// File system or process error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeneratorError {
    /// Add the table being processed as context
    ///
    /// Errors that already name the table are returned unchanged.
    pub fn in_table(self, table: &str) -> Self {
        match &self {
            GeneratorError::TableNotFound { table: t }
            | GeneratorError::ColumnNotFound { table: t, .. }
            | GeneratorError::InTable { table: t, .. }
                if t == table =>
            {
                self
            }
            _ => GeneratorError::InTable {
                table: table.to_string(),
                source: Box::new(self),
            },
        }
    }

    /// The error without context wrappers
    pub fn root(&self) -> &GeneratorError {
        match self {
            GeneratorError::InTable { source, .. } | GeneratorError::InOption { source, .. } => {
                source.root()
            }
            other => other,
        }
    }

    /// A table, column, type or file was not found
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            GeneratorError::TableNotFound { .. }
                | GeneratorError::ColumnNotFound { .. }
                | GeneratorError::TypeNotFound { .. }
                | GeneratorError::ProtoFilesNotFound { .. }
        )
    }

    /// Something requested is not supported
    pub fn is_not_supported(&self) -> bool {
        matches!(self.root(), GeneratorError::NotSupported(_))
    }

    /// A configuration is not allowed for its target
    pub fn is_not_allowed(&self) -> bool {
        matches!(self.root(), GeneratorError::NotAllowed(_))
    }

    /// The run was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), GeneratorError::Cancelled)
    }
}

/// Generate code from a request
///
/// This is the main entry point of the binary.
pub fn generate(request: GenerateRequest) -> Result<GenerateResponse, GeneratorError> {
    request::generate(request)
}

/// Generate code from a JSON encoded [`GenerateRequest`]
pub fn generate_from_bytes(bytes: &[u8]) -> Result<GenerateResponse, GeneratorError> {
    let request: GenerateRequest =
        serde_json::from_slice(bytes).map_err(|e| GeneratorError::DecodeError(e.to_string()))?;
    generate(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_predicates_look_through_context() {
        let err = GeneratorError::ColumnNotFound {
            table: "core_config_data".to_string(),
            column: "nope".to_string(),
        };
        let wrapped = GeneratorError::InOption {
            option: "table_config",
            source: Box::new(err.in_table("core_config_data")),
        };
        assert!(wrapped.is_not_found());
        assert!(!wrapped.is_not_supported());
        assert_eq!(
            wrapped.to_string(),
            "option table_config: column \"nope\" not found in table \"core_config_data\""
        );

        let other = GeneratorError::NotAllowed("x".to_string()).in_table("t");
        assert_eq!(other.to_string(), "table t: not allowed: x");
        assert!(other.is_not_allowed());
        assert!(GeneratorError::Cancelled.in_table("t").is_cancelled());
    }

    #[test]
    fn test_decode_error() {
        let err = generate_from_bytes(b"{not json").unwrap_err();
        assert!(matches!(err, GeneratorError::DecodeError(_)));
    }
}
