//! Serialization schema files for the generated entities
//!
//! The protobuf schema is assembled as a [`FileDescriptorProto`], checked by
//! building a [`DescriptorPool`] from it, and rendered back to `.proto` text
//! from the validated pool. The encoded descriptor set travels along so that
//! callers can feed it to `prost-build` without running `protoc` again.

use crate::codegen::emitter::{wrap_comment, Emitter, GENERATED_HEADER};
use crate::codegen::column::{field_specs, FieldSpec};
use crate::table::Table;
use crate::types::{split_option, TypeMapper};
use crate::GeneratorError;
use prost::Message;
use prost_reflect::{DescriptorPool, Kind};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet,
    OneofDescriptorProto,
};
use serde::Deserialize;
use std::fmt;

/// Serialization format of the generated entities
///
/// The choice is global because it decides the narrowest integer width of
/// every column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Serializer {
    /// No schema file
    #[default]
    None,
    /// proto3 schema, small integers widen to 32 bit
    Protobuf,
    /// flatbuffers schema
    Flatbuffers,
}

impl Serializer {
    /// Parse a serializer name, the empty string means none
    pub fn from_name(name: &str) -> Result<Serializer, GeneratorError> {
        match name {
            "" | "none" => Ok(Serializer::None),
            "protobuf" | "proto" => Ok(Serializer::Protobuf),
            "flatbuffers" | "fbs" => Ok(Serializer::Flatbuffers),
            other => Err(GeneratorError::NotSupported(format!(
                "serializer {:?}",
                other
            ))),
        }
    }

    /// Narrowest integer width the format can carry
    pub fn min_int_bits(self) -> u8 {
        match self {
            Serializer::Protobuf => 32,
            Serializer::None | Serializer::Flatbuffers => 8,
        }
    }

    /// File extension of the schema file
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Serializer::None => None,
            Serializer::Protobuf => Some("proto"),
            Serializer::Flatbuffers => Some("fbs"),
        }
    }
}

impl fmt::Display for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Serializer::None => f.write_str("none"),
            Serializer::Protobuf => f.write_str("protobuf"),
            Serializer::Flatbuffers => f.write_str("flatbuffers"),
        }
    }
}

/// A generated schema file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFile {
    /// File name, `<package>.proto` or `<package>.fbs`
    pub name: String,
    /// Schema text
    pub content: String,
    /// Encoded `FileDescriptorSet`, protobuf only
    pub descriptor_set: Option<Vec<u8>>,
}

/// Build the schema file for `tables` in the given format
pub fn schema_file(
    serializer: Serializer,
    package: &str,
    tables: &[&Table],
    mapper: &TypeMapper,
) -> Result<Option<SchemaFile>, GeneratorError> {
    match serializer {
        Serializer::None => Ok(None),
        Serializer::Protobuf => protobuf_schema(package, tables, mapper).map(Some),
        Serializer::Flatbuffers => flatbuffers_schema(package, tables, mapper).map(Some),
    }
}

/// proto3 scalar type of a Rust type; time and decimal values travel as text
fn proto_type(rust_type: &str) -> Type {
    match split_option(rust_type).0 {
        "u8" | "u16" | "u32" => Type::Uint32,
        "u64" => Type::Uint64,
        "i8" | "i16" | "i32" => Type::Int32,
        "i64" => Type::Int64,
        "f32" => Type::Float,
        "f64" => Type::Double,
        "bool" => Type::Bool,
        "Vec<u8>" => Type::Bytes,
        _ => Type::String,
    }
}

fn proto_field(
    spec: &FieldSpec<'_>,
    number: i32,
    oneofs: &mut Vec<OneofDescriptorProto>,
) -> FieldDescriptorProto {
    let name = spec.column.field.clone();
    let mut field = FieldDescriptorProto {
        name: Some(name.clone()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(proto_type(&spec.rust_type) as i32),
        json_name: Some(name.clone()),
        ..Default::default()
    };
    if spec.is_option() {
        field.oneof_index = Some(oneofs.len() as i32);
        field.proto3_optional = Some(true);
        oneofs.push(OneofDescriptorProto {
            name: Some(format!("_{}", name)),
            ..Default::default()
        });
    }
    field
}

/// Assemble the descriptor of the protobuf schema
pub fn file_descriptor(
    package: &str,
    tables: &[&Table],
    mapper: &TypeMapper,
) -> Result<FileDescriptorProto, GeneratorError> {
    let mut messages = Vec::with_capacity(tables.len() * 2);
    for t in tables {
        let specs = field_specs(t, mapper).map_err(|e| e.in_table(&t.name))?;
        let mut oneofs = Vec::new();
        let fields = specs
            .iter()
            .enumerate()
            .map(|(idx, spec)| proto_field(spec, idx as i32 + 1, &mut oneofs))
            .collect();
        let entity = t.entity_name();
        messages.push(DescriptorProto {
            name: Some(entity.clone()),
            field: fields,
            oneof_decl: oneofs,
            ..Default::default()
        });
        messages.push(DescriptorProto {
            name: Some(t.collection_name()),
            field: vec![FieldDescriptorProto {
                name: Some("data".to_string()),
                number: Some(1),
                label: Some(Label::Repeated as i32),
                r#type: Some(Type::Message as i32),
                type_name: Some(format!(".{}.{}", package, entity)),
                json_name: Some("data".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        });
    }
    Ok(FileDescriptorProto {
        name: Some(format!("{}.proto", package)),
        package: Some(package.to_string()),
        message_type: messages,
        syntax: Some("proto3".to_string()),
        ..Default::default()
    })
}

fn kind_name(kind: &Kind) -> String {
    match kind {
        Kind::Double => "double".to_string(),
        Kind::Float => "float".to_string(),
        Kind::Int32 => "int32".to_string(),
        Kind::Int64 => "int64".to_string(),
        Kind::Uint32 => "uint32".to_string(),
        Kind::Uint64 => "uint64".to_string(),
        Kind::Sint32 => "sint32".to_string(),
        Kind::Sint64 => "sint64".to_string(),
        Kind::Fixed32 => "fixed32".to_string(),
        Kind::Fixed64 => "fixed64".to_string(),
        Kind::Sfixed32 => "sfixed32".to_string(),
        Kind::Sfixed64 => "sfixed64".to_string(),
        Kind::Bool => "bool".to_string(),
        Kind::String => "string".to_string(),
        Kind::Bytes => "bytes".to_string(),
        Kind::Message(m) => m.name().to_string(),
        Kind::Enum(e) => e.name().to_string(),
    }
}

/// The `.proto` schema of `tables`
pub fn protobuf_schema(
    package: &str,
    tables: &[&Table],
    mapper: &TypeMapper,
) -> Result<SchemaFile, GeneratorError> {
    let file = file_descriptor(package, tables, mapper)?;
    let name = file.name().to_string();
    let set = FileDescriptorSet { file: vec![file] };
    let pool = DescriptorPool::from_file_descriptor_set(set.clone())
        .map_err(|e| GeneratorError::Schema(e.to_string()))?;
    let descriptor = pool
        .get_file_by_name(&name)
        .ok_or_else(|| GeneratorError::Schema(format!("file {} missing from pool", name)))?;

    let mut e = Emitter::new();
    e.pln(GENERATED_HEADER);
    e.pln("");
    e.pln("syntax = \"proto3\";");
    e.pln(format!("package {};", package));

    for message in descriptor.messages() {
        e.pln("");
        if let Some(t) = tables.iter().find(|t| t.entity_name() == message.name()) {
            let text = format!(
                "{} represents a single row for DB table {}. {}",
                message.name(),
                t.name,
                t.comment
            );
            for line in wrap_comment(text.trim(), 76) {
                e.pln(format!("// {}", line));
            }
        }
        e.pln(format!("message {} {{", message.name()));
        e.indent();
        for field in message.fields() {
            let label = if field.is_list() {
                "repeated "
            } else if field.field_descriptor_proto().proto3_optional() {
                "optional "
            } else {
                ""
            };
            e.pln(format!(
                "{}{} {} = {};",
                label,
                kind_name(&field.kind()),
                field.name(),
                field.number()
            ));
        }
        e.dedent();
        e.pln("}");
    }

    tracing::info!(file = %name, messages = tables.len() * 2, "generated protobuf schema");
    Ok(SchemaFile {
        name,
        content: e.finish(),
        descriptor_set: Some(set.encode_to_vec()),
    })
}

fn fbs_type(rust_type: &str) -> &'static str {
    match split_option(rust_type).0 {
        "u8" => "ubyte",
        "i8" => "byte",
        "u16" => "ushort",
        "i16" => "short",
        "u32" => "uint",
        "i32" => "int",
        "u64" => "ulong",
        "i64" => "long",
        "f32" => "float",
        "f64" => "double",
        "bool" => "bool",
        "Vec<u8>" => "[ubyte]",
        _ => "string",
    }
}

/// The `.fbs` schema of `tables`
pub fn flatbuffers_schema(
    package: &str,
    tables: &[&Table],
    mapper: &TypeMapper,
) -> Result<SchemaFile, GeneratorError> {
    let mut e = Emitter::new();
    e.pln(GENERATED_HEADER);
    e.pln("");
    e.pln(format!("namespace {};", package));

    for t in tables {
        let specs = field_specs(t, mapper).map_err(|err| err.in_table(&t.name))?;
        let entity = t.entity_name();
        e.pln("");
        e.pln(format!("table {} {{", entity));
        e.indent();
        for spec in &specs {
            e.pln(format!("{}:{};", spec.column.field, fbs_type(&spec.rust_type)));
        }
        e.dedent();
        e.pln("}");
        e.pln("");
        e.pln(format!("table {} {{", t.collection_name()));
        e.indent();
        e.pln(format!("data:[{}];", entity));
        e.dedent();
        e.pln("}");
    }

    let name = format!("{}.fbs", package);
    tracing::info!(file = %name, tables = tables.len(), "generated flatbuffers schema");
    Ok(SchemaFile {
        name,
        content: e.finish(),
        descriptor_set: None,
    })
}
