//! Mapping of MySQL column types to Rust types
//!
//! Every supported base data type has four variants indexed by signedness
//! and nullability. Nullable columns are wrapped in `Option`, binary columns
//! stay `Vec<u8>` where an empty vector stands for NULL.

use crate::schema::Column;
use crate::serializer::Serializer;
use crate::GeneratorError;
use heck::ToSnakeCase;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Index into a variant row
const UNSIGNED_NULL: usize = 0;
const UNSIGNED: usize = 1;
const SIGNED_NULL: usize = 2;
const SIGNED: usize = 3;

/// Lookup key for boolean shaped columns
const BOOL_KEY: &str = "bool";
/// Lookup key for monetary columns
const MONEY_KEY: &str = "money";

/// Base data type -> `[unsigned null, unsigned, signed null, signed]`
static SQL_TYPES: Lazy<HashMap<&'static str, [&'static str; 4]>> = Lazy::new(|| {
    let mut m = HashMap::new();
    let mut add = |keys: &[&'static str], variants: [&'static str; 4]| {
        for k in keys {
            m.insert(*k, variants);
        }
    };
    add(&["tinyint"], ["Option<u8>", "u8", "Option<i8>", "i8"]);
    add(&["smallint"], ["Option<u16>", "u16", "Option<i16>", "i16"]);
    add(
        &["mediumint", "int", "integer"],
        ["Option<u32>", "u32", "Option<i32>", "i32"],
    );
    add(&["bigint"], ["Option<u64>", "u64", "Option<i64>", "i64"]);
    add(&["year"], ["Option<u16>", "u16", "Option<u16>", "u16"]);
    add(&["float"], ["Option<f32>", "f32", "Option<f32>", "f32"]);
    add(&["double", "real"], ["Option<f64>", "f64", "Option<f64>", "f64"]);
    add(
        &["decimal", "numeric", MONEY_KEY],
        ["Option<Decimal>", "Decimal", "Option<Decimal>", "Decimal"],
    );
    add(&["bit"], ["Option<u64>", "u64", "Option<u64>", "u64"]);
    add(
        &["bool", "boolean"],
        ["Option<bool>", "bool", "Option<bool>", "bool"],
    );
    add(
        &["date"],
        ["Option<NaiveDate>", "NaiveDate", "Option<NaiveDate>", "NaiveDate"],
    );
    add(
        &["datetime", "timestamp"],
        [
            "Option<NaiveDateTime>",
            "NaiveDateTime",
            "Option<NaiveDateTime>",
            "NaiveDateTime",
        ],
    );
    add(
        &["time"],
        ["Option<NaiveTime>", "NaiveTime", "Option<NaiveTime>", "NaiveTime"],
    );
    add(
        &[
            "char",
            "varchar",
            "tinytext",
            "text",
            "mediumtext",
            "longtext",
            "enum",
            "set",
            "json",
        ],
        ["Option<String>", "String", "Option<String>", "String"],
    );
    add(
        &[
            "binary",
            "varbinary",
            "tinyblob",
            "blob",
            "mediumblob",
            "longblob",
            "geometry",
        ],
        ["Vec<u8>", "Vec<u8>", "Vec<u8>", "Vec<u8>"],
    );
    m
});

/// Resolves Rust types and column-map accessor names for columns
///
/// The serializer decides the narrowest integer width: protobuf has no 8 or
/// 16 bit scalars, so those widen to 32 bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeMapper {
    serializer: Serializer,
}

impl TypeMapper {
    /// Create a mapper for the given serializer
    pub fn new(serializer: Serializer) -> Self {
        TypeMapper { serializer }
    }

    /// Rust type of a column
    ///
    /// With `allow_null` a nullable column maps to its `Option` variant,
    /// without it to the plain variant. The primitive is the same either way.
    pub fn rust_type(&self, col: &Column, allow_null: bool) -> Result<String, GeneratorError> {
        let key = if col.is_bool() {
            BOOL_KEY.to_string()
        } else if col.is_money() {
            MONEY_KEY.to_string()
        } else {
            col.data_type_lower()
        };

        let variants = SQL_TYPES
            .get(key.as_str())
            .ok_or_else(|| GeneratorError::TypeNotFound {
                column: col.field.clone(),
                data_type: col.data_type.clone(),
            })?;

        let null = allow_null && col.null;
        let idx = match (col.is_unsigned(), null) {
            (true, true) => UNSIGNED_NULL,
            (true, false) => UNSIGNED,
            (false, true) => SIGNED_NULL,
            (false, false) => SIGNED,
        };

        Ok(self.widen(variants[idx]))
    }

    /// Name of the `ColumnMap` method moving a value of this column
    pub fn accessor_name(&self, col: &Column, allow_null: bool) -> Result<String, GeneratorError> {
        self.rust_type(col, allow_null)
            .map(|t| accessor_from_type(&t))
    }

    fn widen(&self, ty: &str) -> String {
        if self.serializer.min_int_bits() < 32 {
            return ty.to_string();
        }
        let (inner, wrapped) = split_option(ty);
        let widened = match inner {
            "u8" | "u16" => "u32",
            "i8" | "i16" => "i32",
            other => other,
        };
        if wrapped {
            format!("Option<{}>", widened)
        } else {
            widened.to_string()
        }
    }
}

/// Split `Option<T>` into `T` and whether it was wrapped
pub fn split_option(ty: &str) -> (&str, bool) {
    match ty.strip_prefix("Option<").and_then(|t| t.strip_suffix('>')) {
        Some(inner) => (inner, true),
        None => (ty, false),
    }
}

/// Accessor name derived from a resolved Rust type
///
/// `Vec<u8>` is always `byte`. Otherwise the `Option` wrapper becomes a
/// `null_` prefix and the last path segment is snake cased:
/// `Option<NaiveDateTime>` maps to `null_naive_date_time`.
pub fn accessor_from_type(ty: &str) -> String {
    if ty == "Vec<u8>" {
        return "byte".to_string();
    }
    let (inner, wrapped) = split_option(ty);
    let last = inner.rsplit("::").next().unwrap_or(inner);
    let base = last.to_snake_case();
    if wrapped {
        format!("null_{}", base)
    } else {
        base
    }
}

/// Whether values of this Rust type are `Copy`
pub fn is_copy_type(ty: &str) -> bool {
    let (inner, _) = split_option(ty);
    matches!(
        inner,
        "u8" | "u16"
            | "u32"
            | "u64"
            | "i8"
            | "i16"
            | "i32"
            | "i64"
            | "f32"
            | "f64"
            | "bool"
            | "Decimal"
            | "NaiveDate"
            | "NaiveDateTime"
            | "NaiveTime"
    )
}

/// Whether the type is a string, optional or not
pub fn is_string_type(ty: &str) -> bool {
    split_option(ty).0 == "String"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnKey;

    fn mapper() -> TypeMapper {
        TypeMapper::default()
    }

    #[test]
    fn test_integer_families() {
        let id = Column::new("config_id", "int").column_type("int(10) unsigned");
        assert_eq!(mapper().rust_type(&id, true).unwrap(), "u32");

        let big = Column::new("entity_id", "bigint")
            .column_type("bigint(20) unsigned")
            .nullable();
        assert_eq!(mapper().rust_type(&big, true).unwrap(), "Option<u64>");
        assert_eq!(mapper().rust_type(&big, false).unwrap(), "u64");

        let scope_id = Column::new("scope_id", "int").column_type("int(11)");
        assert_eq!(mapper().rust_type(&scope_id, true).unwrap(), "i32");
    }

    #[test]
    fn test_null_only_changes_wrapper() {
        for dt in SQL_TYPES.keys() {
            for unsigned in [false, true] {
                let ct = if unsigned {
                    format!("{} unsigned", dt)
                } else {
                    dt.to_string()
                };
                let col = Column::new("some_col", *dt).column_type(ct).nullable();
                let with_null = mapper().rust_type(&col, true).unwrap();
                let without = mapper().rust_type(&col, false).unwrap();
                assert_eq!(split_option(&with_null).0, without, "data type {}", dt);
            }
        }
    }

    #[test]
    fn test_money_is_decimal() {
        for dt in ["float", "double", "decimal"] {
            let price = Column::new("price", dt);
            assert_eq!(mapper().rust_type(&price, true).unwrap(), "Decimal");
            let nullable = price.clone().nullable();
            assert_eq!(
                mapper().rust_type(&nullable, true).unwrap(),
                "Option<Decimal>"
            );
            assert_eq!(mapper().rust_type(&nullable, false).unwrap(), "Decimal");
        }
        let weight = Column::new("weight", "float");
        assert_eq!(mapper().rust_type(&weight, true).unwrap(), "f32");
    }

    #[test]
    fn test_bool_override() {
        let col = Column::new("is_active", "smallint")
            .column_type("smallint(5) unsigned")
            .nullable();
        assert_eq!(mapper().rust_type(&col, true).unwrap(), "Option<bool>");
        assert_eq!(mapper().accessor_name(&col, true).unwrap(), "null_bool");
    }

    #[test]
    fn test_unknown_type_is_not_found() {
        let col = Column::new("shape", "polygonz");
        let err = mapper().rust_type(&col, true).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("polygonz"));
    }

    #[test]
    fn test_protobuf_widens_small_integers() {
        let col = Column::new("sort_order", "smallint")
            .column_type("smallint(5) unsigned")
            .nullable();
        let proto = TypeMapper::new(Serializer::Protobuf);
        assert_eq!(proto.rust_type(&col, true).unwrap(), "Option<u32>");
        let fbs = TypeMapper::new(Serializer::Flatbuffers);
        assert_eq!(fbs.rust_type(&col, true).unwrap(), "Option<u16>");
    }

    #[test]
    fn test_accessor_names() {
        assert_eq!(accessor_from_type("u32"), "u32");
        assert_eq!(accessor_from_type("Option<String>"), "null_string");
        assert_eq!(accessor_from_type("Vec<u8>"), "byte");
        assert_eq!(accessor_from_type("Decimal"), "decimal");
        assert_eq!(
            accessor_from_type("Option<NaiveDateTime>"),
            "null_naive_date_time"
        );
        assert_eq!(accessor_from_type("chrono::NaiveDate"), "naive_date");

        let blob = Column {
            key: ColumnKey::None,
            null: true,
            ..Column::new("image", "blob")
        };
        assert_eq!(mapper().accessor_name(&blob, true).unwrap(), "byte");
    }
}
