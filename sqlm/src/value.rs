///
/// # Field Value Marshaling
///
/// Converts record field values to and from the five storage classes the
/// engine understands (`Value`). Every mappable field type implements
/// `FieldValue`, which also reports the declared type name used by
/// descriptor derivation.
///
/// ## Declared and Semantic Types
///
/// The declared type name is the Rust spelling of the field type. Derivation
/// renames a handful of them to the semantic names the mapping works with:
///
/// | declared        | semantic   | column declaration |
/// |-----------------|------------|--------------------|
/// | `DateTime<Utc>` | `time`     | TEXT (RFC 3339)    |
/// | `Duration`      | `duration` | INTEGER (ns)       |
/// | `BigInt`        | `bigint`   | TEXT (decimal)     |
/// | `BigRational`   | `bigrat`   | TEXT (`n/d`)       |
/// | `Vec<u8>`       | `blob`     | BLOB               |
/// | `String`        | `string`   | TEXT               |
/// | `u8`            | `byte`     | INTEGER            |
/// | `char`          | `rune`     | TEXT               |
///
/// Other names pass through unchanged and must appear in `SUPPORTED_TYPES`.
///

use std::str::FromStr;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use num_bigint::BigInt;
use num_rational::BigRational;

use crate::errors::DbError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }
}

/// Semantic column types accepted by descriptor derivation.
pub const SUPPORTED_TYPES: &[&str] = &[
    "bigint", "bigrat", "blob", "bool", "byte", "duration", "f32", "f64", "i8", "i16", "i32",
    "i64", "isize", "rune", "string", "time", "u16", "u32", "u64", "usize",
];

pub fn semantic_type(declared: &str) -> &str {
    match declared {
        "DateTime<Utc>" => "time",
        "Duration" => "duration",
        "BigInt" => "bigint",
        "BigRational" => "bigrat",
        "Vec<u8>" => "blob",
        "String" => "string",
        "u8" => "byte",
        "char" => "rune",
        other => other,
    }
}

pub fn is_supported(semantic: &str) -> bool {
    SUPPORTED_TYPES.contains(&semantic)
}

/// SQLite column declaration for a supported semantic type. The declaration
/// fixes the column affinity so text stays text and integers stay integers.
pub fn column_declaration(semantic: &str) -> &'static str {
    match semantic {
        "i8" | "i16" | "i32" | "i64" | "isize" | "byte" | "u16" | "u32" | "u64" | "usize"
        | "duration" => "INTEGER",
        "f32" | "f64" => "REAL",
        "bool" => "BOOLEAN",
        "blob" => "BLOB",
        _ => "TEXT",
    }
}

/// A type that can live in a managed column.
pub trait FieldValue {
    fn type_name() -> &'static str
    where
        Self: Sized;

    /// Whether the type stores NULL for a missing value.
    fn nullable() -> bool
    where
        Self: Sized,
    {
        false
    }

    fn to_sql_value(&self) -> Result<Value, DbError>;

    fn from_sql_value(value: Value) -> Result<Self, DbError>
    where
        Self: Sized;
}

/// A positional statement parameter.
pub trait Param {
    fn to_param(&self) -> Result<Value, DbError>;
}

impl<T: FieldValue> Param for T {
    fn to_param(&self) -> Result<Value, DbError> {
        self.to_sql_value()
    }
}

impl Param for &str {
    fn to_param(&self) -> Result<Value, DbError> {
        Ok(Value::Text((*self).to_string()))
    }
}

impl Param for Value {
    fn to_param(&self) -> Result<Value, DbError> {
        Ok(self.clone())
    }
}

/// Builds a `&[&dyn Param]` slice for `retrieve`, `delete` and `exec`.
///
/// ```rust,ignore
/// db.retrieve(&mut list, "WHERE group_num > ?1 AND group_num < ?2", params![1000i64, 1004i64]);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        &[] as &[&dyn $crate::Param]
    };
    ($($param:expr),+ $(,)?) => {
        &[$(&$param as &dyn $crate::Param),+] as &[&dyn $crate::Param]
    };
}

pub(crate) fn mismatch(expected: &str, value: &Value) -> DbError {
    DbError::Decode {
        column: String::new(),
        expected: expected.to_string(),
        found: value.kind(),
    }
}

fn out_of_range(type_name: &'static str, value: impl ToString) -> DbError {
    DbError::ValueOutOfRange {
        type_name,
        value: value.to_string(),
    }
}

fn invalid(type_name: &'static str, value: &str, reason: impl ToString) -> DbError {
    DbError::InvalidValue {
        type_name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

macro_rules! integer_field {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                fn type_name() -> &'static str {
                    $name
                }

                fn to_sql_value(&self) -> Result<Value, DbError> {
                    i64::try_from(*self)
                        .map(Value::Integer)
                        .map_err(|_| out_of_range($name, self))
                }

                fn from_sql_value(value: Value) -> Result<Self, DbError> {
                    match value {
                        Value::Integer(i) => <$ty>::try_from(i).map_err(|_| out_of_range($name, i)),
                        other => Err(mismatch($name, &other)),
                    }
                }
            }
        )*
    };
}

integer_field!(
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    isize => "isize",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    usize => "usize",
);

impl FieldValue for f64 {
    fn type_name() -> &'static str {
        "f64"
    }

    fn to_sql_value(&self) -> Result<Value, DbError> {
        Ok(Value::Real(*self))
    }

    fn from_sql_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Real(r) => Ok(r),
            Value::Integer(i) => Ok(i as f64),
            other => Err(mismatch("f64", &other)),
        }
    }
}

impl FieldValue for f32 {
    fn type_name() -> &'static str {
        "f32"
    }

    fn to_sql_value(&self) -> Result<Value, DbError> {
        Ok(Value::Real(f64::from(*self)))
    }

    fn from_sql_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Real(r) => Ok(r as f32),
            Value::Integer(i) => Ok(i as f32),
            other => Err(mismatch("f32", &other)),
        }
    }
}

impl FieldValue for bool {
    fn type_name() -> &'static str {
        "bool"
    }

    fn to_sql_value(&self) -> Result<Value, DbError> {
        Ok(Value::Integer(i64::from(*self)))
    }

    fn from_sql_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Integer(i) => Ok(i != 0),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl FieldValue for char {
    fn type_name() -> &'static str {
        "char"
    }

    fn to_sql_value(&self) -> Result<Value, DbError> {
        Ok(Value::Text(self.to_string()))
    }

    fn from_sql_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Text(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(invalid("char", &s, "expected exactly one character")),
                }
            }
            other => Err(mismatch("rune", &other)),
        }
    }
}

impl FieldValue for String {
    fn type_name() -> &'static str {
        "String"
    }

    fn to_sql_value(&self) -> Result<Value, DbError> {
        Ok(Value::Text(self.clone()))
    }

    fn from_sql_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl FieldValue for Vec<u8> {
    fn type_name() -> &'static str {
        "Vec<u8>"
    }

    fn to_sql_value(&self) -> Result<Value, DbError> {
        Ok(Value::Blob(self.clone()))
    }

    fn from_sql_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Blob(b) => Ok(b),
            other => Err(mismatch("blob", &other)),
        }
    }
}

impl FieldValue for DateTime<Utc> {
    fn type_name() -> &'static str {
        "DateTime<Utc>"
    }

    fn to_sql_value(&self) -> Result<Value, DbError> {
        Ok(Value::Text(self.to_rfc3339_opts(SecondsFormat::Nanos, true)))
    }

    fn from_sql_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|tm| tm.with_timezone(&Utc))
                .map_err(|e| invalid("time", &s, e)),
            other => Err(mismatch("time", &other)),
        }
    }
}

impl FieldValue for Duration {
    fn type_name() -> &'static str {
        "Duration"
    }

    fn to_sql_value(&self) -> Result<Value, DbError> {
        self.num_nanoseconds()
            .map(Value::Integer)
            .ok_or_else(|| out_of_range("duration", self))
    }

    fn from_sql_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Integer(ns) => Ok(Duration::nanoseconds(ns)),
            other => Err(mismatch("duration", &other)),
        }
    }
}

impl FieldValue for BigInt {
    fn type_name() -> &'static str {
        "BigInt"
    }

    fn to_sql_value(&self) -> Result<Value, DbError> {
        Ok(Value::Text(self.to_string()))
    }

    fn from_sql_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Text(s) => BigInt::from_str(&s).map_err(|e| invalid("bigint", &s, e)),
            Value::Integer(i) => Ok(BigInt::from(i)),
            other => Err(mismatch("bigint", &other)),
        }
    }
}

impl FieldValue for BigRational {
    fn type_name() -> &'static str {
        "BigRational"
    }

    fn to_sql_value(&self) -> Result<Value, DbError> {
        Ok(Value::Text(format!("{}/{}", self.numer(), self.denom())))
    }

    fn from_sql_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Text(s) => BigRational::from_str(&s).map_err(|e| invalid("bigrat", &s, e)),
            Value::Integer(i) => Ok(BigRational::from_integer(BigInt::from(i))),
            other => Err(mismatch("bigrat", &other)),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn type_name() -> &'static str {
        T::type_name()
    }

    fn nullable() -> bool {
        true
    }

    fn to_sql_value(&self) -> Result<Value, DbError> {
        match self {
            Some(inner) => inner.to_sql_value(),
            None => Ok(Value::Null),
        }
    }

    fn from_sql_value(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}
