use std::{fmt, str::FromStr};

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use num_bigint::BigInt;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::{error::ReadError, schema::FieldDecl};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Text,
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    BigInteger,
    Decimal,
    BigDecimal,
    DateTime,
}

impl ValueKind {
    pub fn variants() -> &'static [&'static str] {
        &[
            "string",
            "bool",
            "i8",
            "i16",
            "i32",
            "i64",
            "f32",
            "f64",
            "bigint",
            "decimal",
            "bigdecimal",
            "datetime",
        ]
    }

    fn token(&self) -> &'static str {
        match self {
            ValueKind::Text => "string",
            ValueKind::Boolean => "bool",
            ValueKind::Int8 => "i8",
            ValueKind::Int16 => "i16",
            ValueKind::Int32 => "i32",
            ValueKind::Int64 => "i64",
            ValueKind::Float32 => "f32",
            ValueKind::Float64 => "f64",
            ValueKind::BigInteger => "bigint",
            ValueKind::Decimal => "decimal",
            ValueKind::BigDecimal => "bigdecimal",
            ValueKind::DateTime => "datetime",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ValueKind {
    type Err = ReadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "text" | "str" => Ok(ValueKind::Text),
            "bool" | "boolean" => Ok(ValueKind::Boolean),
            "i8" | "byte" => Ok(ValueKind::Int8),
            "i16" | "short" => Ok(ValueKind::Int16),
            "i32" | "int" | "integer" => Ok(ValueKind::Int32),
            "i64" | "long" => Ok(ValueKind::Int64),
            "f32" | "float" => Ok(ValueKind::Float32),
            "f64" | "double" => Ok(ValueKind::Float64),
            "bigint" | "biginteger" => Ok(ValueKind::BigInteger),
            "decimal" => Ok(ValueKind::Decimal),
            "bigdecimal" => Ok(ValueKind::BigDecimal),
            "datetime" | "naivedatetime" | "localdatetime" => Ok(ValueKind::DateTime),
            _ => Err(ReadError::Schema(format!(
                "unsupported value type '{}'. Supported types: {}",
                value.trim(),
                ValueKind::variants().join(", ")
            ))),
        }
    }
}

/// Target type of a field: its kind plus whether a missing value is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldType {
    pub kind: ValueKind,
    pub nullable: bool,
}

impl FieldType {
    pub const fn required(kind: ValueKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    pub const fn nullable(kind: ValueKind) -> Self {
        Self {
            kind,
            nullable: true,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "Option<{}>", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl FromStr for FieldType {
    type Err = ReadError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let lowered = trimmed.to_ascii_lowercase();
        if let Some(inner) = lowered
            .strip_prefix("option<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return Ok(FieldType::nullable(inner.parse()?));
        }
        if let Some(inner) = trimmed.strip_suffix('?') {
            return Ok(FieldType::nullable(inner.parse()?));
        }
        Ok(FieldType::required(trimmed.parse()?))
    }
}

/// A type as written in a field declaration. Unrecognised names are kept so
/// schema building can report them in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    Known(FieldType),
    Unknown(String),
}

impl From<FieldType> for DeclaredType {
    fn from(value: FieldType) -> Self {
        DeclaredType::Known(value)
    }
}

impl From<&str> for DeclaredType {
    fn from(value: &str) -> Self {
        match value.parse::<FieldType>() {
            Ok(field_type) => DeclaredType::Known(field_type),
            Err(_) => DeclaredType::Unknown(value.to_string()),
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredType::Known(field_type) => write!(f, "{field_type}"),
            DeclaredType::Unknown(name) => write!(f, "{name}"),
        }
    }
}

/// A coerced cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Boolean(bool),
    /// Any of the fixed-width integer kinds, range-checked against the target.
    Integer(i64),
    Float(f64),
    BigInteger(BigInt),
    Decimal(Decimal),
    BigDecimal(BigDecimal),
    DateTime(NaiveDateTime),
}

impl FieldValue {
    pub fn as_display(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            FieldValue::BigInteger(i) => i.to_string(),
            FieldValue::Decimal(d) => d.to_string(),
            FieldValue::BigDecimal(d) => d.to_string(),
            FieldValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Text(s) => serializer.serialize_str(s),
            FieldValue::Boolean(b) => serializer.serialize_bool(*b),
            FieldValue::Integer(i) => serializer.serialize_i64(*i),
            FieldValue::Float(f) => serializer.serialize_f64(*f),
            FieldValue::DateTime(dt) => {
                serializer.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            // Arbitrary precision survives only as text.
            other => serializer.serialize_str(&other.as_display()),
        }
    }
}

/// A Rust type a spreadsheet column can be mapped into.
pub trait SheetField: Sized {
    const TYPE: FieldType;

    /// Extracts the value produced for [`Self::TYPE`]; `None` when it does not fit.
    fn from_value(value: Option<FieldValue>) -> Option<Self>;
}

macro_rules! integer_field {
    ($ty:ty, $kind:ident) => {
        impl SheetField for $ty {
            const TYPE: FieldType = FieldType::required(ValueKind::$kind);

            fn from_value(value: Option<FieldValue>) -> Option<Self> {
                match value? {
                    FieldValue::Integer(i) => <$ty>::try_from(i).ok(),
                    _ => None,
                }
            }
        }
    };
}

integer_field!(i8, Int8);
integer_field!(i16, Int16);
integer_field!(i32, Int32);
integer_field!(i64, Int64);

impl SheetField for String {
    const TYPE: FieldType = FieldType::required(ValueKind::Text);

    fn from_value(value: Option<FieldValue>) -> Option<Self> {
        match value? {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl SheetField for bool {
    const TYPE: FieldType = FieldType::required(ValueKind::Boolean);

    fn from_value(value: Option<FieldValue>) -> Option<Self> {
        match value? {
            FieldValue::Boolean(b) => Some(b),
            _ => None,
        }
    }
}

impl SheetField for f32 {
    const TYPE: FieldType = FieldType::required(ValueKind::Float32);

    fn from_value(value: Option<FieldValue>) -> Option<Self> {
        match value? {
            FieldValue::Float(f) => Some(f as f32),
            _ => None,
        }
    }
}

impl SheetField for f64 {
    const TYPE: FieldType = FieldType::required(ValueKind::Float64);

    fn from_value(value: Option<FieldValue>) -> Option<Self> {
        match value? {
            FieldValue::Float(f) => Some(f),
            _ => None,
        }
    }
}

impl SheetField for BigInt {
    const TYPE: FieldType = FieldType::required(ValueKind::BigInteger);

    fn from_value(value: Option<FieldValue>) -> Option<Self> {
        match value? {
            FieldValue::BigInteger(i) => Some(i),
            _ => None,
        }
    }
}

impl SheetField for Decimal {
    const TYPE: FieldType = FieldType::required(ValueKind::Decimal);

    fn from_value(value: Option<FieldValue>) -> Option<Self> {
        match value? {
            FieldValue::Decimal(d) => Some(d),
            _ => None,
        }
    }
}

impl SheetField for BigDecimal {
    const TYPE: FieldType = FieldType::required(ValueKind::BigDecimal);

    fn from_value(value: Option<FieldValue>) -> Option<Self> {
        match value? {
            FieldValue::BigDecimal(d) => Some(d),
            _ => None,
        }
    }
}

impl SheetField for NaiveDateTime {
    const TYPE: FieldType = FieldType::required(ValueKind::DateTime);

    fn from_value(value: Option<FieldValue>) -> Option<Self> {
        match value? {
            FieldValue::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
}

impl<T: SheetField> SheetField for Option<T> {
    const TYPE: FieldType = FieldType::nullable(T::TYPE.kind);

    fn from_value(value: Option<FieldValue>) -> Option<Self> {
        match value {
            None => Some(None),
            Some(inner) => T::from_value(Some(inner)).map(Some),
        }
    }
}

/// One mapped row: field values in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    values: Vec<(String, Option<FieldValue>)>,
}

impl Record {
    pub fn new(values: Vec<(String, Option<FieldValue>)>) -> Self {
        Self { values }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, value)| value.as_ref())
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> &[(String, Option<FieldValue>)] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Moves a field's value out as `T`.
    pub fn take<T: SheetField>(&mut self, field: &str) -> Result<T, ReadError> {
        let slot = self
            .values
            .iter_mut()
            .find(|(name, _)| name == field)
            .ok_or_else(|| ReadError::Schema(format!("record has no field '{field}'")))?;
        T::from_value(slot.1.take()).ok_or_else(|| {
            ReadError::Schema(format!("field '{field}' does not hold a value of type {}", T::TYPE))
        })
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A record shape with an explicit field table.
///
/// ```
/// use sheet_mapper::{FieldDecl, Record, ReadError, SheetRecord};
///
/// struct Customer {
///     code: i64,
///     name: String,
///     balance: Option<rust_decimal::Decimal>,
/// }
///
/// impl SheetRecord for Customer {
///     fn fields() -> Vec<FieldDecl> {
///         vec![
///             FieldDecl::of::<i64>("code").header("Código"),
///             FieldDecl::of::<String>("name").header("Nome"),
///             FieldDecl::of::<Option<rust_decimal::Decimal>>("balance").header("Saldo"),
///         ]
///     }
///
///     fn from_record(mut record: Record) -> Result<Self, ReadError> {
///         Ok(Self {
///             code: record.take("code")?,
///             name: record.take("name")?,
///             balance: record.take("balance")?,
///         })
///     }
/// }
/// ```
pub trait SheetRecord: Sized {
    fn fields() -> Vec<FieldDecl>;

    fn from_record(record: Record) -> Result<Self, ReadError>;
}
