//! Runtime values exchanged with PostgreSQL.
//!
//! [`SqlValue`] is the neutral representation every field passes through on its way in and out
//! of a statement. [`SqlField`] connects Rust field types to it, [`coerce`] converts between
//! compatible representations, and the `bind`/`decode` helpers talk to sqlx.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sqlx::{
    Arguments, Column, Row, TypeInfo, ValueRef,
    postgres::{PgArguments, PgRow},
};
use std::fmt;
use uuid::Uuid;

use crate::db::schema::{FieldKind, ScalarType, SqlType};

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    BigInt(i64),
    Integer(i32),
    SmallInt(i16),
    Text(String),
    Boolean(bool),
    Numeric(Decimal),
    Double(f64),
    Real(f32),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Uuid(Uuid),
    Binary(Vec<u8>),
    Json(serde_json::Value),
    Array(Vec<SqlValue>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short name of the value's representation, for error messages
    pub fn type_label(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::BigInt(_) => "bigint",
            SqlValue::Integer(_) => "integer",
            SqlValue::SmallInt(_) => "smallint",
            SqlValue::Text(_) => "text",
            SqlValue::Boolean(_) => "boolean",
            SqlValue::Numeric(_) => "numeric",
            SqlValue::Double(_) => "double precision",
            SqlValue::Real(_) => "real",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::TimestampTz(_) => "timestamptz",
            SqlValue::Date(_) => "date",
            SqlValue::Time(_) => "time",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Binary(_) => "bytea",
            SqlValue::Json(_) => "jsonb",
            SqlValue::Array(_) => "array",
        }
    }
}

macro_rules! sql_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    SqlValue::$variant(value)
                }
            }
        )*
    };
}

sql_value_from! {
    i64 => BigInt,
    i32 => Integer,
    i16 => SmallInt,
    String => Text,
    bool => Boolean,
    Decimal => Numeric,
    f64 => Double,
    f32 => Real,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    NaiveDate => Date,
    NaiveTime => Time,
    Uuid => Uuid,
    serde_json::Value => Json,
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Convert a value into the representation of `target`.
///
/// Integers widen freely and narrow only when the value fits, numerics convert among each other,
/// text parses into the target type. On failure the original value is handed back so the caller
/// can report it.
pub fn coerce(value: SqlValue, target: ScalarType) -> Result<SqlValue, SqlValue> {
    use SqlValue as V;

    let converted = match (target, &value) {
        (_, V::Null) => Some(V::Null),

        (ScalarType::BigInt, V::BigInt(v)) => Some(V::BigInt(*v)),
        (ScalarType::BigInt, V::Integer(v)) => Some(V::BigInt(i64::from(*v))),
        (ScalarType::BigInt, V::SmallInt(v)) => Some(V::BigInt(i64::from(*v))),
        (ScalarType::BigInt, V::Numeric(d)) if d.fract().is_zero() => d.to_i64().map(V::BigInt),
        (ScalarType::BigInt, V::Text(s)) => s.trim().parse().ok().map(V::BigInt),

        (ScalarType::Integer, V::Integer(v)) => Some(V::Integer(*v)),
        (ScalarType::Integer, V::SmallInt(v)) => Some(V::Integer(i32::from(*v))),
        (ScalarType::Integer, V::BigInt(v)) => i32::try_from(*v).ok().map(V::Integer),
        (ScalarType::Integer, V::Numeric(d)) if d.fract().is_zero() => d.to_i32().map(V::Integer),
        (ScalarType::Integer, V::Text(s)) => s.trim().parse().ok().map(V::Integer),

        (ScalarType::SmallInt, V::SmallInt(v)) => Some(V::SmallInt(*v)),
        (ScalarType::SmallInt, V::Integer(v)) => i16::try_from(*v).ok().map(V::SmallInt),
        (ScalarType::SmallInt, V::BigInt(v)) => i16::try_from(*v).ok().map(V::SmallInt),
        (ScalarType::SmallInt, V::Numeric(d)) if d.fract().is_zero() => d.to_i16().map(V::SmallInt),
        (ScalarType::SmallInt, V::Text(s)) => s.trim().parse().ok().map(V::SmallInt),

        (ScalarType::Text, V::Text(s)) => Some(V::Text(s.clone())),

        (ScalarType::Boolean, V::Boolean(b)) => Some(V::Boolean(*b)),
        (ScalarType::Boolean, V::Text(s)) => s.trim().parse().ok().map(V::Boolean),

        (ScalarType::Numeric, V::Numeric(d)) => Some(V::Numeric(*d)),
        (ScalarType::Numeric, V::BigInt(v)) => Some(V::Numeric(Decimal::from(*v))),
        (ScalarType::Numeric, V::Integer(v)) => Some(V::Numeric(Decimal::from(*v))),
        (ScalarType::Numeric, V::SmallInt(v)) => Some(V::Numeric(Decimal::from(*v))),
        (ScalarType::Numeric, V::Double(v)) => Decimal::try_from(*v).ok().map(V::Numeric),
        (ScalarType::Numeric, V::Real(v)) => Decimal::try_from(*v).ok().map(V::Numeric),
        (ScalarType::Numeric, V::Text(s)) => s.trim().parse().ok().map(V::Numeric),

        (ScalarType::Double, V::Double(v)) => Some(V::Double(*v)),
        (ScalarType::Double, V::Real(v)) => Some(V::Double(f64::from(*v))),
        (ScalarType::Double, V::Integer(v)) => Some(V::Double(f64::from(*v))),
        (ScalarType::Double, V::SmallInt(v)) => Some(V::Double(f64::from(*v))),
        (ScalarType::Double, V::BigInt(v)) => Some(V::Double(*v as f64)),
        (ScalarType::Double, V::Numeric(d)) => d.to_f64().map(V::Double),
        (ScalarType::Double, V::Text(s)) => s.trim().parse().ok().map(V::Double),

        (ScalarType::Real, V::Real(v)) => Some(V::Real(*v)),
        (ScalarType::Real, V::Double(v)) => Some(V::Real(*v as f32)),
        (ScalarType::Real, V::SmallInt(v)) => Some(V::Real(f32::from(*v))),
        (ScalarType::Real, V::Integer(v)) => Some(V::Real(*v as f32)),
        (ScalarType::Real, V::BigInt(v)) => Some(V::Real(*v as f32)),
        (ScalarType::Real, V::Numeric(d)) => d.to_f32().map(V::Real),
        (ScalarType::Real, V::Text(s)) => s.trim().parse().ok().map(V::Real),

        (ScalarType::Timestamp, V::Timestamp(t)) => Some(V::Timestamp(*t)),
        (ScalarType::Timestamp, V::TimestampTz(t)) => Some(V::Timestamp(t.naive_utc())),
        (ScalarType::Timestamp, V::Date(d)) => Some(V::Timestamp(d.and_time(NaiveTime::MIN))),
        (ScalarType::Timestamp, V::Text(s)) => s.trim().parse().ok().map(V::Timestamp),

        (ScalarType::TimestampTz, V::TimestampTz(t)) => Some(V::TimestampTz(*t)),
        (ScalarType::TimestampTz, V::Timestamp(t)) => Some(V::TimestampTz(t.and_utc())),
        (ScalarType::TimestampTz, V::Text(s)) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| V::TimestampTz(t.with_timezone(&Utc))),

        (ScalarType::Date, V::Date(d)) => Some(V::Date(*d)),
        (ScalarType::Date, V::Timestamp(t)) => Some(V::Date(t.date())),
        (ScalarType::Date, V::Text(s)) => s.trim().parse().ok().map(V::Date),

        (ScalarType::Time, V::Time(t)) => Some(V::Time(*t)),
        (ScalarType::Time, V::Text(s)) => s.trim().parse().ok().map(V::Time),

        (ScalarType::Uuid, V::Uuid(u)) => Some(V::Uuid(*u)),
        (ScalarType::Uuid, V::Text(s)) => Uuid::parse_str(s.trim()).ok().map(V::Uuid),

        (ScalarType::Binary, V::Binary(b)) => Some(V::Binary(b.clone())),

        _ => None,
    };

    converted.ok_or(value)
}

/// A Rust type that can be stored in a column.
///
/// The serde bounds let any field fall back to JSON encoding when its shape has no column
/// mapping.
pub trait SqlField: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn kind() -> FieldKind;

    fn nullable() -> bool {
        false
    }

    /// Absent values are left out of inserts and updates
    fn is_absent(&self) -> bool {
        false
    }

    fn to_sql(&self) -> SqlValue;

    /// Decode a stored value. The rejected value is returned on failure.
    fn from_sql(value: SqlValue) -> Result<Self, SqlValue>;
}

macro_rules! scalar_field {
    ($($ty:ty => $kind:ident, $scalar:ident, $variant:ident);* $(;)?) => {
        $(
            impl SqlField for $ty {
                fn kind() -> FieldKind {
                    FieldKind::$kind
                }

                fn to_sql(&self) -> SqlValue {
                    SqlValue::$variant(self.clone())
                }

                fn from_sql(value: SqlValue) -> Result<Self, SqlValue> {
                    match coerce(value, ScalarType::$scalar)? {
                        SqlValue::$variant(v) => Ok(v),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

scalar_field! {
    i64 => I64, BigInt, BigInt;
    i32 => I32, Integer, Integer;
    i16 => I16, SmallInt, SmallInt;
    String => String, Text, Text;
    bool => Bool, Boolean, Boolean;
    Decimal => Decimal, Numeric, Numeric;
    f64 => F64, Double, Double;
    f32 => F32, Real, Real;
    NaiveDateTime => NaiveDateTime, Timestamp, Timestamp;
    DateTime<Utc> => DateTimeUtc, TimestampTz, TimestampTz;
    NaiveDate => Date, Date, Date;
    NaiveTime => Time, Time, Time;
    Uuid => Uuid, Uuid, Uuid;
}

/// Unsigned and byte-sized integers are carried in the next wider signed representation and
/// narrowed to the column type when bound.
macro_rules! widened_field {
    ($($ty:ty => $kind:ident, $scalar:ident, $wide:ident, $wide_ty:ty);* $(;)?) => {
        $(
            impl SqlField for $ty {
                fn kind() -> FieldKind {
                    FieldKind::$kind
                }

                fn to_sql(&self) -> SqlValue {
                    SqlValue::$wide(<$wide_ty>::from(*self))
                }

                fn from_sql(value: SqlValue) -> Result<Self, SqlValue> {
                    match coerce(value, ScalarType::$scalar)? {
                        SqlValue::$scalar(v) => <$ty>::try_from(v).map_err(|_| SqlValue::$scalar(v)),
                        other => Err(other),
                    }
                }
            }
        )*
    };
}

widened_field! {
    i8 => I8, SmallInt, SmallInt, i16;
    u16 => U16, SmallInt, Integer, i32;
    u32 => U32, Integer, BigInt, i64;
}

impl SqlField for u64 {
    fn kind() -> FieldKind {
        FieldKind::U64
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Numeric(Decimal::from(*self))
    }

    fn from_sql(value: SqlValue) -> Result<Self, SqlValue> {
        match coerce(value, ScalarType::BigInt)? {
            SqlValue::BigInt(v) => u64::try_from(v).map_err(|_| SqlValue::BigInt(v)),
            other => Err(other),
        }
    }
}

/// Raw bytes stored as BYTEA
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bytes(pub Vec<u8>);

impl SqlField for Bytes {
    fn kind() -> FieldKind {
        FieldKind::Bytes
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Binary(self.0.clone())
    }

    fn from_sql(value: SqlValue) -> Result<Self, SqlValue> {
        match coerce(value, ScalarType::Binary)? {
            SqlValue::Binary(v) => Ok(Bytes(v)),
            other => Err(other),
        }
    }
}

impl<T: SqlField> SqlField for Option<T> {
    fn kind() -> FieldKind {
        T::kind()
    }

    fn nullable() -> bool {
        true
    }

    fn is_absent(&self) -> bool {
        self.is_none()
    }

    fn to_sql(&self) -> SqlValue {
        self.as_ref().map(T::to_sql).unwrap_or(SqlValue::Null)
    }

    fn from_sql(value: SqlValue) -> Result<Self, SqlValue> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql(other).map(Some),
        }
    }
}

impl<T: SqlField> SqlField for Vec<T> {
    fn kind() -> FieldKind {
        FieldKind::List(Box::new(T::kind()))
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Array(self.iter().map(T::to_sql).collect())
    }

    fn from_sql(value: SqlValue) -> Result<Self, SqlValue> {
        match value {
            SqlValue::Array(items) => items.into_iter().map(T::from_sql).collect(),
            other => Err(other),
        }
    }
}

impl SqlField for serde_json::Value {
    fn kind() -> FieldKind {
        FieldKind::Object
    }

    fn nullable() -> bool {
        true
    }

    fn is_absent(&self) -> bool {
        self.is_null()
    }

    fn to_sql(&self) -> SqlValue {
        SqlValue::Json(self.clone())
    }

    fn from_sql(value: SqlValue) -> Result<Self, SqlValue> {
        match value {
            SqlValue::Json(v) => Ok(v),
            other => Err(other),
        }
    }
}

/// Why a value could not be bound to a statement parameter.
#[derive(Debug)]
pub enum BindError {
    /// The value cannot be represented as the column type
    Mismatch { value: &'static str, expected: SqlType },
    Encode(sqlx::error::BoxDynError),
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindError::Mismatch { value, expected } => write!(f, "{value} value is not convertible to {expected}"),
            BindError::Encode(e) => write!(f, "failed to encode parameter: {e}"),
        }
    }
}

/// Placeholder text for parameter `n` of the given column type
pub fn placeholder(n: usize, sql_type: &SqlType) -> String {
    match sql_type {
        SqlType::Json => format!("${n}::jsonb"),
        _ => format!("${n}"),
    }
}

fn add_null(args: &mut PgArguments, sql_type: &SqlType) -> Result<(), BindError> {
    macro_rules! null_of {
        ($ty:ty) => {
            match sql_type {
                SqlType::Array(_) => args.add(None::<Vec<$ty>>),
                _ => args.add(None::<$ty>),
            }
        };
    }

    let added = match sql_type {
        SqlType::Json => args.add(None::<String>),
        SqlType::Array(ScalarType::Binary) => {
            return Err(BindError::Mismatch {
                value: "null",
                expected: *sql_type,
            });
        }
        SqlType::Scalar(scalar) | SqlType::Array(scalar) => match scalar {
            ScalarType::BigInt => null_of!(i64),
            ScalarType::Integer => null_of!(i32),
            ScalarType::SmallInt => null_of!(i16),
            ScalarType::Text => null_of!(String),
            ScalarType::Boolean => null_of!(bool),
            ScalarType::Numeric => null_of!(Decimal),
            ScalarType::Double => null_of!(f64),
            ScalarType::Real => null_of!(f32),
            ScalarType::Timestamp => null_of!(NaiveDateTime),
            ScalarType::TimestampTz => null_of!(DateTime<Utc>),
            ScalarType::Date => null_of!(NaiveDate),
            ScalarType::Time => null_of!(NaiveTime),
            ScalarType::Uuid => null_of!(Uuid),
            ScalarType::Binary => args.add(None::<Vec<u8>>),
        },
    };
    added.map_err(BindError::Encode)
}

fn add_scalar(args: &mut PgArguments, value: SqlValue, scalar: ScalarType) -> Result<(), BindError> {
    let added = match value {
        SqlValue::BigInt(v) => args.add(v),
        SqlValue::Integer(v) => args.add(v),
        SqlValue::SmallInt(v) => args.add(v),
        SqlValue::Text(v) => args.add(v),
        SqlValue::Boolean(v) => args.add(v),
        SqlValue::Numeric(v) => args.add(v),
        SqlValue::Double(v) => args.add(v),
        SqlValue::Real(v) => args.add(v),
        SqlValue::Timestamp(v) => args.add(v),
        SqlValue::TimestampTz(v) => args.add(v),
        SqlValue::Date(v) => args.add(v),
        SqlValue::Time(v) => args.add(v),
        SqlValue::Uuid(v) => args.add(v),
        SqlValue::Binary(v) => args.add(v),
        other => {
            return Err(BindError::Mismatch {
                value: other.type_label(),
                expected: SqlType::Scalar(scalar),
            });
        }
    };
    added.map_err(BindError::Encode)
}

fn collect_items<T>(items: Vec<SqlValue>, extract: fn(SqlValue) -> Option<T>) -> Option<Vec<T>> {
    items.into_iter().map(extract).collect()
}

fn add_array(args: &mut PgArguments, items: Vec<SqlValue>, element: ScalarType) -> Result<(), BindError> {
    let mismatch = || BindError::Mismatch {
        value: "array",
        expected: SqlType::Array(element),
    };
    let items = items
        .into_iter()
        .map(|item| coerce(item, element))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| mismatch())?;

    macro_rules! add_typed {
        ($variant:ident) => {
            args.add(
                collect_items(items, |v| match v {
                    SqlValue::$variant(x) => Some(x),
                    _ => None,
                })
                .ok_or_else(mismatch)?,
            )
        };
    }

    let added = match element {
        ScalarType::BigInt => add_typed!(BigInt),
        ScalarType::Integer => add_typed!(Integer),
        ScalarType::SmallInt => add_typed!(SmallInt),
        ScalarType::Text => add_typed!(Text),
        ScalarType::Boolean => add_typed!(Boolean),
        ScalarType::Numeric => add_typed!(Numeric),
        ScalarType::Double => add_typed!(Double),
        ScalarType::Real => add_typed!(Real),
        ScalarType::Timestamp => add_typed!(Timestamp),
        ScalarType::TimestampTz => add_typed!(TimestampTz),
        ScalarType::Date => add_typed!(Date),
        ScalarType::Time => add_typed!(Time),
        ScalarType::Uuid => add_typed!(Uuid),
        ScalarType::Binary => return Err(mismatch()),
    };
    added.map_err(BindError::Encode)
}

/// Append `value` to `args` as a parameter of type `sql_type`.
///
/// Scalars are coerced to the column type first, so a parameter is always encoded with the
/// column's own wire type. JSON is sent as text and must be paired with a `::jsonb` placeholder.
pub fn bind(args: &mut PgArguments, value: SqlValue, sql_type: &SqlType) -> Result<(), BindError> {
    match (sql_type, value) {
        (_, SqlValue::Null) => add_null(args, sql_type),
        (SqlType::Scalar(scalar), value) => {
            let coerced = coerce(value, *scalar).map_err(|rejected| BindError::Mismatch {
                value: rejected.type_label(),
                expected: *sql_type,
            })?;
            add_scalar(args, coerced, *scalar)
        }
        (SqlType::Array(element), SqlValue::Array(items)) => add_array(args, items, *element),
        (SqlType::Json, SqlValue::Json(json)) => args.add(json.to_string()).map_err(BindError::Encode),
        (expected, other) => Err(BindError::Mismatch {
            value: other.type_label(),
            expected: *expected,
        }),
    }
}

fn decode_array<T, F>(row: &PgRow, index: usize, wrap: F) -> Result<SqlValue, sqlx::Error>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    Vec<Option<T>>: for<'r> sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    F: Fn(T) -> SqlValue,
{
    let items: Vec<Option<T>> = row.try_get(index)?;
    Ok(SqlValue::Array(
        items.into_iter().map(|item| item.map(&wrap).unwrap_or(SqlValue::Null)).collect(),
    ))
}

/// Decode column `index` of `row` according to its wire type.
pub fn decode(row: &PgRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let type_name = row.column(index).type_info().name().to_string();
    let value = match type_name.as_str() {
        "INT8" => SqlValue::BigInt(row.try_get(index)?),
        "INT4" => SqlValue::Integer(row.try_get(index)?),
        "INT2" => SqlValue::SmallInt(row.try_get(index)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => SqlValue::Text(row.try_get(index)?),
        "BOOL" => SqlValue::Boolean(row.try_get(index)?),
        "NUMERIC" => SqlValue::Numeric(row.try_get(index)?),
        "FLOAT8" => SqlValue::Double(row.try_get(index)?),
        "FLOAT4" => SqlValue::Real(row.try_get(index)?),
        "TIMESTAMP" => SqlValue::Timestamp(row.try_get(index)?),
        "TIMESTAMPTZ" => SqlValue::TimestampTz(row.try_get(index)?),
        "DATE" => SqlValue::Date(row.try_get(index)?),
        "TIME" => SqlValue::Time(row.try_get(index)?),
        "UUID" => SqlValue::Uuid(row.try_get(index)?),
        "BYTEA" => SqlValue::Binary(row.try_get(index)?),
        "JSON" | "JSONB" => SqlValue::Json(row.try_get(index)?),
        "INT8[]" => decode_array(row, index, SqlValue::BigInt)?,
        "INT4[]" => decode_array(row, index, SqlValue::Integer)?,
        "INT2[]" => decode_array(row, index, SqlValue::SmallInt)?,
        "TEXT[]" | "VARCHAR[]" => decode_array(row, index, SqlValue::Text)?,
        "BOOL[]" => decode_array(row, index, SqlValue::Boolean)?,
        "NUMERIC[]" => decode_array(row, index, SqlValue::Numeric)?,
        "FLOAT8[]" => decode_array(row, index, SqlValue::Double)?,
        "FLOAT4[]" => decode_array(row, index, SqlValue::Real)?,
        "TIMESTAMP[]" => decode_array(row, index, SqlValue::Timestamp)?,
        "TIMESTAMPTZ[]" => decode_array(row, index, SqlValue::TimestampTz)?,
        "DATE[]" => decode_array(row, index, SqlValue::Date)?,
        "TIME[]" => decode_array(row, index, SqlValue::Time)?,
        "UUID[]" => decode_array(row, index, SqlValue::Uuid)?,
        other => {
            return Err(sqlx::Error::ColumnDecode {
                index: row.column(index).name().to_string(),
                source: format!("unsupported column type {other}").into(),
            });
        }
    };

    Ok(value)
}
