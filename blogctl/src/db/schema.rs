//! Entity declarations and the schema descriptors derived from them.
//!
//! An entity describes its table once, through [`Entity::schema`], using the [`EntitySchema`]
//! builder:
//!
//! ```ignore
//! impl Entity for Tag {
//!     type Key = i64;
//!
//!     fn schema() -> EntitySchema<Self> {
//!         EntitySchema::<Self>::new()
//!             .table("tags")
//!             .key("id", |t| &t.id, |t| &mut t.id)
//!             .field("name", |t| &t.name, |t| &mut t.name)
//!             .json(("content", "body"), |t| &t.content, |t| &mut t.content)
//!     }
//! }
//! ```
//!
//! [`describe`] validates the declaration and produces a [`SchemaDescriptor`]: the column list
//! with one SQL type per column (see [`sql_type_of`]) plus type-erased accessors the
//! [`Mapper`](crate::db::mapper::Mapper) uses to move values between rows and entities.

use std::{collections::HashSet, fmt, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};

use crate::db::{
    errors::{DbError, Result},
    value::{SqlField, SqlValue},
};

/// Scalar PostgreSQL storage types a field can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    BigInt,
    Integer,
    SmallInt,
    Text,
    Boolean,
    Numeric,
    Double,
    Real,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Uuid,
    Binary,
}

impl ScalarType {
    /// Type name as written in DDL
    pub fn ddl_name(self) -> &'static str {
        match self {
            ScalarType::BigInt => "BIGINT",
            ScalarType::Integer => "INTEGER",
            ScalarType::SmallInt => "SMALLINT",
            ScalarType::Text => "TEXT",
            ScalarType::Boolean => "BOOLEAN",
            ScalarType::Numeric => "NUMERIC",
            ScalarType::Double => "DOUBLE PRECISION",
            ScalarType::Real => "REAL",
            ScalarType::Timestamp => "TIMESTAMP",
            ScalarType::TimestampTz => "TIMESTAMPTZ",
            ScalarType::Date => "DATE",
            ScalarType::Time => "TIME",
            ScalarType::Uuid => "UUID",
            ScalarType::Binary => "BYTEA",
        }
    }

    /// Type name as reported by the catalog (`format_type`)
    pub fn catalog_name(self) -> &'static str {
        match self {
            ScalarType::BigInt => "bigint",
            ScalarType::Integer => "integer",
            ScalarType::SmallInt => "smallint",
            ScalarType::Text => "text",
            ScalarType::Boolean => "boolean",
            ScalarType::Numeric => "numeric",
            ScalarType::Double => "double precision",
            ScalarType::Real => "real",
            ScalarType::Timestamp => "timestamp without time zone",
            ScalarType::TimestampTz => "timestamp with time zone",
            ScalarType::Date => "date",
            ScalarType::Time => "time without time zone",
            ScalarType::Uuid => "uuid",
            ScalarType::Binary => "bytea",
        }
    }

    /// Whether a list of this scalar is stored as a native array column
    pub fn array_capable(self) -> bool {
        !matches!(self, ScalarType::Binary)
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ScalarType::BigInt | ScalarType::Integer | ScalarType::SmallInt)
    }
}

/// Storage encoding of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Scalar(ScalarType),
    Array(ScalarType),
    /// Serialized JSON, stored as JSONB
    Json,
}

impl SqlType {
    pub fn ddl_name(&self) -> String {
        match self {
            SqlType::Scalar(s) => s.ddl_name().to_string(),
            SqlType::Array(s) => format!("{}[]", s.ddl_name()),
            SqlType::Json => "JSONB".to_string(),
        }
    }

    pub fn catalog_name(&self) -> String {
        match self {
            SqlType::Scalar(s) => s.catalog_name().to_string(),
            SqlType::Array(s) => format!("{}[]", s.catalog_name()),
            SqlType::Json => "jsonb".to_string(),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ddl_name())
    }
}

/// The declared Rust shape of a field, as reported by [`SqlField::kind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    I64,
    U64,
    I32,
    U32,
    I16,
    U16,
    I8,
    String,
    /// Fieldless enum persisted by name
    Enum,
    Bool,
    Decimal,
    F64,
    F32,
    NaiveDateTime,
    DateTimeUtc,
    Date,
    Time,
    Uuid,
    Bytes,
    List(Box<FieldKind>),
    /// Anything without a direct column mapping (nested structs, maps, raw JSON)
    Object,
}

fn scalar_of(kind: &FieldKind) -> Option<ScalarType> {
    let scalar = match kind {
        FieldKind::I64 | FieldKind::U64 => ScalarType::BigInt,
        FieldKind::I32 | FieldKind::U32 => ScalarType::Integer,
        FieldKind::I16 | FieldKind::U16 | FieldKind::I8 => ScalarType::SmallInt,
        FieldKind::String | FieldKind::Enum => ScalarType::Text,
        FieldKind::Bool => ScalarType::Boolean,
        FieldKind::Decimal => ScalarType::Numeric,
        FieldKind::F64 => ScalarType::Double,
        FieldKind::F32 => ScalarType::Real,
        FieldKind::NaiveDateTime => ScalarType::Timestamp,
        FieldKind::DateTimeUtc => ScalarType::TimestampTz,
        FieldKind::Date => ScalarType::Date,
        FieldKind::Time => ScalarType::Time,
        FieldKind::Uuid => ScalarType::Uuid,
        FieldKind::Bytes => ScalarType::Binary,
        FieldKind::List(_) | FieldKind::Object => return None,
    };
    Some(scalar)
}

/// Derive the storage type of a field.
///
/// In priority order: an explicit JSON annotation, then a list of array-capable scalars as a
/// native array, then the fixed scalar table, and finally JSON for everything else.
pub fn sql_type_of(kind: &FieldKind, json_annotated: bool) -> SqlType {
    if json_annotated {
        return SqlType::Json;
    }

    if let FieldKind::List(element) = kind {
        return match scalar_of(element) {
            Some(scalar) if scalar.array_capable() => SqlType::Array(scalar),
            _ => SqlType::Json,
        };
    }

    scalar_of(kind).map(SqlType::Scalar).unwrap_or(SqlType::Json)
}

/// Field name, optionally mapped to a different column name.
#[derive(Debug, Clone, Copy)]
pub struct FieldName {
    pub field: &'static str,
    pub column: &'static str,
}

impl From<&'static str> for FieldName {
    fn from(name: &'static str) -> Self {
        Self { field: name, column: name }
    }
}

impl From<(&'static str, &'static str)> for FieldName {
    fn from((field, column): (&'static str, &'static str)) -> Self {
        Self { field, column }
    }
}

/// A table row type the mapper can persist.
pub trait Entity: Default + Send + Sync + Unpin + 'static {
    /// Primary key type. Must be an integer or UUID so the database can generate it.
    type Key: SqlField + Default + PartialEq + Clone + fmt::Debug;

    fn schema() -> EntitySchema<Self>;
}

type Reader<T> = Box<dyn Fn(&T) -> Result<Option<SqlValue>> + Send + Sync>;
type Writer<T> = Box<dyn Fn(&mut T, SqlValue) -> Result<()> + Send + Sync>;

struct FieldSpec<T> {
    name: FieldName,
    sql_type: SqlType,
    nullable: bool,
    is_key: bool,
    /// Kind of a key field, checked by [`describe`]
    key_kind: Option<FieldKind>,
    read: Reader<T>,
    write: Writer<T>,
}

/// Declarative description of an entity's table.
pub struct EntitySchema<T: Entity> {
    table: Option<String>,
    fields: Vec<FieldSpec<T>>,
    key_get: Option<fn(&T) -> &T::Key>,
}

impl<T: Entity> Default for EntitySchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> EntitySchema<T> {
    pub fn new() -> Self {
        Self {
            table: None,
            fields: Vec::new(),
            key_get: None,
        }
    }

    /// Override the table name (defaults to the type's bare name)
    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    /// Declare the primary key field. The key is generated by the database on insert.
    pub fn key(mut self, name: impl Into<FieldName>, get: fn(&T) -> &T::Key, get_mut: fn(&mut T) -> &mut T::Key) -> Self {
        let mut spec = scalar_spec(name.into(), get, get_mut);
        spec.is_key = true;
        spec.key_kind = Some(<T::Key as SqlField>::kind());
        self.fields.push(spec);
        self.key_get = Some(get);
        self
    }

    /// Declare a column whose type is derived from the field's Rust type.
    ///
    /// `F` must implement [`SqlField`]: scalars, `Option`s and `Vec`s of them, and
    /// `serde_json::Value`. Lists without a native array type are stored as JSON. Other
    /// structured types, such as your own structs, do not implement `SqlField`; declare those
    /// with [`json`](Self::json).
    pub fn field<F: SqlField>(mut self, name: impl Into<FieldName>, get: fn(&T) -> &F, get_mut: fn(&mut T) -> &mut F) -> Self {
        self.fields.push(scalar_spec(name.into(), get, get_mut));
        self
    }

    /// Declare a column stored as serialized JSON, whatever the field's type.
    ///
    /// The column is `NOT NULL` unless `F` accepts JSON `null` (an `Option`, for example).
    pub fn json<F>(mut self, name: impl Into<FieldName>, get: fn(&T) -> &F, get_mut: fn(&mut T) -> &mut F) -> Self
    where
        F: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.fields.push(json_spec(name.into(), get, get_mut));
        self
    }
}

fn scalar_spec<T, F>(name: FieldName, get: fn(&T) -> &F, get_mut: fn(&mut T) -> &mut F) -> FieldSpec<T>
where
    T: Entity,
    F: SqlField,
{
    let sql_type = sql_type_of(&F::kind(), false);
    if sql_type == SqlType::Json {
        // Shapes without a column mapping fall back to JSON encoding
        let mut spec = json_spec(name, get, get_mut);
        spec.nullable = F::nullable();
        return spec;
    }

    let column = name.column;
    FieldSpec {
        name,
        sql_type,
        nullable: F::nullable(),
        is_key: false,
        key_kind: None,
        read: Box::new(move |entity: &T| {
            let value = get(entity);
            Ok((!value.is_absent()).then(|| value.to_sql()))
        }),
        write: Box::new(move |entity: &mut T, value: SqlValue| {
            let decoded = F::from_sql(value).map_err(|rejected| DbError::TypeConversion {
                column: column.to_string(),
                message: format!("{} value cannot be read as {}", rejected.type_label(), sql_type),
            })?;
            *get_mut(entity) = decoded;
            Ok(())
        }),
    }
}

/// Whether `F` can hold an absent value, judged by whether it deserializes from JSON `null`.
///
/// `Option<_>`, `serde_json::Value` and `()` do; structs, maps and sequences do not.
fn accepts_null<F: DeserializeOwned>() -> bool {
    serde_json::from_value::<F>(serde_json::Value::Null).is_ok()
}

fn json_spec<T, F>(name: FieldName, get: fn(&T) -> &F, get_mut: fn(&mut T) -> &mut F) -> FieldSpec<T>
where
    T: Entity,
    F: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let column = name.column;
    FieldSpec {
        name,
        sql_type: SqlType::Json,
        nullable: accepts_null::<F>(),
        is_key: false,
        key_kind: None,
        read: Box::new(move |entity: &T| {
            let json = serde_json::to_value(get(entity)).map_err(|e| DbError::TypeMismatch {
                column: column.to_string(),
                message: e.to_string(),
            })?;
            Ok((!json.is_null()).then_some(SqlValue::Json(json)))
        }),
        write: Box::new(move |entity: &mut T, value: SqlValue| {
            let decoded = match value {
                SqlValue::Json(json) => serde_json::from_value(json),
                SqlValue::Text(text) => serde_json::from_str(&text),
                other => {
                    return Err(DbError::TypeConversion {
                        column: column.to_string(),
                        message: format!("{} value cannot be read as JSON", other.type_label()),
                    });
                }
            }
            .map_err(|e| DbError::TypeConversion {
                column: column.to_string(),
                message: e.to_string(),
            })?;
            *get_mut(entity) = decoded;
            Ok(())
        }),
    }
}

/// Column metadata of one table, independent of the entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub field: &'static str,
    pub column: &'static str,
    pub sql_type: SqlType,
    pub is_key: bool,
    pub nullable: bool,
}

/// Table-level metadata shared by the mapper, the predicate translator and the initializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDef>,
    key_index: usize,
}

impl TableSchema {
    pub fn key(&self) -> &ColumnDef {
        &self.columns[self.key_index]
    }

    /// Look up a column by the entity field name
    pub fn by_field(&self, field: &str) -> Option<(usize, &ColumnDef)> {
        self.columns.iter().enumerate().find(|(_, c)| c.field == field)
    }

    /// Look up a column by its database name
    pub fn by_column(&self, column: &str) -> Option<(usize, &ColumnDef)> {
        self.columns.iter().enumerate().find(|(_, c)| c.column == column)
    }

    pub fn non_key_columns(&self) -> impl Iterator<Item = (usize, &ColumnDef)> {
        self.columns.iter().enumerate().filter(|(_, c)| !c.is_key)
    }
}

/// Validated schema of an entity type, with accessors for every column.
pub struct SchemaDescriptor<T: Entity> {
    table: Arc<TableSchema>,
    readers: Vec<Reader<T>>,
    writers: Vec<Writer<T>>,
    key_get: fn(&T) -> &T::Key,
}

impl<T: Entity> SchemaDescriptor<T> {
    pub fn table(&self) -> &TableSchema {
        &self.table
    }

    pub fn shared_table(&self) -> Arc<TableSchema> {
        Arc::clone(&self.table)
    }

    pub fn key_of<'a>(&self, entity: &'a T) -> &'a T::Key {
        (self.key_get)(entity)
    }

    /// Read the value of column `index`, or `None` when the field is absent
    pub fn read(&self, index: usize, entity: &T) -> Result<Option<SqlValue>> {
        (self.readers[index])(entity)
    }

    pub fn write(&self, index: usize, entity: &mut T, value: SqlValue) -> Result<()> {
        (self.writers[index])(entity, value)
    }
}

impl<T: Entity> fmt::Debug for SchemaDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDescriptor").field("table", &self.table).finish()
    }
}

/// Double-quote an identifier for use in a statement
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Bare type name of `T`, used when the entity does not name its table
pub fn table_name_of<T>() -> String {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics.rsplit("::").next().unwrap_or(without_generics).to_string()
}

/// Build and validate the descriptor of an entity type.
pub fn describe<T: Entity>() -> Result<SchemaDescriptor<T>> {
    let schema = T::schema();
    let table = schema.table.unwrap_or_else(table_name_of::<T>);
    let configuration = |message: String| DbError::Configuration {
        entity: table_name_of::<T>(),
        message,
    };

    let keys: Vec<usize> = schema.fields.iter().enumerate().filter(|(_, f)| f.is_key).map(|(i, _)| i).collect();
    let (key_index, key_get) = match (keys.as_slice(), schema.key_get) {
        ([index], Some(get)) => (*index, get),
        ([], _) => return Err(configuration("no primary key declared".to_string())),
        _ => return Err(configuration(format!("{} primary keys declared, expected exactly one", keys.len()))),
    };

    let key = &schema.fields[key_index];
    let generated = matches!(
        key.key_kind,
        Some(FieldKind::I64 | FieldKind::I32 | FieldKind::I16 | FieldKind::Uuid)
    );
    if !generated || key.nullable {
        return Err(configuration(format!(
            "primary key {} must be a non-optional integer or UUID",
            key.name.field
        )));
    }

    let mut seen = HashSet::new();
    for field in &schema.fields {
        if !seen.insert(field.name.column) {
            return Err(configuration(format!("column {} declared more than once", field.name.column)));
        }
    }

    let mut columns = Vec::with_capacity(schema.fields.len());
    let mut readers = Vec::with_capacity(schema.fields.len());
    let mut writers = Vec::with_capacity(schema.fields.len());
    for spec in schema.fields {
        columns.push(ColumnDef {
            field: spec.name.field,
            column: spec.name.column,
            sql_type: spec.sql_type,
            is_key: spec.is_key,
            nullable: spec.nullable,
        });
        readers.push(spec.read);
        writers.push(spec.write);
    }

    Ok(SchemaDescriptor {
        table: Arc::new(TableSchema { table, columns, key_index }),
        readers,
        writers,
        key_get,
    })
}
