//! Startup reconciliation of declared entity schemas with the live database.
//!
//! For every registered table the initializer either creates it or, when it already exists,
//! checks that each declared column is present with a compatible type. Existing tables are never
//! altered.

use std::collections::HashMap;

use serde::Serialize;
use sqlx::PgConnection;
use tracing::{debug, info, instrument};

use crate::db::{
    errors::{DbError, Result},
    registry::SchemaRegistry,
    schema::{ScalarType, SqlType, TableSchema, quote_ident},
};

/// What the initializer did with one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableOutcome {
    Created,
    Validated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub outcome: TableOutcome,
}

/// Type pairs accepted in addition to an exact match, as (existing, declared)
const COMPATIBLE_TYPES: &[(&str, &str)] = &[
    ("double precision", "real"),
    ("numeric", "real"),
    ("timestamp without time zone", "timestamp"),
    ("integer", "bigint"),
];

/// Lowercase a catalog type name, drop type modifiers and collapse whitespace
fn normalize_type(name: &str) -> String {
    let mut stripped = String::with_capacity(name.len());
    let mut depth = 0usize;
    for c in name.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }
    stripped.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Whether a column stored as `existing` can hold values declared as `declared`
pub fn is_compatible(existing: &str, declared: &SqlType) -> bool {
    let existing = normalize_type(existing);
    let catalog = declared.catalog_name();
    let ddl = declared.ddl_name().to_lowercase();
    if existing == catalog || existing == ddl {
        return true;
    }

    COMPATIBLE_TYPES
        .iter()
        .any(|(stored, wanted)| existing == *stored && (catalog == *wanted || ddl == *wanted))
}

/// `CREATE TABLE IF NOT EXISTS` statement for a table
pub fn create_table_sql(table: &TableSchema) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|column| {
            let name = quote_ident(column.column);
            if column.is_key {
                let key_type = match column.sql_type {
                    SqlType::Scalar(ScalarType::BigInt) => "BIGSERIAL PRIMARY KEY",
                    SqlType::Scalar(ScalarType::SmallInt) => "SMALLSERIAL PRIMARY KEY",
                    SqlType::Scalar(ScalarType::Uuid) => "UUID PRIMARY KEY DEFAULT gen_random_uuid()",
                    _ => "SERIAL PRIMARY KEY",
                };
                format!("{name} {key_type}")
            } else if column.nullable {
                format!("{name} {}", column.sql_type.ddl_name())
            } else {
                format!("{name} {} NOT NULL", column.sql_type.ddl_name())
            }
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(&table.table),
        columns.join(", ")
    )
}

/// Check declared columns against the live ones (column name to catalog type)
pub fn validate_columns(table: &TableSchema, existing: &HashMap<String, String>) -> Result<()> {
    for column in &table.columns {
        let Some(existing_type) = existing.get(column.column) else {
            return Err(DbError::MissingColumn {
                table: table.table.clone(),
                column: column.column.to_string(),
            });
        };

        if !is_compatible(existing_type, &column.sql_type) {
            return Err(DbError::IncompatibleType {
                table: table.table.clone(),
                column: column.column.to_string(),
                existing: existing_type.clone(),
                declared: column.sql_type.ddl_name(),
            });
        }
    }
    Ok(())
}

pub struct SchemaInitializer<'c> {
    db: &'c mut PgConnection,
}

impl<'c> SchemaInitializer<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Create or validate every registered table, in registration order.
    ///
    /// Stops at the first failing table.
    #[instrument(skip_all, err)]
    pub async fn run(&mut self, registry: &SchemaRegistry) -> Result<Vec<TableReport>> {
        let mut reports = Vec::with_capacity(registry.tables().len());
        for table in registry.tables() {
            let outcome = self.initialize(table).await?;
            reports.push(TableReport {
                table: table.table.clone(),
                outcome,
            });
        }
        Ok(reports)
    }

    #[instrument(skip(self, table), fields(table = %table.table), err)]
    pub async fn initialize(&mut self, table: &TableSchema) -> Result<TableOutcome> {
        if self.table_exists(&table.table).await? {
            let existing = self.existing_columns(&table.table).await?;
            validate_columns(table, &existing)?;
            debug!("Existing table matches declared schema");
            return Ok(TableOutcome::Validated);
        }

        sqlx::query(&create_table_sql(table)).execute(&mut *self.db).await?;
        info!(columns = table.columns.len(), "Created table");
        Ok(TableOutcome::Created)
    }

    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = $1)",
        )
        .bind(table)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(exists)
    }

    async fn existing_columns(&mut self, table: &str) -> Result<HashMap<String, String>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT a.attname::text, format_type(a.atttypid, a.atttypmod) \
             FROM pg_attribute a \
             JOIN pg_class c ON c.oid = a.attrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = current_schema() AND c.relname = $1 AND a.attnum > 0 AND NOT a.attisdropped",
        )
        .bind(table)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{Entity, EntitySchema, describe};
    use uuid::Uuid;

    #[derive(Debug, Default)]
    struct Tag {
        id: i64,
        name: Option<String>,
    }

    impl Entity for Tag {
        type Key = i64;

        fn schema() -> EntitySchema<Self> {
            EntitySchema::<Self>::new()
                .key(("id", "Id"), |t| &t.id, |t| &mut t.id)
                .field(("name", "Name"), |t| &t.name, |t| &mut t.name)
        }
    }

    #[derive(Debug, Default)]
    struct Upload {
        id: Uuid,
        size: i32,
        labels: Vec<String>,
        meta: Option<serde_json::Value>,
    }

    impl Entity for Upload {
        type Key = Uuid;

        fn schema() -> EntitySchema<Self> {
            EntitySchema::<Self>::new()
                .table("uploads")
                .key("id", |u| &u.id, |u| &mut u.id)
                .field("size", |u| &u.size, |u| &mut u.size)
                .field("labels", |u| &u.labels, |u| &mut u.labels)
                .json("meta", |u| &u.meta, |u| &mut u.meta)
        }
    }

    #[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
    struct Layout {
        columns: u8,
    }

    #[derive(Debug, Default)]
    struct Page {
        id: i64,
        layout: Layout,
        notes: Option<Layout>,
    }

    impl Entity for Page {
        type Key = i64;

        fn schema() -> EntitySchema<Self> {
            EntitySchema::<Self>::new()
                .table("pages")
                .key("id", |p| &p.id, |p| &mut p.id)
                .json("layout", |p| &p.layout, |p| &mut p.layout)
                .json("notes", |p| &p.notes, |p| &mut p.notes)
        }
    }

    fn tag_table() -> TableSchema {
        describe::<Tag>().unwrap().table().clone()
    }

    #[test]
    fn test_create_table_sql() {
        assert_eq!(
            create_table_sql(&tag_table()),
            "CREATE TABLE IF NOT EXISTS \"Tag\" (\"Id\" BIGSERIAL PRIMARY KEY, \"Name\" TEXT)"
        );
        assert_eq!(
            create_table_sql(describe::<Upload>().unwrap().table()),
            "CREATE TABLE IF NOT EXISTS \"uploads\" (\"id\" UUID PRIMARY KEY DEFAULT gen_random_uuid(), \
             \"size\" INTEGER NOT NULL, \"labels\" TEXT[] NOT NULL, \"meta\" JSONB)"
        );
    }

    #[test]
    fn test_required_json_column_is_not_null() {
        assert_eq!(
            create_table_sql(describe::<Page>().unwrap().table()),
            "CREATE TABLE IF NOT EXISTS \"pages\" (\"id\" BIGSERIAL PRIMARY KEY, \"layout\" JSONB NOT NULL, \"notes\" JSONB)"
        );
    }

    #[test]
    fn test_exact_matches_ignore_case_and_modifiers() {
        assert!(is_compatible("BIGINT", &SqlType::Scalar(ScalarType::BigInt)));
        assert!(is_compatible("text", &SqlType::Scalar(ScalarType::Text)));
        assert!(is_compatible("numeric(10,2)", &SqlType::Scalar(ScalarType::Numeric)));
        assert!(is_compatible(
            "timestamp(3) without time zone",
            &SqlType::Scalar(ScalarType::Timestamp)
        ));
        assert!(is_compatible("bigint[]", &SqlType::Array(ScalarType::BigInt)));
        assert!(is_compatible("jsonb", &SqlType::Json));
    }

    #[test]
    fn test_compatible_pairs() {
        assert!(is_compatible("double precision", &SqlType::Scalar(ScalarType::Real)));
        assert!(is_compatible("numeric", &SqlType::Scalar(ScalarType::Real)));
        assert!(is_compatible("integer", &SqlType::Scalar(ScalarType::BigInt)));
    }

    #[test]
    fn test_incompatible_types() {
        assert!(!is_compatible("bigint", &SqlType::Scalar(ScalarType::Integer)));
        assert!(!is_compatible("real", &SqlType::Scalar(ScalarType::Double)));
        assert!(!is_compatible("text", &SqlType::Json));
        assert!(!is_compatible("json", &SqlType::Json));
        assert!(!is_compatible("integer[]", &SqlType::Array(ScalarType::BigInt)));
    }

    #[test]
    fn test_validate_columns() {
        let table = tag_table();
        let mut existing = HashMap::from([
            ("Id".to_string(), "integer".to_string()),
            ("Name".to_string(), "text".to_string()),
            ("Extra".to_string(), "boolean".to_string()),
        ]);
        validate_columns(&table, &existing).unwrap();

        existing.insert("Name".to_string(), "boolean".to_string());
        let err = validate_columns(&table, &existing).unwrap_err();
        assert!(matches!(err, DbError::IncompatibleType { ref column, .. } if column == "Name"));

        existing.remove("Name");
        let err = validate_columns(&table, &existing).unwrap_err();
        assert!(matches!(err, DbError::MissingColumn { ref column, .. } if column == "Name"));
    }

    #[test]
    fn test_column_names_are_case_sensitive() {
        let existing = HashMap::from([
            ("id".to_string(), "bigint".to_string()),
            ("name".to_string(), "text".to_string()),
        ]);
        assert!(matches!(
            validate_columns(&tag_table(), &existing),
            Err(DbError::MissingColumn { .. })
        ));
    }
}
