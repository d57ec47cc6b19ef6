//! Generic CRUD over any registered [`Entity`].
//!
//! A [`Mapper`] borrows one connection for its lifetime, in the same way the repositories in
//! [`crate::db::handlers`] do, and runs exactly one statement per operation. Statements are built
//! from the entity's [`SchemaDescriptor`]: identifiers come from the schema and are quoted, values
//! are always bound as parameters.
//!
//! ```ignore
//! let mut conn = pool.acquire().await?;
//! let mut tags = registry.mapper::<Tag>(&mut conn)?;
//!
//! let id = tags.insert(&Tag { name: Some("rust".into()), ..Default::default() }).await?;
//! let page = tags.get_page(1, 20, None, Some(OrderBy::desc("id"))).await?;
//! ```

use std::sync::Arc;

use sqlx::{
    Column, PgConnection, Row,
    postgres::{PgArguments, PgRow},
};
use tracing::instrument;

use crate::db::{
    errors::{DbError, Result},
    predicate::{Predicate, translate},
    schema::{Entity, ScalarType, SchemaDescriptor, SqlType, TableSchema, quote_ident},
    value::{self, BindError, SqlField, SqlValue, coerce},
};

/// Sort order of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// A statement parameter, tagged with the column it is bound against
#[derive(Debug, Clone, PartialEq)]
struct Bound {
    column: &'static str,
    value: SqlValue,
    sql_type: SqlType,
}

/// SQL text plus its parameters in placeholder order
#[derive(Debug, Clone, PartialEq)]
struct Statement {
    sql: String,
    params: Vec<Bound>,
}

impl Statement {
    fn arguments(self) -> Result<(String, PgArguments)> {
        let mut args = PgArguments::default();
        for param in self.params {
            value::bind(&mut args, param.value, &param.sql_type).map_err(|e| match e {
                BindError::Mismatch { .. } => DbError::TypeMismatch {
                    column: param.column.to_string(),
                    message: e.to_string(),
                },
                BindError::Encode(source) => {
                    DbError::Other(anyhow::anyhow!("failed to encode {}: {source}", param.column))
                }
            })?;
        }
        Ok((self.sql, args))
    }
}

/// Quoted column list for a `SELECT`, limited to `select` when given
fn select_list(table: &TableSchema, select: Option<&[&str]>) -> Result<String> {
    let columns = match select {
        None => table.columns.iter().map(|c| quote_ident(c.column)).collect::<Vec<_>>(),
        Some([]) => {
            return Err(DbError::InvalidArgument {
                message: "select list must name at least one field".to_string(),
            });
        }
        Some(fields) => fields
            .iter()
            .map(|field| {
                table
                    .by_field(field)
                    .map(|(_, c)| quote_ident(c.column))
                    .ok_or_else(|| DbError::InvalidArgument {
                        message: format!("{} has no field named {field}", table.table),
                    })
            })
            .collect::<Result<Vec<_>>>()?,
    };
    Ok(columns.join(", "))
}

fn order_clause(table: &TableSchema, order: Option<&OrderBy>) -> Result<String> {
    let Some(order) = order else {
        return Ok(format!("ORDER BY {} ASC", quote_ident(table.key().column)));
    };

    let (_, column) = table.by_field(&order.field).ok_or_else(|| DbError::InvalidArgument {
        message: format!("cannot order by unknown field {}", order.field),
    })?;
    if !matches!(column.sql_type, SqlType::Scalar(_)) {
        return Err(DbError::InvalidArgument {
            message: format!("cannot order by {}, a {} column", order.field, column.sql_type),
        });
    }

    let direction = if order.descending { "DESC" } else { "ASC" };
    Ok(format!("ORDER BY {} {direction}", quote_ident(column.column)))
}

/// Coerce a caller-supplied key into the key column's type
fn key_param(table: &TableSchema, id: SqlValue) -> Result<Bound> {
    let key = table.key();
    let SqlType::Scalar(scalar) = key.sql_type else {
        return Err(DbError::Configuration {
            entity: table.table.clone(),
            message: "primary key is not a scalar column".to_string(),
        });
    };
    let mismatch = |label: &str| DbError::TypeMismatch {
        column: key.column.to_string(),
        message: format!("{label} value cannot be used as a {} key", key.sql_type),
    };

    match coerce(id, scalar) {
        Ok(SqlValue::Null) => Err(mismatch("null")),
        Ok(value) => Ok(Bound {
            column: key.column,
            value,
            sql_type: key.sql_type,
        }),
        Err(rejected) => Err(mismatch(rejected.type_label())),
    }
}

fn select_all_statement(table: &TableSchema, order: Option<&OrderBy>) -> Result<Statement> {
    Ok(Statement {
        sql: format!(
            "SELECT {} FROM {} {}",
            select_list(table, None)?,
            quote_ident(&table.table),
            order_clause(table, order)?
        ),
        params: Vec::new(),
    })
}

fn page_statement(
    table: &TableSchema,
    page: i64,
    page_size: i64,
    select: Option<&[&str]>,
    order: Option<&OrderBy>,
) -> Result<Statement> {
    if page < 1 || page_size < 1 {
        return Err(DbError::InvalidArgument {
            message: format!("page and page size must be at least 1 (got page {page}, page size {page_size})"),
        });
    }
    let offset = (page - 1).checked_mul(page_size).ok_or_else(|| DbError::InvalidArgument {
        message: format!("page {page} of size {page_size} is out of range"),
    })?;

    let paging = |column: &'static str, value: i64| Bound {
        column,
        value: SqlValue::BigInt(value),
        sql_type: SqlType::Scalar(ScalarType::BigInt),
    };
    Ok(Statement {
        sql: format!(
            "SELECT {} FROM {} {} LIMIT $1 OFFSET $2",
            select_list(table, select)?,
            quote_ident(&table.table),
            order_clause(table, order)?
        ),
        params: vec![paging("limit", page_size), paging("offset", offset)],
    })
}

fn by_id_statement(table: &TableSchema, id: SqlValue) -> Result<Statement> {
    let key = key_param(table, id)?;
    Ok(Statement {
        sql: format!(
            "SELECT {} FROM {} WHERE {} = {}",
            select_list(table, None)?,
            quote_ident(&table.table),
            quote_ident(table.key().column),
            value::placeholder(1, &key.sql_type)
        ),
        params: vec![key],
    })
}

fn where_params(table: &TableSchema, predicate: &Predicate) -> Result<(String, Vec<Bound>)> {
    let clause = translate(predicate, table, 1)?;
    let params = clause
        .params
        .into_iter()
        .map(|param| Bound {
            column: param.column,
            value: param.value,
            sql_type: param.sql_type,
        })
        .collect();
    Ok((clause.sql, params))
}

fn predicate_statement(table: &TableSchema, predicate: &Predicate, select: Option<&[&str]>) -> Result<Statement> {
    let (condition, params) = where_params(table, predicate)?;
    Ok(Statement {
        sql: format!(
            "SELECT {} FROM {} WHERE {condition} {}",
            select_list(table, select)?,
            quote_ident(&table.table),
            order_clause(table, None)?
        ),
        params,
    })
}

fn count_statement(table: &TableSchema, predicate: Option<&Predicate>) -> Result<Statement> {
    let mut sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&table.table));
    let mut params = Vec::new();
    if let Some(predicate) = predicate {
        let (condition, bound) = where_params(table, predicate)?;
        sql.push_str(" WHERE ");
        sql.push_str(&condition);
        params = bound;
    }
    Ok(Statement { sql, params })
}

fn insert_statement<T: Entity>(descriptor: &SchemaDescriptor<T>, entity: &T) -> Result<Statement> {
    let table = descriptor.table();
    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    let mut params = Vec::new();

    for (index, column) in table.non_key_columns() {
        let Some(value) = descriptor.read(index, entity)? else {
            continue;
        };
        placeholders.push(value::placeholder(params.len() + 1, &column.sql_type));
        columns.push(quote_ident(column.column));
        params.push(Bound {
            column: column.column,
            value,
            sql_type: column.sql_type,
        });
    }

    let returning = quote_ident(table.key().column);
    let sql = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {returning}", quote_ident(&table.table))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {returning}",
            quote_ident(&table.table),
            columns.join(", "),
            placeholders.join(", ")
        )
    };
    Ok(Statement { sql, params })
}

fn update_statement<T: Entity>(descriptor: &SchemaDescriptor<T>, entity: &T) -> Result<Statement> {
    let table = descriptor.table();
    let key = descriptor.key_of(entity);
    if *key == T::Key::default() {
        return Err(DbError::MissingKey {
            table: table.table.clone(),
        });
    }

    let mut assignments = Vec::new();
    let mut params = Vec::new();
    for (index, column) in table.non_key_columns() {
        let Some(value) = descriptor.read(index, entity)? else {
            continue;
        };
        assignments.push(format!(
            "{} = {}",
            quote_ident(column.column),
            value::placeholder(params.len() + 1, &column.sql_type)
        ));
        params.push(Bound {
            column: column.column,
            value,
            sql_type: column.sql_type,
        });
    }

    if assignments.is_empty() {
        return Err(DbError::InvalidArgument {
            message: format!("update of {} has no fields to set", table.table),
        });
    }

    let key_column = table.key();
    params.push(Bound {
        column: key_column.column,
        value: key.to_sql(),
        sql_type: key_column.sql_type,
    });
    Ok(Statement {
        sql: format!(
            "UPDATE {} SET {} WHERE {} = {}",
            quote_ident(&table.table),
            assignments.join(", "),
            quote_ident(key_column.column),
            value::placeholder(params.len(), &key_column.sql_type)
        ),
        params,
    })
}

fn delete_statement(table: &TableSchema, id: SqlValue) -> Result<Statement> {
    let key = key_param(table, id)?;
    Ok(Statement {
        sql: format!(
            "DELETE FROM {} WHERE {} = {}",
            quote_ident(&table.table),
            quote_ident(table.key().column),
            value::placeholder(1, &key.sql_type)
        ),
        params: vec![key],
    })
}

/// Generic data access for one entity type over a borrowed connection
pub struct Mapper<'c, T: Entity> {
    db: &'c mut PgConnection,
    descriptor: Arc<SchemaDescriptor<T>>,
}

impl<'c, T: Entity> Mapper<'c, T> {
    pub fn new(db: &'c mut PgConnection, descriptor: Arc<SchemaDescriptor<T>>) -> Self {
        Self { db, descriptor }
    }

    pub fn table(&self) -> &TableSchema {
        self.descriptor.table()
    }

    /// Every row, ordered by `order` or by key ascending
    #[instrument(skip(self), fields(table = %self.table().table), err)]
    pub async fn get_all(&mut self, order: Option<OrderBy>) -> Result<Vec<T>> {
        let statement = select_all_statement(self.table(), order.as_ref())?;
        self.fetch_all(statement).await
    }

    /// One page of rows. Fields not named in `select` keep their default value.
    #[instrument(skip(self), fields(table = %self.table().table), err)]
    pub async fn get_page(
        &mut self,
        page: i64,
        page_size: i64,
        select: Option<&[&str]>,
        order: Option<OrderBy>,
    ) -> Result<Vec<T>> {
        let statement = page_statement(self.table(), page, page_size, select, order.as_ref())?;
        self.fetch_all(statement).await
    }

    #[instrument(skip(self, id), fields(table = %self.table().table), err)]
    pub async fn get_by_id(&mut self, id: impl Into<SqlValue> + Send) -> Result<Option<T>> {
        let statement = by_id_statement(self.table(), id.into())?;
        let (sql, args) = statement.arguments()?;
        let row = sqlx::query_with(&sql, args).fetch_optional(&mut *self.db).await?;
        row.map(|row| self.decode_row(&row)).transpose()
    }

    #[instrument(skip(self), fields(table = %self.table().table), err)]
    pub async fn get_by_predicate(&mut self, predicate: &Predicate, select: Option<&[&str]>) -> Result<Vec<T>> {
        let statement = predicate_statement(self.table(), predicate, select)?;
        self.fetch_all(statement).await
    }

    #[instrument(skip(self), fields(table = %self.table().table), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let statement = count_statement(self.table(), None)?;
        self.fetch_count(statement).await
    }

    #[instrument(skip(self), fields(table = %self.table().table), err)]
    pub async fn count_by_predicate(&mut self, predicate: &Predicate) -> Result<i64> {
        let statement = count_statement(self.table(), Some(predicate))?;
        self.fetch_count(statement).await
    }

    /// Insert `entity` and return the key generated by the database.
    ///
    /// The key field is never written and absent fields are left to their column defaults.
    #[instrument(skip(self, entity), fields(table = %self.table().table), err)]
    pub async fn insert(&mut self, entity: &T) -> Result<T::Key> {
        let statement = insert_statement(&self.descriptor, entity)?;
        let (sql, args) = statement.arguments()?;
        let row = sqlx::query_with(&sql, args).fetch_one(&mut *self.db).await?;

        let key_column = self.table().key().column;
        let value = value::decode(&row, 0).map_err(|e| DbError::TypeConversion {
            column: key_column.to_string(),
            message: e.to_string(),
        })?;
        T::Key::from_sql(value).map_err(|rejected| DbError::TypeConversion {
            column: key_column.to_string(),
            message: format!("generated key is a {} value", rejected.type_label()),
        })
    }

    /// Write every present non-key field of `entity` to the row with the same key.
    ///
    /// Returns the number of rows affected; updating a key that does not exist is not an error.
    #[instrument(skip(self, entity), fields(table = %self.table().table), err)]
    pub async fn update(&mut self, entity: &T) -> Result<u64> {
        let statement = update_statement(&self.descriptor, entity)?;
        let (sql, args) = statement.arguments()?;
        let result = sqlx::query_with(&sql, args).execute(&mut *self.db).await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, id), fields(table = %self.table().table), err)]
    pub async fn delete(&mut self, id: impl Into<SqlValue> + Send) -> Result<u64> {
        let statement = delete_statement(self.table(), id.into())?;
        let (sql, args) = statement.arguments()?;
        let result = sqlx::query_with(&sql, args).execute(&mut *self.db).await?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&mut self, statement: Statement) -> Result<Vec<T>> {
        let (sql, args) = statement.arguments()?;
        let rows = sqlx::query_with(&sql, args).fetch_all(&mut *self.db).await?;
        rows.iter().map(|row| self.decode_row(row)).collect()
    }

    async fn fetch_count(&mut self, statement: Statement) -> Result<i64> {
        let (sql, args) = statement.arguments()?;
        let count = sqlx::query_scalar_with::<_, i64, _>(&sql, args)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }

    /// Build an entity from a row. Nulls and columns the entity does not declare keep the default.
    fn decode_row(&self, row: &PgRow) -> Result<T> {
        let table = self.table();
        let mut entity = T::default();

        for (position, column) in row.columns().iter().enumerate() {
            let Some((index, declared)) = table.by_column(column.name()) else {
                continue;
            };
            let value = value::decode(row, position).map_err(|e| DbError::TypeConversion {
                column: declared.column.to_string(),
                message: e.to_string(),
            })?;
            if value.is_null() {
                continue;
            }
            self.descriptor.write(index, &mut entity, value)?;
        }

        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{EntitySchema, describe};

    #[derive(Debug, Default, Clone, PartialEq)]
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
    struct Note {
        id: i64,
        title: String,
        tag_ids: Option<Vec<i64>>,
        body: Option<serde_json::Value>,
    }

    impl Entity for Note {
        type Key = i64;

        fn schema() -> EntitySchema<Self> {
            EntitySchema::<Self>::new()
                .table("notes")
                .key("id", |n| &n.id, |n| &mut n.id)
                .field("title", |n| &n.title, |n| &mut n.title)
                .field("tag_ids", |n| &n.tag_ids, |n| &mut n.tag_ids)
                .json("body", |n| &n.body, |n| &mut n.body)
        }
    }

    fn tags() -> SchemaDescriptor<Tag> {
        describe::<Tag>().unwrap()
    }

    #[test]
    fn test_select_all_defaults_to_key_order() {
        let statement = select_all_statement(tags().table(), None).unwrap();
        assert_eq!(statement.sql, "SELECT \"Id\", \"Name\" FROM \"Tag\" ORDER BY \"Id\" ASC");
        assert!(statement.params.is_empty());

        let statement = select_all_statement(tags().table(), Some(&OrderBy::desc("name"))).unwrap();
        assert!(statement.sql.ends_with("ORDER BY \"Name\" DESC"));
    }

    #[test]
    fn test_order_by_unknown_or_json_field() {
        let notes = describe::<Note>().unwrap();
        assert!(matches!(
            select_all_statement(notes.table(), Some(&OrderBy::asc("missing"))),
            Err(DbError::InvalidArgument { .. })
        ));
        assert!(matches!(
            select_all_statement(notes.table(), Some(&OrderBy::asc("body"))),
            Err(DbError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_page_offsets() {
        let table = tags().table().clone();

        let statement = page_statement(&table, 1, 10, None, None).unwrap();
        assert!(statement.sql.ends_with("LIMIT $1 OFFSET $2"));
        assert_eq!(statement.params[0].value, SqlValue::BigInt(10));
        assert_eq!(statement.params[1].value, SqlValue::BigInt(0));

        let statement = page_statement(&table, 3, 2, None, None).unwrap();
        assert_eq!(statement.params[1].value, SqlValue::BigInt(4));
    }

    #[test]
    fn test_page_bounds() {
        let table = tags().table().clone();
        for (page, size) in [(0, 10), (1, 0), (-1, 5)] {
            assert!(matches!(
                page_statement(&table, page, size, None, None),
                Err(DbError::InvalidArgument { .. })
            ));
        }
        assert!(matches!(
            page_statement(&table, i64::MAX, 2, None, None),
            Err(DbError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_page_select_list() {
        let table = tags().table().clone();
        let statement = page_statement(&table, 1, 5, Some(&["name"][..]), None).unwrap();
        assert!(statement.sql.starts_with("SELECT \"Name\" FROM \"Tag\""));

        assert!(matches!(
            page_statement(&table, 1, 5, Some(&["Name"][..]), None),
            Err(DbError::InvalidArgument { .. })
        ));
        assert!(matches!(
            page_statement(&table, 1, 5, Some(&[][..]), None),
            Err(DbError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_by_id_coerces_key() {
        let table = tags().table().clone();
        let statement = by_id_statement(&table, SqlValue::Integer(7)).unwrap();
        assert_eq!(statement.sql, "SELECT \"Id\", \"Name\" FROM \"Tag\" WHERE \"Id\" = $1");
        assert_eq!(statement.params[0].value, SqlValue::BigInt(7));

        let statement = by_id_statement(&table, SqlValue::from("12")).unwrap();
        assert_eq!(statement.params[0].value, SqlValue::BigInt(12));

        assert!(matches!(
            by_id_statement(&table, SqlValue::from("twelve")),
            Err(DbError::TypeMismatch { .. })
        ));
        assert!(matches!(
            by_id_statement(&table, SqlValue::Null),
            Err(DbError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_predicate_and_count_statements() {
        let table = tags().table().clone();
        let predicate = Predicate::eq("name", "rust");

        let statement = predicate_statement(&table, &predicate, None).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT \"Id\", \"Name\" FROM \"Tag\" WHERE \"Name\" = $1 ORDER BY \"Id\" ASC"
        );
        assert_eq!(statement.params[0].value, SqlValue::Text("rust".to_string()));

        let statement = count_statement(&table, Some(&predicate)).unwrap();
        assert_eq!(statement.sql, "SELECT COUNT(*) FROM \"Tag\" WHERE \"Name\" = $1");

        let statement = count_statement(&table, None).unwrap();
        assert_eq!(statement.sql, "SELECT COUNT(*) FROM \"Tag\"");
    }

    #[test]
    fn test_insert_skips_key_and_absent_fields() {
        let descriptor = tags();
        let statement = insert_statement(
            &descriptor,
            &Tag {
                id: 99,
                name: Some("rust".to_string()),
            },
        )
        .unwrap();
        assert_eq!(statement.sql, "INSERT INTO \"Tag\" (\"Name\") VALUES ($1) RETURNING \"Id\"");
        assert_eq!(statement.params.len(), 1);

        let statement = insert_statement(&descriptor, &Tag::default()).unwrap();
        assert_eq!(statement.sql, "INSERT INTO \"Tag\" DEFAULT VALUES RETURNING \"Id\"");
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_insert_casts_json_columns() {
        let descriptor = describe::<Note>().unwrap();
        let note = Note {
            title: "hello".to_string(),
            tag_ids: Some(vec![1, 2]),
            body: Some(serde_json::json!({"blocks": []})),
            ..Default::default()
        };
        let statement = insert_statement(&descriptor, &note).unwrap();
        assert_eq!(
            statement.sql,
            "INSERT INTO \"notes\" (\"title\", \"tag_ids\", \"body\") VALUES ($1, $2, $3::jsonb) RETURNING \"id\""
        );
        assert_eq!(statement.params[2].sql_type, SqlType::Json);
    }

    #[test]
    fn test_update_requires_key() {
        let err = update_statement(
            &tags(),
            &Tag {
                id: 0,
                name: Some("rust".to_string()),
            },
        )
        .unwrap_err();
        assert!(matches!(err, DbError::MissingKey { .. }));
    }

    #[test]
    fn test_update_statement() {
        let statement = update_statement(
            &tags(),
            &Tag {
                id: 4,
                name: Some("go".to_string()),
            },
        )
        .unwrap();
        assert_eq!(statement.sql, "UPDATE \"Tag\" SET \"Name\" = $1 WHERE \"Id\" = $2");
        assert_eq!(statement.params[1].value, SqlValue::BigInt(4));

        let err = update_statement(&tags(), &Tag { id: 4, name: None }).unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument { .. }));
    }

    #[test]
    fn test_delete_statement() {
        let statement = delete_statement(tags().table(), SqlValue::BigInt(5)).unwrap();
        assert_eq!(statement.sql, "DELETE FROM \"Tag\" WHERE \"Id\" = $1");
    }

    #[test]
    fn test_arguments_report_the_column() {
        let statement = Statement {
            sql: String::new(),
            params: vec![Bound {
                column: "Name",
                value: SqlValue::Boolean(true),
                sql_type: SqlType::Scalar(ScalarType::Text),
            }],
        };
        let err = statement.arguments().unwrap_err();
        assert!(matches!(err, DbError::TypeMismatch { column, .. } if column == "Name"));
    }
}
