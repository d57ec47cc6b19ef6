//! Filter predicates over a single entity and their translation into SQL.
//!
//! Predicates are small trees built with helper constructors:
//!
//! ```ignore
//! let filter = Predicate::eq("name", "rust").or(Predicate::gt("id", 10));
//! ```
//!
//! [`translate`] turns a predicate into a parameterized `WHERE` fragment. Identifiers always come
//! from the table schema, values are always bound.

use std::fmt;

use crate::db::{
    errors::{DbError, Result},
    schema::{SqlType, TableSchema, quote_ident},
    value::{SqlValue, coerce},
};

/// Comparison operators supported in predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A boolean condition over the fields of one entity
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare { field: String, op: CompareOp, value: SqlValue },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<SqlValue>) -> Self {
        Predicate::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    /// Conjunction; nested conjunctions are flattened
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut items) => {
                items.push(other);
                Predicate::And(items)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    /// Disjunction; nested disjunctions are flattened
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut items) => {
                items.push(other);
                Predicate::Or(items)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }
}

/// A bound statement parameter produced by [`translate`]
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Stable name of the parameter (`p0`, `p1`, ...)
    pub name: String,
    /// Column the value is compared against
    pub column: &'static str,
    pub value: SqlValue,
    pub sql_type: SqlType,
}

/// A rendered `WHERE` fragment (without the keyword) and its parameters in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub sql: String,
    pub params: Vec<Param>,
}

struct Translator<'a> {
    table: &'a TableSchema,
    first_placeholder: usize,
    params: Vec<Param>,
}

impl Translator<'_> {
    fn render(&mut self, predicate: &Predicate) -> Result<String> {
        match predicate {
            Predicate::Compare { field, op, value } => self.render_compare(field, *op, value),
            Predicate::And(items) => self.render_compound(items, "AND"),
            Predicate::Or(items) => self.render_compound(items, "OR"),
        }
    }

    fn render_compound(&mut self, items: &[Predicate], joiner: &str) -> Result<String> {
        if items.is_empty() {
            return Err(DbError::UnsupportedExpression {
                message: format!("empty {joiner} has no condition to translate"),
            });
        }

        let parts = items.iter().map(|item| self.render(item)).collect::<Result<Vec<_>>>()?;
        if parts.len() == 1 {
            return Ok(parts.into_iter().collect());
        }
        Ok(format!("({})", parts.join(&format!(" {joiner} "))))
    }

    fn render_compare(&mut self, field: &str, op: CompareOp, value: &SqlValue) -> Result<String> {
        let (_, column) = self.table.by_field(field).ok_or_else(|| DbError::UnsupportedExpression {
            message: format!("{} has no field named {field}", self.table.table),
        })?;

        let scalar = match column.sql_type {
            SqlType::Scalar(scalar) => scalar,
            other => {
                return Err(DbError::UnsupportedExpression {
                    message: format!("cannot compare {field}, a {other} column"),
                });
            }
        };

        if value.is_null() {
            return match op {
                CompareOp::Eq => Ok(format!("{} IS NULL", quote_ident(column.column))),
                CompareOp::Ne => Ok(format!("{} IS NOT NULL", quote_ident(column.column))),
                _ => Err(DbError::UnsupportedExpression {
                    message: format!("{field} {op} null has no defined result"),
                }),
            };
        }

        let coerced = coerce(value.clone(), scalar).map_err(|rejected| DbError::TypeMismatch {
            column: column.column.to_string(),
            message: format!("{} value cannot be compared with {}", rejected.type_label(), column.sql_type),
        })?;

        let index = self.params.len();
        self.params.push(Param {
            name: format!("p{index}"),
            column: column.column,
            value: coerced,
            sql_type: column.sql_type,
        });
        Ok(format!("{} {} ${}", quote_ident(column.column), op, self.first_placeholder + index))
    }
}

/// Translate `predicate` into a `WHERE` fragment for `table`.
///
/// Placeholders are numbered from `first_placeholder`, so the fragment can follow parameters
/// already present in the statement.
pub fn translate(predicate: &Predicate, table: &TableSchema, first_placeholder: usize) -> Result<WhereClause> {
    let mut translator = Translator {
        table,
        first_placeholder,
        params: Vec::new(),
    };
    let sql = translator.render(predicate)?;
    Ok(WhereClause {
        sql,
        params: translator.params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{Entity, EntitySchema, ScalarType, describe};
    use chrono::NaiveDateTime;

    #[derive(Debug, Default)]
    struct Article {
        id: i64,
        title: Option<String>,
        score: Option<i32>,
        tag_ids: Option<Vec<i64>>,
        published_at: Option<NaiveDateTime>,
        body: Option<String>,
    }

    impl Entity for Article {
        type Key = i64;

        fn schema() -> EntitySchema<Self> {
            EntitySchema::<Self>::new()
                .table("articles")
                .key("id", |a| &a.id, |a| &mut a.id)
                .field(("title", "headline"), |a| &a.title, |a| &mut a.title)
                .field("score", |a| &a.score, |a| &mut a.score)
                .field("tag_ids", |a| &a.tag_ids, |a| &mut a.tag_ids)
                .field("published_at", |a| &a.published_at, |a| &mut a.published_at)
                .json("body", |a| &a.body, |a| &mut a.body)
        }
    }

    fn articles() -> TableSchema {
        describe::<Article>().unwrap().table().clone()
    }

    #[test]
    fn test_simple_equality() {
        let clause = translate(&Predicate::eq("title", "go"), &articles(), 1).unwrap();

        assert_eq!(clause.sql, "\"headline\" = $1");
        assert_eq!(clause.params.len(), 1);
        assert_eq!(clause.params[0].name, "p0");
        assert_eq!(clause.params[0].column, "headline");
        assert_eq!(clause.params[0].value, SqlValue::Text("go".to_string()));
        assert_eq!(clause.params[0].sql_type, SqlType::Scalar(ScalarType::Text));
    }

    #[test]
    fn test_every_operator() {
        let table = articles();
        for (predicate, expected) in [
            (Predicate::eq("id", 1i64), "\"id\" = $1"),
            (Predicate::ne("id", 1i64), "\"id\" <> $1"),
            (Predicate::gt("id", 1i64), "\"id\" > $1"),
            (Predicate::ge("id", 1i64), "\"id\" >= $1"),
            (Predicate::lt("id", 1i64), "\"id\" < $1"),
            (Predicate::le("id", 1i64), "\"id\" <= $1"),
        ] {
            assert_eq!(translate(&predicate, &table, 1).unwrap().sql, expected);
        }
    }

    #[test]
    fn test_compound_predicates_keep_every_clause() {
        let predicate = Predicate::eq("title", "go")
            .and(Predicate::gt("score", 3))
            .and(Predicate::eq("id", 7i64).or(Predicate::eq("id", 8i64)));
        let clause = translate(&predicate, &articles(), 1).unwrap();

        assert_eq!(
            clause.sql,
            "(\"headline\" = $1 AND \"score\" > $2 AND (\"id\" = $3 OR \"id\" = $4))"
        );
        let names: Vec<_> = clause.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["p0", "p1", "p2", "p3"]);
    }

    #[test]
    fn test_placeholder_offset() {
        let clause = translate(&Predicate::eq("score", 1), &articles(), 4).unwrap();
        assert_eq!(clause.sql, "\"score\" = $4");
        assert_eq!(clause.params[0].name, "p0");
    }

    #[test]
    fn test_values_are_coerced_to_the_field_type() {
        let clause = translate(&Predicate::eq("id", "42"), &articles(), 1).unwrap();
        assert_eq!(clause.params[0].value, SqlValue::BigInt(42));

        let clause = translate(&Predicate::ge("published_at", "2024-01-01T00:00:00"), &articles(), 1).unwrap();
        assert!(matches!(clause.params[0].value, SqlValue::Timestamp(_)));
    }

    #[test]
    fn test_type_mismatch() {
        let err = translate(&Predicate::eq("id", "forty-two"), &articles(), 1).unwrap_err();
        assert!(matches!(err, DbError::TypeMismatch { column, .. } if column == "id"));

        let err = translate(&Predicate::eq("score", i64::MAX), &articles(), 1).unwrap_err();
        assert!(matches!(err, DbError::TypeMismatch { .. }));
    }

    #[test]
    fn test_null_comparisons() {
        let table = articles();
        let clause = translate(&Predicate::eq("title", None::<String>), &table, 1).unwrap();
        assert_eq!(clause.sql, "\"headline\" IS NULL");
        assert!(clause.params.is_empty());

        let clause = translate(&Predicate::ne("title", SqlValue::Null), &table, 1).unwrap();
        assert_eq!(clause.sql, "\"headline\" IS NOT NULL");

        let err = translate(&Predicate::gt("score", SqlValue::Null), &table, 1).unwrap_err();
        assert!(matches!(err, DbError::UnsupportedExpression { .. }));
    }

    #[test]
    fn test_unsupported_shapes() {
        let table = articles();
        let unsupported = |p: Predicate| matches!(translate(&p, &table, 1), Err(DbError::UnsupportedExpression { .. }));

        assert!(unsupported(Predicate::eq("missing", 1)));
        // Column names are not field names
        assert!(unsupported(Predicate::eq("headline", "go")));
        assert!(unsupported(Predicate::eq("body", "text")));
        assert!(unsupported(Predicate::eq("tag_ids", 1i64)));
        assert!(unsupported(Predicate::And(vec![])));
        assert!(unsupported(Predicate::Or(vec![Predicate::Or(vec![])])));
    }

    #[test]
    fn test_single_item_compound_has_no_parentheses() {
        let clause = translate(&Predicate::And(vec![Predicate::eq("id", 1i64)]), &articles(), 1).unwrap();
        assert_eq!(clause.sql, "\"id\" = $1");
    }
}
