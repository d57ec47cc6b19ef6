use thiserror::Error;

/// Unified error type for database operations that application code can handle
#[derive(Error, Debug)]
pub enum DbError {
    /// Entity not found by the given identifier
    #[error("Entity not found")]
    NotFound,

    /// Unique constraint violation
    #[error("Unique constraint violation")]
    UniqueViolation {
        constraint: Option<String>,
        table: Option<String>,
        message: String,
    },

    /// An entity declaration cannot be turned into a schema (no key, two keys, duplicate columns,
    /// or an entity that was never registered)
    #[error("Invalid schema for {entity}: {message}")]
    Configuration { entity: String, message: String },

    /// A declared column does not exist on the live table
    #[error("Table {table} is missing column {column}")]
    MissingColumn { table: String, column: String },

    /// A declared column exists but its storage type cannot hold the declared type
    #[error("Column {table}.{column} has type {existing}, which is incompatible with declared {declared}")]
    IncompatibleType {
        table: String,
        column: String,
        existing: String,
        declared: String,
    },

    /// Caller supplied an out-of-range or otherwise unusable argument
    #[error("{message}")]
    InvalidArgument { message: String },

    /// Update attempted on an entity whose key is unset
    #[error("Entity for table {table} has no key value")]
    MissingKey { table: String },

    /// A stored value could not be converted into the declared field type
    #[error("Cannot decode column {column}: {message}")]
    TypeConversion { column: String, message: String },

    /// A supplied value cannot be converted into the declared field type
    #[error("Value for {column} does not match its declared type: {message}")]
    TypeMismatch { column: String, message: String },

    /// Predicate shape that has no SQL translation
    #[error("Unsupported predicate: {message}")]
    UnsupportedExpression { message: String },

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convert from sqlx::Error using proper sqlx error categorization
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DbError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => DbError::UniqueViolation {
                constraint: db_err.constraint().map(|s| s.to_string()),
                table: db_err.table().map(|s| s.to_string()),
                message: db_err.message().to_string(),
            },
            // All other sqlx errors are non-recoverable - convert to anyhow with context
            _ => DbError::Other(anyhow::Error::from(err)),
        }
    }
}

impl DbError {
    /// True for errors caused by the caller's input rather than by the database or the schema
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DbError::InvalidArgument { .. }
                | DbError::MissingKey { .. }
                | DbError::TypeMismatch { .. }
                | DbError::UnsupportedExpression { .. }
        )
    }
}

/// Type alias for database operation results
pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = DbError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DbError::NotFound));
    }

    #[test]
    fn test_other_sqlx_errors_are_wrapped() {
        let err = DbError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, DbError::Other(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_client_error_classification() {
        assert!(DbError::InvalidArgument { message: "page".into() }.is_client_error());
        assert!(DbError::MissingKey { table: "tag".into() }.is_client_error());
        assert!(
            !DbError::MissingColumn {
                table: "tag".into(),
                column: "name".into()
            }
            .is_client_error()
        );
    }
}
