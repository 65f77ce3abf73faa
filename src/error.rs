use rusqlite::ErrorCode;
use thiserror::Error;

/// Extended result code SQLite reports for a failed FOREIGN KEY constraint.
const SQLITE_CONSTRAINT_FOREIGNKEY: std::os::raw::c_int = 787;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Game log row {row} cannot be keyed: {reason}")]
    InvalidGameKey { row: i64, reason: String },

    #[error("Input table '{table}' is missing required column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("Foreign key violation during '{step}': {message}")]
    ForeignKeyViolation { step: String, message: String },

    #[error("Table '{table}' references '{references}', which is not created before it")]
    SchemaOrder { table: String, references: String },

    #[error("Store did not accept foreign key setting (requested {requested}, got {actual})")]
    ForeignKeySetting { requested: bool, actual: bool },

    #[error("Appearance catalog error: {0}")]
    Catalog(String),

    #[error("Refusing to drop raw tables: {0}")]
    CleanupRefused(String),

    #[error("Raw table '{0}' has not been imported")]
    NotImported(String),

    #[error("Verification failed: {0}")]
    Inconsistent(String),
}

impl MigrationError {
    /// Attaches the step name to SQLite failures, promoting foreign key
    /// failures to their own fatal variant.
    pub fn from_sqlite(step: &str, err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == ErrorCode::ConstraintViolation
                    && code.extended_code == SQLITE_CONSTRAINT_FOREIGNKEY =>
            {
                MigrationError::ForeignKeyViolation {
                    step: step.to_string(),
                    message: message
                        .clone()
                        .unwrap_or_else(|| "FOREIGN KEY constraint failed".to_string()),
                }
            }
            _ => MigrationError::Sqlite(err),
        }
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, MigrationError::ForeignKeyViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: ErrorCode, extended_code: i32, message: &str) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code,
                extended_code,
            },
            Some(message.to_string()),
        )
    }

    #[test]
    fn test_foreign_key_failure_is_promoted() {
        let err = MigrationError::from_sqlite(
            "team",
            failure(ErrorCode::ConstraintViolation, 787, "FOREIGN KEY constraint failed"),
        );
        assert!(err.is_foreign_key_violation());
        assert!(err.to_string().contains("'team'"));
    }

    #[test]
    fn test_other_constraint_failures_stay_sqlite_errors() {
        // SQLITE_CONSTRAINT_UNIQUE
        let err = MigrationError::from_sqlite(
            "person",
            failure(ErrorCode::ConstraintViolation, 2067, "UNIQUE constraint failed"),
        );
        assert!(!err.is_foreign_key_violation());
        assert!(matches!(err, MigrationError::Sqlite(_)));
    }
}
