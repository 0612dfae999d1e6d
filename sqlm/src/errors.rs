///
/// Database handle error types.
///
/// Every failure a handle can latch: descriptor derivation, API misuse,
/// transaction bookkeeping, engine compile/execute failures, and value
/// marshaling between record fields and engine values.
///

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database does not support fields of type {type_name}")]
    UnsupportedType { type_name: String },

    #[error("duplicate occurrence of table tag in {record}")]
    DuplicateTableTag { record: String },

    #[error("expecting i64 for key field '{field}' of {record}, got {found}")]
    KeyNotInt64 {
        record: String,
        field: String,
        found: String,
    },

    #[error("missing table tag in {record}")]
    MissingTableTag { record: String },

    #[error("no structure fields of {record} have a column tag")]
    NoColumns { record: String },

    #[error("at least one column name expected")]
    NoUpdateColumns,

    #[error("table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("no transaction to {action}")]
    NoTransaction { action: &'static str },

    #[error("transaction rolled back by a nested scope")]
    RolledBack,

    #[error("database is closed")]
    Closed,

    #[error("syntax error in '{statement}': {reason}")]
    Syntax { statement: String, reason: String },

    #[error("missing parameter ?{index} for '{statement}'")]
    MissingParameter { index: usize, statement: String },

    #[error("cannot decode column '{column}': expected {expected}, found {found}")]
    Decode {
        column: String,
        expected: String,
        found: &'static str,
    },

    #[error("result row has {found} values, expected {expected}")]
    RowShape { expected: usize, found: usize },

    #[error("value {value} out of range for {type_name}")]
    ValueOutOfRange { type_name: &'static str, value: String },

    #[error("invalid {type_name} value '{value}': {reason}")]
    InvalidValue {
        type_name: &'static str,
        value: String,
        reason: String,
    },

    #[error("engine error: {0}")]
    Engine(String),

    #[error("{0}")]
    Message(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = DbError::UnsupportedType {
            type_name: "Point".to_string(),
        };
        assert_eq!(err.to_string(), "database does not support fields of type Point");

        let err = DbError::KeyNotInt64 {
            record: "Rec".to_string(),
            field: "id".to_string(),
            found: "i32".to_string(),
        };
        assert!(err.to_string().contains("expecting i64"));
        assert!(err.to_string().contains("got i32"));

        let err = DbError::NoTransaction { action: "commit" };
        assert_eq!(err.to_string(), "no transaction to commit");

        let err = DbError::NoTransaction { action: "rollback" };
        assert_eq!(err.to_string(), "no transaction to rollback");

        let err = DbError::UnknownColumn {
            table: "rec".to_string(),
            column: "Z".to_string(),
        };
        assert!(err.to_string().contains("rec"));
        assert!(err.to_string().contains("'Z'"));

        let err = DbError::MissingParameter {
            index: 2,
            statement: "SELECT ?2".to_string(),
        };
        assert!(err.to_string().contains("?2"));

        let err = DbError::Decode {
            column: "Name".to_string(),
            expected: "string".to_string(),
            found: "integer",
        };
        assert!(err.to_string().contains("expected string, found integer"));

        let err = DbError::Message("halt".to_string());
        assert_eq!(err.to_string(), "halt");
    }
}
