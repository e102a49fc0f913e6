use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Engine error with no MySQL counterpart. See `engine::reinterpret`.
    #[error("{0}")]
    Engine(rusqlite::Error),

    #[error("You have an error in your SQL syntax; {0}")]
    Parse(String),

    /// Recognized but unimplemented construct. Carries the rule path.
    #[error("This version of MySQL doesn't yet support '{0}'")]
    NotSupported(String),

    /// Unexpected input shape. Treated as an internal assertion failure.
    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' doesn't exist")]
    NoSuchTable(String),

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Unknown table '{0}' in information_schema")]
    UnknownSystemTable(String),

    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("Unknown column '{0}' in '{1}'")]
    UnknownColumn(String, String),

    #[error("Duplicate key name '{0}'")]
    DuplicateKeyName(String),

    #[error("Key column '{0}' doesn't exist in table")]
    KeyColumnNotFound(String),

    #[error("Can't DROP '{0}'; check that column/key exists")]
    CantDrop(String),

    #[error("Multiple primary key defined")]
    MultiplePrimaryKey,

    #[error("Incorrect index name '{0}'")]
    WrongIndexName(String),

    #[error("Duplicate foreign key constraint name '{0}'")]
    DuplicateForeignKey(String),

    #[error("Duplicate check constraint name '{0}'.")]
    DuplicateCheck(String),

    #[error("Table has multiple constraints with the name '{0}'. Please use constraint specific 'drop' clause.")]
    AmbiguousConstraint(String),

    #[error("Constraint '{0}' does not exist.")]
    ConstraintNotFound(String),

    #[error("Duplicate entry '{0}' for key '{1}'")]
    DuplicateEntry(String, String),

    #[error("Column '{0}' cannot be null")]
    BadNull(String),

    #[error("Field '{0}' doesn't have a default value")]
    NoDefault(String),

    #[error("Check constraint '{0}' is violated.")]
    CheckViolated(String),

    #[error("Column count doesn't match value count at row {0}")]
    ValueCount(usize),

    /// Coercion and range errors (1292, 1264, 1366, 1406, 1265).
    #[error("{message}")]
    Value { code: u16, message: String },

    #[error("Access denied for user '{0}' to database '{1}'")]
    AccessDenied(String, String),

    #[error("Unknown database '{0}'")]
    UnknownDatabase(String),

    #[error("Can't create database '{0}'; database exists")]
    DatabaseExists(String),

    #[error("No database selected")]
    NoDatabase,

    #[error("Lock wait timeout exceeded; try restarting transaction")]
    LockWaitTimeout,

    #[error("Unknown system variable '{0}'")]
    UnknownSystemVariable(String),

    #[error("Variable '{0}' can't be set to the value of '{1}'")]
    WrongValueForVariable(String, String),

    #[error("SAVEPOINT {0} does not exist")]
    NoSuchSavepoint(String),
}

pub type Result<T, E = DriverError> = std::result::Result<T, E>;

impl DriverError {
    pub fn not_supported(rule: impl Into<String>) -> Self {
        DriverError::NotSupported(rule.into())
    }

    pub fn value(code: u16, message: impl Into<String>) -> Self {
        DriverError::Value {
            code,
            message: message.into(),
        }
    }

    /// MySQL error number.
    pub fn code(&self) -> u16 {
        match self {
            DriverError::Io(_) | DriverError::Engine(_) | DriverError::Invalid(_) => 1105,
            DriverError::Parse(_) => 1064,
            DriverError::NotSupported(_) => 1235,
            DriverError::TableExists(_) => 1050,
            DriverError::NoSuchTable(_) => 1146,
            DriverError::UnknownTable(_) => 1051,
            DriverError::UnknownSystemTable(_) => 1109,
            DriverError::DuplicateColumn(_) => 1060,
            DriverError::UnknownColumn(..) => 1054,
            DriverError::DuplicateKeyName(_) => 1061,
            DriverError::KeyColumnNotFound(_) => 1072,
            DriverError::CantDrop(_) => 1091,
            DriverError::MultiplePrimaryKey => 1068,
            DriverError::WrongIndexName(_) => 1280,
            DriverError::DuplicateForeignKey(_) => 1826,
            DriverError::DuplicateCheck(_) => 3822,
            DriverError::AmbiguousConstraint(_) => 3939,
            DriverError::ConstraintNotFound(_) => 3940,
            DriverError::DuplicateEntry(..) => 1062,
            DriverError::BadNull(_) => 1048,
            DriverError::NoDefault(_) => 1364,
            DriverError::CheckViolated(_) => 3819,
            DriverError::ValueCount(_) => 1136,
            DriverError::Value { code, .. } => *code,
            DriverError::AccessDenied(..) => 1044,
            DriverError::UnknownDatabase(_) => 1049,
            DriverError::DatabaseExists(_) => 1007,
            DriverError::NoDatabase => 1046,
            DriverError::LockWaitTimeout => 1205,
            DriverError::UnknownSystemVariable(_) => 1193,
            DriverError::WrongValueForVariable(..) => 1231,
            DriverError::NoSuchSavepoint(_) => 1305,
        }
    }

    pub fn sqlstate(&self) -> &'static str {
        match self.code() {
            1050 => "42S01",
            1146 | 1051 | 1109 => "42S02",
            1060 => "42S21",
            1054 => "42S22",
            1062 | 1048 | 1052 => "23000",
            1136 => "21S01",
            1292 => "22007",
            1264 => "22003",
            1406 => "22001",
            1265 => "01000",
            1045 => "28000",
            1046 => "3D000",
            1064 | 1235 | 1061 | 1072 | 1091 | 1068 | 1280 | 1044 | 1049 | 1305 | 1231 => "42000",
            _ => "HY000",
        }
    }

    /// Errors a client may retry after the current transaction is restarted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriverError::LockWaitTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_states_follow_mysql() {
        let exists = DriverError::TableExists("t".into());
        assert_eq!(exists.code(), 1050);
        assert_eq!(exists.sqlstate(), "42S01");

        let unknown = DriverError::UnknownColumn("x".into(), "field list".into());
        assert_eq!(unknown.code(), 1054);
        assert_eq!(unknown.sqlstate(), "42S22");
        assert_eq!(unknown.to_string(), "Unknown column 'x' in 'field list'");

        let denied = DriverError::AccessDenied("root".into(), "information_schema".into());
        assert_eq!(denied.sqlstate(), "42000");
    }

    #[test]
    fn only_lock_waits_are_retryable() {
        assert!(DriverError::LockWaitTimeout.is_retryable());
        assert!(!DriverError::value(1264, "Out of range").is_retryable());
    }
}
