use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    NotFound,
    UniqueViolation,
    Connection,
    Query,
}

impl std::fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StoreErrorKind::NotFound => "not found",
            StoreErrorKind::UniqueViolation => "unique violation",
            StoreErrorKind::Connection => "connection error",
            StoreErrorKind::Query => "query error",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, message)
    }

    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::new(StoreErrorKind::NotFound, err.to_string()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                Self::new(StoreErrorKind::UniqueViolation, err.to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::new(StoreErrorKind::Connection, err.to_string())
            }
            _ => Self::new(StoreErrorKind::Query, err.to_string()),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.kind == StoreErrorKind::UniqueViolation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found_kind() {
        let err = StoreError::from_sqlx(sqlx::Error::RowNotFound);
        assert_eq!(err.kind, StoreErrorKind::NotFound);
    }

    #[test]
    fn unique_violation_detection() {
        let err = StoreError::new(StoreErrorKind::UniqueViolation, "dup");
        assert!(err.is_unique_violation());
        let err = StoreError::new(StoreErrorKind::Query, "other");
        assert!(!err.is_unique_violation());
    }
}
