//! The persistence error type shared by the session store and the
//! memory service.

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Persistence error: {0}")]
    Other(String),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_mentions_the_id() {
        let err = PersistenceError::NotFound("session-1".to_string());
        assert!(err.to_string().contains("session-1"));
    }
}
