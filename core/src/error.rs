use thiserror::Error;

/// Errors raised by the cookbook core.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid ID parameter: '{0}'")]
    InvalidIdentity(String),

    #[error("{0}")]
    Validation(String),

    #[error("database error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_subject() {
        assert_eq!(
            Error::NotFound("Recipe 7".to_string()).to_string(),
            "Recipe 7 not found"
        );
        assert_eq!(
            Error::InvalidIdentity("abc".to_string()).to_string(),
            "Invalid ID parameter: 'abc'"
        );
    }

    #[test]
    fn rusqlite_errors_convert_to_persistence() {
        let err: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, Error::Persistence(_)));
    }
}
