//! Error types for Duesbot.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing command arguments. The message is the corrective
    /// text shown to the user.
    #[error("{0}")]
    Usage(String),

    /// Target id does not exist or is in the wrong state.
    #[error("{0}")]
    NotFound(String),

    #[error("{name} is already registered with id(s): {id_list}. Use /update or /delete if needed.", id_list = join_ids(.ids))]
    Duplicate { name: String, ids: Vec<i64> },

    #[error("{0}")]
    Permission(String),

    /// Digest destination could not be reached. Never shown to users.
    #[error("Destination unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Telegram error: {0}")]
    Telegram(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Errors that are answered with a plain-text reply at the command
    /// boundary instead of propagating.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::Usage(_) | Error::NotFound(_) | Error::Duplicate { .. } | Error::Permission(_)
        )
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_lists_every_conflicting_id() {
        let err = Error::Duplicate {
            name: "Alice".to_string(),
            ids: vec![1, 4],
        };
        assert_eq!(
            err.to_string(),
            "Alice is already registered with id(s): 1, 4. Use /update or /delete if needed."
        );
    }

    #[test]
    fn store_errors_are_not_user_facing() {
        assert!(Error::Usage("x".into()).is_user_facing());
        assert!(Error::NotFound("x".into()).is_user_facing());
        assert!(!Error::Store("disk".into()).is_user_facing());
        assert!(!Error::Unavailable("gone".into()).is_user_facing());
    }
}
