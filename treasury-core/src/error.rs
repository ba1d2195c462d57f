//! Error types for the treasury ledger

use thiserror::Error;

/// Result type for treasury operations
pub type Result<T> = std::result::Result<T, Error>;

/// Treasury ledger errors
///
/// Every variant carries a stable machine code (see [`Error::code`]) so
/// the calling admin layer can render specific messages without parsing
/// error text. Raw storage error text is summarized, never forwarded
/// verbatim.
#[derive(Error, Debug)]
pub enum Error {
    /// Treasury reserve cannot cover the requested debit
    #[error("insufficient treasury funds: required {required}, available {available}")]
    InsufficientTreasuryFunds {
        /// Amount the operation needed, in display form
        required: String,
        /// Amount the treasury held, in display form
        available: String,
    },

    /// User wallet cannot cover the requested debit
    #[error("insufficient funds for user {user_id}: required {required}, available {available}")]
    InsufficientUserFunds {
        /// Wallet owner
        user_id: String,
        /// Amount the operation needed, in display form
        required: String,
        /// Amount the wallet held, in display form
        available: String,
    },

    /// Referenced user has never been registered
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Policy singleton has never been seeded (fatal configuration error)
    #[error("policy parameters not found; store was never seeded")]
    PolicyNotFound,

    /// Input or policy field failed range validation
    #[error("validation failed: {0}")]
    Validation(String),

    /// Row lock could not be acquired within the bounded wait
    #[error("lock contention: {0}")]
    Contention(String),

    /// Underlying store failure (summary only)
    #[error("storage failure: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code for the admin boundary
    pub fn code(&self) -> &'static str {
        match self {
            Error::InsufficientTreasuryFunds { .. } => "INSUFFICIENT_TREASURY_FUNDS",
            Error::InsufficientUserFunds { .. } => "INSUFFICIENT_USER_FUNDS",
            Error::UserNotFound(_) => "USER_NOT_FOUND",
            Error::PolicyNotFound => "POLICY_NOT_FOUND",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Contention(_) => "CONTENTION",
            Error::Storage(_) => "STORAGE_FAILURE",
            Error::Serialization(_) => "STORAGE_FAILURE",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Io(_) => "STORAGE_FAILURE",
        }
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        use rocksdb::ErrorKind;

        // Only the summarized kind crosses the boundary; the raw store
        // text stays in the debug log.
        let kind = err.kind();
        tracing::debug!(?kind, error = %err, "rocksdb error");

        match kind {
            ErrorKind::TimedOut | ErrorKind::Busy | ErrorKind::TryAgain => {
                Error::Contention(format!("{:?}", kind))
            }
            _ => Error::Storage(format!("rocksdb {:?}", kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_codes() {
        assert_eq!(
            Error::UserNotFound("u1".to_string()).code(),
            "USER_NOT_FOUND"
        );
        assert_eq!(Error::PolicyNotFound.code(), "POLICY_NOT_FOUND");
        assert_eq!(
            Error::Contention("treasury".to_string()).code(),
            "CONTENTION"
        );
    }
}
