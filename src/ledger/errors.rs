//! Ledger client error types

use thiserror::Error;

/// Errors raised by the ledger client, local codec included
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Transport-level errors (connection refused, DNS, TLS)
    #[error("Transport error during {command}: {source}")]
    Transport {
        command: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Request exceeded the configured client timeout
    #[error("Timeout during {command}")]
    Timeout { command: &'static str },

    /// The node answered with an error payload
    #[error("Node rejected {command}: {message} (status: {status})")]
    Api {
        command: &'static str,
        status: u16,
        message: String,
    },

    /// The node answered 2xx but the body did not match the expected shape
    #[error("Unexpected response to {command}: {message}")]
    UnexpectedResponse {
        command: &'static str,
        message: String,
    },

    /// Malformed or absent trytes in a payload
    #[error("Invalid trytes: {0}")]
    InvalidTrytes(String),

    /// Trytes decoded fine but the transaction fields are inconsistent
    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    /// A bundle has no transaction with currentIndex == 0
    #[error("Bundle {bundle} has no tail transaction")]
    MissingTail { bundle: String },
}

impl LedgerError {
    /// Whether a retry on the next scheduled cycle can plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Transport { .. } => true,
            LedgerError::Timeout { .. } => true,
            // Server-side failures are transient; 4xx means the request
            // itself is wrong and will not get better.
            LedgerError::Api { status, .. } => *status >= 500,
            LedgerError::UnexpectedResponse { .. } => false,
            LedgerError::InvalidTrytes(_) => false,
            LedgerError::MalformedTransaction(_) => false,
            LedgerError::MissingTail { .. } => false,
        }
    }

    /// Classify a reqwest error for a given API command
    pub fn from_reqwest(command: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LedgerError::Timeout { command }
        } else {
            LedgerError::Transport {
                command,
                source: err,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(LedgerError::Timeout {
            command: "getNodeInfo"
        }
        .is_retryable());

        assert!(LedgerError::Api {
            command: "findTransactions",
            status: 503,
            message: "overloaded".to_string(),
        }
        .is_retryable());

        assert!(!LedgerError::Api {
            command: "findTransactions",
            status: 400,
            message: "invalid addresses input".to_string(),
        }
        .is_retryable());

        assert!(!LedgerError::InvalidTrytes("bad length".to_string()).is_retryable());
        assert!(!LedgerError::MissingTail {
            bundle: "B".repeat(81),
        }
        .is_retryable());
    }
}
