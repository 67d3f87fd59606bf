use alloy_primitives::TxHash;
use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Every failure the library surfaces to its caller.
///
/// The type is `Clone` so a refresh shared between several waiters can hand
/// each of them the same outcome.
#[derive(Debug, Clone, Error)]
pub enum HtkError {
    #[error("{operation} failed: {source}")]
    Rpc {
        operation: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync>,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid amount {input:?}: {reason}")]
    InvalidAmount { input: String, reason: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("transaction {hash} reached {confirmations} confirmation(s) before timing out after {waited:?}")]
    ConfirmationTimeout {
        hash: TxHash,
        waited: Duration,
        confirmations: u64,
    },

    #[error("could not decode result of {signature}: {message}")]
    Abi { signature: String, message: String },
}

impl HtkError {
    pub fn rpc(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        HtkError::Rpc {
            operation: operation.into(),
            source: Arc::from(source.into()),
        }
    }

    pub fn invalid_amount(input: &str, reason: impl Into<String>) -> Self {
        HtkError::InvalidAmount {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub fn abi(signature: &str, err: impl std::fmt::Display) -> Self {
        HtkError::Abi {
            signature: signature.to_string(),
            message: err.to_string(),
        }
    }

    /// Stable label for the presentation layer.
    pub fn kind(&self) -> &'static str {
        match self {
            HtkError::Rpc { .. } => "rpc",
            HtkError::NotFound(_) => "not_found",
            HtkError::InvalidAmount { .. } => "invalid_amount",
            HtkError::InvalidInput(_) => "invalid_input",
            HtkError::ConfirmationTimeout { .. } => "confirmation_timeout",
            HtkError::Abi { .. } => "abi",
        }
    }

    pub fn is_rpc(&self) -> bool {
        matches!(self, HtkError::Rpc { .. })
    }
}
