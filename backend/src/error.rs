use thiserror::Error;

/// Failure of a call to the Solana RPC endpoint, classified by HTTP status or
/// JSON-RPC code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("the RPC endpoint refused the request (403 Forbidden)")]
    Forbidden,
    #[error("the RPC endpoint is rate limiting requests (429 Too Many Requests)")]
    RateLimited,
    #[error("{0}")]
    Other(String),
}

impl NetworkError {
    /// Forbidden and rate-limited responses both point at a public endpoint
    /// throttling us.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, NetworkError::Forbidden | NetworkError::RateLimited)
    }
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet is not connected")]
    NotConnected,
    #[error("wallet rejected the request: {0}")]
    Rejected(String),
    #[error("failed to send transaction: {0}")]
    Network(NetworkError),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("not enough credits: needed {needed}, available {available}")]
    InsufficientCredits { needed: u64, available: u64 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("Please connect your wallet to buy credits.")]
    WalletNotConnected,
    #[error("A credit purchase is already in progress.")]
    Busy,
    #[error("invalid recipient address {0}")]
    InvalidRecipient(String),
    #[error("failed to get recent blockhash: {0}")]
    Blockhash(NetworkError),
    #[error("{0}")]
    Submission(String),
    #[error("failed to confirm transaction: {0}")]
    Confirmation(NetworkError),
    #[error("Solana transaction failed to confirm: {0}")]
    OnChain(String),
    #[error("transaction expired before it was confirmed")]
    Expired,
    #[error("{0}")]
    Ledger(#[from] LedgerError),
}

impl PaymentError {
    /// Text shown to the user, both in the error banner and the toast.
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Blockhash(cause) if cause.is_access_denied() => format!(
                "Payment failed: Could not connect to the Solana network ({cause} while fetching blockhash). \
                 This often happens with public RPC endpoints. \
                 Please configure a private/dedicated Solana RPC URL (SOLANA_RPC_URL)."
            ),
            other => format!("Payment failed: {other}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Please connect your wallet first.")]
    WalletNotConnected,
    #[error("An image generation is already in progress.")]
    Busy,
    #[error("Please enter a prompt.")]
    EmptyPrompt,
    #[error("Not enough credits. You need {needed} credit(s) to generate. Please purchase more.")]
    InsufficientCredits { needed: u64, available: u64 },
    #[error("{0}")]
    Service(String),
    #[error("{0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for GenerationError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientCredits { needed, available } => {
                GenerationError::InsufficientCredits { needed, available }
            }
            other => GenerationError::Ledger(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_blockhash_gets_rpc_hint() {
        let msg = PaymentError::Blockhash(NetworkError::Forbidden).user_message();
        assert!(msg.starts_with("Payment failed: "));
        assert!(msg.contains("403 Forbidden"));
        assert!(msg.contains("SOLANA_RPC_URL"));
    }

    #[test]
    fn generic_blockhash_failure_is_passed_through() {
        let msg = PaymentError::Blockhash(NetworkError::Other("connection reset".into()))
            .user_message();
        assert_eq!(msg, "Payment failed: failed to get recent blockhash: connection reset");
    }

    #[test]
    fn ledger_shortfall_maps_to_generation_shortfall() {
        let err: GenerationError = LedgerError::InsufficientCredits {
            needed: 1,
            available: 0,
        }
        .into();
        assert!(matches!(
            err,
            GenerationError::InsufficientCredits { needed: 1, available: 0 }
        ));
    }
}
