use async_trait::async_trait;

use crate::error::LedgerError;
use crate::model::PaymentReceipt;

pub mod local;
pub mod postgres;

pub use local::{LocalCounterStore, LocalLedger};
pub use postgres::PgLedger;

/// Credit balance service shared by the payment and generation flows.
///
/// Every mutation is a single atomic read-modify-write.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn balance(&self) -> Result<u64, LedgerError>;

    /// Adds `amount` and returns the new balance.
    async fn credit(&self, amount: u64) -> Result<u64, LedgerError>;

    /// Subtracts `amount` if the balance covers it and returns the new
    /// balance. The balance is left untouched otherwise.
    async fn try_debit(&self, amount: u64) -> Result<u64, LedgerError>;

    /// Credits a confirmed purchase. Backends that keep an audit trail store
    /// the receipt together with the credit.
    async fn record_purchase(&self, receipt: &PaymentReceipt) -> Result<u64, LedgerError> {
        self.credit(receipt.credits.max(0) as u64).await
    }
}
