use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::Transaction};

use super::{BusyGuard, LoadingToast};
use crate::chain::{self, ChainRpc, LatestBlockhash, Wallet};
use crate::config::CreditPricing;
use crate::error::PaymentError;
use crate::ledger::CreditLedger;
use crate::model::{PaymentReceipt, StatusKind};
use crate::notifier::StatusNotifier;
use crate::page::PageState;

const PAYMENT_ERROR_DURATION_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentState {
    Idle,
    Preparing,
    AwaitingBlockhash,
    AwaitingWalletApproval,
    AwaitingConfirmation { signature: Signature },
    Settled { signature: Signature, balance: u64 },
    Failed { message: String },
}

/// Buys credits with a SOL transfer to the configured recipient.
pub struct PaymentFlow {
    wallet: Arc<dyn Wallet>,
    rpc: Arc<dyn ChainRpc>,
    ledger: Arc<dyn CreditLedger>,
    notifier: StatusNotifier,
    page: Arc<PageState>,
    pricing: CreditPricing,
    poll_interval: Duration,
    busy: AtomicBool,
    state: Mutex<PaymentState>,
}

impl PaymentFlow {
    pub fn new(
        wallet: Arc<dyn Wallet>,
        rpc: Arc<dyn ChainRpc>,
        ledger: Arc<dyn CreditLedger>,
        notifier: StatusNotifier,
        page: Arc<PageState>,
        pricing: CreditPricing,
    ) -> Self {
        Self {
            wallet,
            rpc,
            ledger,
            notifier,
            page,
            pricing,
            poll_interval: Duration::from_millis(500),
            busy: AtomicBool::new(false),
            state: Mutex::new(PaymentState::Idle),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// State reached by the latest invocation.
    pub fn state(&self) -> PaymentState {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn transition(&self, next: PaymentState) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::debug!(from = ?*state, to = ?next, "Payment state");
        *state = next;
    }

    /// Run one purchase from `Idle` to `Settled` or `Failed`.
    pub async fn run(&self) -> Result<PaymentReceipt, PaymentError> {
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            self.notifier.post(PaymentError::Busy.to_string(), StatusKind::Info);
            return Err(PaymentError::Busy);
        };
        self.transition(PaymentState::Idle);

        let payer = match self.wallet.public_key() {
            Some(payer) if self.wallet.is_connected() && self.wallet.can_sign() => payer,
            _ => {
                let err = PaymentError::WalletNotConnected;
                self.notifier.post(err.to_string(), StatusKind::Error);
                self.transition(PaymentState::Failed {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        self.page.begin_purchase();
        let mut loading = LoadingToast::new(&self.notifier);
        let result = self.execute(payer, &mut loading).await;
        loading.clear();

        match result {
            Ok((receipt, balance)) => {
                self.page.end_purchase(None);
                tracing::info!(
                    signature = %receipt.signature,
                    credits = receipt.credits,
                    balance,
                    "Credit purchase settled"
                );
                self.notifier.post(
                    format!(
                        "Successfully purchased {} credits!",
                        self.pricing.credits_per_purchase
                    ),
                    StatusKind::Success,
                );
                Ok(receipt)
            }
            Err(err) => {
                let message = err.user_message();
                tracing::error!(error = %err, "Solana transaction error");
                self.page.end_purchase(Some(message.clone()));
                self.notifier
                    .post_for(message.clone(), StatusKind::Error, PAYMENT_ERROR_DURATION_MS);
                self.transition(PaymentState::Failed { message });
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        payer: Pubkey,
        loading: &mut LoadingToast<'_>,
    ) -> Result<(PaymentReceipt, u64), PaymentError> {
        self.transition(PaymentState::Preparing);
        loading.show("Preparing transaction...");
        let mut transaction = self.prepare(&payer)?;

        self.transition(PaymentState::AwaitingBlockhash);
        loading.show("Requesting latest blockhash...");
        let blockhash = self
            .rpc
            .latest_blockhash()
            .await
            .map_err(PaymentError::Blockhash)?;
        transaction.message.recent_blockhash = blockhash.blockhash;

        self.transition(PaymentState::AwaitingWalletApproval);
        loading.show("Sending transaction... Please approve in your wallet.");
        let signature = self
            .wallet
            .send_transaction(transaction, self.rpc.as_ref())
            .await
            .map_err(|e| PaymentError::Submission(e.to_string()))?;

        self.transition(PaymentState::AwaitingConfirmation { signature });
        let short: String = signature.to_string().chars().take(10).collect();
        loading.show(format!(
            "Transaction sent: {short}... Waiting for confirmation."
        ));
        self.confirm(&signature, &blockhash).await?;
        loading.clear();

        let receipt = PaymentReceipt {
            signature: signature.to_string(),
            payer: payer.to_string(),
            recipient: self.pricing.recipient_address.clone(),
            lamports: i64::try_from(self.pricing.purchase_cost_lamports()).unwrap_or(i64::MAX),
            credits: i64::try_from(self.pricing.credits_per_purchase).unwrap_or(i64::MAX),
            created_at: Utc::now(),
        };
        let balance = self.ledger.record_purchase(&receipt).await.map_err(|e| {
            tracing::error!(signature = %receipt.signature, error = %e, "Payment confirmed but credit was not recorded");
            PaymentError::Ledger(e)
        })?;

        self.transition(PaymentState::Settled { signature, balance });
        Ok((receipt, balance))
    }

    fn prepare(&self, payer: &Pubkey) -> Result<Transaction, PaymentError> {
        let recipient = Pubkey::from_str(&self.pricing.recipient_address)
            .map_err(|_| PaymentError::InvalidRecipient(self.pricing.recipient_address.clone()))?;
        let instruction =
            chain::transfer_instruction(payer, &recipient, self.pricing.purchase_cost_lamports())
                .map_err(|e| PaymentError::Submission(e.to_string()))?;
        Ok(Transaction::new_with_payer(&[instruction], Some(payer)))
    }

    async fn confirm(
        &self,
        signature: &Signature,
        blockhash: &LatestBlockhash,
    ) -> Result<(), PaymentError> {
        chain::confirm_transaction(self.rpc.as_ref(), signature, blockhash, self.poll_interval).await
    }
}
