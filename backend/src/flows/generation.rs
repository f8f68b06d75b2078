use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use super::{BusyGuard, LoadingToast};
use crate::chain::Wallet;
use crate::error::GenerationError;
use crate::imagegen::ImageGenerator;
use crate::ledger::CreditLedger;
use crate::model::{GeneratedImage, StatusKind};
use crate::notifier::StatusNotifier;
use crate::page::PageState;

const GENERATION_ERROR_DURATION_MS: u64 = 7_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Validating,
    Requesting { prompt: String },
    Succeeded { balance: u64 },
    Failed { message: String },
}

/// Spends credits on one image per request.
pub struct GenerationFlow {
    wallet: Arc<dyn Wallet>,
    generator: Arc<dyn ImageGenerator>,
    ledger: Arc<dyn CreditLedger>,
    notifier: StatusNotifier,
    page: Arc<PageState>,
    cost: u64,
    busy: AtomicBool,
    state: Mutex<GenerationState>,
}

impl GenerationFlow {
    pub fn new(
        wallet: Arc<dyn Wallet>,
        generator: Arc<dyn ImageGenerator>,
        ledger: Arc<dyn CreditLedger>,
        notifier: StatusNotifier,
        page: Arc<PageState>,
        cost: u64,
    ) -> Self {
        Self {
            wallet,
            generator,
            ledger,
            notifier,
            page,
            cost,
            busy: AtomicBool::new(false),
            state: Mutex::new(GenerationState::Idle),
        }
    }

    pub fn state(&self) -> GenerationState {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn transition(&self, next: GenerationState) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::debug!(from = ?*state, to = ?next, "Generation state");
        *state = next;
    }

    pub async fn run(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            self.notifier.post(GenerationError::Busy.to_string(), StatusKind::Info);
            return Err(GenerationError::Busy);
        };

        self.transition(GenerationState::Validating);
        let prompt = match self.validate(prompt).await {
            Ok(prompt) => prompt,
            Err(err) => {
                let duration = match err {
                    GenerationError::InsufficientCredits { .. } => GENERATION_ERROR_DURATION_MS,
                    _ => crate::notifier::DEFAULT_STATUS_DURATION_MS,
                };
                self.notifier.post_for(err.to_string(), StatusKind::Error, duration);
                // Rejected requests leave no trace beyond the toast.
                self.transition(GenerationState::Idle);
                return Err(err);
            }
        };

        self.transition(GenerationState::Requesting {
            prompt: prompt.clone(),
        });
        self.page.begin_generation(&prompt);
        let mut loading = LoadingToast::new(&self.notifier);
        loading.show("Generating your image with AI...");

        let result = self.request(&prompt).await;
        loading.clear();

        match result {
            Ok((image, balance)) => {
                self.page.finish_generation(Ok(image.clone()));
                tracing::info!(balance, "Image generated");
                self.notifier
                    .post("Image generated successfully!", StatusKind::Success);
                self.transition(GenerationState::Succeeded { balance });
                Ok(image)
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(error = %message, "Image generation failed");
                self.page.finish_generation(Err(message.clone()));
                self.notifier.post_for(
                    format!("Error generating image: {message}"),
                    StatusKind::Error,
                    GENERATION_ERROR_DURATION_MS,
                );
                self.transition(GenerationState::Failed { message });
                Err(err)
            }
        }
    }

    async fn validate(&self, prompt: &str) -> Result<String, GenerationError> {
        if !self.wallet.is_connected() {
            return Err(GenerationError::WalletNotConnected);
        }

        let available = self.ledger.balance().await?;
        if available < self.cost {
            return Err(GenerationError::InsufficientCredits {
                needed: self.cost,
                available,
            });
        }

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GenerationError::EmptyPrompt);
        }
        Ok(prompt.to_string())
    }

    async fn request(&self, prompt: &str) -> Result<(GeneratedImage, u64), GenerationError> {
        let image_url = self
            .generator
            .generate(prompt)
            .await
            .map_err(|e| GenerationError::Service(e.to_string()))?;

        // The balance may have been spent elsewhere while the request ran.
        let balance = self.ledger.try_debit(self.cost).await?;

        Ok((
            GeneratedImage {
                prompt: prompt.to_string(),
                image_url,
                created_at: Utc::now(),
            },
            balance,
        ))
    }
}
