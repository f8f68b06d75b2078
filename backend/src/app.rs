use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::chain::{ChainRpc, DisconnectedWallet, KeypairWallet, SolanaRpc, Wallet};
use crate::config::{Config, CreditPricing, Network, CREDITS_STORAGE_KEY};
use crate::error::{GenerationError, PaymentError};
use crate::flows::{GenerationFlow, PaymentFlow};
use crate::imagegen::{GeminiImageClient, ImageGenerator};
use crate::ledger::{postgres, CreditLedger, LocalCounterStore, LocalLedger, PgLedger};
use crate::model::{GeneratedImage, PaymentReceipt};
use crate::notifier::StatusNotifier;
use crate::page::{self, PageState, PageView};

/// The collaborators the app is wired from.
pub struct AppParts {
    pub network: Network,
    pub pricing: CreditPricing,
    pub wallet: Arc<dyn Wallet>,
    pub rpc: Arc<dyn ChainRpc>,
    pub ledger: Arc<dyn CreditLedger>,
    pub generator: Arc<dyn ImageGenerator>,
    pub confirm_poll: Duration,
}

/// Root composition: wallet, network, ledger, notifier, image service and
/// both flows.
pub struct App {
    network: Network,
    pricing: CreditPricing,
    wallet: Arc<dyn Wallet>,
    ledger: Arc<dyn CreditLedger>,
    notifier: StatusNotifier,
    page: Arc<PageState>,
    payment: PaymentFlow,
    generation: GenerationFlow,
}

impl App {
    pub fn new(parts: AppParts) -> Self {
        let notifier = StatusNotifier::new();
        let page = Arc::new(PageState::new());

        let payment = PaymentFlow::new(
            parts.wallet.clone(),
            parts.rpc,
            parts.ledger.clone(),
            notifier.clone(),
            page.clone(),
            parts.pricing.clone(),
        )
        .with_poll_interval(parts.confirm_poll);

        let generation = GenerationFlow::new(
            parts.wallet.clone(),
            parts.generator,
            parts.ledger.clone(),
            notifier.clone(),
            page.clone(),
            parts.pricing.generation_cost,
        );

        Self {
            network: parts.network,
            pricing: parts.pricing,
            wallet: parts.wallet,
            ledger: parts.ledger,
            notifier,
            page,
            payment,
            generation,
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let wallet: Arc<dyn Wallet> = match &config.keypair_path {
            Some(path) => Arc::new(KeypairWallet::from_file(path)?),
            None => Arc::new(DisconnectedWallet),
        };

        let rpc = SolanaRpc::new(&config.rpc_url);
        tracing::info!(network = %config.network, rpc = %rpc.url(), "Using Solana RPC");

        let ledger: Arc<dyn CreditLedger> = match &config.database_url {
            Some(database_url) => {
                let pool = postgres::get_db_pool(database_url).await?;
                tracing::info!("Using Postgres credit ledger");
                Arc::new(PgLedger::new(pool, CREDITS_STORAGE_KEY))
            }
            None => {
                let store = LocalCounterStore::new(&config.data_dir);
                tracing::info!(path = %store.path().display(), "Using local credit store");
                Arc::new(LocalLedger::new(store, CREDITS_STORAGE_KEY))
            }
        };

        let generator = GeminiImageClient::new(
            config.gemini_api_key.clone(),
            config.gemini_image_model.clone(),
        )
        .context("Failed to build image generation client")?;

        Ok(Self::new(AppParts {
            network: config.network,
            pricing: config.pricing.clone(),
            wallet,
            rpc: Arc::new(rpc),
            ledger,
            generator: Arc::new(generator),
            confirm_poll: Duration::from_millis(config.confirm_poll_ms),
        }))
    }

    pub async fn buy_credits(&self) -> Result<PaymentReceipt, PaymentError> {
        self.payment.run().await
    }

    pub async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        self.generation.run(prompt).await
    }

    /// Current balance; a ledger failure shows as zero credits.
    pub async fn credits(&self) -> u64 {
        self.ledger.balance().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read credit balance");
            0
        })
    }

    pub fn wallet(&self) -> &Arc<dyn Wallet> {
        &self.wallet
    }

    pub fn notifier(&self) -> &StatusNotifier {
        &self.notifier
    }

    pub fn payment(&self) -> &PaymentFlow {
        &self.payment
    }

    pub fn generation(&self) -> &GenerationFlow {
        &self.generation
    }

    pub fn view(&self) -> PageView {
        self.page.view()
    }

    pub fn clear_error(&self) {
        self.page.clear_error();
    }

    pub async fn render(&self) -> String {
        let snapshot = page::PageSnapshot {
            credits: self.credits().await,
            wallet: self.wallet.public_key().map(|pk| pk.to_string()),
            network: self.network.label(),
            is_mainnet: self.network.is_mainnet(),
            purchase_cost_sol: self.pricing.purchase_cost_sol,
            credits_per_purchase: self.pricing.credits_per_purchase,
            generation_cost: self.pricing.generation_cost,
            messages: self.notifier.messages(),
            view: self.page.view(),
        };
        page::render(&snapshot)
    }
}
