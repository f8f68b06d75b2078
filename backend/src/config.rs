use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Key the credit balance is persisted under.
pub const CREDITS_STORAGE_KEY: &str = "slashai_user_credits";

pub const DEFAULT_RECIPIENT_WALLET_ADDRESS: &str = "5uk4cmutw31RWqcN5wXyut7XfpPWjV3Um7x5xHvBiT36";
pub const DEFAULT_CREDIT_PURCHASE_COST_SOL: f64 = 0.01;
pub const DEFAULT_CREDITS_PER_PURCHASE: u64 = 20;
pub const DEFAULT_IMAGE_GENERATION_CREDIT_COST: u64 = 1;
pub const DEFAULT_GEMINI_IMAGE_MODEL: &str = "imagen-3.0-generate-002";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    MainnetBeta,
    Devnet,
    Testnet,
}

impl Network {
    pub fn label(&self) -> &'static str {
        match self {
            Network::MainnetBeta => "mainnet-beta",
            Network::Devnet => "devnet",
            Network::Testnet => "testnet",
        }
    }

    /// Public endpoint used when no RPC URL is configured. These are heavily
    /// rate limited; a dedicated endpoint should be set for real use.
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Network::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Network::Devnet => "https://api.devnet.solana.com",
            Network::Testnet => "https://api.testnet.solana.com",
        }
    }

    pub fn is_mainnet(&self) -> bool {
        matches!(self, Network::MainnetBeta)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "mainnet-beta" | "mainnet" => Ok(Network::MainnetBeta),
            "devnet" => Ok(Network::Devnet),
            "testnet" => Ok(Network::Testnet),
            other => anyhow::bail!("unknown Solana network: {other}"),
        }
    }
}

/// Prices and payout of the credit scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct CreditPricing {
    pub purchase_cost_sol: f64,
    pub credits_per_purchase: u64,
    pub generation_cost: u64,
    pub recipient_address: String,
}

impl CreditPricing {
    pub fn purchase_cost_lamports(&self) -> u64 {
        sol_to_lamports(self.purchase_cost_sol)
    }

    /// Reject prices that would hand out credits for nothing.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.purchase_cost_sol.is_finite() && self.purchase_cost_sol > 0.0,
            "CREDIT_PURCHASE_COST_SOL must be a positive amount, got {}",
            self.purchase_cost_sol
        );
        anyhow::ensure!(
            self.purchase_cost_lamports() > 0,
            "CREDIT_PURCHASE_COST_SOL {} is below one lamport",
            self.purchase_cost_sol
        );
        anyhow::ensure!(
            self.credits_per_purchase > 0,
            "CREDITS_PER_PURCHASE must be greater than zero"
        );
        anyhow::ensure!(
            self.generation_cost > 0,
            "IMAGE_GENERATION_CREDIT_COST must be greater than zero"
        );
        Ok(())
    }
}

impl Default for CreditPricing {
    fn default() -> Self {
        Self {
            purchase_cost_sol: DEFAULT_CREDIT_PURCHASE_COST_SOL,
            credits_per_purchase: DEFAULT_CREDITS_PER_PURCHASE,
            generation_cost: DEFAULT_IMAGE_GENERATION_CREDIT_COST,
            recipient_address: DEFAULT_RECIPIENT_WALLET_ADDRESS.to_string(),
        }
    }
}

/// Zero for negative or non-finite amounts.
pub fn sol_to_lamports(sol: f64) -> u64 {
    if !sol.is_finite() || sol <= 0.0 {
        return 0;
    }
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {name}: {value:?}")),
        None => Ok(default),
    }
}

pub struct Config {
    pub network: Network,
    pub rpc_url: String,
    pub keypair_path: Option<PathBuf>,
    pub pricing: CreditPricing,
    pub gemini_api_key: Option<String>,
    pub gemini_image_model: String,
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub confirm_poll_ms: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source. Unset variables take
    /// their defaults; set but malformed ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let network = match lookup("SOLANA_NETWORK") {
            Some(value) => value.parse()?,
            None => Network::MainnetBeta,
        };

        let pricing = CreditPricing {
            purchase_cost_sol: parse_var(
                &lookup,
                "CREDIT_PURCHASE_COST_SOL",
                DEFAULT_CREDIT_PURCHASE_COST_SOL,
            )?,
            credits_per_purchase: parse_var(
                &lookup,
                "CREDITS_PER_PURCHASE",
                DEFAULT_CREDITS_PER_PURCHASE,
            )?,
            generation_cost: parse_var(
                &lookup,
                "IMAGE_GENERATION_CREDIT_COST",
                DEFAULT_IMAGE_GENERATION_CREDIT_COST,
            )?,
            recipient_address: lookup("RECIPIENT_WALLET_ADDRESS")
                .unwrap_or_else(|| DEFAULT_RECIPIENT_WALLET_ADDRESS.to_string()),
        };
        pricing.validate()?;

        Ok(Self {
            network,
            rpc_url: lookup("SOLANA_RPC_URL")
                .unwrap_or_else(|| network.default_rpc_url().to_string()),
            keypair_path: lookup("SOLANA_KEYPAIR_PATH").map(PathBuf::from),
            pricing,
            gemini_api_key: lookup("GEMINI_API_KEY").filter(|k| !k.is_empty()),
            gemini_image_model: lookup("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_IMAGE_MODEL.to_string()),
            data_dir: lookup("SLASHAI_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".slashai")),
            database_url: lookup("DATABASE_URL").filter(|u| !u.is_empty()),
            confirm_poll_ms: parse_var(&lookup, "CONFIRM_POLL_MS", 500)?,
        })
    }
}
