use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use slashai::config::Config;
use slashai::imagegen::decode_data_url;
use slashai::App;

#[derive(Parser)]
#[command(name = "slashai", about = "Buy credits with SOL and spend them on AI images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show credits, wallet and network
    Status,

    /// Pay the configured SOL amount for a pack of credits
    Buy,

    /// Spend credits on an image for PROMPT
    Generate {
        prompt: String,

        /// Write the image to this file instead of printing its URL
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Sign arbitrary text with the connected wallet
    SignMessage { text: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {e}");
    }

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let app = App::from_config(&config).await?;

    match cli.command {
        Command::Status => {}
        Command::Buy => {
            println!(
                "💳 Purchasing {} credits for {} SOL...",
                config.pricing.credits_per_purchase, config.pricing.purchase_cost_sol
            );
            match app.buy_credits().await {
                Ok(receipt) => println!("✅ Payment confirmed! Signature: {}", receipt.signature),
                Err(e) => eprintln!("❌ {}", e.user_message()),
            }
        }
        Command::Generate { prompt, out } => {
            println!("🎨 Generating image...");
            match app.generate(&prompt).await {
                Ok(image) => match out {
                    Some(path) => {
                        let (_, bytes) = decode_data_url(&image.image_url)
                            .context("Image service did not return inline image data")?;
                        std::fs::write(&path, bytes)
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        println!("✅ Saved image to {}", path.display());
                    }
                    None => println!("✅ {}", image.image_url),
                },
                Err(e) => eprintln!("❌ {e}"),
            }
        }
        Command::SignMessage { text } => match app.wallet().sign_message(text.as_bytes()) {
            Ok(signature) => println!("✍️  {signature}"),
            Err(e) => eprintln!("❌ {e}"),
        },
    }

    println!();
    print!("{}", app.render().await);
    Ok(())
}
