use std::fmt::Write;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use crate::model::{GeneratedImage, StatusKind, StatusMessage};

/// Ephemeral state shown on the page: flags, error banner, latest result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageView {
    pub is_buying_credits: bool,
    pub is_generating_image: bool,
    pub error: Option<String>,
    pub current_prompt: Option<String>,
    pub generated_image: Option<GeneratedImage>,
}

impl PageView {
    /// The image panel shows a spinner only while a request for the current
    /// prompt has not produced an image yet.
    pub fn image_loading(&self) -> bool {
        self.is_generating_image && self.current_prompt.is_some() && self.generated_image.is_none()
    }

    /// The banner is hidden while an error toast already carries its text.
    pub fn visible_error<'a>(&'a self, messages: &[StatusMessage]) -> Option<&'a str> {
        let error = self.error.as_deref()?;
        let duplicated = messages
            .iter()
            .any(|m| m.kind == StatusKind::Error && m.text.contains(error));
        (!duplicated).then_some(error)
    }
}

#[derive(Debug, Default)]
pub struct PageState {
    view: Mutex<PageView>,
}

impl PageState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> PageView {
        self.lock().clone()
    }

    pub fn clear_error(&self) {
        self.lock().error = None;
    }

    pub(crate) fn begin_purchase(&self) {
        let mut view = self.lock();
        view.is_buying_credits = true;
        view.error = None;
    }

    pub(crate) fn end_purchase(&self, error: Option<String>) {
        let mut view = self.lock();
        view.is_buying_credits = false;
        if error.is_some() {
            view.error = error;
        }
    }

    pub(crate) fn begin_generation(&self, prompt: &str) {
        let mut view = self.lock();
        view.current_prompt = Some(prompt.to_string());
        view.generated_image = None;
        view.error = None;
        view.is_generating_image = true;
    }

    pub(crate) fn finish_generation(&self, outcome: Result<GeneratedImage, String>) {
        let mut view = self.lock();
        view.is_generating_image = false;
        match outcome {
            Ok(image) => view.generated_image = Some(image),
            Err(message) => {
                view.generated_image = None;
                view.error = Some(message);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, PageView> {
        self.view.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Everything needed to draw the page once.
pub struct PageSnapshot<'a> {
    pub credits: u64,
    pub wallet: Option<String>,
    pub network: &'a str,
    pub is_mainnet: bool,
    pub purchase_cost_sol: f64,
    pub credits_per_purchase: u64,
    pub generation_cost: u64,
    pub messages: Vec<StatusMessage>,
    pub view: PageView,
}

/// Text rendition of the page: header, toasts, purchase panel, prompt hint,
/// error banner, image panel and network footer.
pub fn render(page: &PageSnapshot<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "SLASHAI  |  Credits: {}", page.credits);

    for msg in &page.messages {
        let _ = writeln!(out, "  [{}] {}", msg.kind.label(), msg.text);
    }

    match &page.wallet {
        None => {
            let _ = writeln!(out, "Wallet not connected. Set SOLANA_KEYPAIR_PATH to connect.");
        }
        Some(address) => {
            let _ = writeln!(out, "Wallet: {address}");
            let status = if page.view.is_buying_credits {
                "Processing Purchase..."
            } else {
                "Buy Credits Now"
            };
            let _ = writeln!(
                out,
                "{} Credits for {} SOL  ({status})",
                page.credits_per_purchase, page.purchase_cost_sol
            );
        }
    }

    let hint = match (&page.wallet, page.credits >= page.generation_cost) {
        (None, _) => "Connect your wallet to generate images.".to_string(),
        (Some(_), true) => format!(
            "Cost: {} credit. You have {} credits.",
            page.generation_cost, page.credits
        ),
        (Some(_), false) => format!(
            "You need {} credit. You have {}. Purchase credits above.",
            page.generation_cost, page.credits
        ),
    };
    let _ = writeln!(out, "{hint}");

    if let Some(error) = page.view.visible_error(&page.messages) {
        let _ = writeln!(out, "Error: {error}");
    }

    if page.view.image_loading() {
        let _ = writeln!(out, "Generating...");
    } else if let Some(image) = &page.view.generated_image {
        let _ = writeln!(out, "Prompt: {}", image.prompt);
        let _ = writeln!(out, "Image: {}", preview_url(&image.image_url));
    }

    let _ = writeln!(out, "(c) {} SLASHAI. Solana Network: {}", Utc::now().format("%Y"), page.network);
    if !page.is_mainnet {
        let _ = writeln!(
            out,
            "Currently on {}. Ensure your wallet is also set to this network.",
            page.network
        );
    }
    out
}

fn preview_url(url: &str) -> String {
    const MAX: usize = 64;
    if url.len() <= MAX {
        return url.to_string();
    }
    let cut = url
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|i| *i <= MAX)
        .last()
        .unwrap_or(0);
    format!("{}... ({} bytes)", &url[..cut], url.len())
}
