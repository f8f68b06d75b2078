use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Info,
    Success,
    Error,
    Loading,
}

impl StatusKind {
    pub fn label(&self) -> &'static str {
        match self {
            StatusKind::Info => "info",
            StatusKind::Success => "success",
            StatusKind::Error => "error",
            StatusKind::Loading => "loading",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub id: String,
    pub kind: StatusKind,
    pub text: String,
    pub duration_ms: Option<u64>,
}

/// The prompt and image of the latest successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub prompt: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CreditBalance {
    pub key: String,
    pub balance: i64, // BIGINT, never negative
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub signature: String,
    pub payer: String,
    pub recipient: String,
    pub lamports: i64,
    pub credits: i64,
    pub created_at: DateTime<Utc>,
}
