use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::CreditLedger;
use crate::error::LedgerError;
use crate::model::{CreditBalance, PaymentReceipt};

pub async fn get_db_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("Failed to connect to Postgres. Ensure the service is running.")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(pool)
}

/// Ledger backed by a `credit_balances` row. Debits are a single conditional
/// `UPDATE`; the balance never goes negative.
pub struct PgLedger {
    pool: PgPool,
    key: String,
}

impl PgLedger {
    pub fn new(pool: PgPool, key: impl Into<String>) -> Self {
        Self {
            pool,
            key: key.into(),
        }
    }

    pub async fn snapshot(&self) -> Result<Option<CreditBalance>, LedgerError> {
        let row = sqlx::query_as::<_, CreditBalance>(
            "SELECT key, balance, updated_at FROM credit_balances WHERE key = $1",
        )
        .bind(&self.key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

fn to_sql_amount(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

#[async_trait]
impl CreditLedger for PgLedger {
    async fn balance(&self) -> Result<u64, LedgerError> {
        Ok(self
            .snapshot()
            .await?
            .map(|row| row.balance.max(0) as u64)
            .unwrap_or(0))
    }

    async fn credit(&self, amount: u64) -> Result<u64, LedgerError> {
        let balance: i64 = sqlx::query_scalar(
            "INSERT INTO credit_balances (key, balance, updated_at) VALUES ($1, $2, NOW())
             ON CONFLICT (key) DO UPDATE
             SET balance = credit_balances.balance + EXCLUDED.balance, updated_at = NOW()
             RETURNING balance",
        )
        .bind(&self.key)
        .bind(to_sql_amount(amount))
        .fetch_one(&self.pool)
        .await?;
        Ok(balance.max(0) as u64)
    }

    async fn try_debit(&self, amount: u64) -> Result<u64, LedgerError> {
        let balance: Option<i64> = sqlx::query_scalar(
            "UPDATE credit_balances SET balance = balance - $2, updated_at = NOW()
             WHERE key = $1 AND balance >= $2
             RETURNING balance",
        )
        .bind(&self.key)
        .bind(to_sql_amount(amount))
        .fetch_optional(&self.pool)
        .await?;

        match balance {
            Some(balance) => Ok(balance.max(0) as u64),
            None => Err(LedgerError::InsufficientCredits {
                needed: amount,
                available: self.balance().await?,
            }),
        }
    }

    async fn record_purchase(&self, receipt: &PaymentReceipt) -> Result<u64, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO payment_receipts (signature, payer, recipient, lamports, credits, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (signature) DO NOTHING",
        )
        .bind(&receipt.signature)
        .bind(&receipt.payer)
        .bind(&receipt.recipient)
        .bind(receipt.lamports)
        .bind(receipt.credits)
        .bind(receipt.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            // Already credited for this signature.
            tx.rollback().await?;
            tracing::warn!(signature = %receipt.signature, "Receipt already recorded");
            return self.balance().await;
        }

        let balance: i64 = sqlx::query_scalar(
            "INSERT INTO credit_balances (key, balance, updated_at) VALUES ($1, $2, NOW())
             ON CONFLICT (key) DO UPDATE
             SET balance = credit_balances.balance + EXCLUDED.balance, updated_at = NOW()
             RETURNING balance",
        )
        .bind(&self.key)
        .bind(receipt.credits.max(0))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(balance.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    // Runs against a live database; skipped when DATABASE_URL is unset.
    async fn test_ledger() -> Option<PgLedger> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping Postgres ledger test");
            return None;
        };
        let pool = get_db_pool(&url).await.expect("connect to test database");
        Some(PgLedger::new(pool, format!("test_{}", uuid::Uuid::new_v4())))
    }

    fn receipt(signature: &str, credits: i64) -> PaymentReceipt {
        PaymentReceipt {
            signature: signature.to_string(),
            payer: "payer".into(),
            recipient: "recipient".into(),
            lamports: 10_000_000,
            credits,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn purchase_is_credited_once_per_signature() {
        let Some(ledger) = test_ledger().await else { return };
        let signature = uuid::Uuid::new_v4().to_string();

        assert_eq!(ledger.record_purchase(&receipt(&signature, 20)).await.unwrap(), 20);
        assert_eq!(ledger.record_purchase(&receipt(&signature, 20)).await.unwrap(), 20);
        assert_eq!(ledger.balance().await.unwrap(), 20);

        let other = uuid::Uuid::new_v4().to_string();
        assert_eq!(ledger.record_purchase(&receipt(&other, 20)).await.unwrap(), 40);
    }

    #[tokio::test]
    async fn debit_is_refused_below_cost() {
        let Some(ledger) = test_ledger().await else { return };

        match ledger.try_debit(1).await {
            Err(LedgerError::InsufficientCredits { needed, available }) => {
                assert_eq!((needed, available), (1, 0));
            }
            other => panic!("expected shortfall, got {other:?}"),
        }

        ledger.credit(2).await.unwrap();
        assert_eq!(ledger.try_debit(1).await.unwrap(), 1);
        assert_eq!(ledger.try_debit(1).await.unwrap(), 0);
        assert!(matches!(
            ledger.try_debit(1).await,
            Err(LedgerError::InsufficientCredits { available: 0, .. })
        ));
        assert_eq!(ledger.balance().await.unwrap(), 0);
    }
}
