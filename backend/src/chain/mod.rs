use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};

use crate::error::{NetworkError, PaymentError};

pub mod solana_client;
pub mod wallet;

pub use self::solana_client::SolanaRpc;
pub use self::wallet::{DisconnectedWallet, KeypairWallet, Wallet};

// System program ID
const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
// SystemInstruction::Transfer, bincode-encoded as a little endian u32
const SYSTEM_TRANSFER_INDEX: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestBlockhash {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// Not yet seen at confirmed commitment.
    Pending,
    Confirmed,
    /// Landed on chain but execution failed.
    Failed(String),
}

/// The RPC calls the payment flow depends on, all at confirmed commitment.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn latest_blockhash(&self) -> Result<LatestBlockhash, NetworkError>;
    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, NetworkError>;
    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus, NetworkError>;
    async fn block_height(&self) -> Result<u64, NetworkError>;
}

/// Build a native SOL transfer from `from` to `to`.
pub fn transfer_instruction(from: &Pubkey, to: &Pubkey, lamports: u64) -> Result<Instruction> {
    // Instruction data: variant index (4 bytes) + lamports (8 bytes)
    let mut instruction_data = Vec::with_capacity(12);
    instruction_data.extend_from_slice(&SYSTEM_TRANSFER_INDEX.to_le_bytes());
    instruction_data.extend_from_slice(&lamports.to_le_bytes());

    Ok(Instruction {
        program_id: Pubkey::from_str(SYSTEM_PROGRAM_ID)?,
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data: instruction_data,
    })
}

/// Wait until `signature` is confirmed, fails on chain, or its blockhash
/// expires. The status is read once more after expiry is observed, so a
/// transaction that landed just before the cutoff still settles.
pub async fn confirm_transaction(
    rpc: &dyn ChainRpc,
    signature: &Signature,
    blockhash: &LatestBlockhash,
    poll_interval: Duration,
) -> Result<(), PaymentError> {
    loop {
        if let Some(outcome) = settled(rpc, signature).await? {
            return outcome;
        }

        let height = rpc
            .block_height()
            .await
            .map_err(PaymentError::Confirmation)?;
        if height > blockhash.last_valid_block_height {
            tracing::debug!(%signature, height, "Blockhash expired, checking status one last time");
            return match settled(rpc, signature).await? {
                Some(outcome) => outcome,
                None => Err(PaymentError::Expired),
            };
        }

        tokio::time::sleep(poll_interval).await;
    }
}

async fn settled(
    rpc: &dyn ChainRpc,
    signature: &Signature,
) -> Result<Option<Result<(), PaymentError>>, PaymentError> {
    let status = rpc
        .signature_status(signature)
        .await
        .map_err(PaymentError::Confirmation)?;
    Ok(match status {
        SignatureStatus::Confirmed => Some(Ok(())),
        SignatureStatus::Failed(err) => Some(Err(PaymentError::OnChain(err))),
        SignatureStatus::Pending => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::{Keypair, Signer};

    #[test]
    fn transfer_instruction_layout() {
        let from = Keypair::new().pubkey();
        let to = Keypair::new().pubkey();
        let ix = transfer_instruction(&from, &to, 10_000_000).unwrap();

        assert_eq!(ix.program_id.to_string(), SYSTEM_PROGRAM_ID);
        assert_eq!(&ix.data[..4], &[2, 0, 0, 0]);
        assert_eq!(&ix.data[4..], &10_000_000u64.to_le_bytes());
        assert_eq!(ix.accounts.len(), 2);
        assert!(ix.accounts[0].is_signer && ix.accounts[0].is_writable);
        assert_eq!(ix.accounts[1].pubkey, to);
        assert!(!ix.accounts[1].is_signer && ix.accounts[1].is_writable);
    }
}
