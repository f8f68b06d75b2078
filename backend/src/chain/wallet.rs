use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair, Signature, Signer},
    transaction::Transaction,
};

use super::ChainRpc;
use crate::error::WalletError;

/// The wallet capabilities the flows rely on.
#[async_trait]
pub trait Wallet: Send + Sync {
    fn is_connected(&self) -> bool;

    fn public_key(&self) -> Option<Pubkey>;

    fn can_sign(&self) -> bool {
        self.is_connected()
    }

    /// Sign `transaction` with the wallet's key and broadcast it.
    async fn send_transaction(
        &self,
        transaction: Transaction,
        rpc: &dyn ChainRpc,
    ) -> Result<Signature, WalletError>;

    fn sign_message(&self, message: &[u8]) -> Result<Signature, WalletError>;
}

/// Wallet holding a keypair loaded from a Solana CLI keypair file.
pub struct KeypairWallet {
    keypair: Keypair,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn from_file(keypair_path: impl AsRef<Path>) -> Result<Self> {
        let keypair = read_keypair_file(keypair_path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read wallet keypair: {}", e))?;
        Ok(Self::new(keypair))
    }
}

#[async_trait]
impl Wallet for KeypairWallet {
    fn is_connected(&self) -> bool {
        true
    }

    fn public_key(&self) -> Option<Pubkey> {
        Some(self.keypair.pubkey())
    }

    async fn send_transaction(
        &self,
        mut transaction: Transaction,
        rpc: &dyn ChainRpc,
    ) -> Result<Signature, WalletError> {
        let recent_blockhash = transaction.message.recent_blockhash;
        transaction
            .try_sign(&[&self.keypair], recent_blockhash)
            .map_err(|e| WalletError::Rejected(e.to_string()))?;

        rpc.send_transaction(&transaction)
            .await
            .map_err(WalletError::Network)
    }

    fn sign_message(&self, message: &[u8]) -> Result<Signature, WalletError> {
        Ok(self.keypair.sign_message(message))
    }
}

/// Placeholder used when no keypair is configured.
#[derive(Debug, Default)]
pub struct DisconnectedWallet;

#[async_trait]
impl Wallet for DisconnectedWallet {
    fn is_connected(&self) -> bool {
        false
    }

    fn public_key(&self) -> Option<Pubkey> {
        None
    }

    async fn send_transaction(
        &self,
        _transaction: Transaction,
        _rpc: &dyn ChainRpc,
    ) -> Result<Signature, WalletError> {
        Err(WalletError::NotConnected)
    }

    fn sign_message(&self, _message: &[u8]) -> Result<Signature, WalletError> {
        Err(WalletError::NotConnected)
    }
}
