use async_trait::async_trait;
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::rpc_client::RpcClient,
    rpc_config::CommitmentConfig,
    rpc_request::RpcError,
};
use solana_sdk::{signature::Signature, transaction::Transaction};

use super::{ChainRpc, LatestBlockhash, SignatureStatus};
use crate::error::NetworkError;

// Some providers report throttling as a JSON-RPC error instead of an HTTP status.
const RPC_RATE_LIMIT_CODES: [i64; 2] = [429, -32429];

pub struct SolanaRpc {
    rpc_client: RpcClient,
}

impl SolanaRpc {
    /// Connect to `rpc_url` with confirmed commitment.
    pub fn new(rpc_url: &str) -> Self {
        let rpc_client =
            RpcClient::new_with_commitment(rpc_url.to_string(), CommitmentConfig::confirmed());
        Self { rpc_client }
    }

    pub fn url(&self) -> String {
        self.rpc_client.url()
    }
}

/// Classify a client error by HTTP status or JSON-RPC code.
pub fn classify_client_error(err: &ClientError) -> NetworkError {
    match err.kind() {
        ClientErrorKind::Reqwest(e) => match e.status().map(|s| s.as_u16()) {
            Some(403) => NetworkError::Forbidden,
            Some(429) => NetworkError::RateLimited,
            _ => NetworkError::Other(err.to_string()),
        },
        ClientErrorKind::RpcError(RpcError::RpcResponseError { code, .. })
            if *code == 403 =>
        {
            NetworkError::Forbidden
        }
        ClientErrorKind::RpcError(RpcError::RpcResponseError { code, .. })
            if RPC_RATE_LIMIT_CODES.contains(code) =>
        {
            NetworkError::RateLimited
        }
        _ => NetworkError::Other(err.to_string()),
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    async fn latest_blockhash(&self) -> Result<LatestBlockhash, NetworkError> {
        let (blockhash, last_valid_block_height) = self
            .rpc_client
            .get_latest_blockhash_with_commitment(CommitmentConfig::confirmed())
            .await
            .map_err(|e| classify_client_error(&e))?;

        Ok(LatestBlockhash {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, NetworkError> {
        self.rpc_client
            .send_transaction(transaction)
            .await
            .map_err(|e| classify_client_error(&e))
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus, NetworkError> {
        let response = self
            .rpc_client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| classify_client_error(&e))?;

        let status = match response.value.into_iter().next().flatten() {
            Some(status) => status,
            None => return Ok(SignatureStatus::Pending),
        };

        if let Some(err) = &status.err {
            return Ok(SignatureStatus::Failed(format!("{err:?}")));
        }
        if status.satisfies_commitment(CommitmentConfig::confirmed()) {
            Ok(SignatureStatus::Confirmed)
        } else {
            Ok(SignatureStatus::Pending)
        }
    }

    async fn block_height(&self) -> Result<u64, NetworkError> {
        self.rpc_client
            .get_block_height_with_commitment(CommitmentConfig::confirmed())
            .await
            .map_err(|e| classify_client_error(&e))
    }
}
