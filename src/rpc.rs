use async_trait::async_trait;
use ethers_core::types::{
    transaction::eip2718::TypedTransaction, Address, BlockNumber, Bytes, TransactionReceipt,
    H256, U256,
};
use ethers_providers::{Http, Middleware, Provider};

use crate::error::RpcError;

/// The remote node operations this client needs. Every call is independent;
/// timeouts are applied by the caller.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, RpcError>;
    async fn suggest_gas_price(&self) -> Result<U256, RpcError>;
    async fn pending_nonce(&self, account: Address) -> Result<U256, RpcError>;
    async fn chain_id(&self) -> Result<U256, RpcError>;
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, RpcError>;
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, RpcError>;
    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, RpcError>;
}

/// JSON-RPC over HTTP(S).
pub struct EthersClient {
    provider: Provider<Http>,
}

impl EthersClient {
    pub fn connect(url: &str) -> Result<Self, RpcError> {
        let provider = Provider::<Http>::try_from(url)
            .map_err(|e| RpcError(format!("invalid node url {url:?}: {e}")))?;
        Ok(Self { provider })
    }
}

fn remote<E: std::fmt::Display>(e: E) -> RpcError {
    RpcError(e.to_string())
}

#[async_trait]
impl LedgerClient for EthersClient {
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, RpcError> {
        self.provider.estimate_gas(tx, None).await.map_err(remote)
    }

    async fn suggest_gas_price(&self) -> Result<U256, RpcError> {
        self.provider.get_gas_price().await.map_err(remote)
    }

    async fn pending_nonce(&self, account: Address) -> Result<U256, RpcError> {
        self.provider
            .get_transaction_count(account, Some(BlockNumber::Pending.into()))
            .await
            .map_err(remote)
    }

    async fn chain_id(&self) -> Result<U256, RpcError> {
        self.provider.get_chainid().await.map_err(remote)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, RpcError> {
        let pending = self.provider.send_raw_transaction(raw).await.map_err(remote)?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, RpcError> {
        self.provider.get_transaction_receipt(hash).await.map_err(remote)
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, RpcError> {
        self.provider.call(tx, None).await.map_err(remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_rejects_garbage_url() {
        assert!(EthersClient::connect("not a url").is_err());
        assert!(EthersClient::connect("http://localhost:8545").is_ok());
    }
}
