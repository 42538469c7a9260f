//! In-memory node and keystore used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ethers_core::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, TransactionReceipt, H256, U256, U64,
};
use ethers_core::utils::keccak256;
use ethers_signers::{LocalWallet, Signer};

use crate::error::{KeystoreError, RpcError};
use crate::keystore::Keystore;
use crate::rpc::LedgerClient;

pub const KEY_A: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
pub const KEY_B: &str = "8da4ef21b864d2cc526dbdb2a120bd2874c36c9d0a1fb7f8c63d7f7a8b41de8f";

/// When a polled receipt becomes available.
#[derive(Debug, Clone, Copy)]
pub enum ReceiptMode {
    /// Available after this many polls returned nothing.
    AfterPolls(usize),
    Never,
    AlwaysError,
}

pub struct MockClient {
    pub gas: U256,
    pub gas_price: U256,
    pub nonce: U256,
    pub chain_id: U256,
    /// Delay applied to `estimate_gas`, to exercise call timeouts.
    pub estimate_delay: Option<Duration>,
    pub receipt_mode: ReceiptMode,
    pub receipt_status: u64,
    pub call_result: Mutex<Bytes>,
    pub fail_estimate_for: Mutex<HashSet<Address>>,
    pub calls: Mutex<Vec<TypedTransaction>>,
    pub sent: Mutex<Vec<Bytes>>,
    pub receipt_polls: AtomicUsize,
}

impl Default for MockClient {
    fn default() -> Self {
        Self {
            gas: U256::from(21_000u64),
            gas_price: U256::from(1_000_000_000u64),
            nonce: U256::from(3u64),
            chain_id: U256::from(5u64),
            estimate_delay: None,
            receipt_mode: ReceiptMode::AfterPolls(0),
            receipt_status: 1,
            call_result: Mutex::new(Bytes::default()),
            fail_estimate_for: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            receipt_polls: AtomicUsize::new(0),
        }
    }
}

impl MockClient {
    pub fn set_call_result_uint(&self, v: U256) {
        let mut word = [0u8; 32];
        v.to_big_endian(&mut word);
        *self.call_result.lock().unwrap() = Bytes::from(word.to_vec());
    }

    pub fn fail_estimate_for(&self, account: Address) {
        self.fail_estimate_for.lock().unwrap().insert(account);
    }

    pub fn calls(&self) -> Vec<TypedTransaction> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().unwrap().clone()
    }

    pub fn receipt_polls(&self) -> usize {
        self.receipt_polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerClient for MockClient {
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, RpcError> {
        if let Some(d) = self.estimate_delay {
            tokio::time::sleep(d).await;
        }
        if let Some(from) = tx.from() {
            if self.fail_estimate_for.lock().unwrap().contains(from) {
                return Err(RpcError("execution reverted".into()));
            }
        }
        Ok(self.gas)
    }

    async fn suggest_gas_price(&self) -> Result<U256, RpcError> {
        Ok(self.gas_price)
    }

    async fn pending_nonce(&self, _account: Address) -> Result<U256, RpcError> {
        Ok(self.nonce)
    }

    async fn chain_id(&self) -> Result<U256, RpcError> {
        Ok(self.chain_id)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, RpcError> {
        let hash = H256::from(keccak256(&raw));
        self.sent.lock().unwrap().push(raw);
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>, RpcError> {
        let polls = self.receipt_polls.fetch_add(1, Ordering::SeqCst);
        match self.receipt_mode {
            ReceiptMode::AlwaysError => Err(RpcError("connection refused".into())),
            ReceiptMode::Never => Ok(None),
            ReceiptMode::AfterPolls(n) if polls < n => Ok(None),
            ReceiptMode::AfterPolls(_) => Ok(Some(TransactionReceipt {
                transaction_hash: hash,
                status: Some(U64::from(self.receipt_status)),
                ..Default::default()
            })),
        }
    }

    async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, RpcError> {
        self.calls.lock().unwrap().push(tx.clone());
        Ok(self.call_result.lock().unwrap().clone())
    }
}

/// Keystore holding plain wallets, each behind a passphrase.
#[derive(Default)]
pub struct MockKeystore {
    accounts: HashMap<Address, (LocalWallet, String)>,
}

impl MockKeystore {
    pub fn with_key(mut self, key: &str, passphrase: &str) -> Self {
        let wallet: LocalWallet = key.parse().unwrap();
        self.accounts.insert(wallet.address(), (wallet, passphrase.to_string()));
        self
    }
}

pub fn address_of(key: &str) -> Address {
    key.parse::<LocalWallet>().unwrap().address()
}

#[async_trait]
impl Keystore for MockKeystore {
    async fn unlock(&self, account: Address, passphrase: &str) -> Result<LocalWallet, KeystoreError> {
        let (wallet, expected) = self
            .accounts
            .get(&account)
            .ok_or(KeystoreError::UnknownAccount(account))?;
        if expected != passphrase {
            return Err(KeystoreError::BadPassphrase {
                account,
                reason: "Mac Mismatch".into(),
            });
        }
        Ok(wallet.clone())
    }
}

pub fn temp_path(ext: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("ethclient-{}.{ext}", uuid::Uuid::new_v4()))
}
