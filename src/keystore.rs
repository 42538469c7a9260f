use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ethers_core::types::{transaction::eip2718::TypedTransaction, Address};
use ethers_signers::{LocalWallet, Signer};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::KeystoreError;
use crate::signing::{sign_legacy, SignedTransaction};

/// Account store that can unlock a signer with a passphrase.
#[async_trait]
pub trait Keystore: Send + Sync {
    async fn unlock(&self, account: Address, passphrase: &str) -> Result<LocalWallet, KeystoreError>;

    /// Unlock `account` and sign `tx` for `chain_id` in one go.
    async fn sign_tx_with_passphrase(
        &self,
        account: Address,
        passphrase: &str,
        tx: &TypedTransaction,
        chain_id: u64,
    ) -> Result<SignedTransaction, KeystoreError> {
        let wallet = self.unlock(account, passphrase).await?.with_chain_id(chain_id);
        sign_legacy(&wallet, tx).await
    }
}

/// Directory of Web3 secret-storage key files.
pub struct KeystoreDir {
    dir: PathBuf,
}

impl KeystoreDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Find the key file for `account`: file name carrying the address (geth
    /// naming), else a JSON `address` field.
    fn find_key_file(&self, account: Address) -> Result<PathBuf, KeystoreError> {
        let needle = format!("{account:x}");
        let mut by_content = None;

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_ascii_lowercase();
            if name.contains(&needle) {
                return Ok(path);
            }
            if by_content.is_none() && key_file_address(&path).as_deref() == Some(needle.as_str()) {
                by_content = Some(path);
            }
        }
        by_content.ok_or(KeystoreError::UnknownAccount(account))
    }
}

/// Lower-case hex address (no 0x) recorded inside a key file, if any.
fn key_file_address(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let json: serde_json::Value = serde_json::from_str(&text).ok()?;
    let addr = json.get("address")?.as_str()?;
    Some(crate::util::strip_0x(addr).to_ascii_lowercase())
}

#[async_trait]
impl Keystore for KeystoreDir {
    async fn unlock(&self, account: Address, passphrase: &str) -> Result<LocalWallet, KeystoreError> {
        let path = self.find_key_file(account)?;
        debug!(path = %path.display(), "decrypting key file");

        let pass = Zeroizing::new(passphrase.to_string());
        let wallet = tokio::task::spawn_blocking(move || LocalWallet::decrypt_keystore(&path, pass.as_bytes()))
            .await
            .map_err(|e| KeystoreError::Signing(format!("key decryption task failed: {e}")))?
            .map_err(|e| KeystoreError::BadPassphrase {
                account,
                reason: e.to_string(),
            })?;

        if wallet.address() != account {
            return Err(KeystoreError::BadPassphrase {
                account,
                reason: format!("key file holds {:?}", wallet.address()),
            });
        }
        Ok(wallet)
    }
}
