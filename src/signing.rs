use ethers_core::types::{transaction::eip2718::TypedTransaction, Bytes, H256};
use ethers_core::utils::keccak256;
use ethers_signers::{LocalWallet, Signer};

use crate::error::KeystoreError;

/// RLP-encoded signed transaction plus its hash.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: H256,
}

/// Sign a legacy transaction with EIP-155 replay protection.
///
/// The chain id is taken from the transaction when set, otherwise from the
/// wallet; it is pinned on the transaction before encoding so the signature
/// and the RLP agree.
pub async fn sign_legacy(
    wallet: &LocalWallet,
    tx: &TypedTransaction,
) -> Result<SignedTransaction, KeystoreError> {
    let mut tx = tx.clone();
    if tx.chain_id().is_none() {
        tx.set_chain_id(wallet.chain_id());
    }
    let sig = wallet
        .sign_transaction(&tx)
        .await
        .map_err(|e| KeystoreError::Signing(e.to_string()))?;
    let raw = tx.rlp_signed(&sig);
    let hash = H256::from(keccak256(&raw));
    Ok(SignedTransaction { raw, hash })
}

/// Decode a raw signed transaction and recover its sender.
#[cfg(test)]
pub fn decode_signed_tx_and_recover(
    raw: &[u8],
) -> anyhow::Result<(TypedTransaction, ethers_core::types::Address)> {
    let rlp = ethers_core::utils::rlp::Rlp::new(raw);
    let (tx, sig) = TypedTransaction::decode_signed(&rlp)?;
    let from = sig.recover(tx.sighash())?;
    Ok((tx, from))
}
