use std::future::Future;
use std::time::Duration;

use ethers_core::types::{
    transaction::eip2718::TypedTransaction, Bytes, TransactionReceipt, H256, U256,
};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::defaults::Defaults;
use crate::error::{RpcError, SendError};
use crate::keystore::Keystore;
use crate::rpc::LedgerClient;
use crate::types::CallMessage;

/// Timing knobs for talking to the node.
#[derive(Clone, Debug)]
pub struct SendOpts {
    /// Budget for each individual remote call.
    pub rpc_timeout: Duration,
    /// Total budget for waiting on a receipt.
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for SendOpts {
    fn default() -> Self {
        Self {
            rpc_timeout: Defaults::RPC_TIMEOUT,
            wait_timeout: Defaults::WAIT_TIMEOUT,
            poll_interval: Defaults::WAIT_POLL_INTERVAL,
        }
    }
}

/// Chain parameters fetched fresh for every send.
#[derive(Clone, Debug, PartialEq)]
pub struct SendParams {
    pub gas_limit: u64,
    pub gas_price: U256,
    pub nonce: u64,
    pub chain_id: u64,
}

#[derive(Clone, Debug)]
pub struct SendOutcome {
    pub hash: H256,
    /// Present only when waiting was requested and the receipt arrived in time.
    pub receipt: Option<TransactionReceipt>,
}

/// Run one remote call under its own timeout.
async fn timed<T, F>(op: &'static str, after: Duration, fut: F) -> Result<T, SendError>
where
    F: Future<Output = Result<T, RpcError>>,
{
    match timeout(after, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(source)) => Err(SendError::Remote { op, source }),
        Err(_) => Err(SendError::Timeout { op, after }),
    }
}

fn to_u64(op: &'static str, v: U256) -> Result<u64, SendError> {
    if v > U256::from(u64::MAX) {
        return Err(SendError::OutOfRange { op, value: v.to_string() });
    }
    Ok(v.as_u64())
}

/// Estimated gas limit, suggested gas price, pending nonce and chain id.
pub async fn fetch_params(
    client: &dyn LedgerClient,
    msg: &CallMessage,
    opts: &SendOpts,
) -> Result<SendParams, SendError> {
    let t = opts.rpc_timeout;
    let tx: TypedTransaction = msg.to_request().into();

    let gas_limit = timed("estimate gas", t, client.estimate_gas(&tx)).await?;
    let gas_price = timed("suggest gas price", t, client.suggest_gas_price()).await?;
    let nonce = timed("pending nonce", t, client.pending_nonce(msg.from)).await?;
    let chain_id = timed("chain id", t, client.chain_id()).await?;

    Ok(SendParams {
        gas_limit: to_u64("estimate gas", gas_limit)?,
        gas_price,
        nonce: to_u64("pending nonce", nonce)?,
        chain_id: to_u64("chain id", chain_id)?,
    })
}

/// Sign `msg` with the sender's key and submit it. With `wait`, poll for the
/// receipt; a wait timeout only produces a warning.
pub async fn send_transaction(
    client: &dyn LedgerClient,
    msg: &CallMessage,
    passphrase: &str,
    keystore: &dyn Keystore,
    wait: bool,
    opts: &SendOpts,
) -> Result<SendOutcome, SendError> {
    let params = fetch_params(client, msg, opts).await?;
    debug!(?params, from = ?msg.from, "fetched send parameters");

    let tx: TypedTransaction = msg
        .to_request()
        .gas(params.gas_limit)
        .gas_price(params.gas_price)
        .nonce(params.nonce)
        .chain_id(params.chain_id)
        .into();

    let signed = keystore
        .sign_tx_with_passphrase(msg.from, passphrase, &tx, params.chain_id)
        .await?;

    let hash = timed(
        "send transaction",
        opts.rpc_timeout,
        client.send_raw_transaction(signed.raw.clone()),
    )
    .await?;
    if hash != signed.hash {
        warn!(local = ?signed.hash, node = ?hash, "node reported a different transaction hash");
    }
    info!(hash = ?hash, from = ?msg.from, nonce = params.nonce, "sendTransaction");

    let receipt = if wait {
        match wait_mined(client, hash, opts).await {
            Ok(r) => {
                info!(hash = ?hash, status = ?r.status, block = ?r.block_number, "transaction mined");
                Some(r)
            }
            Err(e) => {
                warn!(error = %e, "wait transaction receipt failed");
                None
            }
        }
    } else {
        None
    };

    Ok(SendOutcome { hash, receipt })
}

/// Poll for the receipt of `hash` until it shows up or the wait budget is
/// spent. Fetch errors count as "not mined yet".
pub async fn wait_mined(
    client: &dyn LedgerClient,
    hash: H256,
    opts: &SendOpts,
) -> Result<TransactionReceipt, SendError> {
    let deadline = Instant::now() + opts.wait_timeout;
    loop {
        match timeout(opts.rpc_timeout, client.transaction_receipt(hash)).await {
            Ok(Ok(Some(receipt))) => return Ok(receipt),
            Ok(Ok(None)) => debug!(?hash, "transaction not mined yet"),
            Ok(Err(e)) => debug!(?hash, error = %e, "receipt fetch failed, retrying"),
            Err(_) => debug!(?hash, "receipt fetch timed out, retrying"),
        }
        if Instant::now() + opts.poll_interval > deadline {
            return Err(SendError::WaitTimeout {
                hash,
                after: opts.wait_timeout,
            });
        }
        sleep(opts.poll_interval).await;
    }
}

/// Single receipt lookup, no retry.
pub async fn fetch_receipt(
    client: &dyn LedgerClient,
    hash: H256,
    opts: &SendOpts,
) -> Result<Option<TransactionReceipt>, SendError> {
    timed("transaction receipt", opts.rpc_timeout, client.transaction_receipt(hash)).await
}

/// Read-only message call against the latest state.
pub async fn call(
    client: &dyn LedgerClient,
    msg: &CallMessage,
    opts: &SendOpts,
) -> Result<Bytes, SendError> {
    let tx: TypedTransaction = msg.to_request().into();
    timed("call", opts.rpc_timeout, client.call(&tx)).await
}
