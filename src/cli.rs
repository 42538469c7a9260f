use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::defaults::Defaults;
use crate::keystore::KeystoreDir;
use crate::passphrase::PassphraseSource;
use crate::rpc::{EthersClient, LedgerClient};
use crate::send::SendOpts;

/// ethclient: talk to an Ethereum node from the command line
#[derive(Parser, Debug)]
#[command(version, about = "Send transactions and calls to an Ethereum node, one by one or in batches")]
pub struct Cli {
    /// Log level or filter directives (e.g. "debug" or "info,ethclient=trace")
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a transaction to the connected node
    Send(SendArgs),

    /// Execute a message call in the node's VM without leaving a trace on chain
    Call(CallArgs),

    /// Send a batch of transactions listed in an xlsx or comma-delimited file
    #[command(name = "sendBatch")]
    SendBatch(SendBatchArgs),

    /// Look up the receipts of an annotated batch file and record their status
    #[command(name = "batchStatus")]
    BatchStatus(BatchStatusArgs),
}

/// Remote node connection
#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// Remote node url (http or https)
    #[arg(long, default_value = Defaults::NODE_URL)]
    pub url: String,

    /// Timeout for each remote call, in seconds
    #[arg(long, default_value_t = Defaults::RPC_TIMEOUT.as_secs())]
    pub rpc_timeout: u64,

    /// How long to wait for a transaction to be mined, in seconds
    #[arg(long, default_value_t = Defaults::WAIT_TIMEOUT.as_secs())]
    pub wait_timeout: u64,
}

impl NodeArgs {
    pub fn send_opts(&self) -> SendOpts {
        SendOpts {
            rpc_timeout: Duration::from_secs(self.rpc_timeout),
            wait_timeout: Duration::from_secs(self.wait_timeout),
            ..SendOpts::default()
        }
    }

    pub fn connect(&self) -> Result<Arc<dyn LedgerClient>> {
        let client = EthersClient::connect(&self.url)
            .with_context(|| format!("connecting to {}", self.url))?;
        Ok(Arc::new(client))
    }
}

/// Keyfiles and their passphrase
#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    /// Keystore directory path
    #[arg(long, default_value = Defaults::KEYSTORE_DIR)]
    pub keystore: PathBuf,

    /// Keyfile passphrase (visible in the process list; prefer --passwordfile)
    #[arg(long)]
    pub password: Option<String>,

    /// File that contains the keyfile passphrase
    #[arg(long)]
    pub passwordfile: Option<PathBuf>,
}

impl KeyArgs {
    pub fn passphrase_source(&self) -> PassphraseSource {
        PassphraseSource::new(self.password.clone(), self.passwordfile.clone())
    }

    pub fn keystore(&self) -> KeystoreDir {
        KeystoreDir::new(&self.keystore)
    }
}

/// Transaction fields given on the command line
#[derive(Args, Debug, Clone)]
pub struct MessageArgs {
    /// Transaction sender address
    #[arg(long)]
    pub sender: String,

    /// Transaction receiver address (empty for contract creation)
    #[arg(long, default_value = "")]
    pub receiver: String,

    /// Transfer value (wei)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    pub value: String,

    /// Contract invocation payload: hex, or a macro such as "#TRANSFER RDN 100"
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub data: String,

    /// Token list (JSON) used by macros; downloaded when absent
    #[arg(long)]
    pub tokenfile: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub node: NodeArgs,

    #[command(flatten)]
    pub keys: KeyArgs,

    #[command(flatten)]
    pub msg: MessageArgs,

    /// Wait until the transaction has been mined
    #[arg(long)]
    pub sync: bool,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    #[command(flatten)]
    pub node: NodeArgs,

    #[command(flatten)]
    pub msg: MessageArgs,
}

#[derive(Args, Debug)]
pub struct SendBatchArgs {
    #[command(flatten)]
    pub node: NodeArgs,

    #[command(flatten)]
    pub keys: KeyArgs,

    /// Batch file (.xlsx or comma-delimited text); asked for when omitted
    #[arg(long)]
    pub batchfile: Option<PathBuf>,

    /// First entry to send
    #[arg(long, default_value = "0")]
    pub batchstart: usize,

    /// One past the last entry to send (0 = up to the last entry)
    #[arg(long, default_value = "0")]
    pub batchend: usize,

    /// Worksheet name for xlsx batch files
    #[arg(long, default_value = Defaults::SHEET)]
    pub sheet: String,

    /// Token list (JSON) used by macros; downloaded when absent
    #[arg(long)]
    pub tokenfile: Option<String>,

    /// Write each submitted hash back into the batch file and skip entries that already have one
    #[arg(long)]
    pub annotate: bool,

    /// Write a JSON report of the per-entry outcomes (never overwrites)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BatchStatusArgs {
    #[command(flatten)]
    pub node: NodeArgs,

    /// Annotated batch file
    #[arg(long)]
    pub batchfile: PathBuf,

    /// Worksheet name for xlsx batch files
    #[arg(long, default_value = Defaults::SHEET)]
    pub sheet: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_batch_flags() {
        let cli = Cli::try_parse_from([
            "ethclient",
            "sendBatch",
            "--batchfile",
            "b.xlsx",
            "--batchstart",
            "2",
            "--annotate",
            "--password",
            "secret",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.log_level, "debug");
        let Command::SendBatch(args) = cli.cmd else {
            panic!("expected sendBatch");
        };
        assert_eq!(args.batchstart, 2);
        assert_eq!(args.batchend, 0);
        assert_eq!(args.sheet, "Sheet1");
        assert!(args.annotate);
        assert_eq!(args.node.url, Defaults::NODE_URL);
        assert_eq!(args.node.send_opts().rpc_timeout, Duration::from_secs(5));
        assert_eq!(args.keys.keystore, PathBuf::from("keystore"));
    }

    #[test]
    fn send_accepts_macro_data_and_negative_value_text() {
        let cli = Cli::try_parse_from([
            "ethclient",
            "send",
            "--sender",
            "0xadd0354d4f5c101685509001053730417321db49",
            "--receiver",
            "0x8f0909ccb296ebd319834edb0d5785794b781d7f",
            "--value",
            "-1",
            "--data",
            "#TRANSFER RDN 100",
            "--sync",
        ])
        .unwrap();
        let Command::Send(args) = cli.cmd else {
            panic!("expected send");
        };
        assert_eq!(args.msg.value, "-1");
        assert_eq!(args.msg.data, "#TRANSFER RDN 100");
        assert!(args.sync);
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
