use std::time::Duration;

use ethers_core::types::{Address, H256};
use thiserror::Error;

/// Failures while loading the token registry. All of them are fatal to the run.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("reading token list {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing token list: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no download tool installed (tried wget and curl)")]
    NoDownloadToolAvailable,

    #[error("{tool} could not download the token list ({status})")]
    DownloadFailed { tool: &'static str, status: String },
}

#[derive(Error, Debug)]
pub enum MacroError {
    #[error("invalid macro definition")]
    InvalidMacroDefinition,

    #[error("invalid macro argument: #{keyword} takes {expected} arguments, got {got}")]
    InvalidMacroArgument {
        keyword: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("undefined macro definition: #{0}")]
    UndefinedMacro(String),

    #[error("the given token symbol is unrecognizable: {0}")]
    UnrecognizedTokenSymbol(String),

    #[error("invalid token amount {0:?}")]
    InvalidAmount(String),

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("token balance unavailable: {0}")]
    BalanceUnavailable(String),

    #[error("embedded ERC-20 ABI: {0}")]
    AbiDefinition(#[from] serde_json::Error),

    #[error("abi encoding failed: {0}")]
    Abi(#[from] ethers_core::abi::Error),
}

#[derive(Error, Debug)]
pub enum EntryError {
    #[error("end of input")]
    EndOfInput,

    #[error("empty file content")]
    EmptyContent,

    #[error("corrupted record {record}: {reason}")]
    CorruptRecord { record: usize, reason: String },

    #[error("record index {0} exceeds the batch file")]
    RecordIndexExceed(usize),

    #[error("sheet {0:?} not found in workbook")]
    SheetNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("reading workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),

    #[error("workbook archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("worksheet xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("worksheet xml attribute: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("malformed workbook: {0}")]
    MalformedWorkbook(String),
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("invalid sender address {0:?}")]
    Sender(String),

    #[error("invalid receiver address {0:?}")]
    Receiver(String),

    #[error("a transaction without receiver needs a non-empty payload")]
    EmptyPayload,

    #[error("invalid transfer value {0:?}")]
    Value(String),

    #[error("invalid payload: {0}")]
    Payload(String),
}

#[derive(Error, Debug)]
#[error("{0}")]
pub struct RpcError(pub String);

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("no key file for account {0:?} in keystore")]
    UnknownAccount(Address),

    #[error("could not decrypt key for {account:?}: {reason}")]
    BadPassphrase { account: Address, reason: String },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("{op} failed: {source}")]
    Remote {
        op: &'static str,
        #[source]
        source: RpcError,
    },

    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("{op} returned out-of-range value {value}")]
    OutOfRange { op: &'static str, value: String },

    #[error(transparent)]
    Sign(#[from] KeystoreError),

    #[error("wait transaction {hash:?} mined timeout after {after:?}")]
    WaitTimeout { hash: H256, after: Duration },
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("invalid batch index [{begin}, {end}) for {len} entries")]
    InvalidBatchIndex { begin: usize, end: usize, len: usize },

    #[error(transparent)]
    Read(#[from] EntryError),

    #[error("annotating batch file: {0}")]
    Annotate(EntryError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Why a single batch entry (or single-shot command) could not be submitted.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Macro(#[from] MacroError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error("passphrase: {0}")]
    Passphrase(String),
}
