//! Central place for all default values.
//! Update these and the whole app picks them up.

use std::time::Duration;

pub struct Defaults;

impl Defaults {

    /* Remote node */
    pub const NODE_URL: &'static str = "http://localhost:8545";
    pub const RPC_TIMEOUT: Duration = Duration::from_secs(5);
    pub const WAIT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /* Keystore */
    pub const KEYSTORE_DIR: &'static str = "keystore";
    pub const MIN_PASSPHRASE_LEN: usize = 6;
    pub const PASSPHRASE_ATTEMPTS: usize = 3;

    /* Token list */
    pub const TOKEN_LIST_URL: &'static str =
        "https://raw.githubusercontent.com/kvhnuke/etherwallet/mercury/app/scripts/tokens/ethTokens.json";
    pub const TOKEN_CACHE_FILE: &'static str = "ethToken.json";

    /* Batch files */
    pub const SHEET: &'static str = "Sheet1";
    pub const SHEET_EXTENSION: &'static str = "xlsx";
}
