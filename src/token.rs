use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use ethers_core::types::Address;
use serde::Deserialize;
use tracing::{info, warn};

use crate::defaults::Defaults;
use crate::error::RegistryError;

/// ERC-20 token record as published in the shared token list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    #[serde(rename = "decimal")]
    pub decimals: u32,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Symbol -> token lookup table. Keys are lower-cased; last entry wins.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<String, Token>,
}

impl TokenRegistry {
    /// Load from a local token list, or download it once when `path` is
    /// empty or does not exist.
    pub fn load(path: &str) -> Result<Self, RegistryError> {
        Self::load_with(path, || download_token_list(tool_available))
    }

    /// `load` with the download step supplied by the caller.
    fn load_with<F>(path: &str, fetch: F) -> Result<Self, RegistryError>
    where
        F: FnOnce() -> Result<String, RegistryError>,
    {
        let content = if !path.is_empty() && Path::new(path).exists() {
            fs::read_to_string(path).map_err(|source| RegistryError::Io {
                path: path.to_string(),
                source,
            })?
        } else {
            if !path.is_empty() {
                warn!(path, "token list not found, downloading");
            }
            fetch()?
        };
        let registry = Self::from_json(&content)?;
        info!(tokens = registry.len(), "token registry loaded");
        Ok(registry)
    }

    pub fn from_json(content: &str) -> Result<Self, RegistryError> {
        let list: Vec<Token> = serde_json::from_str(content)?;
        Ok(Self::from_tokens(list))
    }

    pub fn from_tokens(list: impl IntoIterator<Item = Token>) -> Self {
        let tokens = list
            .into_iter()
            .map(|t| (t.symbol.to_lowercase(), t))
            .collect();
        Self { tokens }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, symbol: &str) -> Option<&Token> {
        self.tokens.get(&symbol.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn tool_available(tool: &str) -> bool {
    Command::new(tool)
        .arg("--help")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Download command for the first available tool, wget before curl.
fn download_command<A>(
    available: A,
    out: &str,
    url: &str,
) -> Result<(&'static str, Command), RegistryError>
where
    A: Fn(&str) -> bool,
{
    if available("wget") {
        let mut c = Command::new("wget");
        c.args(["-q", "-O", out, url]);
        Ok(("wget", c))
    } else if available("curl") {
        let mut c = Command::new("curl");
        c.args(["-fsSL", "-o", out, url]);
        Ok(("curl", c))
    } else {
        Err(RegistryError::NoDownloadToolAvailable)
    }
}

/// Fetch the token list into the cache file with wget (preferred) or curl.
/// The cache file is left in place for inspection.
fn download_token_list<A>(available: A) -> Result<String, RegistryError>
where
    A: Fn(&str) -> bool,
{
    let out = Defaults::TOKEN_CACHE_FILE;
    let url = Defaults::TOKEN_LIST_URL;
    let (tool, mut cmd) = download_command(available, out, url)?;

    info!(tool, url, "downloading token list");
    let status = cmd.status().map_err(|e| RegistryError::DownloadFailed {
        tool,
        status: e.to_string(),
    })?;
    if !status.success() {
        return Err(RegistryError::DownloadFailed {
            tool,
            status: status.to_string(),
        });
    }

    fs::read_to_string(out).map_err(|source| RegistryError::Io {
        path: out.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"[
        {"address":"0x1111111111111111111111111111111111111111","symbol":"AAA","decimal":6,"type":"default"},
        {"address":"0xe10f51424adbead82eb4b9ae72c29828dc24188f","symbol":"RDN","decimal":18,"type":"default"},
        {"address":"0x2222222222222222222222222222222222222222","symbol":"ZZZ","decimal":0}
    ]"#;

    #[test]
    fn lookup_is_case_insensitive() {
        let reg = TokenRegistry::from_json(LIST).unwrap();
        assert_eq!(reg.len(), 3);
        for sym in ["RDN", "rdn", "Rdn"] {
            let t = reg.get(sym).unwrap();
            assert_eq!(t.decimals, 18);
            assert_eq!(
                t.address,
                "0xe10f51424adbead82eb4b9ae72c29828dc24188f".parse::<Address>().unwrap()
            );
        }
        assert!(reg.get("nope").is_none());
        assert_eq!(reg.get("zzz").unwrap().kind, "");
    }

    #[test]
    fn last_duplicate_symbol_wins() {
        let a = Token {
            address: Address::repeat_byte(1),
            symbol: "DUP".into(),
            decimals: 1,
            kind: String::new(),
        };
        let b = Token { address: Address::repeat_byte(2), symbol: "dup".into(), ..a.clone() };
        let reg = TokenRegistry::from_tokens(vec![a, b]);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("Dup").unwrap().address, Address::repeat_byte(2));
    }

    #[test]
    fn malformed_list_is_a_parse_error() {
        assert!(matches!(
            TokenRegistry::from_json("{not json"),
            Err(RegistryError::Parse(_))
        ));
    }

    #[test]
    fn loads_fixture_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/tokens.json");
        let reg = TokenRegistry::load_with(path, || panic!("existing list must not be downloaded"))
            .unwrap();
        assert!(reg.get("rdn").is_some());
        assert!(TokenRegistry::load(path).unwrap().get("usdt").is_some());
    }

    #[test]
    fn missing_list_is_fetched() {
        let reg =
            TokenRegistry::load_with("/nonexistent/ethToken.json", || Ok(LIST.to_string())).unwrap();
        assert_eq!(reg.len(), 3);
        let reg = TokenRegistry::load_with("", || Ok(LIST.to_string())).unwrap();
        assert!(reg.get("aaa").is_some());
    }

    #[test]
    fn no_download_tool_is_fatal() {
        assert!(matches!(
            download_token_list(|_| false),
            Err(RegistryError::NoDownloadToolAvailable)
        ));
        assert!(matches!(
            TokenRegistry::load_with("/nonexistent/ethToken.json", || download_token_list(|_| false)),
            Err(RegistryError::NoDownloadToolAvailable)
        ));
    }

    #[test]
    fn prefers_wget_then_curl() {
        let (tool, cmd) = download_command(|_| true, "out.json", "http://x").unwrap();
        assert_eq!(tool, "wget");
        assert_eq!(cmd.get_program(), "wget");

        let (tool, cmd) = download_command(|t| t == "curl", "out.json", "http://x").unwrap();
        assert_eq!(tool, "curl");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, ["-fsSL", "-o", "out.json", "http://x"]);
    }
}
