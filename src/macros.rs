//! Call payloads written as macros instead of raw hex.
//!
//! Supported instructions:
//! - `#TRANSFER <token symbol> <amount>|<percentage>%`
//! - `#BALANCEOF <token symbol> <holder address>`
//!
//! e.g. `#TRANSFER EOS 2000` moves 2000 EOS (scaled by the token decimals)
//! from the sender to the receiver.

use std::sync::Arc;
use std::time::Duration;

use ethers_core::abi::Abi;
use ethers_core::types::{transaction::eip2718::TypedTransaction, Address, TransactionRequest, U256, U512};
use tracing::debug;

use crate::abi::load_abi;
use crate::decoder::decode_uint_output;
use crate::defaults::Defaults;
use crate::encoding::{encode_calldata, t_address, t_uint};
use crate::error::MacroError;
use crate::rpc::LedgerClient;
use crate::token::{Token, TokenRegistry};

const MACRO_TRANSFER: &str = "transfer";
const MACRO_BALANCE_OF: &str = "balanceof";
const MACRO_ARGS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroKind {
    Transfer,
    BalanceOf,
}

/// Contract to call and the ABI-encoded input for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMacro {
    pub kind: MacroKind,
    pub contract: Address,
    pub payload: Vec<u8>,
    /// Token decimals, used to render amounts for humans.
    pub decimals: u32,
}

pub struct MacroInterpreter {
    tokens: TokenRegistry,
    abi: Abi,
    client: Option<Arc<dyn LedgerClient>>,
    call_timeout: Duration,
}

impl MacroInterpreter {
    pub fn new(tokens: TokenRegistry) -> Result<Self, MacroError> {
        Ok(Self {
            tokens,
            abi: load_abi()?,
            client: None,
            call_timeout: Defaults::RPC_TIMEOUT,
        })
    }

    /// Attach a node client; required for percentage transfers.
    pub fn with_client(mut self, client: Arc<dyn LedgerClient>, call_timeout: Duration) -> Self {
        self.client = Some(client);
        self.call_timeout = call_timeout;
        self
    }

    pub fn is_macro(input: &str) -> bool {
        input.trim_start().starts_with('#')
    }

    /// Resolve `input` into a contract address and call payload.
    pub async fn parse(&self, input: &str, sender: &str, receiver: &str) -> Result<ResolvedMacro, MacroError> {
        let words: Vec<&str> = input.split_whitespace().collect();
        let keyword = match words.first() {
            Some(k) if k.starts_with('#') => &k[1..],
            _ => return Err(MacroError::InvalidMacroDefinition),
        };
        let args = &words[1..];

        match keyword.to_lowercase().as_str() {
            MACRO_TRANSFER => self.parse_transfer(args, sender, receiver).await,
            MACRO_BALANCE_OF => self.parse_balance_of(args),
            _ => Err(MacroError::UndefinedMacro(keyword.to_string())),
        }
    }

    fn token(&self, symbol: &str) -> Result<&Token, MacroError> {
        self.tokens
            .get(symbol)
            .ok_or_else(|| MacroError::UnrecognizedTokenSymbol(symbol.to_string()))
    }

    fn encode(&self, name: &str, args: Vec<ethers_core::abi::Token>) -> Result<Vec<u8>, MacroError> {
        encode_calldata(self.abi.function(name)?, args)
    }

    async fn parse_transfer(&self, args: &[&str], sender: &str, receiver: &str) -> Result<ResolvedMacro, MacroError> {
        if args.len() != MACRO_ARGS {
            return Err(MacroError::InvalidMacroArgument {
                keyword: "TRANSFER",
                expected: MACRO_ARGS,
                got: args.len(),
            });
        }
        let token = self.token(args[0])?;
        let receiver = parse_address(receiver)?;

        let amount = match args[1].strip_suffix('%') {
            Some(pct) => {
                let (num, den) = parse_percentage(pct)?;
                let balance = self.balance_of(token, sender).await?;
                percentage_of(balance, num, den)?
            }
            None => scale_amount(args[1], token.decimals)?,
        };

        Ok(ResolvedMacro {
            kind: MacroKind::Transfer,
            contract: token.address,
            payload: self.encode("transfer", vec![t_address(receiver), t_uint(amount)])?,
            decimals: token.decimals,
        })
    }

    fn parse_balance_of(&self, args: &[&str]) -> Result<ResolvedMacro, MacroError> {
        if args.len() != MACRO_ARGS {
            return Err(MacroError::InvalidMacroArgument {
                keyword: "BALANCEOF",
                expected: MACRO_ARGS,
                got: args.len(),
            });
        }
        let token = self.token(args[0])?;
        let holder = parse_address(args[1])?;
        Ok(ResolvedMacro {
            kind: MacroKind::BalanceOf,
            contract: token.address,
            payload: self.encode("balanceOf", vec![t_address(holder)])?,
            decimals: token.decimals,
        })
    }

    /// Ask the node for `sender`'s balance of `token`.
    async fn balance_of(&self, token: &Token, sender: &str) -> Result<U256, MacroError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| MacroError::BalanceUnavailable("no node connection".into()))?;
        let holder = parse_address(sender)
            .map_err(|_| MacroError::BalanceUnavailable(format!("invalid sender {sender:?}")))?;

        let tx: TypedTransaction = TransactionRequest::new()
            .to(token.address)
            .data(self.encode("balanceOf", vec![t_address(holder)])?)
            .into();
        let output = tokio::time::timeout(self.call_timeout, client.call(&tx))
            .await
            .map_err(|_| MacroError::BalanceUnavailable(format!("balanceOf timed out after {:?}", self.call_timeout)))?
            .map_err(|e| MacroError::BalanceUnavailable(e.to_string()))?;

        let balance = decode_uint_output(self.abi.function("balanceOf")?, &output)
            .map_err(|e| MacroError::BalanceUnavailable(e.to_string()))?;
        debug!(symbol = %token.symbol, %balance, "sender token balance");
        Ok(balance)
    }
}

fn parse_address(s: &str) -> Result<Address, MacroError> {
    crate::util::parse_addr(s).map_err(|_| MacroError::InvalidAddress(s.to_string()))
}

/// `amount × 10^decimals`, failing on anything but a base-10 integer or on overflow.
pub fn scale_amount(amount: &str, decimals: u32) -> Result<U256, MacroError> {
    let invalid = || MacroError::InvalidAmount(amount.to_string());
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let n = U256::from_dec_str(amount).map_err(|_| invalid())?;
    let scale = U256::from(10u64)
        .checked_pow(U256::from(decimals))
        .ok_or_else(invalid)?;
    n.checked_mul(scale).ok_or_else(invalid)
}

/// Split a percentage such as `12.5` into the exact fraction `125 / 1000`
/// of a whole (i.e. already divided by 100).
fn parse_percentage(pct: &str) -> Result<(U256, U256), MacroError> {
    let invalid = || MacroError::InvalidAmount(format!("{pct}%"));

    let as_float: f64 = pct.parse().map_err(|_| invalid())?;
    if !(0.0..=100.0).contains(&as_float) {
        return Err(invalid());
    }

    let (int_part, frac_part) = pct.split_once('.').unwrap_or((pct, ""));
    let digits = format!("{int_part}{frac_part}");
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let num = U256::from_dec_str(&digits).map_err(|_| invalid())?;
    let den = U256::from(100u64)
        .checked_mul(
            U256::from(10u64)
                .checked_pow(U256::from(frac_part.len()))
                .ok_or_else(invalid)?,
        )
        .ok_or_else(invalid)?;
    Ok((num, den))
}

/// `balance × num / den` without intermediate overflow.
pub fn percentage_of(balance: U256, num: U256, den: U256) -> Result<U256, MacroError> {
    let wide: U512 = balance.full_mul(num) / U512::from(den);
    U256::try_from(wide).map_err(|_| MacroError::InvalidAmount(format!("{num}/{den} of {balance}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockClient;

    const RDN: &str = "0xe10f51424adbead82eb4b9ae72c29828dc24188f";
    const RECEIVER: &str = "0x8f0909ccb296ebd319834edb0d5785794b781d7f";
    const SENDER: &str = "0xadd0354d4f5c101685509001053730417321db49";

    fn registry() -> TokenRegistry {
        let mut list = vec![
            Token {
                address: "0x1111111111111111111111111111111111111111".parse().unwrap(),
                symbol: "USDT".into(),
                decimals: 6,
                kind: "default".into(),
            },
            Token {
                address: RDN.parse().unwrap(),
                symbol: "RDN".into(),
                decimals: 18,
                kind: "default".into(),
            },
        ];
        // order must not matter
        list.reverse();
        TokenRegistry::from_tokens(list)
    }

    fn interpreter() -> MacroInterpreter {
        MacroInterpreter::new(registry()).unwrap()
    }

    #[tokio::test]
    async fn balance_of_encodes_holder() {
        let m = interpreter()
            .parse(&format!("#BALANCEOF RDN {RECEIVER}"), SENDER, "")
            .await
            .unwrap();
        assert_eq!(m.kind, MacroKind::BalanceOf);
        assert_eq!(m.contract, RDN.parse::<Address>().unwrap());
        assert_eq!(m.decimals, 18);
        assert_eq!(
            hex::encode(&m.payload),
            "70a082310000000000000000000000008f0909ccb296ebd319834edb0d5785794b781d7f"
        );
    }

    #[tokio::test]
    async fn transfer_scales_by_decimals() {
        let m = interpreter()
            .parse("#TRANSFER RDN 100", SENDER, RECEIVER)
            .await
            .unwrap();
        assert_eq!(m.kind, MacroKind::Transfer);
        assert_eq!(m.contract, RDN.parse::<Address>().unwrap());
        assert_eq!(
            hex::encode(&m.payload),
            "a9059cbb0000000000000000000000008f0909ccb296ebd319834edb0d5785794b781d7f\
             0000000000000000000000000000000000000000000000056bc75e2d63100000"
        );
    }

    #[tokio::test]
    async fn symbol_lookup_ignores_case() {
        let it = interpreter();
        for sym in ["RDN", "rdn", "Rdn"] {
            let m = it.parse(&format!("#transfer {sym} 1"), SENDER, RECEIVER).await.unwrap();
            assert_eq!(m.contract, RDN.parse::<Address>().unwrap());
        }
    }

    #[tokio::test]
    async fn rejects_non_macro_input() {
        let it = interpreter();
        for input in ["", "   ", "TRANSFER RDN 100", "0xa9059cbb"] {
            assert!(matches!(
                it.parse(input, SENDER, RECEIVER).await,
                Err(MacroError::InvalidMacroDefinition)
            ));
        }
    }

    #[tokio::test]
    async fn unknown_keyword_and_symbol() {
        let it = interpreter();
        assert!(matches!(
            it.parse("#APPROVE RDN 1", SENDER, RECEIVER).await,
            Err(MacroError::UndefinedMacro(k)) if k == "APPROVE"
        ));
        assert!(matches!(
            it.parse("#TRANSFER XYZ 1", SENDER, RECEIVER).await,
            Err(MacroError::UnrecognizedTokenSymbol(_))
        ));
        assert!(matches!(
            it.parse(&format!("#BALANCEOF XYZ {RECEIVER}"), SENDER, "").await,
            Err(MacroError::UnrecognizedTokenSymbol(_))
        ));
    }

    #[tokio::test]
    async fn wrong_argument_count() {
        let it = interpreter();
        assert!(matches!(
            it.parse("#TRANSFER RDN", SENDER, RECEIVER).await,
            Err(MacroError::InvalidMacroArgument { got: 1, .. })
        ));
        assert!(matches!(
            it.parse("#BALANCEOF RDN a b", SENDER, RECEIVER).await,
            Err(MacroError::InvalidMacroArgument { got: 3, .. })
        ));
    }

    #[tokio::test]
    async fn invalid_amounts() {
        let it = interpreter();
        for amount in ["1.5", "-3", "abc", "150%", "x%", "1e1%"] {
            assert!(
                matches!(
                    it.parse(&format!("#TRANSFER RDN {amount}"), SENDER, RECEIVER).await,
                    Err(MacroError::InvalidAmount(_))
                ),
                "{amount}"
            );
        }
    }

    #[tokio::test]
    async fn percentage_needs_a_node() {
        assert!(matches!(
            interpreter().parse("#TRANSFER RDN 50%", SENDER, RECEIVER).await,
            Err(MacroError::BalanceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn percentage_uses_queried_balance() {
        let client = Arc::new(MockClient::default());
        client.set_call_result_uint(U256::from(1000u64));
        let it = interpreter().with_client(client.clone(), Duration::from_secs(1));

        let m = it.parse("#TRANSFER USDT 12.5%", SENDER, RECEIVER).await.unwrap();
        let tokens = it.abi.function("transfer").unwrap().decode_input(&m.payload[4..]).unwrap();
        assert_eq!(tokens[1], ethers_core::abi::Token::Uint(U256::from(125u64)));

        // balanceOf(sender) went to the token contract
        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].to_addr(),
            Some(&"0x1111111111111111111111111111111111111111".parse::<Address>().unwrap())
        );
    }

    #[test]
    fn scale_amount_overflow() {
        assert!(scale_amount("1", 78).is_err());
        assert_eq!(scale_amount("7", 0).unwrap(), U256::from(7u64));
    }

    #[test]
    fn percentage_is_exact() {
        let (n, d) = parse_percentage("100").unwrap();
        assert_eq!(percentage_of(U256::MAX, n, d).unwrap(), U256::MAX);
        let (n, d) = parse_percentage("0.1").unwrap();
        assert_eq!(percentage_of(U256::from(10_000u64), n, d).unwrap(), U256::from(10u64));
    }
}
