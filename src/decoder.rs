use anyhow::{anyhow, Result};
use ethers_core::abi::{Function, Token};
use ethers_core::types::U256;
use ethers_core::utils::format_units;

fn as_uint(tok: &Token) -> Result<U256> {
    match tok {
        Token::Uint(u) => Ok(*u),
        _ => Err(anyhow!("expected uint")),
    }
}

/// Decode the single uint256 a view function such as `balanceOf` returns.
pub fn decode_uint_output(func: &Function, output: &[u8]) -> Result<U256> {
    let tokens = func.decode_output(output)?;
    let first = tokens
        .first()
        .ok_or_else(|| anyhow!("{} returned nothing", func.name))?;
    as_uint(first)
}

/// Render a raw token amount with its decimals, e.g. `1500000` at 6 -> `1.500000`.
pub fn format_token_amount(amount: U256, decimals: u32) -> Result<String> {
    Ok(format_units(amount, decimals)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::load_abi;

    #[test]
    fn decodes_balance_output() {
        let abi = load_abi().unwrap();
        let mut word = [0u8; 32];
        U256::from(1234u64).to_big_endian(&mut word);
        let v = decode_uint_output(abi.function("balanceOf").unwrap(), &word).unwrap();
        assert_eq!(v, U256::from(1234u64));
    }

    #[test]
    fn empty_output_is_an_error() {
        let abi = load_abi().unwrap();
        assert!(decode_uint_output(abi.function("balanceOf").unwrap(), &[]).is_err());
    }

    #[test]
    fn formats_with_decimals() {
        assert_eq!(format_token_amount(U256::from(1_500_000u64), 6).unwrap(), "1.500000");
    }
}
