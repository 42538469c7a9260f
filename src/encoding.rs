use ethers_core::abi::{Function, Token};
use ethers_core::types::{Address, U256};

use crate::error::MacroError;

pub fn t_address(a: Address) -> Token {
    Token::Address(a)
}

pub fn t_uint(v: U256) -> Token {
    Token::Uint(v)
}

pub fn encode_calldata(func: &Function, args: Vec<Token>) -> Result<Vec<u8>, MacroError> {
    Ok(func.encode_input(&args)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::load_abi;

    #[test]
    fn balance_of_calldata_is_selector_plus_padded_address() {
        let abi = load_abi().unwrap();
        let holder: Address = "0x8f0909ccb296ebd319834edb0d5785794b781d7f".parse().unwrap();
        let data = encode_calldata(abi.function("balanceOf").unwrap(), vec![t_address(holder)]).unwrap();
        assert_eq!(
            hex::encode(data),
            "70a082310000000000000000000000008f0909ccb296ebd319834edb0d5785794b781d7f"
        );
    }

    #[test]
    fn wrong_arity_is_an_abi_error() {
        let abi = load_abi().unwrap();
        let err = encode_calldata(abi.function("transfer").unwrap(), vec![t_uint(U256::one())]);
        assert!(matches!(err, Err(MacroError::Abi(_))));
    }
}
