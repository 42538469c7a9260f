// src/util.rs
use anyhow::Result;
use ethers_core::types::{Address, U256};

use crate::error::ValidationError;
use crate::types::{CallMessage, Payload};

pub fn parse_addr(s: &str) -> Result<Address> {
    Ok(s.trim().parse::<Address>()?)
}

pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

pub fn bytes_to_0x(v: &[u8]) -> String {
    format!("0x{}", hex::encode(v))
}

/// 40 hex chars once the optional 0x prefix is gone.
fn is_hex_address(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse a transfer value in wei. Negative values are rejected explicitly so the
/// error names the input instead of a generic parse failure.
pub fn parse_value(s: &str) -> Result<U256, ValidationError> {
    let t = s.trim();
    if t.is_empty() {
        return Ok(U256::zero());
    }
    if t.starts_with('-') {
        return Err(ValidationError::Value(t.to_string()));
    }
    U256::from_dec_str(t).map_err(|_| ValidationError::Value(t.to_string()))
}

/// Make sure the arguments assigned are valid and assemble the call message.
///
/// Shared by the single-shot commands and the batch pipeline:
/// - sender (0x optional) must be exactly 40 hex chars
/// - receiver, when given, must be exactly 40 hex chars
/// - without a receiver the payload must not be empty
/// - value must be a non-negative integer
///
/// A macro payload is accepted as-is here; the caller swaps in the resolved
/// contract address and calldata afterwards.
pub fn check_arguments(
    sender: &str,
    receiver: &str,
    value: &str,
    payload: &Payload,
) -> Result<CallMessage, ValidationError> {
    let sender = strip_0x(sender.trim());
    let receiver = strip_0x(receiver.trim());

    if sender.is_empty() || !is_hex_address(sender) {
        return Err(ValidationError::Sender(sender.to_string()));
    }
    if !receiver.is_empty() && !is_hex_address(receiver) {
        return Err(ValidationError::Receiver(receiver.to_string()));
    }
    if receiver.is_empty() && payload.is_empty() {
        return Err(ValidationError::EmptyPayload);
    }
    let value = parse_value(value)?;

    let from = parse_addr(sender).map_err(|_| ValidationError::Sender(sender.to_string()))?;
    let to = if receiver.is_empty() {
        None
    } else {
        Some(parse_addr(receiver).map_err(|_| ValidationError::Receiver(receiver.to_string()))?)
    };
    let data = match payload {
        Payload::Raw(bytes) => bytes.clone(),
        Payload::Macro(_) => Vec::new(),
    };

    Ok(CallMessage { from, to, value, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENDER: &str = "0xadd0354d4f5c101685509001053730417321db49";
    const RECEIVER: &str = "8f0909ccb296ebd319834edb0d5785794b781d7f";

    #[test]
    fn accepts_sender_with_and_without_prefix() {
        let payload = Payload::Raw(vec![]);
        assert!(check_arguments(SENDER, RECEIVER, "0", &payload).is_ok());
        assert!(check_arguments(&SENDER[2..], RECEIVER, "0", &payload).is_ok());
    }

    #[test]
    fn rejects_short_or_missing_sender() {
        let payload = Payload::Raw(vec![1]);
        assert!(matches!(
            check_arguments("", RECEIVER, "0", &payload),
            Err(ValidationError::Sender(_))
        ));
        assert!(matches!(
            check_arguments("0xadd0354d", RECEIVER, "0", &payload),
            Err(ValidationError::Sender(_))
        ));
    }

    #[test]
    fn rejects_malformed_receiver() {
        let payload = Payload::Raw(vec![]);
        assert!(matches!(
            check_arguments(SENDER, "0x1234", "0", &payload),
            Err(ValidationError::Receiver(_))
        ));
    }

    #[test]
    fn missing_receiver_requires_payload() {
        assert!(matches!(
            check_arguments(SENDER, "", "0", &Payload::Raw(vec![])),
            Err(ValidationError::EmptyPayload)
        ));
        let msg = check_arguments(SENDER, "", "0", &Payload::Raw(vec![0x60, 0x80])).unwrap();
        assert!(msg.to.is_none());
        assert_eq!(msg.data, vec![0x60, 0x80]);
    }

    #[test]
    fn rejects_negative_value() {
        assert!(matches!(
            check_arguments(SENDER, RECEIVER, "-1", &Payload::Raw(vec![])),
            Err(ValidationError::Value(_))
        ));
        let msg = check_arguments(SENDER, RECEIVER, "1000", &Payload::Raw(vec![])).unwrap();
        assert_eq!(msg.value, U256::from(1000u64));
    }
}
