use ethers_core::types::{Address, TransactionRequest, H256, U256};
use serde::Serialize;

/// One transaction descriptor as read from a batch file.
///
/// Addresses and payload stay textual until the pipeline validates them, so a
/// malformed address fails that entry instead of the whole read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionParams {
    /// Zero-based record index in the source (sheet row / text line).
    pub record: usize,
    pub from: String,
    pub to: String,
    pub value: U256,
    pub data: String,
    pub passphrase: Option<String>,
    pub hash: Option<H256>,
    pub status: Option<bool>,
}

/// Call payload: raw bytes, or a macro instruction to be resolved later.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Raw(Vec<u8>),
    Macro(String),
}

impl Payload {
    /// `#...` is a macro; anything else is hex with optional 0x. An odd
    /// number of digits gets a leading zero nibble (`0xabc` -> `0a bc`).
    pub fn parse(s: &str) -> Result<Self, hex::FromHexError> {
        let t = s.trim();
        if crate::macros::MacroInterpreter::is_macro(t) {
            return Ok(Payload::Macro(t.to_string()));
        }
        let digits = crate::util::strip_0x(t);
        let bytes = if digits.len() % 2 == 1 {
            hex::decode(format!("0{digits}"))?
        } else {
            hex::decode(digits)?
        };
        Ok(Payload::Raw(bytes))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Raw(b) => b.is_empty(),
            Payload::Macro(m) => m.is_empty(),
        }
    }
}

/// Validated call message, ready for gas estimation or a read-only call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallMessage {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Vec<u8>,
}

impl CallMessage {
    pub fn to_request(&self) -> TransactionRequest {
        let mut req = TransactionRequest::new()
            .from(self.from)
            .value(self.value)
            .data(self.data.clone());
        if let Some(to) = self.to {
            req = req.to(to);
        }
        req
    }
}

/// Per-entry line of the batch report.
#[derive(Debug, Serialize)]
pub struct BatchEntryOut {
    pub record: usize,
    pub from: String,
    #[serde(flatten)]
    pub outcome: EntryOutcome,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EntryOutcome {
    Submitted { hash: String },
    Mined { hash: String, success: bool },
    Pending { hash: String },
    Failed { reason: String },
    Skipped { reason: String },
}

impl EntryOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, EntryOutcome::Submitted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_detects_macro_and_hex() {
        assert_eq!(
            Payload::parse(" #TRANSFER RDN 100 ").unwrap(),
            Payload::Macro("#TRANSFER RDN 100".into())
        );
        assert_eq!(Payload::parse("0xabc0").unwrap(), Payload::Raw(vec![0xab, 0xc0]));
        assert_eq!(Payload::parse("").unwrap(), Payload::Raw(vec![]));
        assert!(Payload::parse("0xzz").is_err());
    }

    #[test]
    fn odd_length_hex_gets_leading_nibble() {
        assert_eq!(Payload::parse("0xabc").unwrap(), Payload::Raw(vec![0x0a, 0xbc]));
        assert_eq!(Payload::parse("f").unwrap(), Payload::Raw(vec![0x0f]));
        assert!(Payload::parse("0xabz").is_err());
    }

    #[test]
    fn report_entry_serializes_flat() {
        let e = BatchEntryOut {
            record: 2,
            from: "0xabc".into(),
            outcome: EntryOutcome::Failed { reason: "boom".into() },
        };
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["record"], 2);
        assert_eq!(v["status"], "failed");
        assert_eq!(v["reason"], "boom");
    }
}
