use serde::{Serialize, Serializer};

use super::TxnError;
use super::address::TxId;
use super::transaction::{Transaction, serialize_byte_list};

/// Detached ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Delegated logic signature: program, bound arguments and the delegator's signature over the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicSig {
    #[serde(
        rename = "arg",
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_byte_list"
    )]
    pub args: Vec<Vec<u8>>,
    #[serde(rename = "l", serialize_with = "serde_bytes::serialize")]
    pub program: Vec<u8>,
    #[serde(rename = "sig", skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedTransaction {
    #[serde(rename = "lsig", skip_serializing_if = "Option::is_none")]
    pub logic_sig: Option<LogicSig>,
    #[serde(rename = "sig", skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    #[serde(rename = "txn")]
    pub txn: Transaction,
}

impl SignedTransaction {
    pub fn with_signature(txn: Transaction, signature: Signature) -> Self {
        Self {
            logic_sig: None,
            signature: Some(signature),
            txn,
        }
    }

    pub fn with_logic_sig(txn: Transaction, logic_sig: LogicSig) -> Self {
        Self {
            logic_sig: Some(logic_sig),
            signature: None,
            txn,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TxnError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn id(&self) -> Result<TxId, TxnError> {
        self.txn.id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::{Address, TxnHeader};

    #[test]
    fn signed_envelope_orders_lsig_before_txn() {
        let txn = Transaction::payment(Address([1u8; 32]), Address([2u8; 32]), 1, &TxnHeader::default());
        let signed = SignedTransaction::with_logic_sig(
            txn,
            LogicSig {
                args: vec![vec![0, 0, 0, 1]],
                program: vec![0x06, 0x81, 0x01],
                signature: Some(Signature([9u8; 64])),
            },
        );
        let encoded = signed.encode().expect("encode");
        // fixmap of two entries: lsig then txn
        assert_eq!(encoded[0], 0x82);
        assert_eq!(&encoded[1..6], b"\xa4lsig");
        let txn_pos = encoded
            .windows(4)
            .position(|w| w == b"\xa3txn")
            .expect("txn key");
        assert!(txn_pos > 6);
    }

    #[test]
    fn account_signature_is_64_byte_bin() {
        let txn = Transaction::payment(Address([1u8; 32]), Address([2u8; 32]), 1, &TxnHeader::default());
        let signed = SignedTransaction::with_signature(txn, Signature([7u8; 64]));
        let encoded = signed.encode().expect("encode");
        assert_eq!(&encoded[1..5], b"\xa3sig");
        // bin8 marker followed by length 64
        assert_eq!(&encoded[5..7], &[0xc4, 64]);
    }
}
