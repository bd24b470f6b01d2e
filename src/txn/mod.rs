//! 链上原语：地址、规范编码的交易与签名信封。

pub mod address;
pub mod signed;
pub mod transaction;

use thiserror::Error;

pub use address::{Address, AddressError, Digest, TxId, sha512_256};
pub use signed::{LogicSig, Signature, SignedTransaction};
pub use transaction::{AssetParams, OnCompletion, StateSchema, Transaction, TxType, TxnHeader};

#[derive(Debug, Error)]
pub enum TxnError {
    #[error("canonical encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error(transparent)]
    Address(#[from] AddressError),
}
