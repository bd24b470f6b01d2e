//! 签名：账户签名与委托凭证附加，签名前先校验组 id 与委托约束。

mod account;
mod credential;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::codec::CodecError;
use crate::group::{AssembledGroup, GroupError};
use crate::txn::{Address, Digest, SignedTransaction, Transaction, TxId, TxnError};

pub use account::{Account, verify_signature};
pub use credential::DelegatedCredential;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("私钥格式非法: {0}")]
    InvalidSecret(String),
    #[error("{signer} 的签名校验失败")]
    InvalidSignature { signer: Address },
    #[error("第 {index} 笔交易的发送方为 {actual}，签名账户为 {expected}")]
    SenderMismatch {
        index: usize,
        expected: Address,
        actual: Address,
    },
    #[error("委托约束不满足：{field} 期望 {expected}，实际 {actual}")]
    ConstraintViolation {
        field: &'static str,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Group(#[from] GroupError),
    #[error(transparent)]
    Encoding(#[from] TxnError),
    #[error("无法读写委托凭证 {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("委托凭证 {path} 格式非法: {message}")]
    Format { path: PathBuf, message: String },
    #[error("凭证写入任务异常退出: {0}")]
    Join(String),
}

/// 组成员的授权方式。
#[derive(Clone)]
pub enum Authorization {
    Account(Arc<Account>),
    Delegated(Arc<DelegatedCredential>),
}

impl Authorization {
    pub fn account(account: &Arc<Account>) -> Self {
        Authorization::Account(account.clone())
    }

    pub fn delegated(credential: &Arc<DelegatedCredential>) -> Self {
        Authorization::Delegated(credential.clone())
    }

    fn label(&self) -> &'static str {
        match self {
            Authorization::Account(_) => "account",
            Authorization::Delegated(_) => "delegated",
        }
    }
}

impl fmt::Debug for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authorization::Account(account) => f.debug_tuple("Account").field(account).finish(),
            Authorization::Delegated(credential) => f
                .debug_struct("Delegated")
                .field("delegator", &credential.delegator)
                .field("layout", &credential.layout)
                .finish(),
        }
    }
}

/// 已签名的交易组，成员顺序与组装顺序一致。
#[derive(Debug, Clone)]
pub struct SignedGroup {
    members: Vec<SignedTransaction>,
    tx_ids: Vec<TxId>,
    group_id: Option<Digest>,
}

impl SignedGroup {
    pub fn members(&self) -> &[SignedTransaction] {
        &self.members
    }

    pub fn tx_ids(&self) -> &[TxId] {
        &self.tx_ids
    }

    /// 确认跟踪所用的首笔交易 id。
    pub fn primary_tx_id(&self) -> &TxId {
        &self.tx_ids[0]
    }

    pub fn group_id(&self) -> Option<Digest> {
        self.group_id
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// 广播载荷：按组内顺序拼接各成员的规范编码。
    pub fn to_bytes(&self) -> Result<Vec<u8>, TxnError> {
        let mut out = Vec::new();
        for member in &self.members {
            out.extend_from_slice(&member.encode()?);
        }
        Ok(out)
    }
}

/// 先核对组 id，再在本地检查全部委托约束，最后逐个签名。
pub fn sign_group(group: &AssembledGroup) -> Result<SignedGroup, SignerError> {
    group.verify()?;

    let txns: Vec<Transaction> = group
        .members()
        .iter()
        .map(|member| member.txn.clone())
        .collect();

    for member in group.members() {
        if let Authorization::Delegated(credential) = &member.authorization {
            credential.validate(&member.txn, &txns)?;
        }
    }

    let mut members = Vec::with_capacity(txns.len());
    let mut tx_ids = Vec::with_capacity(txns.len());
    for (index, member) in group.members().iter().enumerate() {
        let signed = match &member.authorization {
            Authorization::Account(account) => {
                if account.address() != member.txn.sender {
                    return Err(SignerError::SenderMismatch {
                        index,
                        expected: account.address(),
                        actual: member.txn.sender,
                    });
                }
                account.sign_transaction(member.txn.clone())?
            }
            Authorization::Delegated(credential) => {
                SignedTransaction::with_logic_sig(member.txn.clone(), credential.logic_sig())
            }
        };
        let tx_id = signed.id()?;
        debug!(
            target: "signer",
            index,
            tx_id = %tx_id,
            authorization = member.authorization.label(),
            "交易已签名"
        );
        tx_ids.push(tx_id);
        members.push(signed);
    }

    Ok(SignedGroup {
        members,
        tx_ids,
        group_id: group.group_id(),
    })
}
