use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::abi::{AbiError, DescriptorError};
use crate::algod::AlgodError;
use crate::codec::CodecError;
use crate::group::GroupError;
use crate::signer::SignerError;
use crate::simulate::SimulateError;
use crate::submit::SubmitError;
use crate::txn::TxnError;

/// 面向调用方的错误分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 输入或本地状态有误，修正后重试。
    Input,
    /// 网络或节点暂时不可用，可原样重试。
    Transient,
    /// 节点明确拒绝。
    Rejected,
    /// 已广播但结果未知（轮数用尽或节点读取失败），重试前需先查询链上状态。
    Timeout,
    Cancelled,
    /// 程序错误。
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Input => "input",
            ErrorClass::Transient => "transient",
            ErrorClass::Rejected => "rejected",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Cancelled => "cancelled",
            ErrorClass::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("合约接口错误: {0}")]
    Abi(#[from] AbiError),
    #[error("合约描述错误: {0}")]
    Descriptor(#[from] DescriptorError),
    #[error("节点请求失败: {0}")]
    Algod(#[from] AlgodError),
    #[error("交易组组装失败: {0}")]
    Group(#[from] GroupError),
    #[error("签名失败: {0}")]
    Signer(#[from] SignerError),
    #[error("模拟执行失败: {0}")]
    Simulate(#[from] SimulateError),
    #[error("提交失败: {0}")]
    Submit(#[from] SubmitError),
    #[error("交易编码失败: {0}")]
    Txn(#[from] TxnError),
    #[error("委托参数编码失败: {0}")]
    Codec(#[from] CodecError),
    #[error("配置中缺少账户 `{0}`")]
    MissingAccount(String),
    #[error("配置中缺少 {0}，且合约描述中也没有对应记录")]
    MissingFixture(&'static str),
    #[error("无法读取程序源码 {path}: {source}")]
    Program {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("参数非法: {0}")]
    InvalidInput(String),
    #[error("{operation} 已确认，但确认记录缺少 {field}")]
    MissingOutcome {
        operation: &'static str,
        field: &'static str,
    },
}

impl OperationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            OperationError::Abi(err) => abi_class(err),
            OperationError::Descriptor(err) => match err {
                DescriptorError::Io { .. } | DescriptorError::Parse { .. } => ErrorClass::Input,
                _ => ErrorClass::Internal,
            },
            OperationError::Algod(err) => algod_class(err),
            OperationError::Group(err) => group_class(err),
            OperationError::Signer(err) => signer_class(err),
            OperationError::Simulate(err) => match err {
                SimulateError::Algod(inner) => algod_class(inner),
                SimulateError::Rejected { .. } => ErrorClass::Rejected,
                SimulateError::Dump { .. } => ErrorClass::Input,
                SimulateError::Encode(_) => ErrorClass::Internal,
            },
            OperationError::Submit(err) => match err {
                SubmitError::Rejected { .. } => ErrorClass::Rejected,
                SubmitError::ConfirmationTimeout { .. } | SubmitError::Unresolved { .. } => {
                    ErrorClass::Timeout
                }
                SubmitError::Cancelled { .. } => ErrorClass::Cancelled,
                SubmitError::Algod(inner) => algod_class(inner),
                SubmitError::Encoding(_) => ErrorClass::Internal,
            },
            OperationError::Txn(_) | OperationError::MissingOutcome { .. } => ErrorClass::Internal,
            OperationError::Codec(_)
            | OperationError::MissingAccount(_)
            | OperationError::MissingFixture(_)
            | OperationError::Program { .. }
            | OperationError::InvalidInput(_) => ErrorClass::Input,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

fn abi_class(err: &AbiError) -> ErrorClass {
    match err {
        AbiError::MissingReturn { .. } | AbiError::Decoding(_) => ErrorClass::Internal,
        _ => ErrorClass::Input,
    }
}

fn algod_class(err: &AlgodError) -> ErrorClass {
    if err.is_retryable() {
        return ErrorClass::Transient;
    }
    match err {
        AlgodError::Rejected { .. } => ErrorClass::Rejected,
        AlgodError::Api { .. } | AlgodError::InvalidAddress { .. } => ErrorClass::Input,
        _ => ErrorClass::Internal,
    }
}

fn group_class(err: &GroupError) -> ErrorClass {
    match err {
        GroupError::Empty | GroupError::TooLarge { .. } | GroupError::AlreadyGrouped { .. } => {
            ErrorClass::Input
        }
        GroupError::Tampered { .. } | GroupError::Encoding(_) => ErrorClass::Internal,
    }
}

fn signer_class(err: &SignerError) -> ErrorClass {
    match err {
        SignerError::Group(inner) => group_class(inner),
        SignerError::Encoding(_) | SignerError::Join(_) => ErrorClass::Internal,
        _ => ErrorClass::Input,
    }
}
