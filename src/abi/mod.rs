//! 合约描述与方法注册表（ARC-4）。

pub mod descriptor;
#[cfg(test)]
pub mod fixtures;
pub mod method_call;
pub mod store;
pub mod types;
pub mod value;

use thiserror::Error;

pub use descriptor::{ContractDescriptor, Method, MethodArg, MethodReturn, NetworkInfo};
pub use method_call::{BuiltCall, MethodArgValue, MethodCall, MethodResult, RETURN_PREFIX};
pub use store::{DescriptorError, DescriptorStore};
pub use types::{AbiType, ArgType, ReferenceType, TxnArgType};
pub use value::AbiValue;

#[derive(Debug, Error)]
pub enum AbiError {
    #[error("合约 `{contract}` 中不存在方法 `{method}`")]
    MethodNotFound { contract: String, method: String },
    #[error("合约 `{contract}` 未登记网络 `{network}`")]
    NetworkNotFound { contract: String, network: String },
    #[error("无法识别的 ABI 类型 `{0}`")]
    InvalidType(String),
    #[error("类型不匹配：期望 `{expected}`，实际 {actual}")]
    TypeMismatch { expected: String, actual: String },
    #[error("ABI 编码失败: {0}")]
    Encoding(String),
    #[error("ABI 解码失败: {0}")]
    Decoding(String),
    #[error("方法 `{method}` 需要 {expected} 个参数，实际 {actual} 个")]
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },
    #[error("方法 `{method}` 第 {index} 个参数应为 `{expected}`")]
    ArgumentMismatch {
        method: String,
        index: usize,
        expected: String,
    },
    #[error("外部引用 {kind} 超出上限 {limit}")]
    TooManyReferences { kind: &'static str, limit: usize },
    #[error("方法 `{method}` 的确认记录中没有返回值日志")]
    MissingReturn { method: String },
}
