use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlgodError {
    #[error("algod 请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("请求 {endpoint} 超时（{timeout_ms}ms）")]
    Timeout { endpoint: String, timeout_ms: u64 },
    #[error("请求 {endpoint} 返回状态 {status}: {message}")]
    Api {
        endpoint: String,
        status: StatusCode,
        message: String,
    },
    /// 节点在广播时同步拒绝（分组非法、重复、手续费不足、授权失败等）。
    #[error("节点拒绝交易: {message}")]
    Rejected { message: String },
    #[error("响应解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("algod 响应结构不符合预期: {0}")]
    Schema(String),
    #[error("algod 地址无效 `{address}`: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },
}

impl AlgodError {
    /// 仅网络层失败与 5xx 视为可重试。
    pub fn is_retryable(&self) -> bool {
        match self {
            AlgodError::Http(err) => !err.is_decode() && !err.is_builder(),
            AlgodError::Timeout { .. } => true,
            AlgodError::Api { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            AlgodError::Rejected { .. }
            | AlgodError::Json(_)
            | AlgodError::Schema(_)
            | AlgodError::InvalidAddress { .. } => false,
        }
    }

    pub fn describe(&self) -> String {
        use std::error::Error as _;
        let mut parts = vec![self.to_string()];
        let mut current = self.source();
        while let Some(err) = current {
            let text = err.to_string();
            if parts.last().map(|last| last == &text).unwrap_or(false) {
                current = err.source();
                continue;
            }
            parts.push(text);
            current = err.source();
        }
        parts.join(" | caused by: ")
    }
}
