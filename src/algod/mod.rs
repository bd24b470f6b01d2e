//! algod 节点 REST 边界。

pub mod error;
pub mod http;
#[cfg(test)]
pub mod mock;
pub mod retry;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

pub use error::AlgodError;
pub use http::HttpAlgodClient;
pub use retry::{RetryPolicy, RetryingClient, with_retry};
pub use types::{
    CompiledProgram, DryrunResponse, DryrunTxnResult, NodeStatus, PendingTransaction,
    SuggestedParams,
};

use crate::txn::{Address, TxId};

/// 本 crate 用到的全部节点调用；测试中以脚本化实现替换。
#[async_trait]
pub trait AlgodClient: Send + Sync {
    async fn suggested_params(&self) -> Result<SuggestedParams, AlgodError>;

    async fn compile(&self, source: &[u8]) -> Result<CompiledProgram, AlgodError>;

    /// 广播已签名字节（单笔或按组拼接）。
    async fn send_raw(&self, payload: &[u8]) -> Result<TxId, AlgodError>;

    async fn pending_transaction(&self, tx_id: &TxId) -> Result<PendingTransaction, AlgodError>;

    async fn status(&self) -> Result<NodeStatus, AlgodError>;

    /// 阻塞直到 `round` 之后的区块产生。
    async fn status_after_round(&self, round: u64) -> Result<NodeStatus, AlgodError>;

    async fn dryrun(&self, request: &[u8]) -> Result<DryrunResponse, AlgodError>;

    /// 以下三个读请求保留节点原始 JSON，只用于组装模拟请求。
    async fn application(&self, app_id: u64) -> Result<Value, AlgodError>;

    async fn asset(&self, asset_id: u64) -> Result<Value, AlgodError>;

    async fn account(&self, address: &Address) -> Result<Value, AlgodError>;
}
