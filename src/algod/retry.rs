use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;
use tracing::warn;

use super::{
    AlgodClient, AlgodError, CompiledProgram, DryrunResponse, NodeStatus, PendingTransaction,
    SuggestedParams,
};
use crate::config::NodeConfig;
use crate::txn::{Address, TxId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(node: &NodeConfig) -> Self {
        Self {
            attempts: node.retry_attempts.max(1),
            initial_backoff: Duration::from_millis(node.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(node.retry_max_backoff_ms),
        }
    }
}

/// 对可重试错误做指数退避重试；其它错误原样返回。
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &'static str,
    mut op: F,
) -> Result<T, AlgodError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AlgodError>>,
{
    let mut attempt = 0u32;
    let mut backoff = policy.initial_backoff;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.attempts => {
                warn!(
                    target: "algod::retry",
                    call = label,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err.describe(),
                    "algod 请求失败，将重试"
                );
                sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
            Err(err) => return Err(err),
        }
    }
}

/// 幂等读请求带重试；广播与等待区块不重试。
#[derive(Debug, Clone)]
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<C: AlgodClient> AlgodClient for RetryingClient<C> {
    async fn suggested_params(&self) -> Result<SuggestedParams, AlgodError> {
        with_retry(&self.policy, "suggested_params", || {
            self.inner.suggested_params()
        })
        .await
    }

    async fn compile(&self, source: &[u8]) -> Result<CompiledProgram, AlgodError> {
        with_retry(&self.policy, "compile", || self.inner.compile(source)).await
    }

    async fn send_raw(&self, payload: &[u8]) -> Result<TxId, AlgodError> {
        self.inner.send_raw(payload).await
    }

    async fn pending_transaction(&self, tx_id: &TxId) -> Result<PendingTransaction, AlgodError> {
        with_retry(&self.policy, "pending_transaction", || {
            self.inner.pending_transaction(tx_id)
        })
        .await
    }

    async fn status(&self) -> Result<NodeStatus, AlgodError> {
        with_retry(&self.policy, "status", || self.inner.status()).await
    }

    async fn status_after_round(&self, round: u64) -> Result<NodeStatus, AlgodError> {
        self.inner.status_after_round(round).await
    }

    async fn dryrun(&self, request: &[u8]) -> Result<DryrunResponse, AlgodError> {
        with_retry(&self.policy, "dryrun", || self.inner.dryrun(request)).await
    }

    async fn application(&self, app_id: u64) -> Result<Value, AlgodError> {
        with_retry(&self.policy, "application", || self.inner.application(app_id)).await
    }

    async fn asset(&self, asset_id: u64) -> Result<Value, AlgodError> {
        with_retry(&self.policy, "asset", || self.inner.asset(asset_id)).await
    }

    async fn account(&self, address: &Address) -> Result<Value, AlgodError> {
        with_retry(&self.policy, "account", || self.inner.account(address)).await
    }
}
