//! 广播与确认跟踪：按轮询节点待处理记录，直至确认、拒绝、超出轮数或被取消。

mod deadline;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use deadline::Deadline;

use crate::algod::{AlgodClient, AlgodError};
use crate::config::ConfirmationConfig;
use crate::monitoring::events;
use crate::signer::SignedGroup;
use crate::txn::{TxId, TxnError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Built,
    Signed,
    Broadcast,
    Pending,
    Confirmed,
    TimedOut,
    Rejected,
    Cancelled,
    /// 已广播但节点读取失败，是否上链未知。
    Unresolved,
}

impl SubmissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionState::Built => "built",
            SubmissionState::Signed => "signed",
            SubmissionState::Broadcast => "broadcast",
            SubmissionState::Pending => "pending",
            SubmissionState::Confirmed => "confirmed",
            SubmissionState::TimedOut => "timed_out",
            SubmissionState::Rejected => "rejected",
            SubmissionState::Cancelled => "cancelled",
            SubmissionState::Unresolved => "unresolved",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionState::Confirmed
                | SubmissionState::TimedOut
                | SubmissionState::Rejected
                | SubmissionState::Cancelled
                | SubmissionState::Unresolved
        )
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("交易 {tx_id} 被拒绝: {message}")]
    Rejected { tx_id: TxId, message: String },
    /// 结果未知，交易仍可能在之后上链。
    #[error("交易 {tx_id} 在 {rounds} 轮内未确认")]
    ConfirmationTimeout { tx_id: TxId, rounds: u64 },
    #[error("交易 {tx_id} 的确认等待已取消（已广播: {broadcast}）")]
    Cancelled { tx_id: TxId, broadcast: bool },
    /// 交易可能已被节点接收，不能直接重发。
    #[error("交易 {tx_id} 结果未知: {source}")]
    Unresolved {
        tx_id: TxId,
        #[source]
        source: AlgodError,
    },
    /// 未触达节点的失败。
    #[error(transparent)]
    Algod(#[from] AlgodError),
    #[error(transparent)]
    Encoding(#[from] TxnError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub tx_id: TxId,
    pub tx_ids: Vec<TxId>,
    pub confirmed_round: u64,
    pub rounds_waited: u64,
    pub application_index: Option<u64>,
    pub asset_index: Option<u64>,
    pub logs: Vec<Vec<u8>>,
}

/// 单笔/单组提交的状态机，每次迁移都会记录日志。
struct Tracker<'a> {
    operation: &'a str,
    tx_id: &'a TxId,
    state: SubmissionState,
}

impl Tracker<'_> {
    fn advance(&mut self, next: SubmissionState) {
        debug!(
            target: "submit::state",
            operation = self.operation,
            tx_id = %self.tx_id,
            from = %self.state,
            to = %next,
            "提交状态迁移"
        );
        self.state = next;
    }

    fn broadcast(&self) -> bool {
        !matches!(self.state, SubmissionState::Built | SubmissionState::Signed)
    }

    fn unresolved(&mut self, source: AlgodError) -> SubmitError {
        self.advance(SubmissionState::Unresolved);
        SubmitError::Unresolved {
            tx_id: self.tx_id.clone(),
            source,
        }
    }
}

pub struct Submitter {
    client: Arc<dyn AlgodClient>,
    max_wait_rounds: u64,
    timeout: Option<Duration>,
}

impl Submitter {
    pub fn new(client: Arc<dyn AlgodClient>, config: &ConfirmationConfig) -> Self {
        Self {
            client,
            max_wait_rounds: config.max_wait_rounds,
            timeout: config.deadline_secs.map(Duration::from_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_wait_rounds(&self) -> u64 {
        self.max_wait_rounds
    }

    pub async fn submit(
        &self,
        operation: &str,
        signed: &SignedGroup,
        cancel: &CancellationToken,
    ) -> Result<Confirmation, SubmitError> {
        let started = Instant::now();
        let deadline = self.timeout.map(Deadline::after);
        let tx_id = signed.primary_tx_id().clone();
        let mut tracker = Tracker {
            operation,
            tx_id: &tx_id,
            state: SubmissionState::Built,
        };
        tracker.advance(SubmissionState::Signed);

        let result = self
            .drive(&mut tracker, signed, cancel, deadline)
            .await;
        match &result {
            Ok(confirmation) => events::submission_confirmed(
                operation,
                &tx_id,
                confirmation.confirmed_round,
                confirmation.rounds_waited,
                started.elapsed(),
            ),
            Err(SubmitError::Rejected { message, .. }) => {
                events::submission_unresolved(operation, Some(&tx_id), "rejected", message)
            }
            Err(SubmitError::ConfirmationTimeout { rounds, .. }) => events::submission_unresolved(
                operation,
                Some(&tx_id),
                "timeout",
                &format!("{rounds} rounds"),
            ),
            Err(SubmitError::Cancelled { broadcast, .. }) => events::submission_unresolved(
                operation,
                Some(&tx_id),
                "cancelled",
                if *broadcast { "after broadcast" } else { "before broadcast" },
            ),
            Err(SubmitError::Unresolved { source, .. }) => events::submission_unresolved(
                operation,
                Some(&tx_id),
                "unresolved",
                &source.to_string(),
            ),
            Err(err) => {
                events::submission_unresolved(operation, Some(&tx_id), "error", &err.to_string())
            }
        }
        result
    }

    async fn drive(
        &self,
        tracker: &mut Tracker<'_>,
        signed: &SignedGroup,
        cancel: &CancellationToken,
        deadline: Option<Deadline>,
    ) -> Result<Confirmation, SubmitError> {
        let tx_id = tracker.tx_id.clone();
        if cancel.is_cancelled() || deadline.is_some_and(|d| d.expired()) {
            tracker.advance(SubmissionState::Cancelled);
            return Err(SubmitError::Cancelled {
                tx_id,
                broadcast: false,
            });
        }

        let payload = signed.to_bytes()?;
        match self.client.send_raw(&payload).await {
            Ok(node_id) => {
                if node_id != tx_id {
                    debug!(
                        target: "submit",
                        local = %tx_id,
                        node = %node_id,
                        "节点返回的交易 id 与本地计算不同，以本地首笔为准"
                    );
                }
            }
            Err(err) => {
                let message = match err {
                    AlgodError::Rejected { message } => message,
                    AlgodError::Api { status, .. } if status == StatusCode::TOO_MANY_REQUESTS => {
                        return Err(err.into());
                    }
                    AlgodError::Api { status, message, .. } if status.is_client_error() => message,
                    AlgodError::Http(inner) if inner.is_connect() => {
                        return Err(AlgodError::Http(inner).into());
                    }
                    // 请求可能已送达节点
                    other => return Err(tracker.unresolved(other)),
                };
                tracker.advance(SubmissionState::Rejected);
                return Err(SubmitError::Rejected { tx_id, message });
            }
        }
        tracker.advance(SubmissionState::Broadcast);
        events::submission_broadcast(tracker.operation, &tx_id, signed.len());

        let start_round = self
            .client
            .status()
            .await
            .map_err(|err| tracker.unresolved(err))?
            .last_round;
        let last_round = start_round.saturating_add(self.max_wait_rounds);
        let mut current = start_round;
        tracker.advance(SubmissionState::Pending);

        // 最后一轮仍需轮询一次
        loop {
            if cancel.is_cancelled() || deadline.is_some_and(|d| d.expired()) {
                tracker.advance(SubmissionState::Cancelled);
                return Err(SubmitError::Cancelled {
                    tx_id,
                    broadcast: tracker.broadcast(),
                });
            }

            let pending = self
                .client
                .pending_transaction(&tx_id)
                .await
                .map_err(|err| tracker.unresolved(err))?;
            if let Some(confirmed_round) = pending.confirmed_round() {
                tracker.advance(SubmissionState::Confirmed);
                info!(
                    target: "submit::confirm",
                    tx_id = %tx_id,
                    round = confirmed_round,
                    app_id = ?pending.application_index,
                    asset_id = ?pending.asset_index,
                    "交易已确认"
                );
                return Ok(Confirmation {
                    tx_id: tx_id.clone(),
                    tx_ids: signed.tx_ids().to_vec(),
                    confirmed_round,
                    rounds_waited: current - start_round,
                    application_index: pending.application_index,
                    asset_index: pending.asset_index,
                    logs: pending.decoded_logs()?,
                });
            }
            if !pending.pool_error.is_empty() {
                tracker.advance(SubmissionState::Rejected);
                return Err(SubmitError::Rejected {
                    tx_id,
                    message: pending.pool_error,
                });
            }
            if current >= last_round {
                break;
            }

            debug!(target: "submit::confirm", tx_id = %tx_id, round = current, "等待下一轮");
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracker.advance(SubmissionState::Cancelled);
                    return Err(SubmitError::Cancelled { tx_id, broadcast: true });
                }
                _ = deadline::reached(deadline) => {
                    tracker.advance(SubmissionState::Cancelled);
                    return Err(SubmitError::Cancelled { tx_id, broadcast: true });
                }
                status = self.client.status_after_round(current) => {
                    let status = status.map_err(|err| tracker.unresolved(err))?;
                    current = status.last_round.max(current + 1);
                }
            }
        }

        tracker.advance(SubmissionState::TimedOut);
        warn!(
            target: "submit::confirm",
            tx_id = %tx_id,
            rounds = self.max_wait_rounds,
            "超出等待轮数，结果未知"
        );
        Err(SubmitError::ConfirmationTimeout {
            tx_id,
            rounds: self.max_wait_rounds,
        })
    }
}
