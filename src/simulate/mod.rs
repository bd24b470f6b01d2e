//! 广播前的模拟执行。结果仅作参考，除非调用方要求强制通过。

mod ledger;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::algod::types::decode_logs;
use crate::algod::{AlgodClient, AlgodError, DryrunResponse};
use crate::monitoring::events;
use crate::signer::SignedGroup;
use crate::txn::{SignedTransaction, TxId};

use self::ledger::{LedgerSnapshot, LedgerValue};

const PASS: &str = "PASS";
const REJECT: &str = "REJECT";

#[derive(Debug, Error)]
pub enum SimulateError {
    #[error(transparent)]
    Algod(#[from] AlgodError),
    #[error("模拟请求编码失败: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("无法写入模拟结果 {path}: {source}")]
    Dump {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{operation} 模拟未通过: {reason}")]
    Rejected { operation: String, reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SimulationMode {
    #[default]
    Off,
    /// 失败只告警，流程继续。
    Advisory,
    /// 失败即中止，不广播。
    Enforce,
}

/// 请求（`.msgp`）与响应（`.json`）的落盘位置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpPaths {
    pub request: PathBuf,
    pub response: PathBuf,
}

impl DumpPaths {
    pub fn in_dir(dir: &Path, operation: &str) -> Self {
        Self {
            request: dir.join(format!("{operation}.msgp")),
            response: dir.join(format!("{operation}.json")),
        }
    }
}

/// 键按字典序排列，与节点端编码一致。
#[derive(Serialize)]
struct DryrunRequest<'a> {
    accounts: Vec<LedgerValue<'a>>,
    apps: Vec<LedgerValue<'a>>,
    #[serde(rename = "latest-timestamp")]
    latest_timestamp: i64,
    round: u64,
    txns: &'a [SignedTransaction],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberReport {
    pub index: usize,
    pub tx_id: String,
    pub passed: bool,
    pub app_messages: Vec<String>,
    pub logic_sig_messages: Vec<String>,
    #[serde(skip)]
    pub logs: Vec<Vec<u8>>,
    pub budget_consumed: u64,
    pub global_delta_count: usize,
    pub local_delta_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub error: Option<String>,
    /// 分组内交易数，结果条数不足即视为未通过。
    pub expected: usize,
    pub members: Vec<MemberReport>,
}

impl SimulationReport {
    fn from_response(tx_ids: &[TxId], response: &DryrunResponse) -> Result<Self, AlgodError> {
        let error = Some(response.error.clone()).filter(|message| !message.is_empty());
        let mut members = Vec::with_capacity(response.txns.len());
        for (index, result) in response.txns.iter().enumerate() {
            let rejected = result
                .app_call_messages
                .iter()
                .chain(&result.logic_sig_messages)
                .any(|message| message == REJECT);
            let app_passed = result.app_call_messages.is_empty()
                || result.app_call_messages.iter().any(|message| message == PASS);
            members.push(MemberReport {
                index,
                tx_id: tx_ids
                    .get(index)
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                passed: error.is_none() && !rejected && app_passed,
                app_messages: result.app_call_messages.clone(),
                logic_sig_messages: result.logic_sig_messages.clone(),
                logs: decode_logs(&result.logs)?,
                budget_consumed: result.budget_consumed.unwrap_or_default(),
                global_delta_count: result.global_delta.len(),
                local_delta_count: result.local_deltas.len(),
            });
        }
        Ok(Self {
            error,
            expected: tx_ids.len(),
            members,
        })
    }

    pub fn passed(&self) -> bool {
        self.error.is_none()
            && self.members.len() == self.expected
            && self.members.iter().all(|member| member.passed)
    }

    pub fn budget_consumed(&self) -> u64 {
        self.members.iter().map(|member| member.budget_consumed).sum()
    }

    /// 第一条失败原因，供告警与错误信息使用。
    pub fn failure_reason(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(error.clone());
        }
        if self.members.len() != self.expected {
            return Some(format!(
                "模拟结果 {} 条，分组共 {} 笔交易",
                self.members.len(),
                self.expected
            ));
        }
        self.members
            .iter()
            .find(|member| !member.passed)
            .map(|member| {
                let messages = member
                    .app_messages
                    .iter()
                    .chain(&member.logic_sig_messages)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("第 {} 笔交易: {messages}", member.index)
            })
    }
}

pub struct SimulationGateway {
    client: Arc<dyn AlgodClient>,
    mode: SimulationMode,
}

impl SimulationGateway {
    pub fn new(client: Arc<dyn AlgodClient>, mode: SimulationMode) -> Self {
        Self { client, mode }
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    /// `Off` 时直接返回 `None`，不触网。`Advisory` 下节点侧失败只记录，返回 `None`。
    pub async fn simulate(
        &self,
        operation: &str,
        signed: &SignedGroup,
        dump: Option<&DumpPaths>,
    ) -> Result<Option<SimulationReport>, SimulateError> {
        if self.mode == SimulationMode::Off {
            return Ok(None);
        }

        let report = match self.run(signed, dump).await {
            Ok(report) => report,
            Err(err) if self.mode == SimulationMode::Advisory => {
                let reason = err.to_string();
                warn!(target: "simulate", operation, reason = %reason, "模拟请求失败，按参考模式继续");
                events::simulation_unavailable(operation, &reason);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let passed = report.passed();
        events::simulation_verdict(operation, passed, report.members.len(), report.budget_consumed());
        if passed {
            info!(target: "simulate", operation, members = report.members.len(), "模拟通过");
            return Ok(Some(report));
        }

        let reason = report.failure_reason().unwrap_or_else(|| "未知原因".to_string());
        match self.mode {
            SimulationMode::Enforce => Err(SimulateError::Rejected {
                operation: operation.to_string(),
                reason,
            }),
            _ => {
                warn!(target: "simulate", operation, reason = %reason, "模拟未通过，按参考结果继续");
                Ok(Some(report))
            }
        }
    }

    async fn run(
        &self,
        signed: &SignedGroup,
        dump: Option<&DumpPaths>,
    ) -> Result<SimulationReport, SimulateError> {
        let snapshot = LedgerSnapshot::collect(self.client.as_ref(), signed.members()).await?;
        let request = rmp_serde::to_vec_named(&DryrunRequest {
            accounts: snapshot.accounts.iter().map(LedgerValue).collect(),
            apps: snapshot.apps.iter().map(LedgerValue).collect(),
            latest_timestamp: OffsetDateTime::now_utc().unix_timestamp(),
            round: snapshot.round,
            txns: signed.members(),
        })?;
        if let Some(paths) = dump {
            write_dump(&paths.request, &request).await?;
        }

        let response = self.client.dryrun(&request).await?;
        let report = SimulationReport::from_response(signed.tx_ids(), &response)?;

        if let Some(paths) = dump {
            let body = if response.raw.is_null() {
                serde_json::to_vec_pretty(&report)
            } else {
                serde_json::to_vec_pretty(&response.raw)
            }
            .map_err(|err| SimulateError::Dump {
                path: paths.response.clone(),
                source: std::io::Error::other(err),
            })?;
            write_dump(&paths.response, &body).await?;
            debug!(
                target: "simulate",
                request = %paths.request.display(),
                response = %paths.response.display(),
                "模拟请求与结果已落盘"
            );
        }
        Ok(report)
    }
}

async fn write_dump(path: &Path, contents: &[u8]) -> Result<(), SimulateError> {
    let dump_err = |source: std::io::Error| SimulateError::Dump {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(dump_err)?;
    }
    tokio::fs::write(path, contents).await.map_err(dump_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algod::DryrunTxnResult;
    use crate::algod::mock::MockAlgod;
    use crate::group::GroupBuilder;
    use crate::signer::{Account, Authorization, sign_group};
    use crate::txn::{Digest, OnCompletion, Transaction, TxnHeader};

    fn signed_call() -> SignedGroup {
        let account = Arc::new(Account::from_seed([8u8; 32]));
        let header = TxnHeader {
            fee: 1_000,
            flat_fee: true,
            first_valid: 1_000,
            last_valid: 2_000,
            genesis_id: "sandnet-v1".into(),
            genesis_hash: Digest([7u8; 32]),
            ..TxnHeader::default()
        };
        let call = Transaction::app_call(account.address(), 2, OnCompletion::NoOp, &header);
        let group = GroupBuilder::new()
            .push(call, Authorization::account(&account))
            .build()
            .expect("group");
        sign_group(&group).expect("sign")
    }

    fn rejecting() -> DryrunResponse {
        DryrunResponse {
            txns: vec![DryrunTxnResult {
                app_call_messages: vec!["ApprovalProgram".into(), REJECT.into()],
                ..DryrunTxnResult::default()
            }],
            ..DryrunResponse::default()
        }
    }

    #[tokio::test]
    async fn off_mode_never_calls_the_node() {
        let mock = Arc::new(MockAlgod::new());
        let gateway = SimulationGateway::new(mock.clone(), SimulationMode::Off);
        let report = gateway.simulate("update", &signed_call(), None).await.expect("sim");
        assert!(report.is_none());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn advisory_failure_is_returned_not_raised() {
        let mock = Arc::new(MockAlgod::new());
        mock.push_dryrun(rejecting());
        let gateway = SimulationGateway::new(mock.clone(), SimulationMode::Advisory);
        let report = gateway
            .simulate("update", &signed_call(), None)
            .await
            .expect("advisory")
            .expect("report");
        assert!(!report.passed());
        assert!(report.failure_reason().expect("reason").contains(REJECT));
    }

    #[tokio::test]
    async fn enforce_failure_aborts() {
        let mock = Arc::new(MockAlgod::new());
        mock.push_dryrun(rejecting());
        let gateway = SimulationGateway::new(mock, SimulationMode::Enforce);
        let err = gateway
            .simulate("update", &signed_call(), None)
            .await
            .expect_err("enforced");
        assert!(matches!(err, SimulateError::Rejected { .. }));
    }

    #[tokio::test]
    async fn request_and_response_are_dumped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = DumpPaths::in_dir(&dir.path().join("dryrun"), "manage");
        let mock = Arc::new(MockAlgod::new());
        mock.push_dryrun(DryrunResponse {
            txns: vec![DryrunTxnResult {
                app_call_messages: vec!["ApprovalProgram".into(), PASS.into()],
                logs: vec!["FR98dQ==".into()],
                budget_consumed: Some(42),
                ..DryrunTxnResult::default()
            }],
            ..DryrunResponse::default()
        });
        let gateway = SimulationGateway::new(mock.clone(), SimulationMode::Advisory);
        let signed = signed_call();
        let report = gateway
            .simulate("manage", &signed, Some(&paths))
            .await
            .expect("sim")
            .expect("report");

        assert!(report.passed());
        assert_eq!(report.members[0].logs, vec![vec![0x15, 0x1f, 0x7c, 0x75]]);
        assert_eq!(report.members[0].tx_id, signed.primary_tx_id().to_string());

        let request = std::fs::read(&paths.request).expect("request dump");
        assert_eq!(request, mock.dryrun_requests()[0]);
        // fixmap(5) + "accounts"
        assert_eq!(&request[..3], &[0x85, 0xa8, b'a']);
        for key in [&b"apps"[..], b"latest-timestamp", b"round", b"txns"] {
            assert!(request.windows(key.len()).any(|w| w == key));
        }
        let calls = mock.calls();
        assert!(calls.contains(&"application".to_string()));
        assert!(calls.contains(&"account".to_string()));
        let response = std::fs::read_to_string(&paths.response).expect("response dump");
        assert!(response.contains("\"budget_consumed\": 42"));
    }

    fn node_down() -> AlgodError {
        AlgodError::Api {
            endpoint: "/v2/teal/dryrun".into(),
            status: reqwest::StatusCode::NOT_FOUND,
            message: "dryrun disabled".into(),
        }
    }

    #[tokio::test]
    async fn advisory_survives_unavailable_dryrun() {
        let mock = Arc::new(MockAlgod::new());
        mock.push_dryrun_error(node_down());
        let gateway = SimulationGateway::new(mock.clone(), SimulationMode::Advisory);
        let report = gateway
            .simulate("update", &signed_call(), None)
            .await
            .expect("advisory keeps going");
        assert!(report.is_none());
        assert!(mock.calls().contains(&"dryrun".to_string()));
    }

    #[tokio::test]
    async fn enforce_surfaces_unavailable_dryrun() {
        let mock = Arc::new(MockAlgod::new());
        mock.push_dryrun_error(node_down());
        let gateway = SimulationGateway::new(mock, SimulationMode::Enforce);
        let err = gateway
            .simulate("update", &signed_call(), None)
            .await
            .expect_err("enforced");
        assert!(matches!(err, SimulateError::Algod(AlgodError::Api { .. })));
    }

    #[tokio::test]
    async fn missing_results_do_not_pass() {
        let mock = Arc::new(MockAlgod::new());
        mock.push_dryrun(DryrunResponse::default());
        let gateway = SimulationGateway::new(mock.clone(), SimulationMode::Advisory);
        let report = gateway
            .simulate("update", &signed_call(), None)
            .await
            .expect("advisory")
            .expect("report");
        assert_eq!(report.expected, 1);
        assert!(!report.passed());
        assert!(report.failure_reason().expect("reason").contains("0 条"));

        mock.push_dryrun(DryrunResponse::default());
        let gateway = SimulationGateway::new(mock, SimulationMode::Enforce);
        let err = gateway
            .simulate("update", &signed_call(), None)
            .await
            .expect_err("enforced");
        assert!(matches!(err, SimulateError::Rejected { .. }));
    }
}
