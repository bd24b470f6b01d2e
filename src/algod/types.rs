use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::Value;

use super::AlgodError;
use crate::txn::Digest;

/// `GET /v2/transactions/params`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SuggestedParams {
    /// 每字节手续费（非固定费率时使用）。
    #[serde(default)]
    pub fee: u64,
    pub min_fee: u64,
    pub last_round: u64,
    pub genesis_id: String,
    pub genesis_hash: Digest,
    #[serde(default)]
    pub consensus_version: String,
}

impl SuggestedParams {
    /// 建议的有效窗口：[last_round, last_round + 1000]。
    pub fn first_valid(&self) -> u64 {
        self.last_round
    }

    pub fn last_valid(&self) -> u64 {
        self.last_round + 1_000
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompiledProgram {
    pub hash: String,
    pub result: String,
}

impl CompiledProgram {
    pub fn bytes(&self) -> Result<Vec<u8>, AlgodError> {
        BASE64
            .decode(self.result.trim())
            .map_err(|err| AlgodError::Schema(format!("编译结果不是合法 base64: {err}")))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SendResponse {
    #[serde(rename = "txId")]
    pub tx_id: String,
}

/// `GET /v2/transactions/pending/{txid}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PendingTransaction {
    #[serde(default)]
    pub confirmed_round: Option<u64>,
    #[serde(default)]
    pub pool_error: String,
    #[serde(default)]
    pub application_index: Option<u64>,
    #[serde(default)]
    pub asset_index: Option<u64>,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl PendingTransaction {
    pub fn confirmed_round(&self) -> Option<u64> {
        self.confirmed_round.filter(|round| *round > 0)
    }

    pub fn decoded_logs(&self) -> Result<Vec<Vec<u8>>, AlgodError> {
        decode_logs(&self.logs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeStatus {
    pub last_round: u64,
}

/// `POST /v2/teal/dryrun` 中单笔交易的执行轨迹。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DryrunTxnResult {
    #[serde(default)]
    pub app_call_messages: Vec<String>,
    #[serde(default)]
    pub logic_sig_messages: Vec<String>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub budget_consumed: Option<u64>,
    #[serde(default)]
    pub budget_added: Option<u64>,
    #[serde(default)]
    pub global_delta: Vec<Value>,
    #[serde(default)]
    pub local_deltas: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DryrunResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub txns: Vec<DryrunTxnResult>,
    /// 原始响应体，用于落盘。
    #[serde(skip)]
    pub raw: Value,
}

pub(crate) fn decode_logs(logs: &[String]) -> Result<Vec<Vec<u8>>, AlgodError> {
    logs.iter()
        .map(|entry| {
            BASE64
                .decode(entry)
                .map_err(|err| AlgodError::Schema(format!("日志不是合法 base64: {err}")))
        })
        .collect()
}
