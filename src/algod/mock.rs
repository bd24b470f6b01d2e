//! 脚本化的 `AlgodClient`，记录每次调用以便断言“未触网”。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};

use super::{
    AlgodClient, AlgodError, CompiledProgram, DryrunResponse, NodeStatus, PendingTransaction,
    SuggestedParams,
};
use crate::txn::{Address, Digest, TxId};

pub struct MockAlgod {
    pub params: SuggestedParams,
    pub program: Vec<u8>,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    calls: Vec<String>,
    round: u64,
    sends: VecDeque<Result<TxId, AlgodError>>,
    pending: VecDeque<Result<PendingTransaction, AlgodError>>,
    dryruns: VecDeque<Result<DryrunResponse, AlgodError>>,
    sent_payloads: Vec<Vec<u8>>,
    dryrun_requests: Vec<Vec<u8>>,
}

impl MockAlgod {
    pub fn new() -> Self {
        Self {
            params: SuggestedParams {
                fee: 0,
                min_fee: 1_000,
                last_round: 1_000,
                genesis_id: "sandnet-v1".to_string(),
                genesis_hash: Digest([7u8; 32]),
                consensus_version: String::new(),
            },
            program: vec![0x06, 0x81, 0x01, 0x43],
            state: Mutex::new(MockState {
                round: 1_000,
                ..MockState::default()
            }),
        }
    }

    pub fn push_send(&self, result: Result<TxId, AlgodError>) {
        self.state.lock().expect("mock lock").sends.push_back(result);
    }

    pub fn push_pending(&self, pending: PendingTransaction) {
        self.state.lock().expect("mock lock").pending.push_back(Ok(pending));
    }

    pub fn push_pending_error(&self, err: AlgodError) {
        self.state.lock().expect("mock lock").pending.push_back(Err(err));
    }

    pub fn push_dryrun(&self, response: DryrunResponse) {
        self.state.lock().expect("mock lock").dryruns.push_back(Ok(response));
    }

    pub fn push_dryrun_error(&self, err: AlgodError) {
        self.state.lock().expect("mock lock").dryruns.push_back(Err(err));
    }

    /// 所有应用与资产的创建者。
    pub fn creator() -> Address {
        Address([5u8; 32])
    }

    pub fn confirm_next(&self, round: u64) {
        self.push_pending(PendingTransaction {
            confirmed_round: Some(round),
            ..PendingTransaction::default()
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().expect("mock lock").calls.clone()
    }

    pub fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.state.lock().expect("mock lock").sent_payloads.clone()
    }

    pub fn dryrun_requests(&self) -> Vec<Vec<u8>> {
        self.state.lock().expect("mock lock").dryrun_requests.clone()
    }

    fn record(&self, call: &str) {
        self.state.lock().expect("mock lock").calls.push(call.to_string());
    }
}

#[async_trait]
impl AlgodClient for MockAlgod {
    async fn suggested_params(&self) -> Result<SuggestedParams, AlgodError> {
        self.record("suggested_params");
        Ok(self.params.clone())
    }

    async fn compile(&self, _source: &[u8]) -> Result<CompiledProgram, AlgodError> {
        self.record("compile");
        Ok(CompiledProgram {
            hash: "MOCKHASH".to_string(),
            result: BASE64.encode(&self.program),
        })
    }

    async fn send_raw(&self, payload: &[u8]) -> Result<TxId, AlgodError> {
        self.record("send_raw");
        let mut state = self.state.lock().expect("mock lock");
        state.sent_payloads.push(payload.to_vec());
        state
            .sends
            .pop_front()
            .unwrap_or_else(|| Ok(TxId::from("ACCEPTED".to_string())))
    }

    async fn pending_transaction(&self, _tx_id: &TxId) -> Result<PendingTransaction, AlgodError> {
        self.record("pending_transaction");
        self.state
            .lock()
            .expect("mock lock")
            .pending
            .pop_front()
            .unwrap_or_else(|| Ok(PendingTransaction::default()))
    }

    async fn status(&self) -> Result<NodeStatus, AlgodError> {
        self.record("status");
        Ok(NodeStatus {
            last_round: self.state.lock().expect("mock lock").round,
        })
    }

    async fn status_after_round(&self, round: u64) -> Result<NodeStatus, AlgodError> {
        self.record("status_after_round");
        let mut state = self.state.lock().expect("mock lock");
        state.round = state.round.max(round + 1);
        Ok(NodeStatus {
            last_round: state.round,
        })
    }

    async fn dryrun(&self, request: &[u8]) -> Result<DryrunResponse, AlgodError> {
        self.record("dryrun");
        let mut state = self.state.lock().expect("mock lock");
        state.dryrun_requests.push(request.to_vec());
        state
            .dryruns
            .pop_front()
            .unwrap_or_else(|| Ok(DryrunResponse::default()))
    }

    async fn application(&self, app_id: u64) -> Result<Value, AlgodError> {
        self.record("application");
        Ok(json!({
            "id": app_id,
            "params": {
                "creator": Self::creator().to_string(),
                "approval-program": BASE64.encode(&self.program),
                "clear-state-program": BASE64.encode(&self.program),
                "global-state": [],
                "global-state-schema": {"num-uint": 6, "num-byte-slice": 0}
            }
        }))
    }

    async fn asset(&self, asset_id: u64) -> Result<Value, AlgodError> {
        self.record("asset");
        Ok(json!({
            "index": asset_id,
            "params": {"creator": Self::creator().to_string(), "decimals": 6, "total": 1_000_000}
        }))
    }

    async fn account(&self, address: &Address) -> Result<Value, AlgodError> {
        self.record("account");
        Ok(json!({"address": address.to_string(), "amount": 10_000_000, "assets": []}))
    }
}
