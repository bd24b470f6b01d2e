//! 模拟请求附带的链上状态：被调用应用、相关账户与资产创建者。
//!
//! 节点 JSON 原样转为 msgpack，只有字节型字段由 base64 还原为 bin。

use std::collections::BTreeSet;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use tracing::debug;

use crate::algod::{AlgodClient, AlgodError};
use crate::txn::{Address, SignedTransaction, Transaction, TxType};

/// 创建调用在模拟中使用的占位 app id。
pub const SIMULATED_APP_ID: u64 = 1_380_011_588;

const BYTE_FIELDS: &[&str] = &[
    "approval-program",
    "clear-state-program",
    "metadata-hash",
    "name-b64",
    "unit-name-b64",
    "url-b64",
    "selection-participation-key",
    "vote-participation-key",
    "state-proof-key",
];

#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub apps: Vec<Value>,
    pub accounts: Vec<Value>,
    pub round: u64,
}

impl LedgerSnapshot {
    pub async fn collect(
        client: &dyn AlgodClient,
        members: &[SignedTransaction],
    ) -> Result<Self, AlgodError> {
        let mut snapshot = Self::default();
        let mut apps = BTreeSet::new();
        let mut assets = BTreeSet::new();
        let mut accounts = BTreeSet::new();

        for txn in members.iter().map(|member| &member.txn) {
            if txn.kind != TxType::ApplicationCall {
                continue;
            }
            accounts.insert(txn.sender);
            accounts.extend(txn.accounts.iter().copied());
            for app_id in &txn.foreign_apps {
                apps.insert(*app_id);
                accounts.insert(Address::for_application(*app_id));
            }
            assets.extend(txn.foreign_assets.iter().copied());
            if txn.app_id == 0 {
                snapshot.apps.push(pending_creation(txn));
            } else {
                apps.insert(txn.app_id);
                accounts.insert(Address::for_application(txn.app_id));
            }
        }

        for asset_id in assets {
            let info = client.asset(asset_id).await?;
            accounts.extend(creator_of(&info)?);
        }
        for app_id in apps {
            let info = client.application(app_id).await?;
            accounts.extend(creator_of(&info)?);
            snapshot.apps.push(info);
        }
        for address in &accounts {
            snapshot.accounts.push(client.account(address).await?);
        }
        snapshot.round = client.status().await?.last_round;

        debug!(
            target: "simulate::ledger",
            apps = snapshot.apps.len(),
            accounts = snapshot.accounts.len(),
            round = snapshot.round,
            "模拟所需链上状态已读取"
        );
        Ok(snapshot)
    }
}

fn pending_creation(txn: &Transaction) -> Value {
    json!({
        "id": SIMULATED_APP_ID,
        "params": {
            "creator": txn.sender.to_string(),
            "approval-program": BASE64.encode(&txn.approval_program),
            "clear-state-program": BASE64.encode(&txn.clear_program),
            "global-state-schema": {
                "num-uint": txn.global_schema.num_uints,
                "num-byte-slice": txn.global_schema.num_byte_slices
            },
            "local-state-schema": {
                "num-uint": txn.local_schema.num_uints,
                "num-byte-slice": txn.local_schema.num_byte_slices
            }
        }
    })
}

fn creator_of(info: &Value) -> Result<Option<Address>, AlgodError> {
    match info.pointer("/params/creator").and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<Address>()
            .map(Some)
            .map_err(|err| AlgodError::Schema(format!("创建者地址非法 {raw}: {err}"))),
    }
}

/// 节点 JSON 的 msgpack 视图。
pub struct LedgerValue<'a>(pub &'a Value);

impl Serialize for LedgerValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(flag) => serializer.serialize_bool(*flag),
            Value::Number(number) => {
                if let Some(value) = number.as_u64() {
                    serializer.serialize_u64(value)
                } else if let Some(value) = number.as_i64() {
                    serializer.serialize_i64(value)
                } else {
                    serializer.serialize_f64(number.as_f64().unwrap_or_default())
                }
            }
            Value::String(text) => serializer.serialize_str(text),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&LedgerValue(item))?;
                }
                seq.end()
            }
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    match value {
                        Value::String(encoded) if BYTE_FIELDS.contains(&key.as_str()) => {
                            let bytes = BASE64.decode(encoded).map_err(|err| {
                                S::Error::custom(format!("{key} 不是合法 base64: {err}"))
                            })?;
                            map.serialize_entry(key, serde_bytes::Bytes::new(&bytes))?;
                        }
                        _ => map.serialize_entry(key, &LedgerValue(value))?,
                    }
                }
                map.end()
            }
        }
    }
}
