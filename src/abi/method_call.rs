use super::AbiError;
use super::descriptor::Method;
use super::types::{AbiType, ArgType, ReferenceType};
use super::value::{self, AbiValue};
use crate::txn::{Address, OnCompletion, StateSchema, Transaction, TxId, TxnHeader};

/// 返回值日志前缀：`sha512_256("return")[..4]`。
pub const RETURN_PREFIX: [u8; 4] = [0x15, 0x1f, 0x7c, 0x75];

const MAX_APP_ARGS: usize = 16;
const MAX_FOREIGN_ACCOUNTS: usize = 4;
const MAX_REFERENCES: usize = 8;

/// 一个方法参数的实际取值。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodArgValue {
    Value(AbiValue),
    Account(Address),
    Asset(u64),
    Application(u64),
    /// 作为同组前置交易传递，不占用 app args。
    Transaction(Box<Transaction>),
}

impl From<AbiValue> for MethodArgValue {
    fn from(value: AbiValue) -> Self {
        MethodArgValue::Value(value)
    }
}

impl From<u64> for MethodArgValue {
    fn from(value: u64) -> Self {
        MethodArgValue::Value(AbiValue::from(value))
    }
}

/// 组装好的方法调用：`call` 为 `appl` 交易，`preceding` 为交易类型参数。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltCall {
    pub call: Transaction,
    pub preceding: Vec<Transaction>,
}

#[derive(Debug, Clone)]
pub struct MethodCall<'m> {
    method: &'m Method,
    app_id: u64,
    sender: Address,
    header: TxnHeader,
    on_completion: OnCompletion,
    args: Vec<MethodArgValue>,
    accounts: Vec<Address>,
    foreign_assets: Vec<u64>,
    foreign_apps: Vec<u64>,
    approval_program: Vec<u8>,
    clear_program: Vec<u8>,
    global_schema: StateSchema,
    local_schema: StateSchema,
    note: Vec<u8>,
}

impl<'m> MethodCall<'m> {
    pub fn new(method: &'m Method, app_id: u64, sender: Address, header: TxnHeader) -> Self {
        Self {
            method,
            app_id,
            sender,
            header,
            on_completion: OnCompletion::NoOp,
            args: Vec::new(),
            accounts: Vec::new(),
            foreign_assets: Vec::new(),
            foreign_apps: Vec::new(),
            approval_program: Vec::new(),
            clear_program: Vec::new(),
            global_schema: StateSchema::default(),
            local_schema: StateSchema::default(),
            note: Vec::new(),
        }
    }

    pub fn on_completion(mut self, on_completion: OnCompletion) -> Self {
        self.on_completion = on_completion;
        self
    }

    pub fn arg(mut self, value: impl Into<MethodArgValue>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args<I>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = MethodArgValue>,
    {
        self.args.extend(values);
        self
    }

    /// 内部交易会触及、但不作为方法参数的账户。
    pub fn with_accounts(mut self, accounts: &[Address]) -> Self {
        for account in accounts {
            if !self.accounts.contains(account) {
                self.accounts.push(*account);
            }
        }
        self
    }

    pub fn with_foreign_assets(mut self, assets: &[u64]) -> Self {
        for asset in assets {
            if !self.foreign_assets.contains(asset) {
                self.foreign_assets.push(*asset);
            }
        }
        self
    }

    /// 创建应用：app id 置 0 并附带程序与状态 schema。
    pub fn create(
        mut self,
        approval: Vec<u8>,
        clear: Vec<u8>,
        global: StateSchema,
        local: StateSchema,
    ) -> Self {
        self.app_id = 0;
        self.approval_program = approval;
        self.clear_program = clear;
        self.global_schema = global;
        self.local_schema = local;
        self
    }

    /// 更新应用程序。
    pub fn update_programs(mut self, approval: Vec<u8>, clear: Vec<u8>) -> Self {
        self.on_completion = OnCompletion::UpdateApplication;
        self.approval_program = approval;
        self.clear_program = clear;
        self
    }

    pub fn note(mut self, note: Vec<u8>) -> Self {
        self.note = note;
        self
    }

    pub fn build(mut self) -> Result<BuiltCall, AbiError> {
        let arg_types = self.method.arg_types()?;
        if arg_types.len() != self.args.len() {
            return Err(AbiError::ArgumentCount {
                method: self.method.name.clone(),
                expected: arg_types.len(),
                actual: self.args.len(),
            });
        }

        let mut encoded_types: Vec<AbiType> = Vec::new();
        let mut encoded_values: Vec<AbiValue> = Vec::new();
        let mut preceding = Vec::new();
        let args = std::mem::take(&mut self.args);

        for (index, (ty, value)) in arg_types.iter().zip(args).enumerate() {
            match (ty, value) {
                (ArgType::Value(abi_ty), MethodArgValue::Value(value)) => {
                    encoded_types.push(abi_ty.clone());
                    encoded_values.push(value);
                }
                (ArgType::Reference(ReferenceType::Account), MethodArgValue::Account(address)) => {
                    let slot = self.account_slot(address);
                    encoded_types.push(AbiType::Uint(8));
                    encoded_values.push(AbiValue::Uint(slot as u128));
                }
                (ArgType::Reference(ReferenceType::Asset), MethodArgValue::Asset(asset_id)) => {
                    let slot = self.asset_slot(asset_id);
                    encoded_types.push(AbiType::Uint(8));
                    encoded_values.push(AbiValue::Uint(slot as u128));
                }
                (
                    ArgType::Reference(ReferenceType::Application),
                    MethodArgValue::Application(app_id),
                ) => {
                    let slot = self.app_slot(app_id);
                    encoded_types.push(AbiType::Uint(8));
                    encoded_values.push(AbiValue::Uint(slot as u128));
                }
                (ArgType::Transaction(kind), MethodArgValue::Transaction(txn)) => {
                    if !kind.accepts(txn.kind) {
                        return Err(AbiError::ArgumentMismatch {
                            method: self.method.name.clone(),
                            index,
                            expected: kind.as_str().to_string(),
                        });
                    }
                    preceding.push(*txn);
                }
                (expected, _) => {
                    return Err(AbiError::ArgumentMismatch {
                        method: self.method.name.clone(),
                        index,
                        expected: expected.to_string(),
                    });
                }
            }
        }

        let mut app_args = vec![self.method.selector().to_vec()];
        if encoded_values.len() > MAX_APP_ARGS - 1 {
            // 第 15 个起打包为一个元组
            let tail_types = encoded_types.split_off(MAX_APP_ARGS - 2);
            let tail_values = encoded_values.split_off(MAX_APP_ARGS - 2);
            for (ty, value) in encoded_types.iter().zip(&encoded_values) {
                app_args.push(value::encode(ty, value)?);
            }
            app_args.push(value::encode_tuple(&tail_types, &tail_values)?);
        } else {
            for (ty, value) in encoded_types.iter().zip(&encoded_values) {
                app_args.push(value::encode(ty, value)?);
            }
        }

        if self.accounts.len() > MAX_FOREIGN_ACCOUNTS {
            return Err(AbiError::TooManyReferences {
                kind: "accounts",
                limit: MAX_FOREIGN_ACCOUNTS,
            });
        }
        if self.accounts.len() + self.foreign_assets.len() + self.foreign_apps.len() > MAX_REFERENCES
        {
            return Err(AbiError::TooManyReferences {
                kind: "references",
                limit: MAX_REFERENCES,
            });
        }

        let mut call = Transaction::app_call(
            self.sender,
            self.app_id,
            self.on_completion,
            &self.header,
        );
        call.app_args = app_args;
        call.accounts = self.accounts;
        call.foreign_assets = self.foreign_assets;
        call.foreign_apps = self.foreign_apps;
        call.approval_program = self.approval_program;
        call.clear_program = self.clear_program;
        call.global_schema = self.global_schema;
        call.local_schema = self.local_schema;
        call.note = self.note;

        Ok(BuiltCall { call, preceding })
    }

    /// 0 号为发送方，其余为外部账户数组下标 + 1。
    fn account_slot(&mut self, address: Address) -> usize {
        if address == self.sender {
            return 0;
        }
        match self.accounts.iter().position(|known| *known == address) {
            Some(pos) => pos + 1,
            None => {
                self.accounts.push(address);
                self.accounts.len()
            }
        }
    }

    fn asset_slot(&mut self, asset_id: u64) -> usize {
        match self.foreign_assets.iter().position(|known| *known == asset_id) {
            Some(pos) => pos,
            None => {
                self.foreign_assets.push(asset_id);
                self.foreign_assets.len() - 1
            }
        }
    }

    /// 0 号为被调用应用自身。
    fn app_slot(&mut self, app_id: u64) -> usize {
        if app_id == self.app_id {
            return 0;
        }
        match self.foreign_apps.iter().position(|known| *known == app_id) {
            Some(pos) => pos + 1,
            None => {
                self.foreign_apps.push(app_id);
                self.foreign_apps.len()
            }
        }
    }
}

/// 已确认方法调用的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodResult {
    pub tx_id: TxId,
    pub confirmed_round: u64,
    pub raw_value: Option<Vec<u8>>,
    pub value: Option<AbiValue>,
}

impl MethodResult {
    /// 从确认记录的日志中取最后一条带返回前缀的日志解码。
    pub fn from_logs(
        method: &Method,
        tx_id: TxId,
        confirmed_round: u64,
        logs: &[Vec<u8>],
    ) -> Result<Self, AbiError> {
        let Some(return_type) = method.return_type()? else {
            return Ok(Self {
                tx_id,
                confirmed_round,
                raw_value: None,
                value: None,
            });
        };
        let raw = logs
            .iter()
            .rev()
            .find(|log| log.starts_with(&RETURN_PREFIX))
            .map(|log| log[RETURN_PREFIX.len()..].to_vec())
            .ok_or_else(|| AbiError::MissingReturn {
                method: method.name.clone(),
            })?;
        let value = value::decode(&return_type, &raw)?;
        Ok(Self {
            tx_id,
            confirmed_round,
            raw_value: Some(raw),
            value: Some(value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ContractDescriptor;
    use crate::abi::fixtures::{JINA_JSON, MANAGER_JSON};
    use crate::txn::{Digest, TxType};

    fn header() -> TxnHeader {
        TxnHeader {
            fee: 5_000,
            flat_fee: true,
            min_fee: 1_000,
            first_valid: 10,
            last_valid: 1_010,
            genesis_id: "sandnet-v1".into(),
            genesis_hash: Digest([1u8; 32]),
            ..TxnHeader::default()
        }
    }

    #[test]
    fn reference_arguments_become_foreign_indices() {
        let manager = ContractDescriptor::from_json(MANAGER_JSON).expect("parse");
        let method = manager.method("config").expect("method");
        let built = MethodCall::new(method, 2, Address([1u8; 32]), header())
            .arg(MethodArgValue::Application(54))
            .arg(MethodArgValue::Application(55))
            .arg(MethodArgValue::Asset(1))
            .arg(MethodArgValue::Asset(56))
            .build()
            .expect("build");

        let call = built.call;
        assert_eq!(call.kind, TxType::ApplicationCall);
        assert_eq!(call.app_args[0], method.selector().to_vec());
        assert_eq!(&call.app_args[1..], &[vec![1], vec![2], vec![0], vec![1]]);
        assert_eq!(call.foreign_apps, vec![54, 55]);
        assert_eq!(call.foreign_assets, vec![1, 56]);
        assert_eq!(call.fee, 5_000);
    }

    #[test]
    fn sender_account_reference_is_slot_zero() {
        let manager = ContractDescriptor::from_json(MANAGER_JSON).expect("parse");
        let method = manager.method("send_jusd").expect("method");
        let sender = Address([1u8; 32]);
        let built = MethodCall::new(method, 2, sender, header())
            .arg(MethodArgValue::Account(sender))
            .arg(MethodArgValue::Asset(56))
            .build()
            .expect("build");
        assert_eq!(built.call.app_args[1], vec![0]);
        assert!(built.call.accounts.is_empty());
    }

    #[test]
    fn wrong_argument_count_is_rejected() {
        let jina = ContractDescriptor::from_json(JINA_JSON).expect("parse");
        let method = jina.method("repay").expect("method");
        let err = MethodCall::new(method, 55, Address([1u8; 32]), header())
            .arg(AbiValue::Array(vec![AbiValue::from(86u64)]))
            .build()
            .expect_err("count");
        assert!(matches!(err, AbiError::ArgumentCount { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn arguments_past_fifteen_are_packed_into_tuple() {
        let args = (0..20)
            .map(|_| r#"{"type": "uint64"}"#)
            .collect::<Vec<_>>()
            .join(",");
        let json = format!(
            r#"{{"name":"many","methods":[{{"name":"manyargs","args":[{args}],"returns":{{"type":"uint64"}}}}]}}"#
        );
        let descriptor = ContractDescriptor::from_json(&json).expect("parse");
        let method = descriptor.method("manyargs").expect("method");
        let built = MethodCall::new(method, 9, Address([1u8; 32]), header())
            .args((0..20u64).map(MethodArgValue::from))
            .build()
            .expect("build");
        assert_eq!(built.call.app_args.len(), 16);
        assert_eq!(built.call.app_args[14], 13u64.to_be_bytes().to_vec());
        assert_eq!(built.call.app_args[15].len(), 6 * 8);
    }

    #[test]
    fn return_value_is_decoded_from_last_prefixed_log() {
        let manager = ContractDescriptor::from_json(MANAGER_JSON).expect("parse");
        let method = manager.method("manage").expect("method");
        let mut log = RETURN_PREFIX.to_vec();
        for id in [54u64, 55, 56] {
            log.extend_from_slice(&id.to_be_bytes());
        }
        let logs = vec![b"debug".to_vec(), log];
        let result = MethodResult::from_logs(method, TxId::from("T".to_string()), 90, &logs)
            .expect("result");
        let value = result.value.expect("value");
        let ids: Vec<u64> = value
            .items()
            .expect("tuple")
            .iter()
            .filter_map(AbiValue::as_u64)
            .collect();
        assert_eq!(ids, vec![54, 55, 56]);
    }

    #[test]
    fn missing_return_log_is_an_error() {
        let manager = ContractDescriptor::from_json(MANAGER_JSON).expect("parse");
        let method = manager.method("add").expect("method");
        let err = MethodResult::from_logs(method, TxId::from("T".to_string()), 1, &[])
            .expect_err("missing");
        assert!(matches!(err, AbiError::MissingReturn { .. }));
    }
}
