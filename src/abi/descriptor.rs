use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::AbiError;
use super::types::{AbiType, ArgType};
use crate::txn::sha512_256;

/// 合约描述文档（ARC-4 JSON）；未识别的字段原样保留以便回写。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default)]
    pub methods: Vec<Method>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkInfo>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(rename = "appID")]
    pub app_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default)]
    pub args: Vec<MethodArg>,
    #[serde(default)]
    pub returns: MethodReturn,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodArg {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodReturn {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl Default for MethodReturn {
    fn default() -> Self {
        Self {
            type_name: "void".to_string(),
            desc: None,
        }
    }
}

impl ContractDescriptor {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 按名称查找方法；找不到是输入错误，由调用方决定如何处理。
    pub fn method(&self, name: &str) -> Result<&Method, AbiError> {
        self.methods
            .iter()
            .find(|method| method.name == name)
            .ok_or_else(|| AbiError::MethodNotFound {
                contract: self.name.clone(),
                method: name.to_string(),
            })
    }

    pub fn app_id(&self, network: &str) -> Result<u64, AbiError> {
        self.networks
            .get(network)
            .map(|info| info.app_id)
            .ok_or_else(|| AbiError::NetworkNotFound {
                contract: self.name.clone(),
                network: network.to_string(),
            })
    }

    pub fn set_app_id(&mut self, network: &str, app_id: u64) {
        self.networks
            .insert(network.to_string(), NetworkInfo { app_id });
    }
}

impl Method {
    /// `name(arg1,arg2,...)ret`
    pub fn signature(&self) -> String {
        let args: Vec<&str> = self.args.iter().map(|arg| arg.type_name.trim()).collect();
        format!(
            "{}({}){}",
            self.name,
            args.join(","),
            self.returns.type_name.trim()
        )
    }

    pub fn selector(&self) -> [u8; 4] {
        let hash = sha512_256(&[self.signature().as_bytes()]);
        [hash[0], hash[1], hash[2], hash[3]]
    }

    pub fn arg_types(&self) -> Result<Vec<ArgType>, AbiError> {
        self.args.iter().map(|arg| arg.type_name.parse()).collect()
    }

    /// `void` 返回 `None`。
    pub fn return_type(&self) -> Result<Option<AbiType>, AbiError> {
        match self.returns.type_name.trim() {
            "void" => Ok(None),
            raw => raw.parse().map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::fixtures::MANAGER_JSON;

    #[test]
    fn lookup_by_name_and_network() {
        let descriptor = ContractDescriptor::from_json(MANAGER_JSON).expect("parse");
        assert_eq!(descriptor.app_id("default").expect("network"), 2);
        assert_eq!(descriptor.method("config").expect("method").args.len(), 4);
    }

    #[test]
    fn unknown_method_is_recoverable_error() {
        let descriptor = ContractDescriptor::from_json(MANAGER_JSON).expect("parse");
        match descriptor.method("liquidate") {
            Err(AbiError::MethodNotFound { contract, method }) => {
                assert_eq!(contract, "manager");
                assert_eq!(method, "liquidate");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            descriptor.app_id("mainnet"),
            Err(AbiError::NetworkNotFound { .. })
        ));
    }

    #[test]
    fn selector_is_hash_prefix_of_signature() {
        let descriptor = ContractDescriptor::from_json(MANAGER_JSON).expect("parse");
        let add = descriptor.method("add").expect("method");
        assert_eq!(add.signature(), "add(uint64,uint64)uint128");
        assert_eq!(add.selector(), [0x8a, 0xa3, 0xb6, 0x1f]);
    }

    #[test]
    fn rewrite_preserves_unknown_fields() {
        let mut descriptor = ContractDescriptor::from_json(MANAGER_JSON).expect("parse");
        descriptor.set_app_id("default", 77);
        let json = descriptor.to_json_pretty().expect("json");
        let back = ContractDescriptor::from_json(&json).expect("reparse");
        assert_eq!(back.app_id("default").expect("network"), 77);
        assert_eq!(back.extra["source"]["approval"], "teal/managerProg.teal");
    }
}
