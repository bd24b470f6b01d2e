//! Contract documents shared by tests.

pub const MANAGER_JSON: &str = r#"{
  "name": "manager",
  "desc": "jina protocol manager",
  "methods": [
    {"name": "create", "args": [{"type": "asset", "name": "usdc"}], "returns": {"type": "void"}},
    {"name": "update", "args": [], "returns": {"type": "void"}},
    {"name": "add", "args": [{"type": "uint64"}, {"type": "uint64"}], "returns": {"type": "uint128"}},
    {"name": "manage", "args": [{"type": "asset", "name": "usdc"}, {"type": "byte[]"}, {"type": "byte[]"}, {"type": "byte[]"}, {"type": "byte[]"}], "returns": {"type": "(uint64,uint64,uint64)"}},
    {"name": "config", "args": [{"type": "application"}, {"type": "application"}, {"type": "asset"}, {"type": "asset"}], "returns": {"type": "void"}},
    {"name": "send_jusd", "args": [{"type": "account"}, {"type": "asset"}], "returns": {"type": "void"}},
    {"name": "child_update", "args": [{"type": "application"}, {"type": "byte[]"}, {"type": "byte[]"}], "returns": {"type": "void"}}
  ],
  "networks": {"default": {"appID": 2}},
  "source": {"approval": "teal/managerProg.teal"}
}"#;

pub const JINA_JSON: &str = r#"{
  "name": "jina",
  "methods": [
    {"name": "optin", "args": [{"type": "application", "name": "manager"}], "returns": {"type": "void"}},
    {"name": "earn", "args": [{"type": "uint64[]"}, {"type": "uint64"}, {"type": "uint64"}, {"type": "byte[4]"}], "returns": {"type": "void"}},
    {"name": "borrow", "args": [{"type": "uint64[]"}, {"type": "uint64[]"}, {"type": "uint64[]"}], "returns": {"type": "void"}},
    {"name": "repay", "args": [{"type": "uint64[]"}, {"type": "uint64[]"}], "returns": {"type": "void"}},
    {"name": "claim", "args": [{"type": "asset"}, {"type": "asset"}, {"type": "uint64"}], "returns": {"type": "void"}}
  ],
  "networks": {"default": {"appID": 55}}
}"#;
