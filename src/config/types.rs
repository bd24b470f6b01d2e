use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 运行期全部配置；在入口处构造一次，显式传入每个操作。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub delegation: DelegationConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub fixtures: FixturesConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AuthHeader {
    #[serde(rename = "X-Algo-API-Token")]
    AlgoApiToken,
    #[serde(rename = "X-API-Key")]
    ApiKey,
}

impl AuthHeader {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthHeader::AlgoApiToken => "X-Algo-API-Token",
            AuthHeader::ApiKey => "X-API-Key",
        }
    }
}

impl Default for AuthHeader {
    fn default() -> Self {
        Self::AlgoApiToken
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "super::default_algod_address")]
    pub address: String,
    #[serde(default = "super::default_algod_token")]
    pub token: String,
    #[serde(default)]
    pub auth_header: AuthHeader,
    #[serde(default = "super::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "super::default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "super::default_retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,
    #[serde(default = "super::default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: super::default_algod_address(),
            token: super::default_algod_token(),
            auth_header: AuthHeader::default(),
            request_timeout_ms: super::default_request_timeout_ms(),
            retry_attempts: super::default_retry_attempts(),
            retry_initial_backoff_ms: super::default_retry_initial_backoff_ms(),
            retry_max_backoff_ms: super::default_retry_max_backoff_ms(),
        }
    }
}

impl NodeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggingProfile {
    Lean,
    Verbose,
}

impl Default for LoggingProfile {
    fn default() -> Self {
        Self::Lean
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "super::default_logging_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    #[serde(default = "super::default_logging_profile")]
    pub profile: LoggingProfile,
    #[serde(default = "super::default_timezone_offset_hours")]
    pub timezone_offset_hours: i8,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: super::default_logging_level(),
            json: false,
            profile: super::default_logging_profile(),
            timezone_offset_hours: super::default_timezone_offset_hours(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationConfig {
    /// 轮询确认的轮次上限，超过即返回 `ConfirmationTimeout`。
    #[serde(default = "super::default_max_wait_rounds")]
    pub max_wait_rounds: u64,
    /// 可选的墙钟截止时间（秒）。
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            max_wait_rounds: super::default_max_wait_rounds(),
            deadline_secs: None,
        }
    }
}

/// 各操作的内部交易倍数 k，手续费 = min_fee × k。
///
/// k 包含同组零手续费成员：repay、claim 各含一笔转账，borrow 默认覆盖一个借出方，
/// 借出方更多时需相应调高 `borrow`。
#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    #[serde(default = "super::default_one")]
    pub create: u64,
    #[serde(default = "super::default_one")]
    pub update: u64,
    #[serde(default = "super::default_manage_multiplier")]
    pub manage: u64,
    #[serde(default = "super::default_configure_multiplier")]
    pub configure: u64,
    #[serde(default = "super::default_two")]
    pub send_jusd: u64,
    #[serde(default = "super::default_two")]
    pub child_update: u64,
    #[serde(default = "super::default_one")]
    pub optin: u64,
    #[serde(default = "super::default_one")]
    pub earn: u64,
    #[serde(default = "super::default_borrow_multiplier")]
    pub borrow: u64,
    #[serde(default = "super::default_repay_multiplier")]
    pub repay: u64,
    #[serde(default = "super::default_two")]
    pub claim: u64,
    #[serde(default = "super::default_one")]
    pub asset_ops: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            create: 1,
            update: 1,
            manage: super::default_manage_multiplier(),
            configure: super::default_configure_multiplier(),
            send_jusd: 2,
            child_update: 2,
            optin: 1,
            earn: 1,
            borrow: super::default_borrow_multiplier(),
            repay: super::default_repay_multiplier(),
            claim: 2,
            asset_ops: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelegationConfig {
    #[serde(default = "super::default_delegation_lifespan_rounds")]
    pub lifespan_rounds: u64,
    #[serde(default = "super::default_lender_max_amount")]
    pub lender_max_amount: u64,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            lifespan_rounds: super::default_delegation_lifespan_rounds(),
            lender_max_amount: super::default_lender_max_amount(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub manager_descriptor: PathBuf,
    pub jina_descriptor: PathBuf,
    pub manager_approval: PathBuf,
    pub manager_clear: PathBuf,
    pub liquidator_approval: PathBuf,
    pub liquidator_clear: PathBuf,
    pub jina_approval: PathBuf,
    pub jina_clear: PathBuf,
    pub lender_program: PathBuf,
    pub lender_credential: PathBuf,
    pub dispenser_credential: PathBuf,
    pub dryrun_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            manager_descriptor: PathBuf::from("abi/manager.json"),
            jina_descriptor: PathBuf::from("abi/jina.json"),
            manager_approval: PathBuf::from("teal/managerProg.teal"),
            manager_clear: PathBuf::from("teal/clearState.teal"),
            liquidator_approval: PathBuf::from("teal/liquidatorProg.teal"),
            liquidator_clear: PathBuf::from("teal/clearState.teal"),
            jina_approval: PathBuf::from("teal/approvalProg.teal"),
            jina_clear: PathBuf::from("teal/jinaClear.teal"),
            lender_program: PathBuf::from("teal/logicSigDelegated.teal"),
            lender_credential: PathBuf::from("codec/lender_lsig.codec"),
            dispenser_credential: PathBuf::from("codec/dispenserJUSD.codec"),
            dryrun_dir: PathBuf::from("dryrun"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetFixtures {
    #[serde(default)]
    pub usdc: u64,
    #[serde(default)]
    pub jusd: u64,
    #[serde(default)]
    pub lft: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppFixtures {
    #[serde(default)]
    pub manager: u64,
    #[serde(default)]
    pub jina: u64,
    #[serde(default)]
    pub liquidator: u64,
}

#[derive(Clone, Deserialize)]
pub struct FixturesConfig {
    #[serde(default = "super::default_network")]
    pub network: String,
    /// 账户名 → base64 私钥（32 字节种子或 64 字节 seed‖pk）。
    #[serde(default)]
    pub accounts: BTreeMap<String, String>,
    #[serde(default)]
    pub assets: AssetFixtures,
    #[serde(default)]
    pub apps: AppFixtures,
}

impl std::fmt::Debug for FixturesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 私钥只输出账户名
        f.debug_struct("FixturesConfig")
            .field("network", &self.network)
            .field("accounts", &self.accounts.keys().collect::<Vec<_>>())
            .field("assets", &self.assets)
            .field("apps", &self.apps)
            .finish()
    }
}

impl Default for FixturesConfig {
    fn default() -> Self {
        Self {
            network: super::default_network(),
            accounts: BTreeMap::new(),
            assets: AssetFixtures::default(),
            apps: AppFixtures::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub prometheus_listen: Option<String>,
}
