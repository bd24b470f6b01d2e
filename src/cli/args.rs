use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::simulate::SimulationMode;
use crate::txn::Address;

#[derive(Parser, Debug)]
#[command(name = "jina", version, about = "jina 借贷协议的 Algorand 操作工具")]
pub struct Cli {
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "配置文件路径（默认查找 jina.toml 或 config/jina.toml）"
    )]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub submit: SubmitArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// 所有提交类命令共享的选项。
#[derive(Args, Debug, Clone, Default)]
pub struct SubmitArgs {
    #[arg(long, global = true, help = "广播前先模拟执行，请求与结果写入 dryrun 目录")]
    pub simulate: bool,
    #[arg(long, global = true, help = "模拟未通过则不广播（隐含 --simulate）")]
    pub enforce_simulation: bool,
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        help = "单个操作的墙钟截止时间（秒），覆盖配置中的 deadline_secs"
    )]
    pub timeout_secs: Option<u64>,
}

impl SubmitArgs {
    pub fn simulation_mode(&self) -> SimulationMode {
        if self.enforce_simulation {
            SimulationMode::Enforce
        } else if self.simulate {
            SimulationMode::Advisory
        } else {
            SimulationMode::Off
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 初始化配置模版文件
    Init(InitCmd),
    /// 部署 manager 合约并回写 app id
    Deploy(AccountArg),
    /// 用当前 TEAL 升级 manager
    Update(AccountArg),
    /// 由 manager 创建 liquidator、jina 与 jUSD
    Manage(AccountArg),
    /// 向 manager 登记子应用与资产
    Configure(ConfigureCmd),
    /// manager 发放 jUSD
    #[command(name = "send-jusd")]
    SendJusd(SendJusdCmd),
    /// 经 manager 升级子应用
    #[command(name = "child-update")]
    ChildUpdate(ChildUpdateCmd),
    /// opt-in 到 jina 应用
    Optin(AccountArg),
    /// 签发出借人委托凭证
    Delegate(AccountArg),
    /// 出借人登记可出借额度
    Earn(AccountArg),
    /// 抵押借款
    Borrow(BorrowCmd),
    /// 还款
    Repay(RepayCmd),
    /// 用 jUSD 赎回
    Claim(ClaimCmd),
    /// 把资产管理角色移交给合约
    #[command(name = "asset-config")]
    AssetConfig(AssetCmd),
    /// opt-in 资产
    #[command(name = "asset-optin")]
    AssetOptin(AssetCmd),
    /// 向应用地址注资
    Fund(FundCmd),
    /// 用发放凭证从储备账户转出资产
    Dispense(DispenseCmd),
}

impl Command {
    /// 是否需要连接节点。
    pub fn needs_node(&self) -> bool {
        !matches!(self, Command::Init(_))
    }
}

#[derive(Args, Debug)]
pub struct InitCmd {
    #[arg(long, value_name = "DIR", help = "可选输出目录（默认当前目录）")]
    pub output: Option<PathBuf>,
    #[arg(long, help = "若文件存在则覆盖")]
    pub force: bool,
    #[arg(long, help = "为模版中的账户生成新私钥")]
    pub generate_accounts: bool,
}

#[derive(Args, Debug, Clone)]
pub struct AccountArg {
    #[arg(
        long,
        value_name = "NAME",
        help = "签名账户在 [fixtures.accounts] 中的名称；缺省按命令选择 creator/lender/borrower"
    )]
    pub account: Option<String>,
}

impl AccountArg {
    pub fn or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.account.as_deref().unwrap_or(fallback)
    }
}

#[derive(Args, Debug)]
pub struct ConfigureCmd {
    #[command(flatten)]
    pub account: AccountArg,
    #[arg(long, help = "liquidator app id，缺省取配置")]
    pub liquidator: Option<u64>,
    #[arg(long, help = "jina app id，缺省取合约描述或配置")]
    pub jina: Option<u64>,
    #[arg(long, help = "jUSD 资产 id，缺省取配置")]
    pub jusd: Option<u64>,
}

#[derive(Args, Debug)]
pub struct SendJusdCmd {
    #[command(flatten)]
    pub account: AccountArg,
    #[arg(long, value_name = "ADDRESS", help = "接收 jUSD 的地址")]
    pub receiver: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChildTarget {
    Liquidator,
    Jina,
}

#[derive(Args, Debug)]
pub struct ChildUpdateCmd {
    #[command(flatten)]
    pub account: AccountArg,
    #[arg(long, value_enum)]
    pub child: ChildTarget,
}

#[derive(Args, Debug)]
pub struct BorrowCmd {
    #[command(flatten)]
    pub account: AccountArg,
    #[arg(long, value_delimiter = ',', help = "抵押物资产 id，逗号分隔")]
    pub collateral: Vec<u64>,
    #[arg(long, value_delimiter = ',', help = "各抵押物数量，逗号分隔")]
    pub collateral_amounts: Vec<u64>,
    #[arg(long, value_delimiter = ',', help = "向每位出借人借入的 USDC 数量，逗号分隔")]
    pub amounts: Vec<u64>,
    #[arg(
        long = "credential",
        value_name = "FILE",
        help = "出借人凭证文件，可重复，与 --amounts 一一对应；缺省使用配置中的 lender_credential"
    )]
    pub credentials: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RepayCmd {
    #[command(flatten)]
    pub account: AccountArg,
    #[arg(long, value_delimiter = ',', help = "抵押物资产 id，逗号分隔")]
    pub collateral: Vec<u64>,
    #[arg(long, value_delimiter = ',', help = "对应的还款数量，逗号分隔")]
    pub amounts: Vec<u64>,
}

#[derive(Args, Debug)]
pub struct ClaimCmd {
    #[command(flatten)]
    pub account: AccountArg,
    #[arg(long, help = "赎回的 jUSD 数量")]
    pub amount: u64,
}

#[derive(Args, Debug)]
pub struct AssetCmd {
    #[command(flatten)]
    pub account: AccountArg,
    #[arg(long, help = "资产 id")]
    pub asset: u64,
}

#[derive(Args, Debug)]
pub struct FundCmd {
    #[command(flatten)]
    pub account: AccountArg,
    #[arg(long, help = "目标 app id")]
    pub app: u64,
    #[arg(long, help = "转入的 microAlgos")]
    pub amount: u64,
}

#[derive(Args, Debug)]
pub struct DispenseCmd {
    #[arg(long, value_name = "ADDRESS", help = "接收地址")]
    pub recipient: Address,
    #[arg(long, help = "发放数量")]
    pub amount: u64,
}
