//! 顶层操作：每个操作按 描述 → 参数 → 组装 → 签名 → 模拟 → 提交 走一遍流水线。

pub mod assets;
mod error;
pub mod jina;
pub mod manager;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use error::{ErrorClass, OperationError};

use crate::abi::{AbiValue, ContractDescriptor, DescriptorStore, Method, MethodResult};
use crate::algod::{AlgodClient, SuggestedParams};
use crate::config::HarnessConfig;
use crate::group::GroupBuilder;
use crate::monitoring::events;
use crate::params::{OperationKind, ParamsBuilder};
use crate::signer::{Account, sign_group};
use crate::simulate::{DumpPaths, SimulationGateway, SimulationMode};
use crate::submit::{Confirmation, Submitter};
use crate::txn::TxnHeader;

/// 一次操作所需的全部依赖，显式传入，不依赖全局状态。
pub struct OperationContext {
    pub client: Arc<dyn AlgodClient>,
    pub config: Arc<HarnessConfig>,
    pub descriptors: Arc<DescriptorStore>,
    pub simulation: SimulationMode,
    pub cancel: CancellationToken,
    pub timeout: Option<Duration>,
}

impl OperationContext {
    pub fn new(client: Arc<dyn AlgodClient>, config: Arc<HarnessConfig>) -> Self {
        let timeout = config.confirmation.deadline_secs.map(Duration::from_secs);
        Self {
            client,
            config,
            descriptors: Arc::new(DescriptorStore::new()),
            simulation: SimulationMode::Off,
            cancel: CancellationToken::new(),
            timeout,
        }
    }

    pub fn with_simulation(mut self, mode: SimulationMode) -> Self {
        self.simulation = mode;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        if timeout.is_some() {
            self.timeout = timeout;
        }
        self
    }

    pub fn network(&self) -> &str {
        &self.config.fixtures.network
    }

    /// 按名称取配置中的账户。
    pub fn account(&self, name: &str) -> Result<Arc<Account>, OperationError> {
        let secret = self
            .config
            .fixtures
            .accounts
            .get(name)
            .ok_or_else(|| OperationError::MissingAccount(name.to_string()))?;
        Ok(Arc::new(Account::from_secret_str(secret)?))
    }

    pub async fn suggested_params(&self) -> Result<SuggestedParams, OperationError> {
        Ok(self.client.suggested_params().await?)
    }

    /// 主调用的交易头：`min_fee × k`。k 已计入同组被代付的成员，见 `FeeConfig`。
    pub fn call_header(&self, suggested: &SuggestedParams, kind: OperationKind) -> TxnHeader {
        ParamsBuilder::new(suggested)
            .for_operation(kind, &self.config.fees)
            .build()
    }

    pub fn pooled_header(&self, suggested: &SuggestedParams) -> TxnHeader {
        ParamsBuilder::new(suggested).pooled().build()
    }

    pub async fn descriptor(&self, path: &Path) -> Result<Arc<ContractDescriptor>, OperationError> {
        Ok(self.descriptors.load(path).await?)
    }

    /// 描述中登记的 app id 优先，其次取配置中的固定值。
    pub fn resolve_app_id(
        &self,
        descriptor: &ContractDescriptor,
        fixture: u64,
        name: &'static str,
    ) -> Result<u64, OperationError> {
        match descriptor.app_id(self.network()) {
            Ok(app_id) if app_id != 0 => Ok(app_id),
            _ if fixture != 0 => Ok(fixture),
            Ok(_) => Err(OperationError::MissingFixture(name)),
            Err(err) => Err(err.into()),
        }
    }

    /// 配置中的资产或应用 id，0 视为未配置。
    pub fn require_fixture(&self, id: u64, name: &'static str) -> Result<u64, OperationError> {
        if id == 0 {
            return Err(OperationError::MissingFixture(name));
        }
        Ok(id)
    }

    pub fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            ctx: self,
            gateway: SimulationGateway::new(self.client.clone(), self.simulation),
            submitter: Submitter::new(self.client.clone(), &self.config.confirmation)
                .with_timeout(self.timeout),
        }
    }

    /// 读取 TEAL 源码并经节点编译为字节码。
    pub async fn compile_program(&self, path: &Path) -> Result<Vec<u8>, OperationError> {
        let source = tokio::fs::read(path)
            .await
            .map_err(|source| OperationError::Program {
                path: path.to_path_buf(),
                source,
            })?;
        let compiled = self.client.compile(&source).await?;
        let program = compiled.bytes()?;
        debug!(
            target: "ops::compile",
            path = %path.display(),
            hash = %compiled.hash,
            bytes = program.len(),
            "程序已编译"
        );
        Ok(program)
    }
}

/// 单次流水线：组装、签名、可选模拟、提交并等待确认。
pub struct Pipeline<'a> {
    ctx: &'a OperationContext,
    gateway: SimulationGateway,
    submitter: Submitter,
}

impl Pipeline<'_> {
    pub async fn run(
        &self,
        kind: OperationKind,
        group: GroupBuilder,
    ) -> Result<Confirmation, OperationError> {
        let started = Instant::now();
        let result = self.execute(kind, group).await;
        let outcome = match &result {
            Ok(_) => "confirmed",
            Err(err) => err.class().as_str(),
        };
        events::operation_finished(kind.as_str(), outcome, started.elapsed());
        result
    }

    async fn execute(
        &self,
        kind: OperationKind,
        group: GroupBuilder,
    ) -> Result<Confirmation, OperationError> {
        let assembled = group.build()?;
        let signed = sign_group(&assembled)?;
        debug!(
            target: "ops::pipeline",
            operation = kind.as_str(),
            members = signed.len(),
            group_id = ?signed.group_id(),
            "交易组已签名"
        );

        let dump = DumpPaths::in_dir(&self.ctx.config.paths.dryrun_dir, kind.as_str());
        self.gateway
            .simulate(kind.as_str(), &signed, Some(&dump))
            .await?;

        let confirmation = self
            .submitter
            .submit(kind.as_str(), &signed, &self.ctx.cancel)
            .await?;
        info!(
            target: "ops::pipeline",
            operation = kind.as_str(),
            tx_id = %confirmation.tx_id,
            round = confirmation.confirmed_round,
            "操作完成"
        );
        Ok(confirmation)
    }

    /// 运行后按方法签名解码返回值。
    pub async fn run_method(
        &self,
        kind: OperationKind,
        method: &Method,
        group: GroupBuilder,
    ) -> Result<(Confirmation, MethodResult), OperationError> {
        let confirmation = self.run(kind, group).await?;
        let result = MethodResult::from_logs(
            method,
            confirmation.tx_id.clone(),
            confirmation.confirmed_round,
            &confirmation.logs,
        )?;
        Ok((confirmation, result))
    }
}

pub(crate) fn uint_array(values: &[u64]) -> AbiValue {
    AbiValue::Array(values.iter().copied().map(AbiValue::from).collect())
}
