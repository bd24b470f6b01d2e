//! manager 合约的操作：部署、升级、创建子应用、配置与资产发放。

use tracing::info;

use super::{OperationContext, OperationError};
use crate::abi::{AbiValue, MethodArgValue, MethodCall, MethodResult};
use crate::group::GroupBuilder;
use crate::params::OperationKind;
use crate::signer::Authorization;
use crate::submit::Confirmation;
use crate::txn::{Address, StateSchema};

/// manager 合约的全局状态：6 个整数槽。
const MANAGER_GLOBAL_SCHEMA: StateSchema = StateSchema {
    num_byte_slices: 0,
    num_uints: 6,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub app_id: u64,
    pub confirmation: Confirmation,
}

/// `manage` 创建的子应用与资产。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedApps {
    pub liquidator: u64,
    pub jina: u64,
    pub jusd: u64,
}

impl ManagedApps {
    fn from_result(result: &MethodResult) -> Result<Self, OperationError> {
        let items = result
            .value
            .as_ref()
            .and_then(AbiValue::items)
            .filter(|items| items.len() == 3)
            .ok_or(OperationError::MissingOutcome {
                operation: "manage",
                field: "(liquidator, jina, jusd)",
            })?;
        let id = |index: usize| {
            items[index].as_u64().ok_or(OperationError::MissingOutcome {
                operation: "manage",
                field: "uint64 return",
            })
        };
        Ok(Self {
            liquidator: id(0)?,
            jina: id(1)?,
            jusd: id(2)?,
        })
    }
}

/// 子应用升级目标。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildApp {
    Liquidator,
    Jina,
}

impl ChildApp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildApp::Liquidator => "liquidator",
            ChildApp::Jina => "jina",
        }
    }
}

/// 创建 manager 应用并把新 app id 回写到描述文件。
pub async fn deploy(ctx: &OperationContext, creator: &str) -> Result<Deployment, OperationError> {
    let account = ctx.account(creator)?;
    let paths = &ctx.config.paths;
    let usdc = ctx.require_fixture(ctx.config.fixtures.assets.usdc, "assets.usdc")?;
    let descriptor = ctx.descriptor(&paths.manager_descriptor).await?;
    let method = descriptor.method("create")?;

    let approval = ctx.compile_program(&paths.manager_approval).await?;
    let clear = ctx.compile_program(&paths.manager_clear).await?;
    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::Create);

    let built = MethodCall::new(method, 0, account.address(), header)
        .arg(MethodArgValue::Asset(usdc))
        .create(approval, clear, MANAGER_GLOBAL_SCHEMA, StateSchema::default())
        .build()?;
    let confirmation = ctx
        .pipeline()
        .run(
            OperationKind::Create,
            GroupBuilder::new().push(built.call, Authorization::account(&account)),
        )
        .await?;

    let app_id = confirmation
        .application_index
        .filter(|id| *id != 0)
        .ok_or(OperationError::MissingOutcome {
            operation: "deploy",
            field: "application-index",
        })?;
    ctx.descriptors
        .record_app_id(&paths.manager_descriptor, ctx.network(), app_id)
        .await?;
    info!(target: "ops::manager", app_id, "manager 已部署");
    Ok(Deployment {
        app_id,
        confirmation,
    })
}

/// 用当前 TEAL 源码升级 manager。
pub async fn update(ctx: &OperationContext, creator: &str) -> Result<Confirmation, OperationError> {
    let account = ctx.account(creator)?;
    let paths = &ctx.config.paths;
    let descriptor = ctx.descriptor(&paths.manager_descriptor).await?;
    let method = descriptor.method("update")?;
    let app_id = ctx.resolve_app_id(&descriptor, ctx.config.fixtures.apps.manager, "apps.manager")?;

    let approval = ctx.compile_program(&paths.manager_approval).await?;
    let clear = ctx.compile_program(&paths.manager_clear).await?;
    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::Update);

    let built = MethodCall::new(method, app_id, account.address(), header)
        .update_programs(approval, clear)
        .build()?;
    ctx.pipeline()
        .run(
            OperationKind::Update,
            GroupBuilder::new().push(built.call, Authorization::account(&account)),
        )
        .await
}

/// 由 manager 创建 liquidator、jina 两个子应用与 jUSD 资产，并回写 jina 的 app id。
pub async fn manage(ctx: &OperationContext, creator: &str) -> Result<ManagedApps, OperationError> {
    let account = ctx.account(creator)?;
    let paths = &ctx.config.paths;
    let usdc = ctx.require_fixture(ctx.config.fixtures.assets.usdc, "assets.usdc")?;
    let descriptor = ctx.descriptor(&paths.manager_descriptor).await?;
    let method = descriptor.method("manage")?;
    let app_id = ctx.resolve_app_id(&descriptor, ctx.config.fixtures.apps.manager, "apps.manager")?;

    let liquidator_approval = ctx.compile_program(&paths.liquidator_approval).await?;
    let liquidator_clear = ctx.compile_program(&paths.liquidator_clear).await?;
    let jina_approval = ctx.compile_program(&paths.jina_approval).await?;
    let jina_clear = ctx.compile_program(&paths.jina_clear).await?;
    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::Manage);

    let built = MethodCall::new(method, app_id, account.address(), header)
        .arg(MethodArgValue::Asset(usdc))
        .arg(AbiValue::Bytes(liquidator_approval))
        .arg(AbiValue::Bytes(liquidator_clear))
        .arg(AbiValue::Bytes(jina_approval))
        .arg(AbiValue::Bytes(jina_clear))
        .build()?;
    let (_, result) = ctx
        .pipeline()
        .run_method(
            OperationKind::Manage,
            method,
            GroupBuilder::new().push(built.call, Authorization::account(&account)),
        )
        .await?;

    let apps = ManagedApps::from_result(&result)?;
    ctx.descriptors
        .record_app_id(&paths.jina_descriptor, ctx.network(), apps.jina)
        .await?;
    info!(
        target: "ops::manager",
        liquidator = apps.liquidator,
        jina = apps.jina,
        jusd = apps.jusd,
        "子应用已创建"
    );
    Ok(apps)
}

/// 把子应用与资产登记到 manager。
pub async fn configure(
    ctx: &OperationContext,
    creator: &str,
    apps: ManagedApps,
) -> Result<Confirmation, OperationError> {
    let account = ctx.account(creator)?;
    let usdc = ctx.require_fixture(ctx.config.fixtures.assets.usdc, "assets.usdc")?;
    let descriptor = ctx.descriptor(&ctx.config.paths.manager_descriptor).await?;
    let method = descriptor.method("config")?;
    let app_id = ctx.resolve_app_id(&descriptor, ctx.config.fixtures.apps.manager, "apps.manager")?;

    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::Configure);
    let built = MethodCall::new(method, app_id, account.address(), header)
        .arg(MethodArgValue::Application(apps.liquidator))
        .arg(MethodArgValue::Application(apps.jina))
        .arg(MethodArgValue::Asset(usdc))
        .arg(MethodArgValue::Asset(apps.jusd))
        .build()?;
    ctx.pipeline()
        .run(
            OperationKind::Configure,
            GroupBuilder::new().push(built.call, Authorization::account(&account)),
        )
        .await
}

/// manager 向 `receiver` 发放 jUSD。
pub async fn send_jusd(
    ctx: &OperationContext,
    creator: &str,
    receiver: Address,
) -> Result<Confirmation, OperationError> {
    let account = ctx.account(creator)?;
    let jusd = ctx.require_fixture(ctx.config.fixtures.assets.jusd, "assets.jusd")?;
    let descriptor = ctx.descriptor(&ctx.config.paths.manager_descriptor).await?;
    let method = descriptor.method("send_jusd")?;
    let app_id = ctx.resolve_app_id(&descriptor, ctx.config.fixtures.apps.manager, "apps.manager")?;

    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::SendJusd);
    let built = MethodCall::new(method, app_id, account.address(), header)
        .arg(MethodArgValue::Account(receiver))
        .arg(MethodArgValue::Asset(jusd))
        .build()?;
    ctx.pipeline()
        .run(
            OperationKind::SendJusd,
            GroupBuilder::new().push(built.call, Authorization::account(&account)),
        )
        .await
}

/// 经 manager 升级子应用的程序。
pub async fn child_update(
    ctx: &OperationContext,
    creator: &str,
    child: ChildApp,
) -> Result<Confirmation, OperationError> {
    let account = ctx.account(creator)?;
    let paths = &ctx.config.paths;
    let descriptor = ctx.descriptor(&paths.manager_descriptor).await?;
    let method = descriptor.method("child_update")?;
    let app_id = ctx.resolve_app_id(&descriptor, ctx.config.fixtures.apps.manager, "apps.manager")?;

    let (child_id, approval_path, clear_path) = match child {
        ChildApp::Liquidator => (
            ctx.require_fixture(ctx.config.fixtures.apps.liquidator, "apps.liquidator")?,
            &paths.liquidator_approval,
            &paths.liquidator_clear,
        ),
        ChildApp::Jina => {
            let jina = ctx.descriptor(&paths.jina_descriptor).await?;
            (
                ctx.resolve_app_id(&jina, ctx.config.fixtures.apps.jina, "apps.jina")?,
                &paths.jina_approval,
                &paths.jina_clear,
            )
        }
    };
    let approval = ctx.compile_program(approval_path).await?;
    let clear = ctx.compile_program(clear_path).await?;

    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::ChildUpdate);
    let built = MethodCall::new(method, app_id, account.address(), header)
        .arg(MethodArgValue::Application(child_id))
        .arg(AbiValue::Bytes(approval))
        .arg(AbiValue::Bytes(clear))
        .build()?;
    info!(target: "ops::manager", child = child.as_str(), child_id, "升级子应用");
    ctx.pipeline()
        .run(
            OperationKind::ChildUpdate,
            GroupBuilder::new().push(built.call, Authorization::account(&account)),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{ContractDescriptor, RETURN_PREFIX};
    use crate::algod::PendingTransaction;
    use crate::ops::testing::*;

    fn manage_return_log(liquidator: u64, jina: u64, jusd: u64) -> String {
        use base64::Engine;
        let mut log = RETURN_PREFIX.to_vec();
        for id in [liquidator, jina, jusd] {
            log.extend_from_slice(&id.to_be_bytes());
        }
        base64::engine::general_purpose::STANDARD.encode(log)
    }

    fn sent_call(h: &Harness) -> Vec<u8> {
        h.mock.sent_payloads().pop().expect("payload")
    }

    #[tokio::test]
    async fn deploy_backfills_descriptor() {
        let h = harness();
        h.mock.push_pending(PendingTransaction {
            confirmed_round: Some(1_001),
            application_index: Some(77),
            ..PendingTransaction::default()
        });
        let deployment = deploy(&h.ctx, "creator").await.expect("deploy");
        assert_eq!(deployment.app_id, 77);

        let on_disk = ContractDescriptor::from_json(
            &std::fs::read_to_string(path(&h, "abi/manager.json")).expect("read"),
        )
        .expect("parse");
        assert_eq!(on_disk.app_id("default").expect("network"), 77);

        // 后续操作读取到新 id
        let reloaded = h.ctx.descriptor(&h.ctx.config.paths.manager_descriptor).await.expect("load");
        assert_eq!(h.ctx.resolve_app_id(&reloaded, 0, "apps.manager").expect("id"), 77);
        assert!(!sent_call(&h).is_empty());
    }

    #[tokio::test]
    async fn deploy_without_app_index_is_internal() {
        let h = harness();
        h.mock.confirm_next(1_001);
        let err = deploy(&h.ctx, "creator").await.expect_err("missing index");
        assert!(matches!(err, OperationError::MissingOutcome { .. }));
    }

    #[tokio::test]
    async fn manage_decodes_created_ids() {
        let h = harness();
        h.mock.push_pending(PendingTransaction {
            confirmed_round: Some(1_002),
            logs: vec![manage_return_log(54, 56, 57)],
            ..PendingTransaction::default()
        });
        let apps = manage(&h.ctx, "creator").await.expect("manage");
        assert_eq!(
            apps,
            ManagedApps {
                liquidator: 54,
                jina: 56,
                jusd: 57
            }
        );
        let jina = ContractDescriptor::from_json(
            &std::fs::read_to_string(path(&h, "abi/jina.json")).expect("read"),
        )
        .expect("parse");
        assert_eq!(jina.app_id("default").expect("network"), 56);
    }

    #[tokio::test]
    async fn manage_fee_covers_inner_creations() {
        let h = harness();
        h.mock.push_pending(PendingTransaction {
            confirmed_round: Some(1_002),
            logs: vec![manage_return_log(1, 2, 3)],
            ..PendingTransaction::default()
        });
        manage(&h.ctx, "creator").await.expect("manage");
        // min_fee 1000 × k 5 = 5000 = 0xcd 0x13 0x88
        let payload = sent_call(&h);
        let needle = [b'f', b'e', b'e', 0xcd, 0x13, 0x88];
        assert!(payload.windows(needle.len()).any(|w| w == needle));
    }

    #[tokio::test]
    async fn unknown_method_is_recoverable_and_offline() {
        let h = harness();
        let descriptor = h.ctx.descriptor(&h.ctx.config.paths.manager_descriptor).await.expect("load");
        let err = descriptor.method("liquidate").map_err(OperationError::from).expect_err("missing");
        assert_eq!(err.class(), crate::ops::ErrorClass::Input);
        assert!(h.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn update_sets_update_application() {
        let h = harness();
        h.mock.confirm_next(1_001);
        update(&h.ctx, "creator").await.expect("update");
        // apan = UpdateApplication
        let payload = sent_call(&h);
        let needle = [b'a', b'p', b'a', b'n', 0x04];
        assert!(payload.windows(needle.len()).any(|w| w == needle));
    }

    #[tokio::test]
    async fn configure_places_references() {
        let h = harness();
        h.mock.confirm_next(1_003);
        let apps = ManagedApps {
            liquidator: 54,
            jina: 56,
            jusd: 57,
        };
        let confirmation = configure(&h.ctx, "creator", apps).await.expect("configure");
        assert_eq!(confirmation.confirmed_round, 1_003);
        let payload = sent_call(&h);
        // apfa = [54, 56]
        let needle = [b'a', b'p', b'f', b'a', 0x92, 54, 56];
        assert!(payload.windows(needle.len()).any(|w| w == needle));
    }

    #[tokio::test]
    async fn child_update_targets_liquidator() {
        let h = harness();
        h.mock.confirm_next(1_004);
        child_update(&h.ctx, "creator", ChildApp::Liquidator)
            .await
            .expect("child update");
        assert_eq!(
            h.mock.calls().iter().filter(|c| c.as_str() == "compile").count(),
            2
        );
    }

    #[tokio::test]
    async fn send_jusd_requires_fixture() {
        let mut h = harness();
        let mut config = (*h.ctx.config).clone();
        config.fixtures.assets.jusd = 0;
        h.ctx.config = std::sync::Arc::new(config);
        let err = send_jusd(&h.ctx, "creator", Address([1u8; 32]))
            .await
            .expect_err("missing jusd");
        assert!(matches!(err, OperationError::MissingFixture("assets.jusd")));
        assert!(h.mock.calls().is_empty());
    }
}
