//! 资产与账户层面的辅助操作。

use std::sync::Arc;

use tracing::info;

use super::{OperationContext, OperationError};
use crate::group::GroupBuilder;
use crate::params::OperationKind;
use crate::signer::{Authorization, DelegatedCredential};
use crate::submit::Confirmation;
use crate::txn::{Address, AssetParams, Transaction};

/// 把资产的管理角色移交给合约：manager/reserve/freeze 归 jina，clawback 归 liquidator。
pub async fn asset_config(
    ctx: &OperationContext,
    creator: &str,
    asset_id: u64,
) -> Result<Confirmation, OperationError> {
    let account = ctx.account(creator)?;
    let jina = ctx.descriptor(&ctx.config.paths.jina_descriptor).await?;
    let jina_id = ctx.resolve_app_id(&jina, ctx.config.fixtures.apps.jina, "apps.jina")?;
    let liquidator =
        ctx.require_fixture(ctx.config.fixtures.apps.liquidator, "apps.liquidator")?;

    let jina_address = Address::for_application(jina_id);
    let params = AssetParams {
        manager: jina_address,
        reserve: jina_address,
        freeze: jina_address,
        clawback: Address::for_application(liquidator),
        ..AssetParams::default()
    };
    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::AssetConfig);
    let txn = Transaction::asset_config(account.address(), asset_id, params, &header);
    info!(
        target: "ops::assets",
        asset_id,
        manager = %jina_address,
        clawback_app = liquidator,
        "移交资产管理角色"
    );
    ctx.pipeline()
        .run(
            OperationKind::AssetConfig,
            GroupBuilder::new().push(txn, Authorization::account(&account)),
        )
        .await
}

pub async fn asset_opt_in(
    ctx: &OperationContext,
    holder: &str,
    asset_id: u64,
) -> Result<Confirmation, OperationError> {
    let account = ctx.account(holder)?;
    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::AssetOptIn);
    let txn = Transaction::asset_opt_in(account.address(), asset_id, &header);
    ctx.pipeline()
        .run(
            OperationKind::AssetOptIn,
            GroupBuilder::new().push(txn, Authorization::account(&account)),
        )
        .await
}

/// 向应用地址转入 microAlgos，供内部交易支付手续费与最低余额。
pub async fn fund(
    ctx: &OperationContext,
    funder: &str,
    app_id: u64,
    amount: u64,
) -> Result<Confirmation, OperationError> {
    if app_id == 0 {
        return Err(OperationError::InvalidInput("不能向 app id 0 注资".into()));
    }
    let account = ctx.account(funder)?;
    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::Fund);
    let txn = Transaction::payment(
        account.address(),
        Address::for_application(app_id),
        amount,
        &header,
    );
    ctx.pipeline()
        .run(
            OperationKind::Fund,
            GroupBuilder::new().push(txn, Authorization::account(&account)),
        )
        .await
}

/// 用发放凭证从储备账户向 `recipient` 转出资产，单笔独立交易。
pub async fn dispense(
    ctx: &OperationContext,
    recipient: Address,
    amount: u64,
) -> Result<Confirmation, OperationError> {
    let credential =
        Arc::new(DelegatedCredential::load(&ctx.config.paths.dispenser_credential).await?);
    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::Dispense);
    let txn = Transaction::asset_transfer(
        credential.delegator,
        recipient,
        credential.terms.asset_id,
        amount,
        &header,
    );
    info!(
        target: "ops::assets",
        reserve = %credential.delegator,
        recipient = %recipient,
        asset_id = credential.terms.asset_id,
        amount,
        "发放资产"
    );
    ctx.pipeline()
        .run(
            OperationKind::Dispense,
            GroupBuilder::new().push(txn, Authorization::delegated(&credential)),
        )
        .await
}
