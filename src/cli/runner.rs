use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, anyhow};
use tracing::{error, info};

use crate::cli::args::{BorrowCmd, ChildTarget, Cli, Command, ConfigureCmd};
use crate::cli::context::{
    build_algod_client, build_operation_context, init_configs, install_cancel_on_ctrl_c,
};
use crate::config::HarnessConfig;
use crate::ops::jina::{BorrowRequest, Loan};
use crate::ops::manager::{ChildApp, ManagedApps};
use crate::ops::{OperationContext, OperationError, assets, jina, manager};
use crate::signer::DelegatedCredential;
use crate::submit::Confirmation;

pub async fn run(cli: Cli, config: HarnessConfig) -> Result<()> {
    if !cli.command.needs_node() {
        if let Command::Init(args) = cli.command {
            init_configs(args)?;
        }
        return Ok(());
    }

    if let Some(listen) = config.monitoring.prometheus_listen.as_deref() {
        crate::monitoring::try_init_prometheus(listen)?;
    }

    let client = build_algod_client(&config.node)?;
    let cancel = install_cancel_on_ctrl_c();
    let ctx = build_operation_context(client, config, &cli.submit, cancel);

    let started = Instant::now();
    let outcome = dispatch(&ctx, cli.command).await;
    match outcome {
        Ok(()) => Ok(()),
        Err(err) => {
            error!(
                target: "cli",
                class = err.class().as_str(),
                retryable = err.is_retryable(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %err,
                "操作失败"
            );
            Err(anyhow!(err))
        }
    }
}

async fn dispatch(ctx: &OperationContext, command: Command) -> Result<(), OperationError> {
    match command {
        Command::Init(_) => Ok(()),
        Command::Deploy(args) => {
            let deployment = manager::deploy(ctx, args.or("creator")).await?;
            println!("manager app id: {}", deployment.app_id);
            report(&deployment.confirmation);
            Ok(())
        }
        Command::Update(args) => {
            report(&manager::update(ctx, args.or("creator")).await?);
            Ok(())
        }
        Command::Manage(args) => {
            let apps = manager::manage(ctx, args.or("creator")).await?;
            println!(
                "liquidator: {}  jina: {}  jUSD: {}",
                apps.liquidator, apps.jina, apps.jusd
            );
            Ok(())
        }
        Command::Configure(cmd) => {
            let apps = resolve_managed_apps(ctx, &cmd).await?;
            report(&manager::configure(ctx, cmd.account.or("creator"), apps).await?);
            Ok(())
        }
        Command::SendJusd(cmd) => {
            report(&manager::send_jusd(ctx, cmd.account.or("creator"), cmd.receiver).await?);
            Ok(())
        }
        Command::ChildUpdate(cmd) => {
            let child = match cmd.child {
                ChildTarget::Liquidator => ChildApp::Liquidator,
                ChildTarget::Jina => ChildApp::Jina,
            };
            report(&manager::child_update(ctx, cmd.account.or("creator"), child).await?);
            Ok(())
        }
        Command::Optin(args) => {
            report(&jina::optin(ctx, args.or("borrower")).await?);
            Ok(())
        }
        Command::Delegate(args) => {
            let credential = jina::delegate_lender(ctx, args.or("lender")).await?;
            println!(
                "凭证已写入 {}（委托人 {}，到期轮次 {:?}）",
                ctx.config.paths.lender_credential.display(),
                credential.delegator,
                credential.terms.expiry_round
            );
            Ok(())
        }
        Command::Earn(args) => {
            report(&jina::earn(ctx, args.or("lender")).await?);
            Ok(())
        }
        Command::Borrow(cmd) => {
            let request = borrow_request(ctx, &cmd).await?;
            report(&jina::borrow(ctx, cmd.account.or("borrower"), &request).await?);
            Ok(())
        }
        Command::Repay(cmd) => {
            report(
                &jina::repay(ctx, cmd.account.or("borrower"), &cmd.collateral, &cmd.amounts)
                    .await?,
            );
            Ok(())
        }
        Command::Claim(cmd) => {
            report(&jina::claim(ctx, cmd.account.or("borrower"), cmd.amount).await?);
            Ok(())
        }
        Command::AssetConfig(cmd) => {
            report(&assets::asset_config(ctx, cmd.account.or("creator"), cmd.asset).await?);
            Ok(())
        }
        Command::AssetOptin(cmd) => {
            report(&assets::asset_opt_in(ctx, cmd.account.or("borrower"), cmd.asset).await?);
            Ok(())
        }
        Command::Fund(cmd) => {
            report(&assets::fund(ctx, cmd.account.or("creator"), cmd.app, cmd.amount).await?);
            Ok(())
        }
        Command::Dispense(cmd) => {
            report(&assets::dispense(ctx, cmd.recipient, cmd.amount).await?);
            Ok(())
        }
    }
}

fn report(confirmation: &Confirmation) {
    info!(
        target: "cli",
        tx_id = %confirmation.tx_id,
        round = confirmation.confirmed_round,
        members = confirmation.tx_ids.len(),
        "已确认"
    );
    println!(
        "{} 已在第 {} 轮确认",
        confirmation.tx_id, confirmation.confirmed_round
    );
    if let Some(app_id) = confirmation.application_index {
        println!("application index: {app_id}");
    }
    if let Some(asset_id) = confirmation.asset_index {
        println!("asset index: {asset_id}");
    }
}

/// 命令行未给出的 id 依次取合约描述与配置。
async fn resolve_managed_apps(
    ctx: &OperationContext,
    cmd: &ConfigureCmd,
) -> Result<ManagedApps, OperationError> {
    let fixtures = &ctx.config.fixtures;
    let jina = match cmd.jina {
        Some(id) => id,
        None => {
            let descriptor = ctx.descriptor(&ctx.config.paths.jina_descriptor).await?;
            ctx.resolve_app_id(&descriptor, fixtures.apps.jina, "apps.jina")?
        }
    };
    Ok(ManagedApps {
        liquidator: ctx.require_fixture(
            cmd.liquidator.unwrap_or(fixtures.apps.liquidator),
            "apps.liquidator",
        )?,
        jina,
        jusd: ctx.require_fixture(cmd.jusd.unwrap_or(fixtures.assets.jusd), "assets.jusd")?,
    })
}

async fn borrow_request(
    ctx: &OperationContext,
    cmd: &BorrowCmd,
) -> Result<BorrowRequest, OperationError> {
    let paths = if cmd.credentials.is_empty() {
        vec![ctx.config.paths.lender_credential.clone(); cmd.amounts.len().min(1)]
    } else {
        cmd.credentials.clone()
    };
    if paths.len() != cmd.amounts.len() {
        return Err(OperationError::InvalidInput(format!(
            "凭证数量 {} 与借款数量 {} 不一致",
            paths.len(),
            cmd.amounts.len()
        )));
    }

    let mut loans = Vec::with_capacity(paths.len());
    for (path, amount) in paths.iter().zip(&cmd.amounts) {
        let credential = DelegatedCredential::load(path).await?;
        loans.push(Loan {
            credential: Arc::new(credential),
            amount: *amount,
        });
    }
    Ok(BorrowRequest {
        collateral_ids: cmd.collateral.clone(),
        collateral_amounts: cmd.collateral_amounts.clone(),
        loans,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::AccountArg;
    use crate::ops::testing::*;

    #[tokio::test]
    async fn configure_ids_fall_back_to_descriptor_and_fixtures() {
        let h = harness();
        let cmd = ConfigureCmd {
            account: AccountArg { account: None },
            liquidator: None,
            jina: None,
            jusd: None,
        };
        let apps = resolve_managed_apps(&h.ctx, &cmd).await.expect("apps");
        assert_eq!(
            apps,
            ManagedApps {
                liquidator: 54,
                jina: 55,
                jusd: JUSD
            }
        );
    }

    #[tokio::test]
    async fn borrow_request_pairs_credentials_with_amounts() {
        let h = harness();
        jina::delegate_lender(&h.ctx, "lender").await.expect("delegate");
        let cmd = BorrowCmd {
            account: AccountArg { account: None },
            collateral: vec![86],
            collateral_amounts: vec![1],
            amounts: vec![1_000],
            credentials: Vec::new(),
        };
        let request = borrow_request(&h.ctx, &cmd).await.expect("request");
        assert_eq!(request.loans.len(), 1);
        assert_eq!(request.loans[0].amount, 1_000);

        let uneven = BorrowCmd {
            amounts: vec![1, 2],
            ..cmd
        };
        let err = borrow_request(&h.ctx, &uneven).await.expect_err("uneven");
        assert!(matches!(err, OperationError::InvalidInput(_)));
    }
}
