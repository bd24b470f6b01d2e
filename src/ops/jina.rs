//! jina 借贷合约的操作。

use std::sync::Arc;

use tracing::{debug, info};

use super::{OperationContext, OperationError, uint_array};
use crate::abi::{AbiValue, ContractDescriptor, MethodArgValue, MethodCall};
use crate::codec::{DelegationTerms, TermsLayout};
use crate::group::GroupBuilder;
use crate::monitoring::events;
use crate::params::{OperationKind, ParamsBuilder};
use crate::signer::{Authorization, DelegatedCredential};
use crate::submit::Confirmation;
use crate::txn::{Address, OnCompletion, Transaction};

/// 一笔由出借人委托凭证代签的 USDC 放款。
#[derive(Debug, Clone)]
pub struct Loan {
    pub credential: Arc<DelegatedCredential>,
    pub amount: u64,
}

#[derive(Debug, Clone, Default)]
pub struct BorrowRequest {
    /// 抵押物资产 id 与数量，一一对应。
    pub collateral_ids: Vec<u64>,
    pub collateral_amounts: Vec<u64>,
    pub loans: Vec<Loan>,
}

impl BorrowRequest {
    fn check(&self) -> Result<(), OperationError> {
        if self.loans.is_empty() {
            return Err(OperationError::InvalidInput("借款至少需要一位出借人".into()));
        }
        if self.collateral_ids.len() != self.collateral_amounts.len() {
            return Err(OperationError::InvalidInput(format!(
                "抵押物 id 数量 {} 与抵押数量 {} 不一致",
                self.collateral_ids.len(),
                self.collateral_amounts.len()
            )));
        }
        Ok(())
    }
}

async fn jina_app(
    ctx: &OperationContext,
) -> Result<(Arc<ContractDescriptor>, u64), OperationError> {
    let descriptor = ctx.descriptor(&ctx.config.paths.jina_descriptor).await?;
    let app_id = ctx.resolve_app_id(&descriptor, ctx.config.fixtures.apps.jina, "apps.jina")?;
    Ok((descriptor, app_id))
}

/// 读取已落盘的出借人委托凭证（加载时校验签名）。
pub async fn load_lender_credential(
    ctx: &OperationContext,
) -> Result<Arc<DelegatedCredential>, OperationError> {
    let credential = DelegatedCredential::load(&ctx.config.paths.lender_credential).await?;
    Ok(Arc::new(credential))
}

/// 用户 opt-in 到 jina 应用。
pub async fn optin(ctx: &OperationContext, user: &str) -> Result<Confirmation, OperationError> {
    let account = ctx.account(user)?;
    let (descriptor, app_id) = jina_app(ctx).await?;
    let method = descriptor.method("optin")?;
    let manager = ctx.descriptor(&ctx.config.paths.manager_descriptor).await?;
    let manager_id =
        ctx.resolve_app_id(&manager, ctx.config.fixtures.apps.manager, "apps.manager")?;

    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::OptIn);
    let built = MethodCall::new(method, app_id, account.address(), header)
        .on_completion(OnCompletion::OptIn)
        .arg(MethodArgValue::Application(manager_id))
        .build()?;
    ctx.pipeline()
        .run(
            OperationKind::OptIn,
            GroupBuilder::new().push(built.call, Authorization::account(&account)),
        )
        .await
}

/// 签发出借人委托凭证：限定 USDC、单笔上限、到期轮次与 jina 应用，并写入凭证文件。
pub async fn delegate_lender(
    ctx: &OperationContext,
    lender: &str,
) -> Result<Arc<DelegatedCredential>, OperationError> {
    let account = ctx.account(lender)?;
    let usdc = ctx.require_fixture(ctx.config.fixtures.assets.usdc, "assets.usdc")?;
    let (_, app_id) = jina_app(ctx).await?;
    let delegation = &ctx.config.delegation;

    let suggested = ctx.suggested_params().await?;
    let expiry = ParamsBuilder::new(&suggested)
        .with_expiry_offset(delegation.lifespan_rounds)
        .expiry_round()
        .ok_or(OperationError::MissingOutcome {
            operation: "delegate",
            field: "expiry_round",
        })?;
    let terms = DelegationTerms::lender(usdc, delegation.lender_max_amount, expiry, app_id);

    let program = ctx.compile_program(&ctx.config.paths.lender_program).await?;
    let credential = DelegatedCredential::delegate(&account, program, terms, TermsLayout::Lender)?;
    credential.save(&ctx.config.paths.lender_credential).await?;
    events::delegation_issued(TermsLayout::Lender, terms.expiry_round);
    info!(
        target: "ops::jina",
        lender = %credential.delegator,
        expiry,
        max_amount = terms.max_amount,
        path = %ctx.config.paths.lender_credential.display(),
        "出借人凭证已保存"
    );
    Ok(Arc::new(credential))
}

/// 出借人向 jina 登记可出借资产、额度、到期轮次与凭证标签。
pub async fn earn(ctx: &OperationContext, lender: &str) -> Result<Confirmation, OperationError> {
    let account = ctx.account(lender)?;
    let lft = ctx.require_fixture(ctx.config.fixtures.assets.lft, "assets.lft")?;
    let jusd = ctx.require_fixture(ctx.config.fixtures.assets.jusd, "assets.jusd")?;
    let credential = load_lender_credential(ctx).await?;
    if credential.delegator != account.address() {
        return Err(OperationError::InvalidInput(format!(
            "凭证委托人 {} 不是 {lender}",
            credential.delegator
        )));
    }
    let expiry = credential.terms.expiry_round.ok_or_else(|| {
        OperationError::InvalidInput("出借人凭证未绑定到期轮次".into())
    })?;

    let (descriptor, app_id) = jina_app(ctx).await?;
    let method = descriptor.method("earn")?;
    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::Earn);
    let built = MethodCall::new(method, app_id, account.address(), header)
        .arg(uint_array(&[lft, jusd]))
        .arg(credential.terms.max_amount)
        .arg(expiry)
        .arg(AbiValue::Bytes(credential.program_tag().to_vec()))
        .build()?;
    ctx.pipeline()
        .run(
            OperationKind::Earn,
            GroupBuilder::new().push(built.call, Authorization::account(&account)),
        )
        .await
}

/// 借款：主调用在前，随后每位出借人一笔委托代签的 USDC 转账，手续费由主调用代付。
pub async fn borrow(
    ctx: &OperationContext,
    borrower: &str,
    request: &BorrowRequest,
) -> Result<Confirmation, OperationError> {
    request.check()?;
    let account = ctx.account(borrower)?;
    let usdc = ctx.require_fixture(ctx.config.fixtures.assets.usdc, "assets.usdc")?;
    let (descriptor, app_id) = jina_app(ctx).await?;
    let method = descriptor.method("borrow")?;

    let lenders: Vec<Address> = request
        .loans
        .iter()
        .map(|loan| loan.credential.delegator)
        .collect();
    let amounts: Vec<u64> = request.loans.iter().map(|loan| loan.amount).collect();

    let suggested = ctx.suggested_params().await?;
    let pooled = ctx.pooled_header(&suggested);
    let header = ctx.call_header(&suggested, OperationKind::Borrow);
    let built = MethodCall::new(method, app_id, account.address(), header)
        .arg(uint_array(&request.collateral_ids))
        .arg(uint_array(&request.collateral_amounts))
        .arg(uint_array(&amounts))
        .with_accounts(&lenders)
        .with_foreign_assets(&[usdc])
        .with_foreign_assets(&request.collateral_ids)
        .build()?;

    let mut group = GroupBuilder::new().push(built.call, Authorization::account(&account));
    for loan in &request.loans {
        let transfer = Transaction::asset_transfer(
            loan.credential.delegator,
            account.address(),
            usdc,
            loan.amount,
            &pooled,
        );
        group = group.push(transfer, Authorization::delegated(&loan.credential));
    }
    debug!(
        target: "ops::jina",
        borrower = %account.address(),
        lenders = lenders.len(),
        total = amounts.iter().sum::<u64>(),
        "借款交易组已组装"
    );
    ctx.pipeline().run(OperationKind::Borrow, group).await
}

/// 还款：主调用 + 借款人向 jina 应用地址转入 USDC 总额。
pub async fn repay(
    ctx: &OperationContext,
    borrower: &str,
    collateral_ids: &[u64],
    amounts: &[u64],
) -> Result<Confirmation, OperationError> {
    if collateral_ids.len() != amounts.len() {
        return Err(OperationError::InvalidInput(format!(
            "抵押物 id 数量 {} 与还款数量 {} 不一致",
            collateral_ids.len(),
            amounts.len()
        )));
    }
    let total = amounts
        .iter()
        .try_fold(0u64, |acc, amount| acc.checked_add(*amount))
        .ok_or_else(|| OperationError::InvalidInput("还款总额溢出".into()))?;

    let account = ctx.account(borrower)?;
    let usdc = ctx.require_fixture(ctx.config.fixtures.assets.usdc, "assets.usdc")?;
    let (descriptor, app_id) = jina_app(ctx).await?;
    let method = descriptor.method("repay")?;

    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::Repay);
    let built = MethodCall::new(method, app_id, account.address(), header)
        .arg(uint_array(collateral_ids))
        .arg(uint_array(amounts))
        .with_foreign_assets(&[usdc])
        .with_foreign_assets(collateral_ids)
        .build()?;
    let transfer = Transaction::asset_transfer(
        account.address(),
        Address::for_application(app_id),
        usdc,
        total,
        &ctx.pooled_header(&suggested),
    );
    ctx.pipeline()
        .run(
            OperationKind::Repay,
            GroupBuilder::new()
                .push(built.call, Authorization::account(&account))
                .push(transfer, Authorization::account(&account)),
        )
        .await
}

/// 赎回：主调用 + 调用方向 jina 应用地址转入 jUSD。
pub async fn claim(
    ctx: &OperationContext,
    caller: &str,
    amount: u64,
) -> Result<Confirmation, OperationError> {
    let account = ctx.account(caller)?;
    let usdc = ctx.require_fixture(ctx.config.fixtures.assets.usdc, "assets.usdc")?;
    let jusd = ctx.require_fixture(ctx.config.fixtures.assets.jusd, "assets.jusd")?;
    let (descriptor, app_id) = jina_app(ctx).await?;
    let method = descriptor.method("claim")?;

    let suggested = ctx.suggested_params().await?;
    let header = ctx.call_header(&suggested, OperationKind::Claim);
    let built = MethodCall::new(method, app_id, account.address(), header)
        .arg(MethodArgValue::Asset(usdc))
        .arg(MethodArgValue::Asset(jusd))
        .arg(amount)
        .build()?;
    let transfer = Transaction::asset_transfer(
        account.address(),
        Address::for_application(app_id),
        jusd,
        amount,
        &ctx.pooled_header(&suggested),
    );
    ctx.pipeline()
        .run(
            OperationKind::Claim,
            GroupBuilder::new()
                .push(built.call, Authorization::account(&account))
                .push(transfer, Authorization::account(&account)),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::ErrorClass;
    use crate::ops::testing::*;
    use crate::signer::{Account, SignerError};

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    fn loan_from(credential: Arc<DelegatedCredential>, amount: u64) -> BorrowRequest {
        BorrowRequest {
            collateral_ids: vec![86],
            collateral_amounts: vec![1],
            loans: vec![Loan { credential, amount }],
        }
    }

    #[tokio::test]
    async fn optin_references_manager() {
        let h = harness();
        h.mock.confirm_next(1_001);
        optin(&h.ctx, "borrower").await.expect("optin");
        let payload = h.mock.sent_payloads().pop().expect("payload");
        assert!(contains(&payload, &[b'a', b'p', b'a', b'n', 0x01]));
        // manager app id 2
        assert!(contains(&payload, &[b'a', b'p', b'f', b'a', 0x91, 0x02]));
    }

    #[tokio::test]
    async fn delegate_binds_terms_and_persists() {
        let h = harness();
        let credential = delegate_lender(&h.ctx, "lender").await.expect("delegate");
        let expiry = h.mock.params.first_valid() + 172_800;
        assert_eq!(
            credential.terms,
            DelegationTerms::lender(USDC, 2_000_000, expiry, 55)
        );
        assert_eq!(
            credential.delegator,
            h.ctx.account("lender").expect("lender").address()
        );
        let loaded = load_lender_credential(&h.ctx).await.expect("load");
        assert_eq!(*loaded, *credential);
        // 只签发，不提交
        assert!(!h.mock.calls().iter().any(|c| c == "send_raw"));
    }

    #[tokio::test]
    async fn earn_passes_program_tag() {
        let h = harness();
        let credential = delegate_lender(&h.ctx, "lender").await.expect("delegate");
        h.mock.confirm_next(1_002);
        earn(&h.ctx, "lender").await.expect("earn");
        let payload = h.mock.sent_payloads().pop().expect("payload");
        let tag = credential.program_tag();
        // byte[4] 参数：msgpack bin8 长度 4
        let mut needle = vec![0xc4, 0x04];
        needle.extend_from_slice(&tag);
        assert!(contains(&payload, &needle));
    }

    #[tokio::test]
    async fn earn_rejects_foreign_credential() {
        let h = harness();
        delegate_lender(&h.ctx, "lender").await.expect("delegate");
        let err = earn(&h.ctx, "borrower").await.expect_err("not the delegator");
        assert!(matches!(err, OperationError::InvalidInput(_)));
        assert!(!h.mock.calls().iter().any(|c| c == "send_raw"));
    }

    #[tokio::test]
    async fn borrow_groups_call_with_delegated_transfers() {
        let h = harness();
        let credential = delegate_lender(&h.ctx, "lender").await.expect("delegate");
        h.mock.confirm_next(1_003);
        let confirmation = borrow(&h.ctx, "borrower", &loan_from(credential.clone(), 500_000))
            .await
            .expect("borrow");
        assert_eq!(confirmation.tx_ids.len(), 2);

        let payload = h.mock.sent_payloads().pop().expect("payload");
        assert!(contains(&payload, b"lsig"));
        assert!(contains(&payload, credential.delegator.as_bytes()));
        // 主调用手续费 = 1000 × 4，借出方转账由其代付
        assert!(contains(&payload, &[b'f', b'e', b'e', 0xcd, 0x0f, 0xa0]));
    }

    #[tokio::test]
    async fn borrow_with_mismatched_asset_never_reaches_network() {
        let h = harness();
        let lender = Account::from_seed([3u8; 32]);
        let program = h.mock.program.clone();
        let expiry = h.mock.params.first_valid() + 100;
        let credential = DelegatedCredential::delegate(
            &lender,
            program,
            DelegationTerms::lender(JUSD, 2_000_000, expiry, 55),
            TermsLayout::Lender,
        )
        .expect("delegate");

        let err = borrow(&h.ctx, "borrower", &loan_from(Arc::new(credential), 10))
            .await
            .expect_err("asset mismatch");
        match &err {
            OperationError::Signer(SignerError::ConstraintViolation { field, .. }) => {
                assert_eq!(*field, "asset_id")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.class(), ErrorClass::Input);
        assert_eq!(h.mock.calls(), vec!["suggested_params"]);
    }

    #[tokio::test]
    async fn borrow_over_limit_is_rejected_locally() {
        let h = harness();
        let credential = delegate_lender(&h.ctx, "lender").await.expect("delegate");
        let err = borrow(&h.ctx, "borrower", &loan_from(credential, 2_000_001))
            .await
            .expect_err("over limit");
        assert!(matches!(
            err,
            OperationError::Signer(SignerError::ConstraintViolation { field: "amount", .. })
        ));
        assert!(!h.mock.calls().iter().any(|c| c == "send_raw"));
    }

    #[tokio::test]
    async fn borrow_requires_a_lender() {
        let h = harness();
        let err = borrow(&h.ctx, "borrower", &BorrowRequest::default())
            .await
            .expect_err("no loans");
        assert_eq!(err.class(), ErrorClass::Input);
        assert!(h.mock.calls().is_empty());
    }

    #[tokio::test]
    async fn repay_transfers_total_to_app_address() {
        let h = harness();
        h.mock.confirm_next(1_004);
        let confirmation = repay(&h.ctx, "borrower", &[86, 87], &[300, 200])
            .await
            .expect("repay");
        assert_eq!(confirmation.tx_ids.len(), 2);
        let payload = h.mock.sent_payloads().pop().expect("payload");
        assert!(contains(&payload, Address::for_application(55).as_bytes()));
        // aamt = 500
        assert!(contains(&payload, &[b'a', b'a', b'm', b't', 0xcd, 0x01, 0xf4]));
        // fee = 1000 × 3
        assert!(contains(&payload, &[b'f', b'e', b'e', 0xcd, 0x0b, 0xb8]));
    }

    #[tokio::test]
    async fn repay_with_uneven_lists_is_input_error() {
        let h = harness();
        let err = repay(&h.ctx, "borrower", &[86], &[1, 2])
            .await
            .expect_err("uneven");
        assert!(matches!(err, OperationError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn claim_sends_jusd_back() {
        let h = harness();
        h.mock.confirm_next(1_005);
        claim(&h.ctx, "borrower", 42).await.expect("claim");
        let payload = h.mock.sent_payloads().pop().expect("payload");
        // xaid = JUSD
        assert!(contains(&payload, &[b'x', b'a', b'i', b'd', JUSD as u8]));
        // fee = 1000 × 2
        assert!(contains(&payload, &[b'f', b'e', b'e', 0xcd, 0x07, 0xd0]));
    }
}
