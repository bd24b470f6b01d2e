//! 交易参数构造：固定费率倍数与有效窗口。

use std::fmt;

use crate::algod::SuggestedParams;
use crate::config::FeeConfig;
use crate::txn::TxnHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Update,
    Manage,
    Configure,
    SendJusd,
    ChildUpdate,
    OptIn,
    Earn,
    Borrow,
    Repay,
    Claim,
    AssetConfig,
    AssetOptIn,
    Fund,
    Dispense,
}

impl OperationKind {
    pub const ALL: [OperationKind; 15] = [
        OperationKind::Create,
        OperationKind::Update,
        OperationKind::Manage,
        OperationKind::Configure,
        OperationKind::SendJusd,
        OperationKind::ChildUpdate,
        OperationKind::OptIn,
        OperationKind::Earn,
        OperationKind::Borrow,
        OperationKind::Repay,
        OperationKind::Claim,
        OperationKind::AssetConfig,
        OperationKind::AssetOptIn,
        OperationKind::Fund,
        OperationKind::Dispense,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Manage => "manage",
            OperationKind::Configure => "configure",
            OperationKind::SendJusd => "send_jusd",
            OperationKind::ChildUpdate => "child_update",
            OperationKind::OptIn => "optin",
            OperationKind::Earn => "earn",
            OperationKind::Borrow => "borrow",
            OperationKind::Repay => "repay",
            OperationKind::Claim => "claim",
            OperationKind::AssetConfig => "asset_config",
            OperationKind::AssetOptIn => "asset_optin",
            OperationKind::Fund => "fund",
            OperationKind::Dispense => "dispense",
        }
    }

    /// 调用会触发的内部交易数 k（含自身）。
    pub fn inner_operations(&self, fees: &FeeConfig) -> u64 {
        match self {
            OperationKind::Create => fees.create,
            OperationKind::Update => fees.update,
            OperationKind::Manage => fees.manage,
            OperationKind::Configure => fees.configure,
            OperationKind::SendJusd => fees.send_jusd,
            OperationKind::ChildUpdate => fees.child_update,
            OperationKind::OptIn => fees.optin,
            OperationKind::Earn => fees.earn,
            OperationKind::Borrow => fees.borrow,
            OperationKind::Repay => fees.repay,
            OperationKind::Claim => fees.claim,
            OperationKind::AssetConfig
            | OperationKind::AssetOptIn
            | OperationKind::Fund
            | OperationKind::Dispense => fees.asset_ops,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 在节点建议参数之上叠加调用方覆盖，产出一笔交易的头部。
#[derive(Debug, Clone)]
pub struct ParamsBuilder {
    suggested: SuggestedParams,
    flat_fee: bool,
    fee: u64,
    first_valid: u64,
    last_valid: u64,
    expiry_round: Option<u64>,
}

impl ParamsBuilder {
    /// 默认：固定费率 `min_fee`，窗口取建议值。
    pub fn new(suggested: &SuggestedParams) -> Self {
        Self {
            suggested: suggested.clone(),
            flat_fee: true,
            fee: suggested.min_fee,
            first_valid: suggested.first_valid(),
            last_valid: suggested.last_valid(),
            expiry_round: None,
        }
    }

    /// 固定费率 `min_fee × k`。
    pub fn for_operation(mut self, kind: OperationKind, fees: &FeeConfig) -> Self {
        self.flat_fee = true;
        self.fee = self
            .suggested
            .min_fee
            .saturating_mul(kind.inner_operations(fees));
        self
    }

    /// 手续费由同组主调用代付的成员。
    pub fn pooled(mut self) -> Self {
        self.flat_fee = true;
        self.fee = 0;
        self
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.flat_fee = true;
        self.fee = fee;
        self
    }

    /// 按字节计费，下限为 `min_fee`。
    pub fn per_byte(mut self) -> Self {
        self.flat_fee = false;
        self
    }

    /// 委托凭证的到期轮次 = first_valid + offset。
    pub fn with_expiry_offset(mut self, offset: u64) -> Self {
        self.expiry_round = Some(self.first_valid.saturating_add(offset));
        self
    }

    pub fn clamp_last_valid(mut self, round: u64) -> Self {
        self.last_valid = self.last_valid.min(round).max(self.first_valid);
        self
    }

    pub fn expiry_round(&self) -> Option<u64> {
        self.expiry_round
    }

    pub fn build(&self) -> TxnHeader {
        TxnHeader {
            fee: if self.flat_fee { self.fee } else { 0 },
            flat_fee: self.flat_fee,
            fee_per_byte: self.suggested.fee,
            min_fee: self.suggested.min_fee,
            first_valid: self.first_valid,
            last_valid: self.last_valid,
            genesis_id: self.suggested.genesis_id.clone(),
            genesis_hash: self.suggested.genesis_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::txn::{Address, Digest, Transaction};

    fn suggested(min_fee: u64) -> SuggestedParams {
        SuggestedParams {
            fee: 0,
            min_fee,
            last_round: 5_000,
            genesis_id: "sandnet-v1".into(),
            genesis_hash: Digest([2u8; 32]),
            consensus_version: String::new(),
        }
    }

    #[test]
    fn default_window_is_copied_from_suggestion() {
        let header = ParamsBuilder::new(&suggested(1_000)).build();
        assert_eq!(header.first_valid, 5_000);
        assert_eq!(header.last_valid, 6_000);
        assert_eq!(header.fee, 1_000);
        assert!(header.flat_fee);
    }

    #[test]
    fn configure_uses_ten_times_min_fee() {
        let header = ParamsBuilder::new(&suggested(1_000))
            .for_operation(OperationKind::Configure, &FeeConfig::default())
            .build();
        assert_eq!(header.fee, 10_000);
    }

    #[test]
    fn expiry_offset_and_clamp() {
        let builder = ParamsBuilder::new(&suggested(1_000)).with_expiry_offset(172_800);
        assert_eq!(builder.expiry_round(), Some(177_800));
        let header = builder.clamp_last_valid(5_500).build();
        assert_eq!(header.last_valid, 5_500);
    }

    #[test]
    fn pooled_members_carry_zero_fee() {
        let header = ParamsBuilder::new(&suggested(1_000))
            .for_operation(OperationKind::Borrow, &FeeConfig::default())
            .pooled()
            .build();
        assert_eq!(header.fee, 0);
    }

    #[test]
    fn per_byte_policy_defers_to_transaction_size() {
        let header = ParamsBuilder::new(&suggested(1_000)).per_byte().build();
        assert!(!header.flat_fee);
        let mut txn = Transaction::payment(Address([1u8; 32]), Address([2u8; 32]), 1, &header);
        txn.apply_fee_policy(&header).expect("fee");
        assert_eq!(txn.fee, 1_000);
    }

    proptest! {
        #[test]
        fn flat_fee_is_min_fee_times_k(min_fee in 1u64..1_000_000, k in 0u64..64) {
            let fees = FeeConfig { borrow: k, ..FeeConfig::default() };
            let header = ParamsBuilder::new(&suggested(min_fee))
                .for_operation(OperationKind::Borrow, &fees)
                .build();
            prop_assert_eq!(header.fee, min_fee * k);
        }
    }

    #[test]
    fn every_kind_uses_its_configured_multiplier() {
        let fees = FeeConfig::default();
        for kind in OperationKind::ALL {
            let header = ParamsBuilder::new(&suggested(1_000))
                .for_operation(kind, &fees)
                .build();
            assert_eq!(header.fee, 1_000 * kind.inner_operations(&fees), "{kind}");
        }
    }
}
