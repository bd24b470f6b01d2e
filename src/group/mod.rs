//! 原子交易组组装：组 id 在全部成员定稿后计算一次并写入每个成员。

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::signer::Authorization;
use crate::txn::{Digest, Transaction, TxnError, sha512_256};

pub const MAX_GROUP_SIZE: usize = 16;
const GROUP_PREFIX: &[u8] = b"TG";

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("交易组为空")]
    Empty,
    #[error("交易组包含 {count} 笔交易，上限 {limit}")]
    TooLarge { count: usize, limit: usize },
    #[error("第 {index} 笔交易在入组前已带有组 id")]
    AlreadyGrouped { index: usize },
    /// 盖章后成员被修改；属于程序错误，网络必然拒绝该组。
    #[error("交易组已被篡改：第 {index} 笔的组 id 为 {actual}，重算结果为 {expected}")]
    Tampered {
        index: usize,
        expected: Digest,
        actual: Digest,
    },
    #[error(transparent)]
    Encoding(#[from] TxnError),
}

#[derive(Serialize)]
struct TxGroupPayload {
    #[serde(rename = "txlist")]
    txlist: Vec<serde_bytes::ByteBuf>,
}

/// `sha512_256("TG" || msgpack({"txlist": [txid...]}))`，各成员按清空组字段后的内容计算。
pub fn compute_group_id(members: &[Transaction]) -> Result<Digest, TxnError> {
    let mut txlist = Vec::with_capacity(members.len());
    for txn in members {
        let mut unstamped = txn.clone();
        unstamped.group = Digest::default();
        txlist.push(serde_bytes::ByteBuf::from(unstamped.raw_id()?.to_vec()));
    }
    let encoded = rmp_serde::to_vec_named(&TxGroupPayload { txlist })?;
    Ok(Digest(sha512_256(&[GROUP_PREFIX, &encoded])))
}

#[derive(Debug, Clone)]
pub struct GroupMember {
    pub txn: Transaction,
    pub authorization: Authorization,
}

#[derive(Debug, Default)]
pub struct GroupBuilder {
    members: Vec<GroupMember>,
}

impl GroupBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按提交顺序追加；约定第 0 位为主调用，其后为其依赖的转账。
    pub fn push(mut self, txn: Transaction, authorization: Authorization) -> Self {
        self.members.push(GroupMember { txn, authorization });
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn build(self) -> Result<AssembledGroup, GroupError> {
        let count = self.members.len();
        if count == 0 {
            return Err(GroupError::Empty);
        }
        if count > MAX_GROUP_SIZE {
            return Err(GroupError::TooLarge {
                count,
                limit: MAX_GROUP_SIZE,
            });
        }
        if let Some(index) = self.members.iter().position(|member| member.txn.is_grouped()) {
            return Err(GroupError::AlreadyGrouped { index });
        }

        let mut members = self.members;
        if count == 1 {
            return Ok(AssembledGroup::Standalone(members.remove(0)));
        }

        let txns: Vec<Transaction> = members.iter().map(|member| member.txn.clone()).collect();
        let group_id = compute_group_id(&txns)?;
        for member in &mut members {
            member.txn.group = group_id;
        }
        debug!(target: "group", group_id = %group_id, members = count, "交易组已盖章");
        Ok(AssembledGroup::Atomic { group_id, members })
    }
}

#[derive(Debug, Clone)]
pub enum AssembledGroup {
    /// 单笔交易，不计算也不写入组 id。
    Standalone(GroupMember),
    Atomic {
        group_id: Digest,
        members: Vec<GroupMember>,
    },
}

impl AssembledGroup {
    pub fn members(&self) -> &[GroupMember] {
        match self {
            AssembledGroup::Standalone(member) => std::slice::from_ref(member),
            AssembledGroup::Atomic { members, .. } => members,
        }
    }

    pub fn group_id(&self) -> Option<Digest> {
        match self {
            AssembledGroup::Standalone(_) => None,
            AssembledGroup::Atomic { group_id, .. } => Some(*group_id),
        }
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    #[cfg(test)]
    pub(crate) fn transaction_mut(&mut self, index: usize) -> Option<&mut Transaction> {
        match self {
            AssembledGroup::Standalone(member) => (index == 0).then_some(&mut member.txn),
            AssembledGroup::Atomic { members, .. } => members.get_mut(index).map(|m| &mut m.txn),
        }
    }

    /// 重算组 id 并与每个成员比对。
    pub fn verify(&self) -> Result<(), GroupError> {
        match self {
            AssembledGroup::Standalone(member) => {
                if member.txn.is_grouped() {
                    return Err(GroupError::Tampered {
                        index: 0,
                        expected: Digest::default(),
                        actual: member.txn.group,
                    });
                }
                Ok(())
            }
            AssembledGroup::Atomic { group_id, members } => {
                let txns: Vec<Transaction> =
                    members.iter().map(|member| member.txn.clone()).collect();
                let expected = compute_group_id(&txns)?;
                for (index, member) in members.iter().enumerate() {
                    if member.txn.group != expected || *group_id != expected {
                        return Err(GroupError::Tampered {
                            index,
                            expected,
                            actual: member.txn.group,
                        });
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::signer::Account;
    use crate::txn::{Address, OnCompletion, TxnHeader};

    fn header() -> TxnHeader {
        TxnHeader {
            fee: 1_000,
            flat_fee: true,
            min_fee: 1_000,
            first_valid: 200,
            last_valid: 1_200,
            genesis_id: "sandnet-v1".into(),
            genesis_hash: Digest([3u8; 32]),
            ..TxnHeader::default()
        }
    }

    fn account_auth() -> Authorization {
        Authorization::Account(Arc::new(Account::from_seed([11u8; 32])))
    }

    fn call_and_transfer() -> (Transaction, Transaction) {
        let a = Address([0xaa; 32]);
        let b = Address([0xbb; 32]);
        let call = Transaction::app_call(a, 55, OnCompletion::NoOp, &header());
        let transfer = Transaction::asset_transfer(a, b, 1, 10_000_000, &header());
        (call, transfer)
    }

    #[test]
    fn two_member_group_shares_one_id() {
        let (call, transfer) = call_and_transfer();
        let group = GroupBuilder::new()
            .push(call.clone(), account_auth())
            .push(transfer.clone(), account_auth())
            .build()
            .expect("group");

        let group_id = group.group_id().expect("atomic");
        assert!(!group_id.is_zero());
        let members = group.members();
        assert_eq!(members[0].txn.group, group_id);
        assert_eq!(members[1].txn.group, group_id);
        assert_eq!(members[1].txn.asset_amount, 10_000_000);
        assert_eq!(compute_group_id(&[call, transfer]).expect("recompute"), group_id);
        group.verify().expect("verify");
    }

    #[test]
    fn single_member_is_not_stamped() {
        let (call, _) = call_and_transfer();
        let group = GroupBuilder::new()
            .push(call.clone(), account_auth())
            .build()
            .expect("group");
        assert!(group.group_id().is_none());
        let member = &group.members()[0];
        assert!(member.txn.group.is_zero());
        assert_eq!(member.txn.encode().expect("enc"), call.encode().expect("enc"));
    }

    #[test]
    fn mutation_after_stamping_is_detected() {
        let (call, transfer) = call_and_transfer();
        let mut group = GroupBuilder::new()
            .push(call, account_auth())
            .push(transfer, account_auth())
            .build()
            .expect("group");
        group.transaction_mut(1).expect("member").asset_amount = 20_000_000;
        assert!(matches!(group.verify(), Err(GroupError::Tampered { index: 0, .. })));
    }

    #[test]
    fn order_changes_the_group_id() {
        let (call, transfer) = call_and_transfer();
        let forward = compute_group_id(&[call.clone(), transfer.clone()]).expect("id");
        let reverse = compute_group_id(&[transfer, call]).expect("id");
        assert_ne!(forward, reverse);
    }

    #[test]
    fn size_limits_are_enforced() {
        assert!(matches!(GroupBuilder::new().build(), Err(GroupError::Empty)));
        let (call, _) = call_and_transfer();
        let mut builder = GroupBuilder::new();
        for _ in 0..=MAX_GROUP_SIZE {
            builder = builder.push(call.clone(), account_auth());
        }
        assert!(matches!(
            builder.build(),
            Err(GroupError::TooLarge { count: 17, limit: 16 })
        ));
    }
}
