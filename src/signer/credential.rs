use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::{DelegationTerms, TermsLayout, program_tag};
use crate::monitoring::events;
use crate::persist::write_atomic;
use crate::txn::address::PROGRAM_PREFIX;
use crate::txn::{Address, LogicSig, Signature, Transaction, TxType};

use super::account::{Account, verify_signature};
use super::SignerError;

/// 委托凭证：委托人对程序签名，允许该程序在约束内代其转出资产。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegatedCredential {
    pub program: Vec<u8>,
    pub args: Vec<Vec<u8>>,
    pub signature: Signature,
    pub delegator: Address,
    pub terms: DelegationTerms,
    pub layout: TermsLayout,
}

#[derive(Serialize, Deserialize)]
struct CredentialFile {
    delegator: Address,
    layout: TermsLayout,
    terms: DelegationTerms,
    program: String,
    args: Vec<String>,
    signature: String,
}

impl DelegatedCredential {
    pub fn delegate(
        account: &Account,
        program: Vec<u8>,
        terms: DelegationTerms,
        layout: TermsLayout,
    ) -> Result<Self, SignerError> {
        let args = terms.encode_args(layout)?;
        let signature = account.sign_bytes(&program_message(&program));
        let credential = Self {
            program,
            args,
            signature,
            delegator: account.address(),
            terms,
            layout,
        };
        debug!(
            target: "signer::credential",
            delegator = %credential.delegator,
            layout = ?layout,
            asset_id = terms.asset_id,
            max_amount = terms.max_amount,
            expiry_round = ?terms.expiry_round,
            "委托凭证已签发"
        );
        Ok(credential)
    }

    /// 校验委托签名，并确认参数与约束一致。
    pub fn verify(&self) -> Result<(), SignerError> {
        verify_signature(
            &self.delegator,
            &program_message(&self.program),
            &self.signature,
        )?;
        let decoded = DelegationTerms::decode_args(self.layout, &self.args)?;
        if decoded != self.terms {
            return Err(SignerError::ConstraintViolation {
                field: "args",
                expected: format!("{:?}", self.terms),
                actual: format!("{decoded:?}"),
            });
        }
        Ok(())
    }

    pub fn program_tag(&self) -> [u8; 4] {
        program_tag(&self.program)
    }

    pub fn logic_sig(&self) -> LogicSig {
        LogicSig {
            args: self.args.clone(),
            program: self.program.clone(),
            signature: Some(self.signature),
        }
    }

    /// 本地检查 `txn` 是否落在凭证约束内；`group` 为其所在交易组（独立交易时只含自身）。
    pub fn validate(&self, txn: &Transaction, group: &[Transaction]) -> Result<(), SignerError> {
        let result = self.check(txn, group);
        if let Err(SignerError::ConstraintViolation { field, .. }) = &result {
            warn!(
                target: "signer::credential",
                delegator = %self.delegator,
                field,
                "交易超出委托凭证约束，拒绝签名"
            );
            events::delegation_rejected(self.layout, field);
        }
        result
    }

    fn check(&self, txn: &Transaction, group: &[Transaction]) -> Result<(), SignerError> {
        ensure(
            "type",
            TxType::AssetTransfer.as_str(),
            txn.kind.as_str(),
            txn.kind == TxType::AssetTransfer,
        )?;
        ensure("sender", self.delegator, txn.sender, txn.sender == self.delegator)?;
        ensure(
            "asset_id",
            self.terms.asset_id,
            txn.asset_id,
            txn.asset_id == self.terms.asset_id,
        )?;
        ensure(
            "amount",
            format!("<= {}", self.terms.max_amount),
            txn.asset_amount,
            txn.asset_amount <= self.terms.max_amount,
        )?;
        ensure(
            "close_to",
            Address::ZERO,
            txn.asset_close_to,
            txn.asset_close_to.is_zero(),
        )?;
        ensure(
            "close_remainder_to",
            Address::ZERO,
            txn.close_remainder_to,
            txn.close_remainder_to.is_zero(),
        )?;
        ensure("rekey_to", Address::ZERO, txn.rekey_to, txn.rekey_to.is_zero())?;

        if let Some(expiry) = self.terms.expiry_round {
            ensure(
                "last_valid",
                format!("<= {expiry}"),
                txn.last_valid,
                txn.last_valid <= expiry,
            )?;
        }

        if let Some(app_id) = self.terms.app_id {
            let head = group.first().filter(|_| group.len() > 1);
            let actual = match head {
                Some(call) if call.kind == TxType::ApplicationCall => call.app_id.to_string(),
                Some(other) => other.kind.as_str().to_string(),
                None => "standalone".to_string(),
            };
            let matches = head
                .map(|call| call.kind == TxType::ApplicationCall && call.app_id == app_id)
                .unwrap_or(false);
            ensure("group[0].app_id", app_id, actual, matches)?;
        }
        Ok(())
    }

    pub async fn save(&self, path: &Path) -> Result<(), SignerError> {
        let file = CredentialFile {
            delegator: self.delegator,
            layout: self.layout,
            terms: self.terms,
            program: BASE64.encode(&self.program),
            args: self.args.iter().map(|arg| BASE64.encode(arg)).collect(),
            signature: BASE64.encode(self.signature.0),
        };
        let contents = serde_json::to_vec_pretty(&file).map_err(|err| SignerError::Format {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_atomic(&target, &contents))
            .await
            .map_err(|err| SignerError::Join(err.to_string()))?
            .map_err(|source| SignerError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            target: "signer::credential",
            path = %path.display(),
            delegator = %self.delegator,
            layout = ?self.layout,
            "委托凭证已保存"
        );
        Ok(())
    }

    /// 读取并校验凭证；签名或参数不一致的文件直接拒绝。
    pub async fn load(path: &Path) -> Result<Self, SignerError> {
        let raw = tokio::fs::read(path).await.map_err(|source| SignerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let format_err = |message: String| SignerError::Format {
            path: path.to_path_buf(),
            message,
        };
        let file: CredentialFile =
            serde_json::from_slice(&raw).map_err(|err| format_err(err.to_string()))?;
        let decode = |field: &str, value: &str| {
            BASE64
                .decode(value)
                .map_err(|err| format_err(format!("{field}: {err}")))
        };

        let program = decode("program", &file.program)?;
        let args = file
            .args
            .iter()
            .map(|arg| decode("args", arg))
            .collect::<Result<Vec<_>, _>>()?;
        let signature_bytes = decode("signature", &file.signature)?;
        let signature: [u8; 64] = signature_bytes.as_slice().try_into().map_err(|_| {
            format_err(format!("signature 应为 64 字节，实际 {}", signature_bytes.len()))
        })?;

        let credential = Self {
            program,
            args,
            signature: Signature(signature),
            delegator: file.delegator,
            terms: file.terms,
            layout: file.layout,
        };
        credential.verify()?;
        Ok(credential)
    }
}

fn program_message(program: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(PROGRAM_PREFIX.len() + program.len());
    message.extend_from_slice(PROGRAM_PREFIX);
    message.extend_from_slice(program);
    message
}

fn ensure(
    field: &'static str,
    expected: impl ToString,
    actual: impl ToString,
    ok: bool,
) -> Result<(), SignerError> {
    if ok {
        Ok(())
    } else {
        Err(SignerError::ConstraintViolation {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::{Digest, OnCompletion, TxnHeader};

    const PROGRAM: &[u8] = &[6, 0x81, 1, 0x43];
    const USDC: u64 = 10;
    const JINA_APP: u64 = 55;

    fn header(last_valid: u64) -> TxnHeader {
        TxnHeader {
            flat_fee: true,
            first_valid: 1_000,
            last_valid,
            genesis_id: "sandnet-v1".into(),
            genesis_hash: Digest([4u8; 32]),
            ..TxnHeader::default()
        }
    }

    fn lender() -> (Account, DelegatedCredential) {
        let account = Account::from_seed([21u8; 32]);
        let terms = DelegationTerms::lender(USDC, 2_000_000, 173_000, JINA_APP);
        let credential =
            DelegatedCredential::delegate(&account, PROGRAM.to_vec(), terms, TermsLayout::Lender)
                .expect("delegate");
        (account, credential)
    }

    fn borrow_group(credential: &DelegatedCredential, asset_id: u64, amount: u64) -> Vec<Transaction> {
        let borrower = Address([0xb0; 32]);
        let call = Transaction::app_call(borrower, JINA_APP, OnCompletion::NoOp, &header(2_000));
        let transfer = Transaction::asset_transfer(
            credential.delegator,
            borrower,
            asset_id,
            amount,
            &header(2_000),
        );
        vec![call, transfer]
    }

    #[test]
    fn delegated_signature_verifies() {
        let (_, credential) = lender();
        credential.verify().expect("verify");
        assert_eq!(credential.args.len(), 4);
        let lsig = credential.logic_sig();
        assert_eq!(lsig.program, PROGRAM);
        assert_eq!(lsig.signature, Some(credential.signature));
    }

    #[test]
    fn tampered_args_fail_verification() {
        let (_, mut credential) = lender();
        credential.args[1] = 9_000_000u64.to_be_bytes().to_vec();
        assert!(matches!(
            credential.verify(),
            Err(SignerError::ConstraintViolation { field: "args", .. })
        ));
    }

    #[test]
    fn transfer_within_terms_passes() {
        let (_, credential) = lender();
        let group = borrow_group(&credential, USDC, 1_500_000);
        credential.validate(&group[1], &group).expect("within terms");
    }

    #[test]
    fn foreign_asset_is_a_violation() {
        let (_, credential) = lender();
        let group = borrow_group(&credential, USDC + 1, 1_000);
        let err = credential.validate(&group[1], &group).expect_err("asset");
        match err {
            SignerError::ConstraintViolation {
                field,
                expected,
                actual,
            } => {
                assert_eq!(field, "asset_id");
                assert_eq!(expected, USDC.to_string());
                assert_eq!(actual, (USDC + 1).to_string());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn over_limit_amount_is_a_violation() {
        let (_, credential) = lender();
        let group = borrow_group(&credential, USDC, 2_000_001);
        assert!(matches!(
            credential.validate(&group[1], &group),
            Err(SignerError::ConstraintViolation { field: "amount", .. })
        ));
    }

    #[test]
    fn expired_window_is_a_violation() {
        let (_, credential) = lender();
        let mut group = borrow_group(&credential, USDC, 1);
        group[1].last_valid = 173_001;
        assert!(matches!(
            credential.validate(&group[1], &group),
            Err(SignerError::ConstraintViolation { field: "last_valid", .. })
        ));
    }

    #[test]
    fn bound_app_requires_controlling_call() {
        let (_, credential) = lender();
        let group = borrow_group(&credential, USDC, 1);
        let standalone = vec![group[1].clone()];
        assert!(matches!(
            credential.validate(&standalone[0], &standalone),
            Err(SignerError::ConstraintViolation { field: "group[0].app_id", .. })
        ));
    }

    #[test]
    fn rekey_is_a_violation() {
        let (_, credential) = lender();
        let mut group = borrow_group(&credential, USDC, 1);
        group[1].rekey_to = Address([1u8; 32]);
        assert!(matches!(
            credential.validate(&group[1], &group),
            Err(SignerError::ConstraintViolation { field: "rekey_to", .. })
        ));
    }

    #[test]
    fn dispenser_terms_ignore_group_shape() {
        let account = Account::from_seed([22u8; 32]);
        let credential = DelegatedCredential::delegate(
            &account,
            PROGRAM.to_vec(),
            DelegationTerms::dispenser(USDC, 500),
            TermsLayout::Dispenser,
        )
        .expect("delegate");
        let transfer =
            Transaction::asset_transfer(account.address(), Address([3u8; 32]), USDC, 500, &header(2_000));
        credential
            .validate(&transfer, std::slice::from_ref(&transfer))
            .expect("standalone dispense");
    }

    #[tokio::test]
    async fn saved_credential_loads_back_verified() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("lender_lsig.codec");
        let (_, credential) = lender();
        credential.save(&path).await.expect("save");

        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("\"layout\": \"lender\""));

        let loaded = DelegatedCredential::load(&path).await.expect("load");
        assert_eq!(loaded, credential);
    }

    #[tokio::test]
    async fn forged_signature_is_rejected_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("forged.codec");
        let (_, mut credential) = lender();
        credential.signature = Account::from_seed([99u8; 32]).sign_bytes(b"Programother");
        credential.save(&path).await.expect("save");
        assert!(matches!(
            DelegatedCredential::load(&path).await,
            Err(SignerError::InvalidSignature { .. })
        ));
    }
}
