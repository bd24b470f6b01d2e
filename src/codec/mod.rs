//! 委托凭证参数的定长编码。
//!
//! 每个字段编码为一个独立的 8 字节大端 u64 参数，参数顺序由 [`TermsLayout`] 固定：
//!
//! | layout      | arg 0    | arg 1      | arg 2        | arg 3  |
//! |-------------|----------|------------|--------------|--------|
//! | `Lender`    | asset_id | max_amount | expiry_round | app_id |
//! | `Dispenser` | asset_id | max_amount |              |        |

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

const FIELD_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermsLayout {
    Lender,
    Dispenser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermField {
    AssetId,
    MaxAmount,
    ExpiryRound,
    AppId,
}

impl TermField {
    pub fn as_str(&self) -> &'static str {
        match self {
            TermField::AssetId => "asset_id",
            TermField::MaxAmount => "max_amount",
            TermField::ExpiryRound => "expiry_round",
            TermField::AppId => "app_id",
        }
    }
}

impl fmt::Display for TermField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TermsLayout {
    pub fn fields(&self) -> &'static [TermField] {
        match self {
            TermsLayout::Lender => &[
                TermField::AssetId,
                TermField::MaxAmount,
                TermField::ExpiryRound,
                TermField::AppId,
            ],
            TermsLayout::Dispenser => &[TermField::AssetId, TermField::MaxAmount],
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("{layout:?} layout requires field `{field}`")]
    MissingField {
        layout: TermsLayout,
        field: TermField,
    },
    #[error("{layout:?} layout has no slot for field `{field}`")]
    UnsupportedField {
        layout: TermsLayout,
        field: TermField,
    },
    #[error("{layout:?} layout expects {expected} arguments, got {actual}")]
    ArgumentCount {
        layout: TermsLayout,
        expected: usize,
        actual: usize,
    },
    #[error("argument {index} must be 8 bytes, got {actual}")]
    Width { index: usize, actual: usize },
}

/// 委托凭证绑定的交易约束。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationTerms {
    pub asset_id: u64,
    pub max_amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_round: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<u64>,
}

impl DelegationTerms {
    pub fn lender(asset_id: u64, max_amount: u64, expiry_round: u64, app_id: u64) -> Self {
        Self {
            asset_id,
            max_amount,
            expiry_round: Some(expiry_round),
            app_id: Some(app_id),
        }
    }

    pub fn dispenser(asset_id: u64, max_amount: u64) -> Self {
        Self {
            asset_id,
            max_amount,
            expiry_round: None,
            app_id: None,
        }
    }

    fn field(&self, field: TermField) -> Option<u64> {
        match field {
            TermField::AssetId => Some(self.asset_id),
            TermField::MaxAmount => Some(self.max_amount),
            TermField::ExpiryRound => self.expiry_round,
            TermField::AppId => self.app_id,
        }
    }

    pub fn encode_args(&self, layout: TermsLayout) -> Result<Vec<Vec<u8>>, CodecError> {
        let fields = layout.fields();
        for optional in [TermField::ExpiryRound, TermField::AppId] {
            if !fields.contains(&optional) && self.field(optional).is_some() {
                return Err(CodecError::UnsupportedField {
                    layout,
                    field: optional,
                });
            }
        }
        fields
            .iter()
            .map(|field| {
                self.field(*field)
                    .map(|value| value.to_be_bytes().to_vec())
                    .ok_or(CodecError::MissingField {
                        layout,
                        field: *field,
                    })
            })
            .collect()
    }

    pub fn decode_args(layout: TermsLayout, args: &[Vec<u8>]) -> Result<Self, CodecError> {
        let fields = layout.fields();
        if args.len() != fields.len() {
            return Err(CodecError::ArgumentCount {
                layout,
                expected: fields.len(),
                actual: args.len(),
            });
        }
        let mut terms = DelegationTerms::default();
        for (index, (field, arg)) in fields.iter().zip(args).enumerate() {
            let raw: [u8; FIELD_WIDTH] =
                arg.as_slice()
                    .try_into()
                    .map_err(|_| CodecError::Width {
                        index,
                        actual: arg.len(),
                    })?;
            let value = u64::from_be_bytes(raw);
            match field {
                TermField::AssetId => terms.asset_id = value,
                TermField::MaxAmount => terms.max_amount = value,
                TermField::ExpiryRound => terms.expiry_round = Some(value),
                TermField::AppId => terms.app_id = Some(value),
            }
        }
        Ok(terms)
    }
}

/// 链上用于识别出借人程序的标签：`sha256(program)[..4]`。
pub fn program_tag(program: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(program);
    [digest[0], digest[1], digest[2], digest[3]]
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn lender_layout_is_four_big_endian_words() {
        let terms = DelegationTerms::lender(1, 2_000_000, 172_900, 55);
        let args = terms.encode_args(TermsLayout::Lender).expect("encode");
        assert_eq!(args.len(), 4);
        assert_eq!(args[1], vec![0, 0, 0, 0, 0, 0x1e, 0x84, 0x80]);
        assert_eq!(args[3], 55u64.to_be_bytes().to_vec());
    }

    #[test]
    fn dispenser_layout_rejects_bound_expiry() {
        let terms = DelegationTerms::lender(1, 10, 100, 55);
        assert_eq!(
            terms.encode_args(TermsLayout::Dispenser),
            Err(CodecError::UnsupportedField {
                layout: TermsLayout::Dispenser,
                field: TermField::ExpiryRound
            })
        );
        let terms = DelegationTerms::dispenser(56, 10);
        assert_eq!(
            terms.encode_args(TermsLayout::Lender),
            Err(CodecError::MissingField {
                layout: TermsLayout::Lender,
                field: TermField::ExpiryRound
            })
        );
    }

    #[test]
    fn decode_rejects_wrong_count_and_width() {
        let short = vec![vec![0u8; 8]; 3];
        assert!(matches!(
            DelegationTerms::decode_args(TermsLayout::Lender, &short),
            Err(CodecError::ArgumentCount { expected: 4, actual: 3, .. })
        ));
        let narrow = vec![vec![0u8; 8], vec![0u8; 4]];
        assert_eq!(
            DelegationTerms::decode_args(TermsLayout::Dispenser, &narrow),
            Err(CodecError::Width { index: 1, actual: 4 })
        );
    }

    #[test]
    fn program_tag_is_sha256_prefix() {
        // sha256("") = e3b0c442...
        assert_eq!(program_tag(b""), [0xe3, 0xb0, 0xc4, 0x42]);
    }

    proptest! {
        #[test]
        fn lender_terms_survive_encoding(asset in any::<u64>(), max in any::<u64>(), expiry in any::<u64>(), app in any::<u64>()) {
            let terms = DelegationTerms::lender(asset, max, expiry, app);
            let args = terms.encode_args(TermsLayout::Lender).expect("encode");
            prop_assert!(args.iter().all(|arg| arg.len() == FIELD_WIDTH));
            prop_assert_eq!(DelegationTerms::decode_args(TermsLayout::Lender, &args).expect("decode"), terms);
        }

        #[test]
        fn dispenser_terms_survive_encoding(asset in any::<u64>(), max in any::<u64>()) {
            let terms = DelegationTerms::dispenser(asset, max);
            let args = terms.encode_args(TermsLayout::Dispenser).expect("encode");
            prop_assert_eq!(DelegationTerms::decode_args(TermsLayout::Dispenser, &args).expect("decode"), terms);
        }
    }
}
