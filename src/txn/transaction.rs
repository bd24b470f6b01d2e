use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use super::address::{Address, Digest, TxId, sha512_256};
use super::TxnError;

const TX_PREFIX: &[u8] = b"TX";
/// Bytes a detached ed25519 signature plus its map key add to an encoded transaction.
const SIGNATURE_OVERHEAD: u64 = 75;

pub(crate) fn is_zero(value: &u64) -> bool {
    *value == 0
}

pub(crate) fn serialize_byte_list<S>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut seq = serializer.serialize_seq(Some(items.len()))?;
    for item in items {
        seq.serialize_element(serde_bytes::Bytes::new(item))?;
    }
    seq.end()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TxType {
    #[default]
    Payment,
    AssetTransfer,
    AssetConfig,
    ApplicationCall,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Payment => "pay",
            TxType::AssetTransfer => "axfer",
            TxType::AssetConfig => "acfg",
            TxType::ApplicationCall => "appl",
        }
    }
}

impl Serialize for TxType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OnCompletion {
    #[default]
    NoOp,
    OptIn,
    CloseOut,
    ClearState,
    UpdateApplication,
    DeleteApplication,
}

impl OnCompletion {
    pub fn code(&self) -> u64 {
        match self {
            OnCompletion::NoOp => 0,
            OnCompletion::OptIn => 1,
            OnCompletion::CloseOut => 2,
            OnCompletion::ClearState => 3,
            OnCompletion::UpdateApplication => 4,
            OnCompletion::DeleteApplication => 5,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, OnCompletion::NoOp)
    }
}

impl Serialize for OnCompletion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.code())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateSchema {
    #[serde(rename = "nbs", skip_serializing_if = "is_zero")]
    pub num_byte_slices: u64,
    #[serde(rename = "nui", skip_serializing_if = "is_zero")]
    pub num_uints: u64,
}

impl StateSchema {
    pub fn new(num_uints: u64, num_byte_slices: u64) -> Self {
        Self {
            num_byte_slices,
            num_uints,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_byte_slices == 0 && self.num_uints == 0
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero_u32(value: &u32) -> bool {
    *value == 0
}

/// Asset parameters (`apar`); on reconfiguration only the role addresses are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetParams {
    #[serde(rename = "am", skip_serializing_if = "Digest::is_zero")]
    pub metadata_hash: Digest,
    #[serde(rename = "an", skip_serializing_if = "String::is_empty")]
    pub asset_name: String,
    #[serde(rename = "au", skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(rename = "c", skip_serializing_if = "Address::is_zero")]
    pub clawback: Address,
    #[serde(rename = "dc", skip_serializing_if = "is_zero_u32")]
    pub decimals: u32,
    #[serde(rename = "df", skip_serializing_if = "is_false")]
    pub default_frozen: bool,
    #[serde(rename = "f", skip_serializing_if = "Address::is_zero")]
    pub freeze: Address,
    #[serde(rename = "m", skip_serializing_if = "Address::is_zero")]
    pub manager: Address,
    #[serde(rename = "r", skip_serializing_if = "Address::is_zero")]
    pub reserve: Address,
    #[serde(rename = "t", skip_serializing_if = "is_zero")]
    pub total: u64,
    #[serde(rename = "un", skip_serializing_if = "String::is_empty")]
    pub unit_name: String,
}

/// Header values shared by every transaction of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxnHeader {
    pub fee: u64,
    pub flat_fee: bool,
    pub fee_per_byte: u64,
    pub min_fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: Digest,
}

/// One network operation in canonical field order.
///
/// Field declaration order follows the byte-wise order of the wire keys, so
/// `rmp_serde::to_vec_named` yields the canonical encoding directly: empty
/// fields are skipped and integers use the shortest msgpack form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Transaction {
    #[serde(rename = "aamt", skip_serializing_if = "is_zero")]
    pub asset_amount: u64,
    #[serde(rename = "aclose", skip_serializing_if = "Address::is_zero")]
    pub asset_close_to: Address,
    #[serde(rename = "amt", skip_serializing_if = "is_zero")]
    pub amount: u64,
    #[serde(
        rename = "apaa",
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serialize_byte_list"
    )]
    pub app_args: Vec<Vec<u8>>,
    #[serde(rename = "apan", skip_serializing_if = "OnCompletion::is_noop")]
    pub on_completion: OnCompletion,
    #[serde(
        rename = "apap",
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serde_bytes::serialize"
    )]
    pub approval_program: Vec<u8>,
    #[serde(rename = "apar", skip_serializing_if = "Option::is_none")]
    pub asset_params: Option<AssetParams>,
    #[serde(rename = "apas", skip_serializing_if = "Vec::is_empty")]
    pub foreign_assets: Vec<u64>,
    #[serde(rename = "apat", skip_serializing_if = "Vec::is_empty")]
    pub accounts: Vec<Address>,
    #[serde(rename = "apfa", skip_serializing_if = "Vec::is_empty")]
    pub foreign_apps: Vec<u64>,
    #[serde(rename = "apgs", skip_serializing_if = "StateSchema::is_empty")]
    pub global_schema: StateSchema,
    #[serde(rename = "apid", skip_serializing_if = "is_zero")]
    pub app_id: u64,
    #[serde(rename = "apls", skip_serializing_if = "StateSchema::is_empty")]
    pub local_schema: StateSchema,
    #[serde(
        rename = "apsu",
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serde_bytes::serialize"
    )]
    pub clear_program: Vec<u8>,
    #[serde(rename = "arcv", skip_serializing_if = "Address::is_zero")]
    pub asset_receiver: Address,
    #[serde(rename = "caid", skip_serializing_if = "is_zero")]
    pub config_asset: u64,
    #[serde(rename = "close", skip_serializing_if = "Address::is_zero")]
    pub close_remainder_to: Address,
    #[serde(rename = "fee", skip_serializing_if = "is_zero")]
    pub fee: u64,
    #[serde(rename = "fv", skip_serializing_if = "is_zero")]
    pub first_valid: u64,
    #[serde(rename = "gen", skip_serializing_if = "String::is_empty")]
    pub genesis_id: String,
    #[serde(rename = "gh", skip_serializing_if = "Digest::is_zero")]
    pub genesis_hash: Digest,
    #[serde(rename = "grp", skip_serializing_if = "Digest::is_zero")]
    pub group: Digest,
    #[serde(rename = "lv", skip_serializing_if = "is_zero")]
    pub last_valid: u64,
    #[serde(rename = "lx", skip_serializing_if = "Digest::is_zero")]
    pub lease: Digest,
    #[serde(
        rename = "note",
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "serde_bytes::serialize"
    )]
    pub note: Vec<u8>,
    #[serde(rename = "rcv", skip_serializing_if = "Address::is_zero")]
    pub receiver: Address,
    #[serde(rename = "rekey", skip_serializing_if = "Address::is_zero")]
    pub rekey_to: Address,
    #[serde(rename = "snd", skip_serializing_if = "Address::is_zero")]
    pub sender: Address,
    #[serde(rename = "type")]
    pub kind: TxType,
    #[serde(rename = "xaid", skip_serializing_if = "is_zero")]
    pub asset_id: u64,
}

impl Transaction {
    fn with_header(kind: TxType, sender: Address, header: &TxnHeader) -> Self {
        Self {
            kind,
            sender,
            fee: header.fee,
            first_valid: header.first_valid,
            last_valid: header.last_valid,
            genesis_id: header.genesis_id.clone(),
            genesis_hash: header.genesis_hash,
            ..Self::default()
        }
    }

    pub fn payment(sender: Address, receiver: Address, amount: u64, header: &TxnHeader) -> Self {
        Self {
            receiver,
            amount,
            ..Self::with_header(TxType::Payment, sender, header)
        }
    }

    pub fn asset_transfer(
        sender: Address,
        receiver: Address,
        asset_id: u64,
        amount: u64,
        header: &TxnHeader,
    ) -> Self {
        Self {
            asset_receiver: receiver,
            asset_id,
            asset_amount: amount,
            ..Self::with_header(TxType::AssetTransfer, sender, header)
        }
    }

    /// Zero-amount self transfer that opts the sender into `asset_id`.
    pub fn asset_opt_in(sender: Address, asset_id: u64, header: &TxnHeader) -> Self {
        Self::asset_transfer(sender, sender, asset_id, 0, header)
    }

    pub fn asset_config(
        sender: Address,
        asset_id: u64,
        params: AssetParams,
        header: &TxnHeader,
    ) -> Self {
        Self {
            config_asset: asset_id,
            asset_params: Some(params),
            ..Self::with_header(TxType::AssetConfig, sender, header)
        }
    }

    pub fn app_call(
        sender: Address,
        app_id: u64,
        on_completion: OnCompletion,
        header: &TxnHeader,
    ) -> Self {
        Self {
            app_id,
            on_completion,
            ..Self::with_header(TxType::ApplicationCall, sender, header)
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TxnError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Bytes covered by an account signature.
    pub fn bytes_to_sign(&self) -> Result<Vec<u8>, TxnError> {
        let encoded = self.encode()?;
        let mut message = Vec::with_capacity(TX_PREFIX.len() + encoded.len());
        message.extend_from_slice(TX_PREFIX);
        message.extend_from_slice(&encoded);
        Ok(message)
    }

    pub fn raw_id(&self) -> Result<[u8; 32], TxnError> {
        let encoded = self.encode()?;
        Ok(sha512_256(&[TX_PREFIX, &encoded]))
    }

    pub fn id(&self) -> Result<TxId, TxnError> {
        Ok(TxId::from_digest(&self.raw_id()?))
    }

    pub fn estimate_size(&self) -> Result<u64, TxnError> {
        Ok(self.encode()?.len() as u64 + SIGNATURE_OVERHEAD)
    }

    /// Applies the header fee policy once every content field is final.
    ///
    /// Flat policy keeps the fee as given; otherwise the fee is
    /// `fee_per_byte × size`, floored at the network minimum.
    pub fn apply_fee_policy(&mut self, header: &TxnHeader) -> Result<(), TxnError> {
        if header.flat_fee {
            self.fee = header.fee;
            return Ok(());
        }
        let size = self.estimate_size()?;
        self.fee = header
            .fee_per_byte
            .saturating_mul(size)
            .max(header.min_fee);
        Ok(())
    }

    pub fn is_grouped(&self) -> bool {
        !self.group.is_zero()
    }
}
