use super::AbiError;
use super::types::{AbiType, bool_run};
use crate::txn::Address;

const LENGTH_PREFIX: usize = 2;
const BOOL_TRUE: u8 = 0x80;

/// ARC-4 值；编码方式由配对的 [`AbiType`] 决定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    /// `uintN` / `ufixedNxM`，超过 128 位的类型高位补零。
    Uint(u128),
    Byte(u8),
    Bool(bool),
    Address(Address),
    String(String),
    /// `byte[N]` / `byte[]` 的紧凑形式。
    Bytes(Vec<u8>),
    Array(Vec<AbiValue>),
    Tuple(Vec<AbiValue>),
}

impl From<u64> for AbiValue {
    fn from(value: u64) -> Self {
        AbiValue::Uint(value as u128)
    }
}

impl From<bool> for AbiValue {
    fn from(value: bool) -> Self {
        AbiValue::Bool(value)
    }
}

impl From<Address> for AbiValue {
    fn from(value: Address) -> Self {
        AbiValue::Address(value)
    }
}

impl From<&str> for AbiValue {
    fn from(value: &str) -> Self {
        AbiValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for AbiValue {
    fn from(value: Vec<u8>) -> Self {
        AbiValue::Bytes(value)
    }
}

impl AbiValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AbiValue::Uint(value) => u64::try_from(*value).ok(),
            AbiValue::Byte(value) => Some(*value as u64),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&[AbiValue]> {
        match self {
            AbiValue::Array(items) | AbiValue::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// 列表中的 `Bytes` 展开为逐字节的 `Byte` 值。
    fn expand_items(&self, ty: &AbiType) -> Result<Vec<AbiValue>, AbiError> {
        match self {
            AbiValue::Array(items) | AbiValue::Tuple(items) => Ok(items.clone()),
            AbiValue::Bytes(bytes) => Ok(bytes.iter().copied().map(AbiValue::Byte).collect()),
            other => Err(mismatch(ty, other)),
        }
    }
}

fn mismatch(ty: &AbiType, value: &AbiValue) -> AbiError {
    AbiError::TypeMismatch {
        expected: ty.to_string(),
        actual: format!("{value:?}"),
    }
}

pub fn encode(ty: &AbiType, value: &AbiValue) -> Result<Vec<u8>, AbiError> {
    match (ty, value) {
        (AbiType::Uint(bits) | AbiType::Ufixed { bits, .. }, AbiValue::Uint(raw)) => {
            encode_uint(*bits, *raw)
        }
        (AbiType::Uint(8), AbiValue::Byte(raw)) => Ok(vec![*raw]),
        (AbiType::Byte, AbiValue::Byte(raw)) => Ok(vec![*raw]),
        (AbiType::Byte, AbiValue::Uint(raw)) if *raw <= u8::MAX as u128 => Ok(vec![*raw as u8]),
        (AbiType::Bool, AbiValue::Bool(flag)) => Ok(vec![if *flag { BOOL_TRUE } else { 0 }]),
        (AbiType::Address, AbiValue::Address(address)) => Ok(address.as_bytes().to_vec()),
        (AbiType::Address, AbiValue::Bytes(raw)) if raw.len() == 32 => Ok(raw.clone()),
        (AbiType::String, AbiValue::String(text)) => with_length_prefix(text.len(), text.as_bytes()),
        (AbiType::StaticArray(inner, len), _) => {
            let items = value.expand_items(ty)?;
            if items.len() != *len {
                return Err(AbiError::Encoding(format!(
                    "`{ty}` expects {len} elements, got {}",
                    items.len()
                )));
            }
            encode_tuple(&vec![(**inner).clone(); *len], &items)
        }
        (AbiType::DynamicArray(inner), _) => {
            let items = value.expand_items(ty)?;
            let body = encode_tuple(&vec![(**inner).clone(); items.len()], &items)?;
            with_length_prefix(items.len(), &body)
        }
        (AbiType::Tuple(types), AbiValue::Tuple(items) | AbiValue::Array(items)) => {
            if types.len() != items.len() {
                return Err(AbiError::Encoding(format!(
                    "`{ty}` expects {} elements, got {}",
                    types.len(),
                    items.len()
                )));
            }
            encode_tuple(types, items)
        }
        _ => Err(mismatch(ty, value)),
    }
}

fn encode_uint(bits: u16, raw: u128) -> Result<Vec<u8>, AbiError> {
    let width = bits as usize / 8;
    if bits < 128 && raw >> bits != 0 {
        return Err(AbiError::Encoding(format!("{raw} overflows uint{bits}")));
    }
    let be = raw.to_be_bytes();
    let mut out = vec![0u8; width];
    if width >= be.len() {
        out[width - be.len()..].copy_from_slice(&be);
    } else {
        out.copy_from_slice(&be[be.len() - width..]);
    }
    Ok(out)
}

fn with_length_prefix(len: usize, body: &[u8]) -> Result<Vec<u8>, AbiError> {
    let len = u16::try_from(len)
        .map_err(|_| AbiError::Encoding(format!("length {len} exceeds u16 prefix")))?;
    let mut out = Vec::with_capacity(LENGTH_PREFIX + body.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(body);
    Ok(out)
}

/// head/tail 布局：静态成员内联，动态成员在 head 中写入 u16 偏移。
pub fn encode_tuple(types: &[AbiType], values: &[AbiValue]) -> Result<Vec<u8>, AbiError> {
    if types.len() != values.len() {
        return Err(AbiError::Encoding(format!(
            "tuple arity {} does not match {} values",
            types.len(),
            values.len()
        )));
    }

    let mut heads: Vec<Vec<u8>> = Vec::new();
    let mut tails: Vec<Vec<u8>> = Vec::new();
    let mut dynamic: Vec<bool> = Vec::new();

    let mut i = 0usize;
    while i < types.len() {
        if types[i] == AbiType::Bool {
            let run = bool_run(types, i).min(8);
            let mut packed = 0u8;
            for (bit, value) in values[i..i + run].iter().enumerate() {
                match value {
                    AbiValue::Bool(true) => packed |= BOOL_TRUE >> bit,
                    AbiValue::Bool(false) => {}
                    other => return Err(mismatch(&AbiType::Bool, other)),
                }
            }
            heads.push(vec![packed]);
            tails.push(Vec::new());
            dynamic.push(false);
            i += run;
            continue;
        }

        let encoded = encode(&types[i], &values[i])?;
        if types[i].is_dynamic() {
            heads.push(vec![0, 0]);
            tails.push(encoded);
            dynamic.push(true);
        } else {
            heads.push(encoded);
            tails.push(Vec::new());
            dynamic.push(false);
        }
        i += 1;
    }

    let head_len: usize = heads.iter().map(Vec::len).sum();
    let mut offset = head_len;
    for (idx, is_dynamic) in dynamic.iter().enumerate() {
        if *is_dynamic {
            let pointer = u16::try_from(offset)
                .map_err(|_| AbiError::Encoding(format!("tuple offset {offset} exceeds u16")))?;
            heads[idx] = pointer.to_be_bytes().to_vec();
        }
        offset += tails[idx].len();
    }

    let mut out = Vec::with_capacity(offset);
    for head in &heads {
        out.extend_from_slice(head);
    }
    for tail in &tails {
        out.extend_from_slice(tail);
    }
    Ok(out)
}

pub fn decode(ty: &AbiType, bytes: &[u8]) -> Result<AbiValue, AbiError> {
    match ty {
        AbiType::Uint(bits) | AbiType::Ufixed { bits, .. } => decode_uint(*bits, bytes),
        AbiType::Byte => match bytes {
            [raw] => Ok(AbiValue::Byte(*raw)),
            _ => Err(width_error(ty, 1, bytes.len())),
        },
        AbiType::Bool => match bytes {
            [BOOL_TRUE] => Ok(AbiValue::Bool(true)),
            [0] => Ok(AbiValue::Bool(false)),
            _ => Err(AbiError::Decoding(format!("invalid bool encoding {bytes:02x?}"))),
        },
        AbiType::Address => {
            let raw: [u8; 32] = bytes
                .try_into()
                .map_err(|_| width_error(ty, 32, bytes.len()))?;
            Ok(AbiValue::Address(Address(raw)))
        }
        AbiType::String => {
            let body = strip_length_prefix(bytes, 1)?;
            let text = String::from_utf8(body.to_vec())
                .map_err(|err| AbiError::Decoding(format!("string is not utf-8: {err}")))?;
            Ok(AbiValue::String(text))
        }
        AbiType::StaticArray(inner, len) => {
            let items = decode_tuple(&vec![(**inner).clone(); *len], bytes)?;
            Ok(collapse_bytes(inner, items))
        }
        AbiType::DynamicArray(inner) => {
            if bytes.len() < LENGTH_PREFIX {
                return Err(AbiError::Decoding("missing array length prefix".into()));
            }
            let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
            let items = decode_tuple(&vec![(**inner).clone(); len], &bytes[LENGTH_PREFIX..])?;
            Ok(collapse_bytes(inner, items))
        }
        AbiType::Tuple(types) => Ok(AbiValue::Tuple(decode_tuple(types, bytes)?)),
    }
}

fn width_error(ty: &AbiType, expected: usize, actual: usize) -> AbiError {
    AbiError::Decoding(format!("`{ty}` needs {expected} bytes, got {actual}"))
}

fn collapse_bytes(inner: &AbiType, items: Vec<AbiValue>) -> AbiValue {
    if *inner != AbiType::Byte {
        return AbiValue::Array(items);
    }
    let bytes = items
        .iter()
        .filter_map(|item| match item {
            AbiValue::Byte(raw) => Some(*raw),
            _ => None,
        })
        .collect();
    AbiValue::Bytes(bytes)
}

fn decode_uint(bits: u16, bytes: &[u8]) -> Result<AbiValue, AbiError> {
    let width = bits as usize / 8;
    if bytes.len() != width {
        return Err(AbiError::Decoding(format!(
            "uint{bits} needs {width} bytes, got {}",
            bytes.len()
        )));
    }
    let significant = width.saturating_sub(16);
    if bytes[..significant].iter().any(|byte| *byte != 0) {
        return Err(AbiError::Decoding(format!("uint{bits} value exceeds 128 bits")));
    }
    let value = bytes[significant..]
        .iter()
        .fold(0u128, |acc, byte| (acc << 8) | *byte as u128);
    Ok(AbiValue::Uint(value))
}

fn strip_length_prefix(bytes: &[u8], element_width: usize) -> Result<&[u8], AbiError> {
    if bytes.len() < LENGTH_PREFIX {
        return Err(AbiError::Decoding("missing length prefix".into()));
    }
    let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    let body = &bytes[LENGTH_PREFIX..];
    if body.len() != len * element_width {
        return Err(AbiError::Decoding(format!(
            "length prefix {len} does not match {} body bytes",
            body.len()
        )));
    }
    Ok(body)
}

fn take(bytes: &[u8], cursor: usize, len: usize) -> Result<&[u8], AbiError> {
    bytes
        .get(cursor..cursor + len)
        .ok_or_else(|| AbiError::Decoding(format!("tuple truncated at byte {cursor}")))
}

pub fn decode_tuple(types: &[AbiType], bytes: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
    enum Slot {
        Static(AbiValue),
        Dynamic(usize),
    }

    let mut slots: Vec<Slot> = Vec::with_capacity(types.len());
    let mut cursor = 0usize;
    let mut i = 0usize;

    while i < types.len() {
        if types[i] == AbiType::Bool {
            let run = bool_run(types, i).min(8);
            let packed = take(bytes, cursor, 1)?[0];
            for bit in 0..run {
                slots.push(Slot::Static(AbiValue::Bool(packed & (BOOL_TRUE >> bit) != 0)));
            }
            cursor += 1;
            i += run;
            continue;
        }
        if types[i].is_dynamic() {
            let raw = take(bytes, cursor, LENGTH_PREFIX)?;
            slots.push(Slot::Dynamic(u16::from_be_bytes([raw[0], raw[1]]) as usize));
            cursor += LENGTH_PREFIX;
        } else {
            let len = types[i].static_len()?;
            slots.push(Slot::Static(decode(&types[i], take(bytes, cursor, len)?)?));
            cursor += len;
        }
        i += 1;
    }

    let offsets: Vec<usize> = slots
        .iter()
        .filter_map(|slot| match slot {
            Slot::Dynamic(offset) => Some(*offset),
            Slot::Static(_) => None,
        })
        .collect();
    if offsets.is_empty() && cursor != bytes.len() {
        return Err(AbiError::Decoding(format!(
            "{} trailing bytes after static tuple",
            bytes.len() - cursor
        )));
    }

    let mut values = Vec::with_capacity(slots.len());
    let mut dynamic_idx = 0usize;
    for (ty, slot) in types.iter().zip(slots) {
        match slot {
            Slot::Static(value) => values.push(value),
            Slot::Dynamic(start) => {
                let end = offsets
                    .get(dynamic_idx + 1)
                    .copied()
                    .unwrap_or(bytes.len());
                if start > end || end > bytes.len() {
                    return Err(AbiError::Decoding(format!(
                        "invalid dynamic offset {start}..{end}"
                    )));
                }
                values.push(decode(ty, &bytes[start..end])?);
                dynamic_idx += 1;
            }
        }
    }
    Ok(values)
}
