use std::fmt;
use std::str::FromStr;

use super::AbiError;

/// ARC-4 值类型。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiType {
    Uint(u16),
    Ufixed { bits: u16, precision: u8 },
    Byte,
    Bool,
    Address,
    String,
    StaticArray(Box<AbiType>, usize),
    DynamicArray(Box<AbiType>),
    Tuple(Vec<AbiType>),
}

/// 以外部数组下标传递的引用参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceType {
    Account,
    Asset,
    Application,
}

/// 以同组前置交易传递的参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnArgType {
    Any,
    Pay,
    Keyreg,
    Acfg,
    Axfer,
    Afrz,
    Appl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgType {
    Value(AbiType),
    Reference(ReferenceType),
    Transaction(TxnArgType),
}

impl AbiType {
    pub fn is_dynamic(&self) -> bool {
        match self {
            AbiType::String | AbiType::DynamicArray(_) => true,
            AbiType::StaticArray(inner, _) => inner.is_dynamic(),
            AbiType::Tuple(items) => items.iter().any(AbiType::is_dynamic),
            _ => false,
        }
    }

    /// 静态类型的编码字节长度；连续 bool 按位打包。
    pub fn static_len(&self) -> Result<usize, AbiError> {
        match self {
            AbiType::Uint(bits) | AbiType::Ufixed { bits, .. } => Ok(*bits as usize / 8),
            AbiType::Byte | AbiType::Bool => Ok(1),
            AbiType::Address => Ok(32),
            AbiType::StaticArray(inner, len) => {
                if **inner == AbiType::Bool {
                    Ok(len.div_ceil(8))
                } else {
                    Ok(inner.static_len()? * len)
                }
            }
            AbiType::Tuple(items) => {
                let mut total = 0usize;
                let mut i = 0usize;
                while i < items.len() {
                    if items[i] == AbiType::Bool {
                        let run = bool_run(items, i);
                        total += run.div_ceil(8);
                        i += run;
                    } else {
                        total += items[i].static_len()?;
                        i += 1;
                    }
                }
                Ok(total)
            }
            AbiType::String | AbiType::DynamicArray(_) => {
                Err(AbiError::Encoding(format!("`{self}` has no static length")))
            }
        }
    }
}

/// 从 `start` 起连续 bool 的个数。
pub(crate) fn bool_run(items: &[AbiType], start: usize) -> usize {
    items[start..]
        .iter()
        .take_while(|item| **item == AbiType::Bool)
        .count()
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiType::Uint(bits) => write!(f, "uint{bits}"),
            AbiType::Ufixed { bits, precision } => write!(f, "ufixed{bits}x{precision}"),
            AbiType::Byte => f.write_str("byte"),
            AbiType::Bool => f.write_str("bool"),
            AbiType::Address => f.write_str("address"),
            AbiType::String => f.write_str("string"),
            AbiType::StaticArray(inner, len) => write!(f, "{inner}[{len}]"),
            AbiType::DynamicArray(inner) => write!(f, "{inner}[]"),
            AbiType::Tuple(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

impl FromStr for AbiType {
    type Err = AbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_value_type(s.trim())
    }
}

fn invalid(raw: &str) -> AbiError {
    AbiError::InvalidType(raw.to_string())
}

fn parse_value_type(raw: &str) -> Result<AbiType, AbiError> {
    if raw.is_empty() {
        return Err(invalid(raw));
    }
    if let Some(prefix) = raw.strip_suffix("[]") {
        return Ok(AbiType::DynamicArray(Box::new(parse_value_type(prefix)?)));
    }
    if raw.ends_with(']') {
        let open = raw.rfind('[').ok_or_else(|| invalid(raw))?;
        let len: usize = raw[open + 1..raw.len() - 1]
            .parse()
            .map_err(|_| invalid(raw))?;
        return Ok(AbiType::StaticArray(
            Box::new(parse_value_type(&raw[..open])?),
            len,
        ));
    }
    if raw.starts_with('(') {
        if !raw.ends_with(')') {
            return Err(invalid(raw));
        }
        let inner = &raw[1..raw.len() - 1];
        let items = split_tuple(inner)?
            .into_iter()
            .map(parse_value_type)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(AbiType::Tuple(items));
    }
    match raw {
        "byte" => return Ok(AbiType::Byte),
        "bool" => return Ok(AbiType::Bool),
        "address" => return Ok(AbiType::Address),
        "string" => return Ok(AbiType::String),
        _ => {}
    }
    if let Some(bits) = raw.strip_prefix("uint") {
        let bits: u16 = bits.parse().map_err(|_| invalid(raw))?;
        if bits == 0 || bits > 512 || bits % 8 != 0 {
            return Err(invalid(raw));
        }
        return Ok(AbiType::Uint(bits));
    }
    if let Some(rest) = raw.strip_prefix("ufixed") {
        let (bits, precision) = rest.split_once('x').ok_or_else(|| invalid(raw))?;
        let bits: u16 = bits.parse().map_err(|_| invalid(raw))?;
        let precision: u8 = precision.parse().map_err(|_| invalid(raw))?;
        if bits == 0 || bits > 512 || bits % 8 != 0 || precision == 0 || precision > 160 {
            return Err(invalid(raw));
        }
        return Ok(AbiType::Ufixed { bits, precision });
    }
    Err(invalid(raw))
}

/// 按顶层逗号切分元组成员；空元组返回空列表。
fn split_tuple(inner: &str) -> Result<Vec<&str>, AbiError> {
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (idx, ch) in inner.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(invalid(inner));
                }
            }
            ',' if depth == 0 => {
                parts.push(&inner[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(invalid(inner));
    }
    parts.push(&inner[start..]);
    if parts.iter().any(|part| part.is_empty()) {
        return Err(invalid(inner));
    }
    Ok(parts)
}

impl TxnArgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxnArgType::Any => "txn",
            TxnArgType::Pay => "pay",
            TxnArgType::Keyreg => "keyreg",
            TxnArgType::Acfg => "acfg",
            TxnArgType::Axfer => "axfer",
            TxnArgType::Afrz => "afrz",
            TxnArgType::Appl => "appl",
        }
    }

    pub fn accepts(&self, kind: crate::txn::TxType) -> bool {
        use crate::txn::TxType;
        match self {
            TxnArgType::Any => true,
            TxnArgType::Pay => kind == TxType::Payment,
            TxnArgType::Acfg => kind == TxType::AssetConfig,
            TxnArgType::Axfer => kind == TxType::AssetTransfer,
            TxnArgType::Appl => kind == TxType::ApplicationCall,
            TxnArgType::Keyreg | TxnArgType::Afrz => false,
        }
    }
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Account => "account",
            ReferenceType::Asset => "asset",
            ReferenceType::Application => "application",
        }
    }
}

impl FromStr for ArgType {
    type Err = AbiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let txn = match raw {
            "txn" => Some(TxnArgType::Any),
            "pay" => Some(TxnArgType::Pay),
            "keyreg" => Some(TxnArgType::Keyreg),
            "acfg" => Some(TxnArgType::Acfg),
            "axfer" => Some(TxnArgType::Axfer),
            "afrz" => Some(TxnArgType::Afrz),
            "appl" => Some(TxnArgType::Appl),
            _ => None,
        };
        if let Some(kind) = txn {
            return Ok(ArgType::Transaction(kind));
        }
        let reference = match raw {
            "account" => Some(ReferenceType::Account),
            "asset" => Some(ReferenceType::Asset),
            "application" => Some(ReferenceType::Application),
            _ => None,
        };
        if let Some(kind) = reference {
            return Ok(ArgType::Reference(kind));
        }
        Ok(ArgType::Value(parse_value_type(raw)?))
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgType::Value(ty) => write!(f, "{ty}"),
            ArgType::Reference(kind) => f.write_str(kind.as_str()),
            ArgType::Transaction(kind) => f.write_str(kind.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_types_and_prints_canonically() {
        let raw = "(uint64,(bool,byte[]),address[2])[]";
        let ty: AbiType = raw.parse().expect("parse");
        assert_eq!(ty.to_string(), raw);
        assert!(ty.is_dynamic());
    }

    #[test]
    fn rejects_malformed_types() {
        for raw in ["uint7", "uint0", "uint520", "(uint64", "uint64[x]", "(,)", "float", ""] {
            assert!(raw.parse::<AbiType>().is_err(), "{raw} should fail");
        }
    }

    #[test]
    fn static_length_packs_consecutive_bools() {
        let ty: AbiType = "(bool,bool,bool,uint64,bool)".parse().expect("parse");
        assert_eq!(ty.static_len().expect("len"), 1 + 8 + 1);
        let ty: AbiType = "bool[9]".parse().expect("parse");
        assert_eq!(ty.static_len().expect("len"), 2);
    }

    #[test]
    fn reference_and_transaction_arguments_are_recognised() {
        assert_eq!(
            "asset".parse::<ArgType>().expect("parse"),
            ArgType::Reference(ReferenceType::Asset)
        );
        assert_eq!(
            "axfer".parse::<ArgType>().expect("parse"),
            ArgType::Transaction(TxnArgType::Axfer)
        );
        assert_eq!(
            "uint64[]".parse::<ArgType>().expect("parse"),
            ArgType::Value(AbiType::DynamicArray(Box::new(AbiType::Uint(64))))
        );
    }
}
