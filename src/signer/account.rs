use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use zeroize::Zeroizing;

use crate::txn::{Address, Signature, SignedTransaction, Transaction};

use super::SignerError;

/// ed25519 账户；私钥只在内存中保存，`Debug` 不输出任何密钥材料。
#[derive(Clone)]
pub struct Account {
    signing_key: SigningKey,
    address: Address,
}

impl Account {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let seed = Zeroizing::new(seed);
        let signing_key = SigningKey::from_bytes(&seed);
        let address = Address(signing_key.verifying_key().to_bytes());
        Self {
            signing_key,
            address,
        }
    }

    pub fn generate() -> Self {
        let seed = Zeroizing::new(rand::random::<[u8; 32]>());
        Self::from_seed(*seed)
    }

    /// 支持 JSON 字节数组、逗号分隔的字节列表，以及 base64 编码的
    /// 32 字节种子或 64 字节 `seed || pubkey`。
    pub fn from_secret_str(raw: &str) -> Result<Self, SignerError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SignerError::InvalidSecret("私钥为空".into()));
        }

        let bytes: Zeroizing<Vec<u8>> = if trimmed.starts_with('[') {
            Zeroizing::new(
                serde_json::from_str::<Vec<u8>>(trimmed)
                    .map_err(|err| SignerError::InvalidSecret(format!("JSON 字节数组非法: {err}")))?,
            )
        } else if trimmed.contains(',') {
            let parsed: Result<Vec<u8>, _> = trimmed
                .split(',')
                .map(|part| part.trim().parse::<u8>())
                .collect();
            Zeroizing::new(
                parsed.map_err(|err| SignerError::InvalidSecret(format!("字节列表非法: {err}")))?,
            )
        } else {
            Zeroizing::new(
                BASE64
                    .decode(trimmed)
                    .map_err(|err| SignerError::InvalidSecret(format!("base64 非法: {err}")))?,
            )
        };

        Self::from_secret_bytes(&bytes)
    }

    fn from_secret_bytes(bytes: &[u8]) -> Result<Self, SignerError> {
        match bytes.len() {
            32 => {
                let mut seed = Zeroizing::new([0u8; 32]);
                seed.copy_from_slice(bytes);
                Ok(Self::from_seed(*seed))
            }
            64 => {
                let mut seed = Zeroizing::new([0u8; 32]);
                seed.copy_from_slice(&bytes[..32]);
                let account = Self::from_seed(*seed);
                if account.address.as_bytes()[..] != bytes[32..] {
                    return Err(SignerError::InvalidSecret(
                        "64 字节私钥的公钥部分与种子不匹配".into(),
                    ));
                }
                Ok(account)
            }
            other => Err(SignerError::InvalidSecret(format!(
                "私钥长度应为 32 或 64 字节，实际 {other}"
            ))),
        }
    }

    /// base64 编码的 32 字节种子，与 `from_secret_str` 互逆。
    pub fn export_seed(&self) -> Zeroizing<String> {
        let seed = Zeroizing::new(self.signing_key.to_bytes());
        Zeroizing::new(BASE64.encode(*seed))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sign_bytes(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }

    pub fn sign_transaction(&self, txn: Transaction) -> Result<SignedTransaction, SignerError> {
        let message = txn.bytes_to_sign()?;
        let signature = self.sign_bytes(&message);
        Ok(SignedTransaction::with_signature(txn, signature))
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// 用地址对应的公钥校验 ed25519 签名。
pub fn verify_signature(
    signer: &Address,
    message: &[u8],
    signature: &Signature,
) -> Result<(), SignerError> {
    let key = VerifyingKey::from_bytes(signer.as_bytes())
        .map_err(|_| SignerError::InvalidSignature { signer: *signer })?;
    let signature = ed25519_dalek::Signature::from_bytes(&signature.0);
    key.verify_strict(message, &signature)
        .map_err(|_| SignerError::InvalidSignature { signer: *signer })
}
