use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use super::ContractDescriptor;
use crate::cache::{Cache, InMemoryBackend};
use crate::persist::write_atomic;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("无法读取合约描述 {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("合约描述 {path} 解析失败: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("合约描述序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("无法写回合约描述 {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("写回任务异常退出: {0}")]
    Join(String),
}

/// 按规范化路径缓存合约描述；写入走单写者锁并在落盘后失效缓存。
#[derive(Default)]
pub struct DescriptorStore {
    cache: Cache<InMemoryBackend<PathBuf, ContractDescriptor>>,
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    pub async fn load(&self, path: &Path) -> Result<Arc<ContractDescriptor>, DescriptorError> {
        let key = Self::key(path);
        self.cache
            .load_or_fetch(key, |key| {
                let key = key.clone();
                async move { read_descriptor(&key).await }
            })
            .await
    }

    /// 回填并持久化 `network` 的 app id，返回写入后的描述。
    pub async fn record_app_id(
        &self,
        path: &Path,
        network: &str,
        app_id: u64,
    ) -> Result<Arc<ContractDescriptor>, DescriptorError> {
        let key = Self::key(path);
        let _guard = self.cache.lock_for_write(&key).await;

        let mut descriptor = read_descriptor(&key).await?;
        let previous = descriptor.networks.get(network).map(|info| info.app_id);
        descriptor.set_app_id(network, app_id);
        let contents = descriptor.to_json_pretty()?;

        let target = key.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, contents.as_bytes()))
            .await
            .map_err(|err| DescriptorError::Join(err.to_string()))?
            .map_err(|source| DescriptorError::Persist {
                path: key.clone(),
                source,
            })?;

        self.cache.invalidate(&key).await;
        info!(
            target: "abi::store",
            path = %key.display(),
            network,
            app_id,
            previous = ?previous,
            "合约 app id 已回写"
        );
        Ok(Arc::new(descriptor))
    }

    pub async fn invalidate(&self, path: &Path) {
        self.cache.invalidate(&Self::key(path)).await;
    }
}

async fn read_descriptor(path: &Path) -> Result<ContractDescriptor, DescriptorError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let descriptor =
        ContractDescriptor::from_json(&raw).map_err(|source| DescriptorError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    debug!(
        target: "abi::store",
        path = %path.display(),
        methods = descriptor.methods.len(),
        "已从磁盘加载合约描述"
    );
    Ok(descriptor)
}
