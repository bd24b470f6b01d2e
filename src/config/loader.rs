use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::HarnessConfig;

pub const DEFAULT_CONFIG_PATHS: &[&str] = &["jina.toml", "config/jina.toml"];

pub const ENV_ALGOD_ADDRESS: &str = "JINA_ALGOD_ADDRESS";
pub const ENV_ALGOD_TOKEN: &str = "JINA_ALGOD_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// 显式路径必须可读；未指定时取第一个存在的默认位置，都没有则用内置默认值。
/// 文件内容之上再叠加环境变量。
pub fn load_config(path: Option<PathBuf>) -> Result<HarnessConfig, ConfigError> {
    let source = path.or_else(|| {
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.is_file())
    });
    let mut config = match source {
        Some(path) => parse_file(&path)?,
        None => HarnessConfig::default(),
    };
    apply_env_overrides(&mut config, |key| env::var(key).ok());
    Ok(config)
}

fn parse_file(path: &Path) -> Result<HarnessConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// 节点地址与令牌允许通过环境变量覆盖，空值忽略。
pub(crate) fn apply_env_overrides<F>(config: &mut HarnessConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(address) = lookup(ENV_ALGOD_ADDRESS).filter(|value| !value.trim().is_empty()) {
        config.node.address = address.trim().to_string();
    }
    if let Some(token) = lookup(ENV_ALGOD_TOKEN).filter(|value| !value.trim().is_empty()) {
        config.node.token = token.trim().to_string();
    }
}
