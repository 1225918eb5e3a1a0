//! グループ定義ファイルのロード
//!
//! ファイル発見とパースを統合

use crate::error::{ConfigError, Result};
use crate::model::ContainerGroup;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// 設定ファイルパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "SHIPYARD_CONFIG_PATH";

/// 探索するファイル名（優先順）
const CANDIDATES: &[&str] = &[
    "shipyard.local.yaml",
    ".shipyard.local.yaml",
    "shipyard.yaml",
    ".shipyard.yaml",
    "shipyard.yml",
    "shipyard.json",
];

/// グループ定義ファイルを探す
///
/// 以下の優先順位で検索:
/// 1. 環境変数 SHIPYARD_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: shipyard.local.yaml, .shipyard.local.yaml, shipyard.yaml, ...
pub fn find_group_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        debug!(path = %path.display(), "SHIPYARD_CONFIG_PATH points to a missing file");
    }

    let current_dir = std::env::current_dir()?;
    find_group_file_in(&current_dir)
}

/// 指定ディレクトリからグループ定義ファイルを探す
pub fn find_group_file_in(dir: &Path) -> Result<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| ConfigError::GroupFileNotFound(dir.to_path_buf()))
}

/// グループ定義ファイルをロードして検証
///
/// 拡張子が `.json` ならJSON、それ以外はYAMLとして読む。
/// グループ名が空の場合はファイルのあるディレクトリ名を使う。
#[instrument(skip(path), fields(path = %path.display()))]
pub fn load_group(path: &Path) -> Result<ContainerGroup> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::InvalidConfig(format!("{} を読み込めません: {}", path.display(), e))
    })?;

    let mut group = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_group_json(&content)?,
        _ => parse_group_yaml(&content)?,
    };

    if group.name.is_empty() {
        group.name = path
            .canonicalize()
            .ok()
            .as_deref()
            .and_then(Path::parent)
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("default")
            .to_string();
    }

    group.validate()?;
    info!(
        group = %group.name,
        containers = group.containers.len(),
        "Container group loaded"
    );
    Ok(group)
}

pub fn parse_group_yaml(content: &str) -> Result<ContainerGroup> {
    Ok(serde_yaml::from_str(content)?)
}

pub fn parse_group_json(content: &str) -> Result<ContainerGroup> {
    Ok(serde_json::from_str(content)?)
}
