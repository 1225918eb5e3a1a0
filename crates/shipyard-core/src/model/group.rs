//! コンテナグループ定義

use super::container::ContainerSpec;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 1回の実行で一緒に起動するコンテナの集合
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerGroup {
    pub name: String,
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

impl ContainerGroup {
    pub fn new(name: impl Into<String>, containers: Vec<ContainerSpec>) -> Self {
        Self {
            name: name.into(),
            containers,
        }
    }

    pub fn get(&self, alias: &str) -> Option<&ContainerSpec> {
        self.containers.iter().find(|c| c.alias == alias)
    }

    /// skip指定されていないコンテナ
    pub fn active(&self) -> impl Iterator<Item = &ContainerSpec> {
        self.containers.iter().filter(|c| !c.skip)
    }

    /// エイリアスの一意性と依存先の存在を検証
    ///
    /// skip指定のコンテナも依存先として有効。
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.containers {
            if spec.alias.is_empty() {
                return Err(ConfigError::InvalidConfig(format!(
                    "イメージ '{}' のエイリアスが空です",
                    spec.image
                )));
            }
            if !seen.insert(spec.alias.as_str()) {
                return Err(ConfigError::DuplicateAlias(spec.alias.clone()));
            }
        }

        for spec in &self.containers {
            for dependency in &spec.depends_on {
                if dependency == &spec.alias {
                    return Err(ConfigError::SelfDependency(spec.alias.clone()));
                }
                if !seen.contains(dependency.as_str()) {
                    return Err(ConfigError::UnknownDependency {
                        alias: spec.alias.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
