//! ネットワーク定義

use serde::{Deserialize, Serialize};
use std::fmt;

/// カスタムネットワークに必要な最小Docker APIバージョン
pub const CUSTOM_NETWORK_API_VERSION: &str = "1.21";

/// ネットワークモード
///
/// `bridge` / `host` / `none` / `container:<name>` 以外はカスタムネットワーク名として扱う。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NetworkMode {
    #[default]
    Bridge,
    Host,
    None,
    /// 他コンテナのネットワーク名前空間を共有
    Container(String),
    /// ユーザー定義ネットワーク
    Custom(String),
}

impl NetworkMode {
    /// 文字列からパース
    pub fn parse(s: &str) -> Self {
        match s {
            "" | "bridge" | "default" => Self::Bridge,
            "host" => Self::Host,
            "none" => Self::None,
            other => match other.strip_prefix("container:") {
                Some(name) => Self::Container(name.to_string()),
                None => Self::Custom(other.to_string()),
            },
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }

    /// Docker APIの `HostConfig.NetworkMode` に渡す文字列
    pub fn as_docker_str(&self) -> String {
        match self {
            Self::Bridge => "bridge".to_string(),
            Self::Host => "host".to_string(),
            Self::None => "none".to_string(),
            Self::Container(name) => format!("container:{}", name),
            Self::Custom(name) => name.clone(),
        }
    }

    /// カスタムネットワーク名（カスタムでなければ None）
    pub fn custom_name(&self) -> Option<&str> {
        match self {
            Self::Custom(name) => Some(name),
            _ => None,
        }
    }
}

impl From<String> for NetworkMode {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<NetworkMode> for String {
    fn from(mode: NetworkMode) -> Self {
        mode.as_docker_str()
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_docker_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_network_modes() {
        assert_eq!(NetworkMode::parse("bridge"), NetworkMode::Bridge);
        assert_eq!(NetworkMode::parse("host"), NetworkMode::Host);
        assert_eq!(NetworkMode::parse("none"), NetworkMode::None);
        assert_eq!(
            NetworkMode::parse("container:db"),
            NetworkMode::Container("db".to_string())
        );
        assert_eq!(
            NetworkMode::parse("it-net"),
            NetworkMode::Custom("it-net".to_string())
        );
    }

    #[test]
    fn test_only_custom_network_is_custom() {
        assert!(NetworkMode::parse("it-net").is_custom());
        assert!(!NetworkMode::parse("container:db").is_custom());
        assert!(!NetworkMode::Bridge.is_custom());
    }

    #[test]
    fn test_docker_str_roundtrip() {
        for s in ["bridge", "host", "none", "container:web", "backend"] {
            assert_eq!(NetworkMode::parse(s).as_docker_str(), s);
        }
    }
}
