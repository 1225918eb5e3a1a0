//! ポート定義

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// プロトコル種別
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    /// 文字列からProtocolをパース
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            _ => None,
        }
    }

    /// Docker APIで使用する文字列に変換
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// ホスト側ポートの指定方法
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPort {
    /// エンジンが空きポートを割り当てる（記録しない）
    Dynamic,
    /// 固定ポート
    Fixed(u16),
    /// エンジンが割り当てたポートを指定の名前で公開する
    Symbolic(String),
}

/// ポート指定
///
/// 書式: `[bind-ip:]host:container[/protocol]` または `container[/protocol]`
///
/// - `8080` → コンテナポートのみ（ホストポートは動的）
/// - `9090:8080` → 固定マッピング
/// - `web.port:8080` → 動的ポートを `web.port` として公開
/// - `127.0.0.1:web.port:8080/tcp` → バインドIP付き
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub bind_ip: Option<String>,
    pub host: HostPort,
    pub container: u16,
    pub protocol: Protocol,
}

impl PortSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = |reason: &str| ConfigError::InvalidPortSpec {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(invalid("空のポート指定です"));
        }

        let (mapping, protocol) = match trimmed.rsplit_once('/') {
            Some((mapping, proto)) => (
                mapping,
                Protocol::parse(proto).ok_or_else(|| invalid("プロトコルは tcp か udp です"))?,
            ),
            None => (trimmed, Protocol::Tcp),
        };

        let parts: Vec<&str> = mapping.split(':').collect();
        let (bind_ip, host_part, container_part) = match parts.as_slice() {
            [container] => (None, None, *container),
            [host, container] => (None, Some(*host), *container),
            [ip, host, container] => (Some(ip.to_string()), Some(*host), *container),
            _ => return Err(invalid("':' 区切りの要素が多すぎます")),
        };

        let container = container_part
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| invalid("コンテナポートは1〜65535の数値です"))?;

        let host = match host_part {
            None | Some("") => HostPort::Dynamic,
            Some(h) => match h.parse::<u16>() {
                Ok(port) => HostPort::Fixed(port),
                Err(_) if is_property_name(h) => HostPort::Symbolic(h.to_string()),
                Err(_) => return Err(invalid("ホストポートは数値か名前です")),
            },
        };

        Ok(Self {
            bind_ip: bind_ip.filter(|ip| !ip.is_empty()),
            host,
            container,
            protocol,
        })
    }

    /// Docker APIのポートキー（例: `8080/tcp`）
    pub fn docker_key(&self) -> String {
        format!("{}/{}", self.container, self.protocol.as_str())
    }

    /// シンボリック名（あれば）
    pub fn symbolic_name(&self) -> Option<&str> {
        match &self.host {
            HostPort::Symbolic(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ip) = &self.bind_ip {
            write!(f, "{}:", ip)?;
        }
        match &self.host {
            HostPort::Dynamic => {}
            HostPort::Fixed(port) => write!(f, "{}:", port)?,
            HostPort::Symbolic(name) => write!(f, "{}:", name)?,
        }
        write!(f, "{}/{}", self.container, self.protocol.as_str())
    }
}

fn is_property_name(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && s.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}
