//! 再起動ポリシー・リソース制限・ログドライバ

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 再起動モード
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartMode {
    /// 再起動しない（デフォルト）
    #[default]
    No,
    /// 常に再起動
    Always,
    /// 異常終了時のみ再起動
    OnFailure,
    /// 明示的に停止しない限り再起動
    UnlessStopped,
}

impl RestartMode {
    /// 文字列からパース
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "no" | "" => Some(Self::No),
            "always" => Some(Self::Always),
            "on-failure" | "on_failure" => Some(Self::OnFailure),
            "unless-stopped" | "unless_stopped" => Some(Self::UnlessStopped),
            _ => None,
        }
    }

    /// Docker APIで使用する文字列に変換
    pub fn as_docker_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Always => "always",
            Self::OnFailure => "on-failure",
            Self::UnlessStopped => "unless-stopped",
        }
    }
}

/// 再起動ポリシー
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    #[serde(default)]
    pub name: RestartMode,
    /// `on-failure` 時の最大リトライ回数
    #[serde(default)]
    pub retry: u32,
}

impl RestartPolicy {
    pub fn on_failure(retry: u32) -> Self {
        Self {
            name: RestartMode::OnFailure,
            retry,
        }
    }
}

/// ulimit設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ulimit {
    pub name: String,
    #[serde(default)]
    pub soft: Option<i64>,
    #[serde(default)]
    pub hard: Option<i64>,
}

impl Ulimit {
    /// `nofile=1024:2048` 形式をパース
    pub fn parse(s: &str) -> Option<Self> {
        let (name, limits) = s.split_once('=')?;
        let (soft, hard) = match limits.split_once(':') {
            Some((soft, hard)) => (soft.parse().ok()?, hard.parse().ok()?),
            None => {
                let v = limits.parse().ok()?;
                (v, v)
            }
        };
        Some(Self {
            name: name.trim().to_string(),
            soft: Some(soft),
            hard: Some(hard),
        })
    }
}

/// ログドライバ設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDriver {
    pub name: String,
    #[serde(default)]
    pub opts: BTreeMap<String, String>,
}
