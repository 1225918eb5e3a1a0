//! 起動待機（Readiness）定義

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 起動待機設定
///
/// 複数の条件を指定した場合はOR評価（最初に満たされた条件で準備完了）。
///
/// YAML形式：
/// ```yaml
/// wait:
///   conditions:
///     - http: { url: "http://localhost:8080/health", status: "200..399" }
///     - log: { pattern: "ready to accept connections" }
///   timeout_ms: 30000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitSpec {
    #[serde(default)]
    pub conditions: Vec<WaitCondition>,
    /// 全体のタイムアウト（ミリ秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// ポーリング間隔（ミリ秒）
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// 待機に失敗したらこのコンテナを停止する
    #[serde(default)]
    pub shutdown_on_failure: bool,
    /// 待機失敗をグループ起動の失敗として扱う（false なら警告のみ）
    #[serde(default = "default_fail_on_error")]
    pub fail_on_error: bool,
}

/// 待機条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitCondition {
    /// HEADリクエストに応答が返る
    Http {
        url: String,
        #[serde(default)]
        status: Option<StatusRange>,
    },
    /// TCP接続が成功する
    Tcp {
        #[serde(default)]
        host: Option<String>,
        ports: Vec<u16>,
    },
    /// コンテナログにパターンが出現する
    Log { pattern: String },
    /// コンテナ内コマンドが終了コード0で終わる
    Exec { command: Vec<String> },
    /// 指定時間の経過
    Time { ms: u64 },
}

fn default_timeout_ms() -> u64 {
    30_000
}
fn default_interval_ms() -> u64 {
    500
}
fn default_fail_on_error() -> bool {
    true
}

impl Default for WaitSpec {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            timeout_ms: default_timeout_ms(),
            interval_ms: default_interval_ms(),
            shutdown_on_failure: false,
            fail_on_error: default_fail_on_error(),
        }
    }
}

impl WaitSpec {
    /// 単一条件の待機設定
    pub fn new(condition: WaitCondition, timeout: Duration) -> Self {
        Self {
            conditions: vec![condition],
            timeout_ms: timeout.as_millis() as u64,
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// 時間経過のみを待つ設定か
    pub fn is_time_only(&self) -> bool {
        !self.conditions.is_empty()
            && self
                .conditions
                .iter()
                .all(|c| matches!(c, WaitCondition::Time { .. }))
    }

    pub fn validate(&self) -> Result<()> {
        for condition in &self.conditions {
            match condition {
                WaitCondition::Log { pattern } => {
                    regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidLogPattern {
                        pattern: pattern.clone(),
                        message: e.to_string(),
                    })?;
                }
                WaitCondition::Exec { command } if command.is_empty() => {
                    return Err(ConfigError::InvalidConfig(
                        "wait.exec の command が空です".to_string(),
                    ));
                }
                WaitCondition::Tcp { ports, .. } if ports.is_empty() => {
                    return Err(ConfigError::InvalidConfig(
                        "wait.tcp の ports が空です".to_string(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl WaitCondition {
    /// ログ出力用の短い名前
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Tcp { .. } => "tcp",
            Self::Log { .. } => "log",
            Self::Exec { .. } => "exec",
            Self::Time { .. } => "time",
        }
    }
}

/// HTTPステータス範囲（両端を含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StatusRange {
    pub min: u16,
    pub max: u16,
}

impl StatusRange {
    /// `200..399` または `200` 形式をパース
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || ConfigError::InvalidStatusRange(s.to_string());
        let (min, max) = match s.trim().split_once("..") {
            Some((min, max)) => (min.trim(), max.trim()),
            None => (s.trim(), s.trim()),
        };
        let min: u16 = min.parse().map_err(|_| invalid())?;
        let max: u16 = max.parse().map_err(|_| invalid())?;
        if min > max {
            return Err(invalid());
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, status: u16) -> bool {
        (self.min..=self.max).contains(&status)
    }
}

impl TryFrom<String> for StatusRange {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<StatusRange> for String {
    fn from(range: StatusRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for StatusRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}..{}", self.min, self.max)
        }
    }
}
