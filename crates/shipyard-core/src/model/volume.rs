//! ボリューム定義

use crate::error::{ConfigError, Result};

/// マウントモードとして認識するトークン
const MODE_TOKENS: &[&str] = &[
    "ro", "rw", "z", "Z", "nocopy", "shared", "rshared", "slave", "rslave", "private",
    "rprivate", "consistent", "cached", "delegated",
];

/// バインドマウント指定（`host:container[:mode]`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host: String,
    pub container: String,
    pub mode: Option<String>,
}

impl BindMount {
    /// バインド指定をパース
    ///
    /// 右側から読む。Windowsのドライブレター（`C:\...`）のコロンは区切りとみなさない。
    pub fn parse(spec: &str) -> Result<Self> {
        let mut segments: Vec<String> = spec.split(':').map(str::to_string).collect();

        // ドライブレター補正: "c" + "\path" → "c:\path"
        if segments.len() > 1 && is_drive_letter(&segments[0], &segments[1]) {
            let rest = segments.remove(1);
            segments[0] = format!("{}:{}", segments[0], rest);
        }

        if segments.len() < 2 || segments.iter().any(String::is_empty) {
            return Err(ConfigError::InvalidBindSpec(spec.to_string()));
        }

        let mode = match segments.last() {
            Some(last) if segments.len() > 2 && is_mode(last) => segments.pop(),
            _ => None,
        };
        let container = segments
            .pop()
            .ok_or_else(|| ConfigError::InvalidBindSpec(spec.to_string()))?;
        let host = segments.join(":");

        Ok(Self {
            host,
            container,
            mode,
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.mode
            .as_deref()
            .is_some_and(|m| m.split(',').any(|t| t == "ro"))
    }
}

fn is_drive_letter(first: &str, second: &str) -> bool {
    first.len() == 1
        && first.chars().all(|c| c.is_ascii_alphabetic())
        && (second.starts_with('\\') || second.starts_with('/'))
}

fn is_mode(segment: &str) -> bool {
    segment.split(',').all(|token| MODE_TOKENS.contains(&token))
}
