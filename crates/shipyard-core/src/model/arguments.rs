//! コマンド引数定義

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};

/// コマンド / エントリポイントの引数
///
/// shell形式（1つの文字列）とexec形式（文字列の配列）は排他。
///
/// YAML形式：
/// ```yaml
/// cmd: "java -jar app.jar"          # shell形式
/// cmd: ["java", "-jar", "app.jar"]  # exec形式
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ArgumentsRepr")]
pub struct Arguments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArgumentsRepr {
    Shell(String),
    Exec(Vec<String>),
    Full {
        shell: Option<String>,
        exec: Option<Vec<String>>,
    },
}

impl From<ArgumentsRepr> for Arguments {
    fn from(repr: ArgumentsRepr) -> Self {
        match repr {
            ArgumentsRepr::Shell(shell) => Self::shell(shell),
            ArgumentsRepr::Exec(exec) => Self::exec(exec),
            ArgumentsRepr::Full { shell, exec } => Self { shell, exec },
        }
    }
}

impl Arguments {
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            shell: Some(command.into()),
            exec: None,
        }
    }

    pub fn exec<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            shell: None,
            exec: Some(args.into_iter().map(Into::into).collect()),
        }
    }

    /// 引数構造を検証
    ///
    /// shell形式とexec形式が同時に指定されている場合はエラー
    pub fn validate(&self, field: &'static str) -> Result<()> {
        match (&self.shell, &self.exec) {
            (Some(_), Some(_)) => Err(ConfigError::InvalidArgumentSyntax {
                field,
                reason: "shell形式とexec形式が同時に指定されています".to_string(),
            }),
            (None, None) => Err(ConfigError::InvalidArgumentSyntax {
                field,
                reason: "引数が空です".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Docker APIに渡す引数リストに変換
    ///
    /// shell形式はシェルのクォート規則で分割する。
    pub fn to_args(&self, field: &'static str) -> Result<Vec<String>> {
        match (&self.shell, &self.exec) {
            (Some(shell), None) => {
                shell_words::split(shell).map_err(|e| ConfigError::InvalidArgumentSyntax {
                    field,
                    reason: e.to_string(),
                })
            }
            (None, Some(exec)) => Ok(exec.clone()),
            _ => self.validate(field).map(|()| Vec::new()),
        }
    }
}
