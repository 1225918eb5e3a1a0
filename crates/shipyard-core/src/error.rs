use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAMLパースエラー: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSONパースエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "{field} の指定が不正です: {reason}\n\nヒント:\n  • shell形式（文字列）とexec形式（配列）はどちらか一方だけを指定してください"
    )]
    InvalidArgumentSyntax { field: &'static str, reason: String },

    #[error("環境変数ファイルを読み込めません: {path}\n理由: {message}")]
    EnvFileUnreadable { path: PathBuf, message: String },

    #[error(
        "バインド指定が不正です: '{0}'\n\nヒント:\n  • host-path:container-path[:mode] の形式で指定してください"
    )]
    InvalidBindSpec(String),

    #[error("ポート指定が不正です: '{spec}'\n理由: {reason}")]
    InvalidPortSpec { spec: String, reason: String },

    #[error("ステータス範囲が不正です: '{0}'（例: 200..399）")]
    InvalidStatusRange(String),

    #[error("ログパターンが不正です: '{pattern}'\n理由: {message}")]
    InvalidLogPattern { pattern: String, message: String },

    #[error("コンテナ '{alias}' が未定義のエイリアス '{dependency}' に依存しています")]
    UnknownDependency { alias: String, dependency: String },

    #[error("コンテナ '{0}' が自分自身に依存しています")]
    SelfDependency(String),

    #[error("エイリアス '{0}' が重複しています")]
    DuplicateAlias(String),

    #[error(
        "設定ファイルが見つかりません\n探索開始位置: {0}\nヒント: shipyard.yaml を含むディレクトリで実行するか、SHIPYARD_CONFIG_PATH を指定してください"
    )]
    GroupFileNotFound(PathBuf),

    #[error("無効な設定: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
