use crate::orchestrator::RunResult;
use shipyard_core::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(
        "Dockerに接続できません: {0}\n\nヒント:\n  • Dockerが起動しているか確認してください\n  • DOCKER_HOST の設定を確認してください"
    )]
    DockerConnectionFailed(String),

    #[error("コンテナ '{container}' が見つかりません")]
    ContainerNotFound { container: String },

    #[error(
        "イメージ '{image}' が見つかりません\n\nヒント:\n  • イメージ名とタグを確認してください\n  • docker pull {image} でイメージをダウンロードしてください"
    )]
    ImageNotFound { image: String },

    #[error("Docker APIエラー: {0}")]
    DockerApiError(String),

    #[error("Docker API呼び出し '{operation}' が {timeout_ms}ms 以内に完了しませんでした")]
    EngineTimeout { operation: String, timeout_ms: u64 },

    #[error("設定エラー: {0}")]
    Config(#[from] ConfigError),

    #[error(
        "循環依存が検出されました: {}\n\nヒント:\n  • depends_on の指定を見直してください",
        aliases.join(", ")
    )]
    CyclicDependency { aliases: Vec<String> },

    #[error(
        "コンテナ '{alias}' のポート '{port}' に割り当てられたホストポートが見つかりません\n\nヒント:\n  • ネットワークモードが host の場合、ポート公開は行われません"
    )]
    AllocationError { alias: String, port: String },

    #[error(
        "コンテナ '{alias}' の準備完了を待機中にタイムアウトしました（{waited_ms}ms）\n\nヒント:\n  • コンテナのログを確認してください\n  • wait.timeout_ms を増やしてみてください"
    )]
    ReadinessTimedOut { alias: String, waited_ms: u64 },

    #[error("コンテナ '{alias}' の準備完了待機に失敗しました: {reason}")]
    ReadinessFailed { alias: String, reason: String },

    #[error("プロパティファイル {path} を書き込めません: {message}")]
    PropertyWriteFailed { path: PathBuf, message: String },

    #[error("コンテナグループの起動を中断しました（'{alias}'）: {reason}")]
    StartupAborted {
        alias: String,
        reason: String,
        results: Vec<RunResult>,
    },
}

impl From<bollard::errors::Error> for ContainerError {
    fn from(err: bollard::errors::Error) -> Self {
        match &err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => {
                // 404の意味（イメージ/コンテナ）は呼び出し側で判断する
                ContainerError::DockerApiError(message.clone())
            }
            _ => {
                let err_str = err.to_string();
                if err_str.contains("Connection refused")
                    || err_str.contains("No such file or directory")
                {
                    ContainerError::DockerConnectionFailed(err_str)
                } else {
                    ContainerError::DockerApiError(err_str)
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
