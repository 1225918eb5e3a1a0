//! コンテナエンジンの抽象化

use crate::converter::CreateRequest;
use crate::error::{ContainerError, Result};
use shipyard_core::Protocol;
use std::future::Future;
use std::time::Duration;

/// コンテナエンジンのトレイト
///
/// Docker 実装は [`crate::DockerEngine`]。テストでは差し替え可能。
#[allow(async_fn_in_trait)]
pub trait ContainerEngine {
    /// コンテナを作成し、IDを返す（起動はしない）
    async fn create(&self, request: &CreateRequest) -> Result<String>;
    async fn start(&self, container_id: &str) -> Result<()>;
    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot>;
    /// これまでのログ全体（stdout + stderr）
    async fn logs(&self, container_id: &str) -> Result<String>;
    /// コンテナ内でコマンドを実行し、終了コードを返す
    async fn exec(&self, container_id: &str, command: &[String]) -> Result<i64>;
    /// 停止して削除する（存在しなければ何もしない）
    async fn remove(&self, container_id: &str) -> Result<()>;
}

/// コンテナの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Stopped,
    Paused,
    Unknown,
}

/// inspect 結果のうち必要な部分
#[derive(Debug, Clone)]
pub struct ContainerSnapshot {
    pub id: String,
    pub state: ContainerState,
    pub exit_code: Option<i64>,
    pub ip_address: Option<String>,
    pub ports: Vec<PublishedPort>,
}

impl ContainerSnapshot {
    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }

    /// コンテナポートに対応する公開ポートを探す
    ///
    /// バインドIPが指定されていれば一致するものを優先する。
    pub fn find_port(
        &self,
        container_port: u16,
        protocol: Protocol,
        bind_ip: Option<&str>,
    ) -> Option<&PublishedPort> {
        let mut candidates = self
            .ports
            .iter()
            .filter(|p| p.container_port == container_port && p.protocol == protocol);
        match bind_ip {
            Some(ip) => {
                let all: Vec<_> = candidates.collect();
                all.iter()
                    .find(|p| p.host_ip.as_deref() == Some(ip))
                    .or(all.first())
                    .copied()
            }
            None => candidates.next(),
        }
    }
}

/// エンジンが報告した公開ポート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPort {
    pub container_port: u16,
    pub protocol: Protocol,
    pub host_ip: Option<String>,
    pub host_port: u16,
}

/// エンジン呼び出しに上限時間を付ける
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ContainerError::EngineTimeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ContainerSnapshot {
        ContainerSnapshot {
            id: "abc".to_string(),
            state: ContainerState::Running,
            exit_code: None,
            ip_address: Some("172.17.0.2".to_string()),
            ports: vec![
                PublishedPort {
                    container_port: 80,
                    protocol: Protocol::Tcp,
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: 32768,
                },
                PublishedPort {
                    container_port: 80,
                    protocol: Protocol::Tcp,
                    host_ip: Some("127.0.0.1".to_string()),
                    host_port: 32769,
                },
            ],
        }
    }

    #[test]
    fn test_find_port() {
        let snap = snapshot();
        assert_eq!(snap.find_port(80, Protocol::Tcp, None).unwrap().host_port, 32768);
        assert_eq!(
            snap.find_port(80, Protocol::Tcp, Some("127.0.0.1"))
                .unwrap()
                .host_port,
            32769
        );
        assert!(snap.find_port(80, Protocol::Udp, None).is_none());
        assert!(snap.find_port(443, Protocol::Tcp, None).is_none());
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: Result<()> = with_timeout("slow", Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ContainerError::EngineTimeout { .. })));
    }
}
