//! 起動待機（Readiness Probe）
//!
//! コンテナが起動した後、設定された条件のどれかが満たされるまでポーリングする。
//! 状態は `Idle → Polling → {Ready | TimedOut | Failed}` と一方向に遷移する。

use crate::engine::{ContainerEngine, with_timeout};
use crate::error::{ContainerError, Result};
use regex::Regex;
use shipyard_core::{ConfigError, StatusRange, WaitCondition, WaitSpec};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

/// 1回の試行にかける最大時間
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);

/// プローブの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Polling,
    Ready,
    TimedOut,
    Failed,
}

/// 待機の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Ready,
    TimedOut,
    /// コンテナの停止やエンジンエラーなど、待っても回復しない失敗
    Failed(String),
}

/// 待機結果と経過時間
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub outcome: ReadinessOutcome,
    pub waited: Duration,
    pub attempts: u32,
    /// 満たされた条件の種類
    pub satisfied_by: Option<&'static str>,
}

impl ProbeReport {
    pub fn is_ready(&self) -> bool {
        self.outcome == ReadinessOutcome::Ready
    }
}

enum Check {
    Http {
        url: String,
        status: Option<StatusRange>,
    },
    Tcp {
        host: String,
        ports: Vec<u16>,
    },
    Log(Regex),
    Exec(Vec<String>),
    Time(Duration),
}

impl Check {
    fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Tcp { .. } => "tcp",
            Self::Log(_) => "log",
            Self::Exec(_) => "exec",
            Self::Time(_) => "time",
        }
    }
}

/// 1つのコンテナに対する起動待機
pub struct ReadinessProber<'a, E> {
    engine: &'a E,
    checks: Vec<Check>,
    timeout: Duration,
    interval: Duration,
    http: reqwest::Client,
    state: ProbeState,
}

impl<'a, E: ContainerEngine> ReadinessProber<'a, E> {
    pub fn new(engine: &'a E, spec: &WaitSpec) -> Result<Self> {
        let checks = spec
            .conditions
            .iter()
            .map(|condition| {
                Ok(match condition {
                    WaitCondition::Http { url, status } => Check::Http {
                        url: url.clone(),
                        status: *status,
                    },
                    WaitCondition::Tcp { host, ports } => Check::Tcp {
                        host: host.clone().unwrap_or_else(|| "127.0.0.1".to_string()),
                        ports: ports.clone(),
                    },
                    WaitCondition::Log { pattern } => {
                        Check::Log(Regex::new(pattern).map_err(|e| {
                            ConfigError::InvalidLogPattern {
                                pattern: pattern.clone(),
                                message: e.to_string(),
                            }
                        })?)
                    }
                    WaitCondition::Exec { command } => Check::Exec(command.clone()),
                    WaitCondition::Time { ms } => Check::Time(Duration::from_millis(*ms)),
                })
            })
            .collect::<std::result::Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            engine,
            checks,
            timeout: spec.timeout(),
            interval: spec.interval(),
            http: reqwest::Client::new(),
            state: ProbeState::Idle,
        })
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// 条件が満たされるか、タイムアウトするか、失敗するまで待つ
    ///
    /// タイムアウトの場合、`waited` は必ず設定したタイムアウト以上になる。
    pub async fn wait(&mut self, container_id: &str) -> ProbeReport {
        let started = Instant::now();
        self.state = ProbeState::Polling;

        // 時間指定のみなら単純に待つ
        if self.is_time_only() {
            let wait_for = self
                .checks
                .iter()
                .filter_map(|c| match c {
                    Check::Time(d) => Some(*d),
                    _ => None,
                })
                .min()
                .unwrap_or_default();
            if wait_for > self.timeout {
                sleep(self.timeout).await;
                return self.finish(ReadinessOutcome::TimedOut, started, 1, None);
            }
            sleep(wait_for).await;
            return self.finish(ReadinessOutcome::Ready, started, 1, Some("time"));
        }

        let deadline = started + self.timeout;
        let mut attempts = 0;
        loop {
            // 期限を過ぎたら新しい試行は始めない
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return self.finish(ReadinessOutcome::TimedOut, started, attempts, None);
            }
            attempts += 1;
            let attempt_limit = ATTEMPT_TIMEOUT.min(remaining);

            let running = match with_timeout(
                "inspect",
                attempt_limit,
                self.engine.inspect(container_id),
            )
            .await
            {
                Ok(snapshot) if snapshot.is_running() => true,
                Ok(snapshot) => {
                    let reason = match snapshot.exit_code {
                        Some(code) => format!("コンテナが終了しました（終了コード {}）", code),
                        None => "コンテナが実行中ではありません".to_string(),
                    };
                    return self.finish(ReadinessOutcome::Failed(reason), started, attempts, None);
                }
                Err(e) => match attempt_timed_out(e) {
                    Ok(running) => running,
                    Err(reason) => {
                        return self.finish(
                            ReadinessOutcome::Failed(reason),
                            started,
                            attempts,
                            None,
                        );
                    }
                },
            };

            if running {
                match self.check_conditions(container_id, started, deadline).await {
                    Ok(Some(kind)) => {
                        return self.finish(
                            ReadinessOutcome::Ready,
                            started,
                            attempts,
                            Some(kind),
                        );
                    }
                    Ok(None) => {}
                    Err(reason) => {
                        return self.finish(
                            ReadinessOutcome::Failed(reason),
                            started,
                            attempts,
                            None,
                        );
                    }
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            sleep(self.interval.min(remaining)).await;
        }
    }

    fn is_time_only(&self) -> bool {
        !self.checks.is_empty() && self.checks.iter().all(|c| matches!(c, Check::Time(_)))
    }

    fn finish(
        &mut self,
        outcome: ReadinessOutcome,
        started: Instant,
        attempts: u32,
        satisfied_by: Option<&'static str>,
    ) -> ProbeReport {
        self.state = match &outcome {
            ReadinessOutcome::Ready => ProbeState::Ready,
            ReadinessOutcome::TimedOut => ProbeState::TimedOut,
            ReadinessOutcome::Failed(_) => ProbeState::Failed,
        };
        let waited = started.elapsed();
        match &outcome {
            ReadinessOutcome::Ready => {
                info!(waited_ms = waited.as_millis() as u64, by = ?satisfied_by, "Container ready")
            }
            ReadinessOutcome::TimedOut => {
                warn!(waited_ms = waited.as_millis() as u64, attempts, "Readiness timed out")
            }
            ReadinessOutcome::Failed(reason) => warn!(%reason, "Readiness check failed"),
        }
        ProbeReport {
            outcome,
            waited,
            attempts,
            satisfied_by,
        }
    }

    /// 条件を順に評価し、最初に満たされたものを返す
    ///
    /// `Err` は待っても回復しない失敗。
    async fn check_conditions(
        &self,
        container_id: &str,
        started: Instant,
        deadline: Instant,
    ) -> std::result::Result<Option<&'static str>, String> {
        if self.checks.is_empty() {
            return Ok(Some("running"));
        }

        for check in &self.checks {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let limit = ATTEMPT_TIMEOUT.min(remaining);
            let satisfied = match check {
                Check::Time(d) => started.elapsed() >= *d,
                Check::Http { url, status } => self.http_ready(url, *status, limit).await,
                Check::Tcp { host, ports } => tcp_ready(host, ports, limit).await,
                Check::Log(pattern) => {
                    match with_timeout("logs", limit, self.engine.logs(container_id)).await {
                        Ok(logs) => pattern.is_match(&logs),
                        Err(e) => attempt_timed_out(e)?,
                    }
                }
                Check::Exec(command) => {
                    // コマンド自体が遅いことがあるので待機期限まで待つ
                    match with_timeout(
                        "exec",
                        remaining,
                        self.engine.exec(container_id, command),
                    )
                    .await
                    {
                        Ok(code) => {
                            debug!(command = ?command, code, "Exec probe finished");
                            code == 0
                        }
                        Err(e) => attempt_timed_out(e)?,
                    }
                }
            };
            if satisfied {
                return Ok(Some(check.kind()));
            }
        }
        Ok(None)
    }

    async fn http_ready(&self, url: &str, status: Option<StatusRange>, limit: Duration) -> bool {
        match self.http.head(url).timeout(limit).send().await {
            Ok(response) => {
                let code = response.status().as_u16();
                debug!(url, code, "HTTP probe responded");
                status.is_none_or(|range| range.contains(code))
            }
            Err(e) => {
                debug!(url, error = %e, "HTTP probe not ready");
                false
            }
        }
    }
}

/// 1回の試行が時間切れなら未準備（`Ok(false)`）、それ以外のエンジンエラーは失敗
fn attempt_timed_out(err: ContainerError) -> std::result::Result<bool, String> {
    match err {
        ContainerError::EngineTimeout {
            operation,
            timeout_ms,
        } => {
            debug!(%operation, timeout_ms, "Probe attempt timed out");
            Ok(false)
        }
        other => Err(other.to_string()),
    }
}

async fn tcp_ready(host: &str, ports: &[u16], limit: Duration) -> bool {
    for port in ports {
        match tokio::time::timeout(limit, TcpStream::connect((host, *port))).await {
            Ok(Ok(_)) => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::CreateRequest;
    use crate::engine::{ContainerSnapshot, ContainerState};
    use crate::error::ContainerError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct StubEngine {
        state: ContainerState,
        logs: String,
        exec_code: i64,
        inspect_delay: Duration,
        exec_delay: Duration,
    }

    impl StubEngine {
        fn running() -> Self {
            Self {
                state: ContainerState::Running,
                logs: String::new(),
                exec_code: 1,
                inspect_delay: Duration::ZERO,
                exec_delay: Duration::ZERO,
            }
        }
    }

    impl ContainerEngine for StubEngine {
        async fn create(&self, _request: &CreateRequest) -> Result<String> {
            Ok("stub".to_string())
        }

        async fn start(&self, _container_id: &str) -> Result<()> {
            Ok(())
        }

        async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot> {
            if !self.inspect_delay.is_zero() {
                sleep(self.inspect_delay).await;
            }
            Ok(ContainerSnapshot {
                id: container_id.to_string(),
                state: self.state,
                exit_code: (self.state == ContainerState::Stopped).then_some(137),
                ip_address: None,
                ports: Vec::new(),
            })
        }

        async fn logs(&self, _container_id: &str) -> Result<String> {
            Ok(self.logs.clone())
        }

        async fn exec(&self, _container_id: &str, _command: &[String]) -> Result<i64> {
            if !self.exec_delay.is_zero() {
                sleep(self.exec_delay).await;
            }
            Ok(self.exec_code)
        }

        async fn remove(&self, container_id: &str) -> Result<()> {
            Err(ContainerError::ContainerNotFound {
                container: container_id.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_http_unreachable_times_out() {
        let engine = StubEngine::running();
        let spec = WaitSpec::new(
            WaitCondition::Http {
                url: "http://127.0.0.1:1/".to_string(),
                status: None,
            },
            Duration::from_millis(500),
        );

        let mut prober = ReadinessProber::new(&engine, &spec).unwrap();
        assert_eq!(prober.state(), ProbeState::Idle);

        let report = prober.wait("c1").await;
        assert_eq!(report.outcome, ReadinessOutcome::TimedOut);
        assert!(report.waited >= Duration::from_millis(500));
        assert_eq!(prober.state(), ProbeState::TimedOut);
    }

    #[tokio::test]
    async fn test_slow_inspect_still_times_out() {
        let engine = StubEngine {
            inspect_delay: Duration::from_millis(5),
            ..StubEngine::running()
        };
        let spec = WaitSpec::new(
            WaitCondition::Http {
                url: "http://127.0.0.1:1/".to_string(),
                status: None,
            },
            Duration::from_millis(500),
        );

        let mut prober = ReadinessProber::new(&engine, &spec).unwrap();
        let report = prober.wait("c1").await;
        assert_eq!(report.outcome, ReadinessOutcome::TimedOut);
        assert!(report.waited >= Duration::from_millis(500));
        assert_eq!(prober.state(), ProbeState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_exec_is_awaited() {
        let engine = StubEngine {
            exec_code: 0,
            exec_delay: Duration::from_millis(2_500),
            ..StubEngine::running()
        };
        let spec = WaitSpec::new(
            WaitCondition::Exec {
                command: vec!["pg_isready".to_string()],
            },
            Duration::from_secs(10),
        );

        let report = ReadinessProber::new(&engine, &spec)
            .unwrap()
            .wait("c1")
            .await;
        assert!(report.is_ready());
        assert_eq!(report.satisfied_by, Some("exec"));
        assert!(report.waited >= Duration::from_millis(2_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exec_slower_than_timeout_times_out() {
        let engine = StubEngine {
            exec_code: 0,
            exec_delay: Duration::from_secs(5),
            ..StubEngine::running()
        };
        let spec = WaitSpec::new(
            WaitCondition::Exec {
                command: vec!["pg_isready".to_string()],
            },
            Duration::from_secs(1),
        );

        let mut prober = ReadinessProber::new(&engine, &spec).unwrap();
        let report = prober.wait("c1").await;
        assert_eq!(report.outcome, ReadinessOutcome::TimedOut);
        assert!(report.waited >= Duration::from_secs(1));
        assert_eq!(prober.state(), ProbeState::TimedOut);
    }

    #[tokio::test]
    async fn test_http_responsive_is_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        let engine = StubEngine::running();
        let spec = WaitSpec::new(
            WaitCondition::Http {
                url: format!("http://{}/health", addr),
                status: Some(StatusRange::parse("200..299").unwrap()),
            },
            Duration::from_secs(5),
        );

        let mut prober = ReadinessProber::new(&engine, &spec).unwrap();
        let report = prober.wait("c1").await;
        assert!(report.is_ready());
        assert_eq!(report.satisfied_by, Some("http"));
        assert!(report.waited < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_tcp_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let engine = StubEngine::running();
        let spec = WaitSpec::new(
            WaitCondition::Tcp {
                host: None,
                ports: vec![port],
            },
            Duration::from_secs(2),
        );

        let report = ReadinessProber::new(&engine, &spec)
            .unwrap()
            .wait("c1")
            .await;
        assert_eq!(report.satisfied_by, Some("tcp"));
        drop(listener);
    }

    #[tokio::test]
    async fn test_log_pattern_or_semantics() {
        let engine = StubEngine {
            logs: "LOG: database system is ready to accept connections\n".to_string(),
            ..StubEngine::running()
        };
        let spec = WaitSpec {
            conditions: vec![
                WaitCondition::Exec {
                    command: vec!["false".to_string()],
                },
                WaitCondition::Log {
                    pattern: "ready to accept connections".to_string(),
                },
            ],
            ..WaitSpec::default()
        };

        let report = ReadinessProber::new(&engine, &spec)
            .unwrap()
            .wait("c1")
            .await;
        assert!(report.is_ready());
        assert_eq!(report.satisfied_by, Some("log"));
    }

    #[tokio::test]
    async fn test_exec_success() {
        let engine = StubEngine {
            exec_code: 0,
            ..StubEngine::running()
        };
        let spec = WaitSpec::new(
            WaitCondition::Exec {
                command: vec!["pg_isready".to_string()],
            },
            Duration::from_secs(1),
        );

        let report = ReadinessProber::new(&engine, &spec)
            .unwrap()
            .wait("c1")
            .await;
        assert_eq!(report.satisfied_by, Some("exec"));
    }

    #[tokio::test]
    async fn test_exited_container_fails_fast() {
        let engine = StubEngine {
            state: ContainerState::Stopped,
            ..StubEngine::running()
        };
        let spec = WaitSpec::new(
            WaitCondition::Http {
                url: "http://127.0.0.1:1/".to_string(),
                status: None,
            },
            Duration::from_secs(10),
        );

        let mut prober = ReadinessProber::new(&engine, &spec).unwrap();
        let report = prober.wait("c1").await;
        assert!(matches!(report.outcome, ReadinessOutcome::Failed(ref r) if r.contains("137")));
        assert_eq!(prober.state(), ProbeState::Failed);
        assert!(report.waited < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_time_only() {
        let engine = StubEngine::running();
        let spec = WaitSpec::new(WaitCondition::Time { ms: 50 }, Duration::from_secs(1));

        let report = ReadinessProber::new(&engine, &spec)
            .unwrap()
            .wait("c1")
            .await;
        assert!(report.is_ready());
        assert!(report.waited >= Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let engine = StubEngine::running();
        let spec = WaitSpec::new(
            WaitCondition::Log {
                pattern: "([".to_string(),
            },
            Duration::from_secs(1),
        );
        assert!(matches!(
            ReadinessProber::new(&engine, &spec),
            Err(ContainerError::Config(ConfigError::InvalidLogPattern { .. }))
        ));
    }
}
