#![allow(dead_code)]

use shipyard_container::{
    ContainerEngine, ContainerError, ContainerSnapshot, ContainerState, CreateRequest,
    PublishedPort, Result,
};
use shipyard_core::Protocol;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::time::Duration;

struct FakeContainer {
    alias: String,
    ports: Vec<PublishedPort>,
}

/// Dockerを使わずに起動処理を確認するためのエンジン
///
/// 動的ポートは 32768 から順に割り当てる。
pub struct FakeEngine {
    next_id: AtomicUsize,
    next_port: AtomicU16,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    failing_start: HashSet<String>,
    exiting: HashSet<String>,
    logs: HashMap<String, String>,
    containers: Mutex<HashMap<String, FakeContainer>>,
    events: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(1),
            next_port: AtomicU16::new(32768),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::from_millis(10),
            delays: HashMap::new(),
            failing: HashSet::new(),
            failing_start: HashSet::new(),
            exiting: HashSet::new(),
            logs: HashMap::new(),
            containers: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_delay_for(mut self, alias: &str, delay: Duration) -> Self {
        self.delays.insert(alias.to_string(), delay);
        self
    }

    /// 作成に失敗させる
    pub fn fail_create(mut self, alias: &str) -> Self {
        self.failing.insert(alias.to_string());
        self
    }

    /// 作成はできるが起動に失敗させる
    pub fn fail_start(mut self, alias: &str) -> Self {
        self.failing_start.insert(alias.to_string());
        self
    }

    /// 起動直後に終了した状態にする
    pub fn exit_immediately(mut self, alias: &str) -> Self {
        self.exiting.insert(alias.to_string());
        self
    }

    pub fn with_logs(mut self, alias: &str, logs: &str) -> Self {
        self.logs.insert(alias.to_string(), logs.to_string());
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_with(&self, prefix: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.containers.lock().unwrap().len()
    }

    fn alias_of(&self, id: &str) -> Option<String> {
        self.containers
            .lock()
            .unwrap()
            .get(id)
            .map(|c| c.alias.clone())
    }
}

impl ContainerEngine for FakeEngine {
    /// Docker と同じく、応答を返す前にコンテナは作られている
    async fn create(&self, request: &CreateRequest) -> Result<String> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let delay = self
            .delays
            .get(&request.alias)
            .copied()
            .unwrap_or(self.delay);

        if self.failing.contains(&request.alias) {
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(ContainerError::ImageNotFound {
                image: request.image.clone(),
            });
        }

        let mut ports = Vec::new();
        let bindings = request
            .config
            .host_config
            .as_ref()
            .and_then(|h| h.port_bindings.clone())
            .unwrap_or_default();
        for (key, bindings) in bindings {
            let (port, proto) = key.split_once('/').unwrap();
            for binding in bindings.unwrap_or_default() {
                let host_port = match binding.host_port.as_deref() {
                    Some("") | None => self.next_port.fetch_add(1, Ordering::SeqCst),
                    Some(p) => p.parse().unwrap(),
                };
                ports.push(PublishedPort {
                    container_port: port.parse().unwrap(),
                    protocol: Protocol::parse(proto).unwrap(),
                    host_ip: Some(binding.host_ip.unwrap_or_else(|| "0.0.0.0".to_string())),
                    host_port,
                });
            }
        }

        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers.lock().unwrap().insert(
            id.clone(),
            FakeContainer {
                alias: request.alias.clone(),
                ports,
            },
        );
        self.events
            .lock()
            .unwrap()
            .push(format!("create:{}", request.alias));

        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn start(&self, container_id: &str) -> Result<()> {
        let alias = self.alias_of(container_id).unwrap_or_default();
        if self.failing_start.contains(&alias) {
            return Err(ContainerError::DockerApiError(format!(
                "port is already allocated: {}",
                alias
            )));
        }
        self.events.lock().unwrap().push(format!("start:{}", alias));
        Ok(())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot> {
        let containers = self.containers.lock().unwrap();
        let container = containers
            .get(container_id)
            .ok_or_else(|| ContainerError::ContainerNotFound {
                container: container_id.to_string(),
            })?;
        let exited = self.exiting.contains(&container.alias);
        Ok(ContainerSnapshot {
            id: container_id.to_string(),
            state: if exited {
                ContainerState::Stopped
            } else {
                ContainerState::Running
            },
            exit_code: exited.then_some(1),
            ip_address: Some("10.0.0.2".to_string()),
            ports: container.ports.clone(),
        })
    }

    async fn logs(&self, container_id: &str) -> Result<String> {
        let alias = self.alias_of(container_id).unwrap_or_default();
        Ok(self.logs.get(&alias).cloned().unwrap_or_default())
    }

    async fn exec(&self, _container_id: &str, _command: &[String]) -> Result<i64> {
        Ok(0)
    }

    async fn remove(&self, container_id: &str) -> Result<()> {
        if let Some(container) = self.containers.lock().unwrap().remove(container_id) {
            self.events
                .lock()
                .unwrap()
                .push(format!("remove:{}", container.alias));
        }
        Ok(())
    }
}
