//! bollard によるコンテナエンジン実装
#![allow(deprecated)]

use crate::converter::{CreateRequest, GROUP_LABEL};
use crate::engine::{ContainerEngine, ContainerSnapshot, ContainerState, PublishedPort};
use crate::error::{ContainerError, Result};
use bollard::Docker;
use bollard::container::{CreateContainerOptions, ListContainersOptions};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::PortMap;
use futures_util::stream::StreamExt;
use shipyard_core::Protocol;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Docker Engine API を使うエンジン
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// ローカルのDockerに接続し、疎通を確認する
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        Ok(Self { docker })
    }

    pub fn client(&self) -> &Docker {
        &self.docker
    }

    /// サーバーのAPIバージョン
    pub async fn server_api_version(&self) -> Result<Option<String>> {
        Ok(self.docker.version().await?.api_version)
    }

    /// グループのラベルが付いたコンテナを全て削除し、削除した名前を返す
    pub async fn remove_group(&self, group: &str) -> Result<Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_string(),
            vec![format!("{}={}", GROUP_LABEL, group)],
        );
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;
        let mut removed = Vec::new();
        for container in containers {
            let Some(id) = container.id else { continue };
            let name = container
                .names
                .and_then(|names| names.into_iter().next())
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| id.clone());
            self.remove(&id).await?;
            removed.push(name);
        }
        Ok(removed)
    }
}

impl ContainerEngine for DockerEngine {
    async fn create(&self, request: &CreateRequest) -> Result<String> {
        let options = request.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            platform: None,
        });

        let created = match self
            .docker
            .create_container(options, request.config.clone())
            .await
        {
            Ok(created) => created,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                return Err(ContainerError::ImageNotFound {
                    image: request.image.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        for warning in &created.warnings {
            warn!(alias = %request.alias, "{}", warning);
        }
        debug!(alias = %request.alias, id = %created.id, "Container created");
        Ok(created.id)
    }

    async fn start(&self, container_id: &str) -> Result<()> {
        match self
            .docker
            .start_container(
                container_id,
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
        {
            // 304: 既に起動済み
            Ok(_)
            | Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => {
                info!(id = %container_id, "Container started");
                Ok(())
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(ContainerError::ContainerNotFound {
                container: container_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot> {
        let info = match self
            .docker
            .inspect_container(
                container_id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
        {
            Ok(info) => info,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                return Err(ContainerError::ContainerNotFound {
                    container: container_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let (state, exit_code) = match info.state {
            Some(state) => {
                let mapped = if state.paused.unwrap_or(false) {
                    ContainerState::Paused
                } else if state.running.unwrap_or(false) {
                    ContainerState::Running
                } else if state.status.is_some() {
                    ContainerState::Stopped
                } else {
                    ContainerState::Unknown
                };
                (mapped, state.exit_code)
            }
            None => (ContainerState::Unknown, None),
        };

        let (ip_address, ports) = match info.network_settings {
            Some(settings) => {
                let ip = settings
                    .ip_address
                    .filter(|ip| !ip.is_empty())
                    .or_else(|| {
                        settings.networks.and_then(|networks| {
                            networks
                                .into_values()
                                .filter_map(|endpoint| endpoint.ip_address)
                                .find(|ip| !ip.is_empty())
                        })
                    });
                (ip, published_ports(settings.ports.unwrap_or_default()))
            }
            None => (None, Vec::new()),
        };

        Ok(ContainerSnapshot {
            id: info.id.unwrap_or_else(|| container_id.to_string()),
            state,
            exit_code,
            ip_address,
            ports,
        })
    }

    async fn logs(&self, container_id: &str) -> Result<String> {
        let options = bollard::query_parameters::LogsOptions {
            stdout: true,
            stderr: true,
            follow: false,
            tail: "all".to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(container_id, Some(options));
        let mut output = String::new();
        while let Some(chunk) = stream.next().await {
            output.push_str(&chunk?.to_string());
        }
        Ok(output)
    }

    async fn exec(&self, container_id: &str, command: &[String]) -> Result<i64> {
        let exec_config = CreateExecOptions {
            cmd: Some(command.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let message = self.docker.create_exec(container_id, exec_config).await?;

        match self
            .docker
            .start_exec(&message.id, None::<bollard::exec::StartExecOptions>)
            .await?
        {
            StartExecResults::Attached { mut output, .. } => {
                // 終了まで出力を読み捨てる
                while let Some(chunk) = output.next().await {
                    chunk?;
                }
            }
            StartExecResults::Detached => {}
        }

        let inspect = self.docker.inspect_exec(&message.id).await?;
        Ok(inspect.exit_code.unwrap_or(-1))
    }

    async fn remove(&self, container_id: &str) -> Result<()> {
        match self
            .docker
            .stop_container(
                container_id,
                None::<bollard::query_parameters::StopContainerOptions>,
            )
            .await
        {
            Ok(_) => {}
            // 304: 既に停止済み、404: 存在しない
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304 | 404,
                ..
            }) => {}
            Err(e) => warn!(id = %container_id, error = %e, "Failed to stop container"),
        }

        match self
            .docker
            .remove_container(
                container_id,
                Some(bollard::query_parameters::RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(_)
            | Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!(id = %container_id, "Container removed");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// PortMap（`"80/tcp" → [HostIp, HostPort]`）を平坦化
fn published_ports(map: PortMap) -> Vec<PublishedPort> {
    let mut ports = Vec::new();
    for (key, bindings) in map {
        let Some((port, proto)) = key.split_once('/') else {
            continue;
        };
        let (Ok(container_port), Some(protocol)) = (port.parse::<u16>(), Protocol::parse(proto))
        else {
            continue;
        };
        for binding in bindings.into_iter().flatten() {
            let Some(host_port) = binding
                .host_port
                .as_deref()
                .and_then(|p| p.parse::<u16>().ok())
            else {
                continue;
            };
            ports.push(PublishedPort {
                container_port,
                protocol,
                host_ip: binding.host_ip.filter(|ip| !ip.is_empty()),
                host_port,
            });
        }
    }
    ports.sort_by_key(|p| (p.container_port, p.host_port));
    ports
}
