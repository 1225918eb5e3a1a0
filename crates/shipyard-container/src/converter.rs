//! ContainerSpec から Docker API の作成リクエストへの変換
#![allow(deprecated)]

use bollard::container::{Config, NetworkingConfig};
use bollard::models::{
    EndpointSettings, HostConfig, HostConfigLogConfig, PortBinding, ResourcesUlimits,
    RestartPolicy as DockerRestartPolicy, RestartPolicyNameEnum,
};
use shipyard_core::properties::read_properties;
use shipyard_core::{BindMount, ConfigError, ContainerSpec, HostPort, PortSpec, RestartMode};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// グループ名を保持するラベル
pub const GROUP_LABEL: &str = "shipyard.group";
/// エイリアスを保持するラベル
pub const ALIAS_LABEL: &str = "shipyard.alias";

/// 変換時に外から与える情報
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub group: String,
    /// 呼び出し側からの環境変数上書き（最優先）
    pub env_overrides: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            env_overrides: BTreeMap::new(),
        }
    }
}

/// コンテナ作成リクエスト
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub alias: String,
    pub image: String,
    /// 明示的なコンテナ名（None ならエンジンが決める）
    pub name: Option<String>,
    pub config: Config<String>,
}

impl CreateRequest {
    /// Docker API に送るJSON表現
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.config)
    }
}

/// ContainerSpec を作成リクエストに変換
pub fn build_create_request(
    spec: &ContainerSpec,
    ctx: &RequestContext,
) -> Result<CreateRequest, ConfigError> {
    let cmd = spec.cmd.as_ref().map(|c| c.to_args("cmd")).transpose()?;
    let entrypoint = spec
        .entrypoint
        .as_ref()
        .map(|e| e.to_args("entrypoint"))
        .transpose()?;

    let env = merge_environment(
        spec.env_property_file.as_deref(),
        spec.env.as_ref(),
        &ctx.env_overrides,
        spec.keep_envs,
    )?;

    let (exposed_ports, port_bindings) = port_config(&spec.port_specs()?);
    let (volumes, binds) = bind_config(&spec.binds)?;

    let network = spec.network_mode();
    let networking_config = network.custom_name().map(|name| {
        let mut endpoints = HashMap::new();
        endpoints.insert(
            name.to_string(),
            EndpointSettings {
                aliases: Some(vec![spec.alias.clone()]),
                ..Default::default()
            },
        );
        NetworkingConfig {
            endpoints_config: endpoints,
        }
    });

    let host_config = HostConfig {
        binds,
        port_bindings,
        network_mode: Some(network.as_docker_str()),
        links: non_empty(spec.link_list()),
        volumes_from: non_empty(spec.volumes_from.clone()),
        tmpfs: tmpfs_config(&spec.tmpfs),
        extra_hosts: non_empty(spec.extra_hosts.clone()),
        dns: non_empty(spec.dns.clone()),
        dns_search: non_empty(spec.dns_search.clone()),
        cap_add: non_empty(spec.cap_add.clone()),
        cap_drop: non_empty(spec.cap_drop.clone()),
        security_opt: non_empty(spec.security_opts.clone()),
        ulimits: non_empty(
            spec.ulimits
                .iter()
                .map(|u| ResourcesUlimits {
                    name: Some(u.name.clone()),
                    soft: u.soft,
                    hard: u.hard,
                })
                .collect(),
        ),
        memory: spec.memory,
        memory_swap: spec.memory_swap,
        shm_size: spec.shm_size,
        privileged: spec.privileged,
        restart_policy: spec.restart_policy.as_ref().map(|policy| DockerRestartPolicy {
            name: Some(restart_policy_name(policy.name)),
            maximum_retry_count: (policy.name == RestartMode::OnFailure)
                .then_some(i64::from(policy.retry)),
        }),
        log_config: spec.log_driver.as_ref().map(|driver| HostConfigLogConfig {
            typ: Some(driver.name.clone()),
            config: (!driver.opts.is_empty())
                .then(|| driver.opts.clone().into_iter().collect()),
        }),
        ..Default::default()
    };

    // ラベル設定（グループ単位の一括停止に使う）
    let mut labels: HashMap<String, String> = spec.labels.clone().into_iter().collect();
    labels.insert(GROUP_LABEL.to_string(), ctx.group.clone());
    labels.insert(ALIAS_LABEL.to_string(), spec.alias.clone());

    let config = Config {
        image: Some(spec.image.clone()),
        cmd,
        entrypoint,
        env,
        exposed_ports,
        volumes,
        labels: Some(labels),
        working_dir: spec.working_dir.clone(),
        user: spec.user.clone(),
        hostname: spec.hostname.clone(),
        domainname: spec.domainname.clone(),
        host_config: Some(host_config),
        networking_config,
        ..Default::default()
    };

    Ok(CreateRequest {
        alias: spec.alias.clone(),
        image: spec.image.clone(),
        name: spec.container_name(),
        config,
    })
}

/// 環境変数を組み立てる
///
/// 優先順位は propertiesファイル < 定義の env < 呼び出し側の上書き。
/// `keep_envs` が true の場合、上書きされたファイル側の値も別エントリとして
/// 勝った値より前に残す。どの入力もなければ `None`（Env を送らない）。
pub fn merge_environment(
    property_file: Option<&Path>,
    env: Option<&BTreeMap<String, String>>,
    overrides: &BTreeMap<String, String>,
    keep_envs: bool,
) -> Result<Option<Vec<String>>, ConfigError> {
    let from_file = property_file.map(read_properties).transpose()?;

    let mut configured = env.cloned().unwrap_or_default();
    configured.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));

    let entries: Vec<String> = if keep_envs {
        from_file
            .iter()
            .flatten()
            .chain(configured.iter())
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    } else {
        let mut merged = from_file.unwrap_or_default();
        merged.extend(configured);
        merged
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    };

    Ok(non_empty(entries))
}

type PortBindings = HashMap<String, Option<Vec<PortBinding>>>;

/// ExposedPorts と PortBindings を作る
///
/// 動的・シンボリック指定はホストポートを空にしてエンジンに割り当てさせる。
fn port_config(
    specs: &[PortSpec],
) -> (
    Option<HashMap<String, HashMap<(), ()>>>,
    Option<PortBindings>,
) {
    if specs.is_empty() {
        return (None, None);
    }

    let mut exposed_ports = HashMap::new();
    let mut port_bindings: PortBindings = HashMap::new();

    for spec in specs {
        let key = spec.docker_key();
        exposed_ports.insert(key.clone(), HashMap::new());

        let host_port = match &spec.host {
            HostPort::Fixed(port) => port.to_string(),
            HostPort::Dynamic | HostPort::Symbolic(_) => String::new(),
        };
        port_bindings
            .entry(key)
            .or_insert_with(|| Some(Vec::new()))
            .get_or_insert_with(Vec::new)
            .push(PortBinding {
                host_ip: spec.bind_ip.clone(),
                host_port: Some(host_port),
            });
    }

    (Some(exposed_ports), Some(port_bindings))
}

/// Volumes（コンテナ側パス）と Binds（元の指定のまま）を作る
fn bind_config(
    binds: &[String],
) -> Result<(Option<HashMap<String, HashMap<(), ()>>>, Option<Vec<String>>), ConfigError> {
    if binds.is_empty() {
        return Ok((None, None));
    }

    let mut volumes = HashMap::new();
    for bind in binds {
        let mount = BindMount::parse(bind)?;
        volumes.insert(mount.container, HashMap::new());
    }
    Ok((Some(volumes), Some(binds.to_vec())))
}

fn tmpfs_config(mounts: &[String]) -> Option<HashMap<String, String>> {
    if mounts.is_empty() {
        return None;
    }
    Some(
        mounts
            .iter()
            .map(|m| match m.split_once(':') {
                Some((path, opts)) => (path.to_string(), opts.to_string()),
                None => (m.clone(), String::new()),
            })
            .collect(),
    )
}

fn restart_policy_name(mode: RestartMode) -> RestartPolicyNameEnum {
    match mode {
        RestartMode::No => RestartPolicyNameEnum::NO,
        RestartMode::Always => RestartPolicyNameEnum::ALWAYS,
        RestartMode::OnFailure => RestartPolicyNameEnum::ON_FAILURE,
        RestartMode::UnlessStopped => RestartPolicyNameEnum::UNLESS_STOPPED,
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    (!items.is_empty()).then_some(items)
}
