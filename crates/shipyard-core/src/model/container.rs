//! コンテナ定義

use super::arguments::Arguments;
use super::network::{CUSTOM_NETWORK_API_VERSION, NetworkMode};
use super::port::PortSpec;
use super::resource::{LogDriver, RestartPolicy, Ulimit};
use super::wait::WaitSpec;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// コンテナ名の決め方
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingStrategy {
    /// エンジンに任せる（デフォルト）
    #[default]
    None,
    /// エイリアスをコンテナ名にする
    Alias,
}

/// コンテナ実行定義
///
/// 一度組み立てたら変更しない。派生させる場合は [`ContainerSpec::builder_from`] を使う。
///
/// YAML形式：
/// ```yaml
/// - alias: db
///   image: postgres:16
///   env:
///     POSTGRES_PASSWORD: secret
///   ports: ["db.port:5432"]
///   wait:
///     conditions:
///       - log: { pattern: "ready to accept connections" }
/// - alias: api
///   image: myapp:latest
///   depends_on: [db]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub alias: String,
    pub image: String,
    #[serde(default)]
    pub cmd: Option<Arguments>,
    #[serde(default)]
    pub entrypoint: Option<Arguments>,
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,
    /// 追加の環境変数を読み込むpropertiesファイル
    #[serde(default)]
    pub env_property_file: Option<PathBuf>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub domainname: Option<String>,
    /// ポート指定（[`PortSpec`] の書式）
    #[serde(default)]
    pub ports: Vec<String>,
    /// バインドマウント（`host:container[:mode]`）
    #[serde(default)]
    pub binds: Vec<String>,
    #[serde(default)]
    pub volumes_from: Vec<String>,
    /// tmpfsマウント（`path[:options]`）
    #[serde(default)]
    pub tmpfs: Vec<String>,
    /// リンク（カンマ区切りも可）
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub extra_hosts: Vec<String>,
    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub dns_search: Vec<String>,
    #[serde(default)]
    pub cap_add: Vec<String>,
    #[serde(default)]
    pub cap_drop: Vec<String>,
    #[serde(default)]
    pub security_opts: Vec<String>,
    #[serde(default)]
    pub ulimits: Vec<Ulimit>,
    /// メモリ上限（バイト）
    #[serde(default)]
    pub memory: Option<i64>,
    /// メモリ+スワップ上限（バイト、-1で無制限）
    #[serde(default)]
    pub memory_swap: Option<i64>,
    /// /dev/shm サイズ（バイト）
    #[serde(default)]
    pub shm_size: Option<i64>,
    #[serde(default)]
    pub privileged: Option<bool>,
    #[serde(default)]
    pub restart_policy: Option<RestartPolicy>,
    #[serde(default)]
    pub network: Option<NetworkMode>,
    #[serde(default)]
    pub naming_strategy: NamingStrategy,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub wait: Option<WaitSpec>,
    #[serde(default)]
    pub log_driver: Option<LogDriver>,
    /// 動的ポートの割り当て結果を書き出すファイル
    #[serde(default)]
    pub port_property_file: Option<PathBuf>,
    /// コンテナIPを公開するプロパティキーの一部
    #[serde(default)]
    pub exposed_property_key: Option<String>,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub keep_envs: bool,
}

impl ContainerSpec {
    /// デフォルト値からビルダーを作成
    pub fn builder(alias: impl Into<String>, image: impl Into<String>) -> ContainerSpecBuilder {
        ContainerSpecBuilder {
            spec: ContainerSpec {
                alias: alias.into(),
                image: image.into(),
                ..Default::default()
            },
        }
    }

    /// 既存の定義を複製してビルダーを作成（元の定義は変更されない）
    pub fn builder_from(base: &ContainerSpec) -> ContainerSpecBuilder {
        ContainerSpecBuilder { spec: base.clone() }
    }

    /// 引数構造を検証し、必要な最小APIバージョンを返す
    ///
    /// カスタムネットワークを使う場合は `Some("1.21")`、それ以外は `None`。
    pub fn init_and_validate(&self) -> Result<Option<&'static str>> {
        if let Some(entrypoint) = &self.entrypoint {
            entrypoint.validate("entrypoint")?;
        }
        if let Some(cmd) = &self.cmd {
            cmd.validate("cmd")?;
        }
        if let Some(wait) = &self.wait {
            wait.validate()?;
        }

        if self.network_mode().is_custom() {
            return Ok(Some(CUSTOM_NETWORK_API_VERSION));
        }
        Ok(None)
    }

    /// ネットワークモード（未指定なら bridge）
    pub fn network_mode(&self) -> NetworkMode {
        self.network.clone().unwrap_or_default()
    }

    /// 再起動ポリシー（未指定なら再起動しない）
    pub fn restart_policy(&self) -> RestartPolicy {
        self.restart_policy.clone().unwrap_or_default()
    }

    /// ポート指定をパース
    pub fn port_specs(&self) -> Result<Vec<PortSpec>> {
        self.ports.iter().map(|p| PortSpec::parse(p)).collect()
    }

    /// リンクをカンマで分割・トリムして返す
    pub fn link_list(&self) -> Vec<String> {
        self.links
            .iter()
            .flat_map(|l| l.split(','))
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    }

    /// 命名戦略に基づくコンテナ名
    pub fn container_name(&self) -> Option<String> {
        match self.naming_strategy {
            NamingStrategy::None => None,
            NamingStrategy::Alias => Some(self.alias.clone()),
        }
    }
}

/// [`ContainerSpec`] のビルダー
///
/// 常に自前のコピーを持つため、元の定義とは何も共有しない。
#[derive(Debug, Clone)]
pub struct ContainerSpecBuilder {
    spec: ContainerSpec,
}

impl ContainerSpecBuilder {
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.spec.alias = alias.into();
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.spec.image = image.into();
        self
    }

    pub fn cmd(mut self, cmd: Arguments) -> Self {
        self.spec.cmd = Some(cmd);
        self
    }

    pub fn entrypoint(mut self, entrypoint: Arguments) -> Self {
        self.spec.entrypoint = Some(entrypoint);
        self
    }

    /// 環境変数マップを丸ごと置き換える
    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.spec.env = Some(env);
        self
    }

    /// 環境変数を1つ追加（同じキーは後勝ち）
    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec
            .env
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn env_property_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.env_property_file = Some(path.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.labels.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.spec.working_dir = Some(dir.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.spec.user = Some(user.into());
        self
    }

    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.spec.hostname = Some(hostname.into());
        self
    }

    pub fn domainname(mut self, domainname: impl Into<String>) -> Self {
        self.spec.domainname = Some(domainname.into());
        self
    }

    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.spec.ports.push(port.into());
        self
    }

    pub fn bind(mut self, bind: impl Into<String>) -> Self {
        self.spec.binds.push(bind.into());
        self
    }

    pub fn volumes_from(mut self, container: impl Into<String>) -> Self {
        self.spec.volumes_from.push(container.into());
        self
    }

    pub fn tmpfs(mut self, mount: impl Into<String>) -> Self {
        self.spec.tmpfs.push(mount.into());
        self
    }

    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.spec.links.push(link.into());
        self
    }

    pub fn extra_host(mut self, host: impl Into<String>) -> Self {
        self.spec.extra_hosts.push(host.into());
        self
    }

    pub fn dns(mut self, server: impl Into<String>) -> Self {
        self.spec.dns.push(server.into());
        self
    }

    pub fn dns_search(mut self, domain: impl Into<String>) -> Self {
        self.spec.dns_search.push(domain.into());
        self
    }

    pub fn cap_add(mut self, cap: impl Into<String>) -> Self {
        self.spec.cap_add.push(cap.into());
        self
    }

    pub fn cap_drop(mut self, cap: impl Into<String>) -> Self {
        self.spec.cap_drop.push(cap.into());
        self
    }

    pub fn security_opt(mut self, opt: impl Into<String>) -> Self {
        self.spec.security_opts.push(opt.into());
        self
    }

    pub fn ulimit(mut self, ulimit: Ulimit) -> Self {
        self.spec.ulimits.push(ulimit);
        self
    }

    pub fn memory(mut self, bytes: i64) -> Self {
        self.spec.memory = Some(bytes);
        self
    }

    pub fn memory_swap(mut self, bytes: i64) -> Self {
        self.spec.memory_swap = Some(bytes);
        self
    }

    pub fn shm_size(mut self, bytes: i64) -> Self {
        self.spec.shm_size = Some(bytes);
        self
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.spec.privileged = Some(privileged);
        self
    }

    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.spec.restart_policy = Some(policy);
        self
    }

    pub fn network(mut self, network: NetworkMode) -> Self {
        self.spec.network = Some(network);
        self
    }

    pub fn naming_strategy(mut self, strategy: NamingStrategy) -> Self {
        self.spec.naming_strategy = strategy;
        self
    }

    pub fn depends_on(mut self, alias: impl Into<String>) -> Self {
        self.spec.depends_on.push(alias.into());
        self
    }

    pub fn wait(mut self, wait: WaitSpec) -> Self {
        self.spec.wait = Some(wait);
        self
    }

    pub fn log_driver(mut self, driver: LogDriver) -> Self {
        self.spec.log_driver = Some(driver);
        self
    }

    pub fn port_property_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.spec.port_property_file = Some(path.into());
        self
    }

    pub fn exposed_property_key(mut self, key: impl Into<String>) -> Self {
        self.spec.exposed_property_key = Some(key.into());
        self
    }

    pub fn skip(mut self, skip: bool) -> Self {
        self.spec.skip = skip;
        self
    }

    pub fn keep_envs(mut self, keep: bool) -> Self {
        self.spec.keep_envs = keep;
        self
    }

    pub fn build(self) -> ContainerSpec {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::model::WaitCondition;
    use std::time::Duration;

    fn base() -> ContainerSpec {
        ContainerSpec::builder("db", "postgres:16")
            .env_var("POSTGRES_PASSWORD", "secret")
            .label("team", "qa")
            .port("db.port:5432")
            .depends_on("volume-init")
            .build()
    }

    #[test]
    fn test_builder_from_does_not_touch_source() {
        let original = base();
        let snapshot = original.clone();

        let derived = ContainerSpec::builder_from(&original)
            .alias("db2")
            .env_var("POSTGRES_PASSWORD", "changed")
            .env_var("PGDATA", "/tmp/pg")
            .label("team", "dev")
            .port("9999:5432")
            .depends_on("other")
            .build();

        assert_eq!(original, snapshot);
        assert_eq!(derived.alias, "db2");
        assert_eq!(derived.env.as_ref().unwrap().len(), 2);
        assert_eq!(derived.ports.len(), 2);
        assert_eq!(derived.depends_on, vec!["volume-init", "other"]);
    }

    #[test]
    fn test_defaults() {
        let spec = ContainerSpec::builder("web", "nginx").build();
        assert!(spec.ports.is_empty());
        assert!(spec.port_specs().unwrap().is_empty());
        assert_eq!(spec.naming_strategy, NamingStrategy::None);
        assert_eq!(spec.container_name(), None);
        assert_eq!(spec.restart_policy(), RestartPolicy::default());
        assert_eq!(spec.network_mode(), NetworkMode::Bridge);
        assert!(spec.memory.is_none());
    }

    #[test]
    fn test_init_and_validate_custom_network() {
        let spec = ContainerSpec::builder("web", "nginx")
            .network(NetworkMode::parse("it-net"))
            .build();
        assert_eq!(spec.init_and_validate().unwrap(), Some("1.21"));

        let bridge = ContainerSpec::builder("web", "nginx")
            .network(NetworkMode::parse("container:db"))
            .build();
        assert_eq!(bridge.init_and_validate().unwrap(), None);
    }

    #[test]
    fn test_init_and_validate_rejects_mixed_arguments() {
        let spec = ContainerSpec::builder("web", "nginx")
            .cmd(Arguments {
                shell: Some("nginx -g 'daemon off;'".to_string()),
                exec: Some(vec!["nginx".to_string()]),
            })
            .build();
        assert!(matches!(
            spec.init_and_validate(),
            Err(ConfigError::InvalidArgumentSyntax { field: "cmd", .. })
        ));
    }

    #[test]
    fn test_init_and_validate_checks_wait() {
        let spec = ContainerSpec::builder("web", "nginx")
            .wait(WaitSpec::new(
                WaitCondition::Exec { command: vec![] },
                Duration::from_secs(1),
            ))
            .build();
        assert!(spec.init_and_validate().is_err());
    }

    #[test]
    fn test_link_list_splits_commas() {
        let spec = ContainerSpec::builder("web", "nginx")
            .link("db:database, cache")
            .link("queue")
            .build();
        assert_eq!(spec.link_list(), vec!["db:database", "cache", "queue"]);
    }

    #[test]
    fn test_alias_naming() {
        let spec = ContainerSpec::builder("web", "nginx")
            .naming_strategy(NamingStrategy::Alias)
            .build();
        assert_eq!(spec.container_name().as_deref(), Some("web"));
    }

    #[test]
    fn test_deserialize_minimal() {
        let spec: ContainerSpec = serde_yaml::from_str(
            r#"
alias: cache
image: redis:7-alpine
cmd: redis-server --save ""
network: backend
restart_policy: { name: on-failure, retry: 3 }
"#,
        )
        .unwrap();
        assert_eq!(spec.alias, "cache");
        assert!(spec.cmd.as_ref().unwrap().shell.is_some());
        assert_eq!(spec.network_mode(), NetworkMode::Custom("backend".to_string()));
        assert_eq!(spec.restart_policy(), RestartPolicy::on_failure(3));
        assert!(!spec.skip);
    }
}
