//! 動的ポートの割り当て結果の解決と書き出し

use crate::engine::ContainerSnapshot;
use crate::error::{ContainerError, Result};
use shipyard_core::properties::format_properties;
use shipyard_core::{HostPort, PortSpec};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// プロパティキーのテンプレート
///
/// `{alias}` と `{name}`（シンボリック名）を置換する。デフォルトは `{name}`。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyKeyTemplate(String);

impl Default for PropertyKeyTemplate {
    fn default() -> Self {
        Self("{name}".to_string())
    }
}

impl PropertyKeyTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn render(&self, alias: &str, name: &str) -> String {
        self.0.replace("{alias}", alias).replace("{name}", name)
    }
}

/// 解決済みのポート
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPort {
    pub spec: PortSpec,
    pub host_ip: Option<String>,
    pub host_port: u16,
}

/// コンテナ1つ分のポート解決結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortMapping {
    pub alias: String,
    pub resolved: Vec<ResolvedPort>,
    /// シンボリック名などから作ったプロパティ
    pub properties: BTreeMap<String, String>,
}

/// エンジンの報告とポート指定を突き合わせる
///
/// シンボリック指定に対応する公開ポートがなければ [`ContainerError::AllocationError`]。
/// `exposed_property_key` があれば `container.<key>.ip` にコンテナIPを記録する。
pub fn resolve_ports(
    alias: &str,
    specs: &[PortSpec],
    snapshot: &ContainerSnapshot,
    template: &PropertyKeyTemplate,
    exposed_property_key: Option<&str>,
) -> Result<PortMapping> {
    let mut mapping = PortMapping {
        alias: alias.to_string(),
        ..Default::default()
    };

    for spec in specs {
        let published =
            snapshot.find_port(spec.container, spec.protocol, spec.bind_ip.as_deref());

        let Some(published) = published else {
            if let HostPort::Symbolic(_) = spec.host {
                return Err(ContainerError::AllocationError {
                    alias: alias.to_string(),
                    port: spec.to_string(),
                });
            }
            debug!(alias, port = %spec, "Port not published by engine");
            continue;
        };

        if let Some(name) = spec.symbolic_name() {
            mapping
                .properties
                .insert(template.render(alias, name), published.host_port.to_string());
        }
        mapping.resolved.push(ResolvedPort {
            spec: spec.clone(),
            host_ip: published.host_ip.clone(),
            host_port: published.host_port,
        });
    }

    if let Some(key) = exposed_property_key
        && let Some(ip) = &snapshot.ip_address
    {
        mapping
            .properties
            .insert(format!("container.{}.ip", key), ip.clone());
    }

    Ok(mapping)
}

/// プロパティの書き出し先
pub trait PropertySink: Send + Sync {
    fn write(&self, properties: &BTreeMap<String, String>) -> Result<()>;
    fn describe(&self) -> String;
}

impl<T: PropertySink + ?Sized> PropertySink for std::sync::Arc<T> {
    fn write(&self, properties: &BTreeMap<String, String>) -> Result<()> {
        (**self).write(properties)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// propertiesファイルへの書き出し
///
/// 一時ファイルに書いてから置き換えるため、途中までのファイルは残らない。
#[derive(Debug, Clone)]
pub struct FilePropertySink {
    path: PathBuf,
}

impl FilePropertySink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_err(&self, e: impl ToString) -> ContainerError {
        ContainerError::PropertyWriteFailed {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }
}

impl PropertySink for FilePropertySink {
    fn write(&self, properties: &BTreeMap<String, String>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| self.write_err(e))?;

        let header = format!(
            "Shipyard port mappings\n{}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        let content = format_properties(properties, Some(&header));

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| self.write_err(e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| self.write_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.write_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.write_err(e.error))?;

        info!(path = %self.path.display(), count = properties.len(), "Port properties written");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// メモリ上への書き出し（呼び出し側で結果を参照する用途）
#[derive(Debug, Default)]
pub struct MemoryPropertySink {
    properties: Mutex<BTreeMap<String, String>>,
}

impl MemoryPropertySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.properties
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl PropertySink for MemoryPropertySink {
    fn write(&self, properties: &BTreeMap<String, String>) -> Result<()> {
        self.properties
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// 起動中に集めたポート割り当てを保持し、最後にまとめて書き出す
#[derive(Debug, Default)]
pub struct PortPropertyAccumulator {
    inner: Mutex<AccumulatedProperties>,
}

#[derive(Debug, Default)]
struct AccumulatedProperties {
    all: BTreeMap<String, String>,
    by_file: BTreeMap<PathBuf, BTreeMap<String, String>>,
}

impl PortPropertyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解決結果を記録する（`target` があればそのファイル分にも記録）
    pub fn record(&self, target: Option<&Path>, mapping: &PortMapping) {
        if mapping.properties.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.all.extend(mapping.properties.clone());
        if let Some(path) = target {
            inner
                .by_file
                .entry(path.to_path_buf())
                .or_default()
                .extend(mapping.properties.clone());
        }
    }

    /// これまでに記録した全プロパティ
    pub fn properties(&self) -> BTreeMap<String, String> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .all
            .clone()
    }

    /// ファイルごとの分と追加のシンクへ書き出す
    pub fn flush(&self, sinks: &[Box<dyn PropertySink>]) -> Result<BTreeMap<String, String>> {
        let (all, by_file) = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            (inner.all.clone(), inner.by_file.clone())
        };

        for (path, properties) in &by_file {
            FilePropertySink::new(path).write(properties)?;
        }
        if !all.is_empty() {
            for sink in sinks {
                debug!(sink = %sink.describe(), "Flushing port properties");
                sink.write(&all)?;
            }
        }
        Ok(all)
    }
}
