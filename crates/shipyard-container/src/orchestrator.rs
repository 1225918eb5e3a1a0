//! コンテナグループの起動オーケストレーション
//!
//! 1. 起動前に全ての定義を検証する（引数構造・依存関係・循環・リクエスト変換）
//! 2. 依存グラフの段階ごとに、段階内は最大 `max_parallel` 並列で起動する
//! 3. 各コンテナのポートを解決し、起動待機を行う
//! 4. 失敗したら作成中のものを待ってから起動待機を打ち切り、作成済みのコンテナを逆順で片付ける
//! 5. 全て成功したらポート割り当てをまとめて書き出す

use crate::converter::{CreateRequest, RequestContext, build_create_request};
use crate::engine::{ContainerEngine, with_timeout};
use crate::error::{ContainerError, Result};
use crate::graph::DependencyGraph;
use crate::port::{
    PortPropertyAccumulator, PropertyKeyTemplate, PropertySink, ResolvedPort, resolve_ports,
};
use crate::waiter::{ProbeReport, ReadinessOutcome, ReadinessProber};
use futures_util::future;
use futures_util::stream::{self, StreamExt};
use shipyard_core::{ContainerGroup, ContainerSpec, PortSpec};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

/// 起動オプション
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// 同じ段階で同時に起動するコンテナ数の上限
    pub max_parallel: usize,
    /// エンジン呼び出し1回あたりの上限時間
    pub engine_timeout: Duration,
    pub port_key_template: PropertyKeyTemplate,
    /// 全コンテナに適用する環境変数の上書き
    pub env_overrides: BTreeMap<String, String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            engine_timeout: Duration::from_secs(60),
            port_key_template: PropertyKeyTemplate::default(),
            env_overrides: BTreeMap::new(),
        }
    }
}

/// コンテナごとの起動結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// 起動して準備完了
    Ready,
    /// 起動したが待機に失敗（fail_on_error = false）
    Unready,
    Failed,
    /// 他のコンテナの失敗により打ち切られた
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub alias: String,
    pub container_id: Option<String>,
    pub status: RunStatus,
    pub ports: Vec<ResolvedPort>,
    pub readiness: Option<ProbeReport>,
    pub elapsed: Duration,
    pub message: Option<String>,
}

impl RunResult {
    fn new(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            container_id: None,
            status: RunStatus::Ready,
            ports: Vec::new(),
            readiness: None,
            elapsed: Duration::ZERO,
            message: None,
        }
    }

    fn cancelled(alias: &str, container_id: &str) -> Self {
        Self {
            container_id: Some(container_id.to_string()),
            status: RunStatus::Cancelled,
            message: Some("起動処理が打ち切られました".to_string()),
            ..Self::new(alias)
        }
    }
}

/// グループ起動の結果
#[derive(Debug, Clone)]
pub struct RunReport {
    pub group: String,
    /// 完了順（依存先は必ず依存元より前）
    pub results: Vec<RunResult>,
    /// 解決したポートなどのプロパティ
    pub properties: BTreeMap<String, String>,
    /// 必要な最小Docker APIバージョン
    pub api_version: Option<&'static str>,
}

impl RunReport {
    pub fn get(&self, alias: &str) -> Option<&RunResult> {
        self.results.iter().find(|r| r.alias == alias)
    }
}

/// 起動するコンテナ1つ分の検証済みデータ
#[derive(Debug, Clone)]
pub struct PlannedContainer {
    pub spec: ContainerSpec,
    pub request: CreateRequest,
    pub ports: Vec<PortSpec>,
}

/// 検証済みの起動計画
#[derive(Debug, Clone)]
pub struct StartPlan {
    pub group: String,
    /// 並列に起動できる段階
    pub levels: Vec<Vec<PlannedContainer>>,
    pub api_version: Option<&'static str>,
}

impl StartPlan {
    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// エンジンに触れずに全体を検証し、起動計画を作る
///
/// 引数構造・依存関係・循環・リクエスト変換（環境変数ファイルの読み込みを含む）を
/// 全て確認してから段階ごとの起動計画を返す。
pub fn plan_group(group: &ContainerGroup, options: &RunOptions) -> Result<StartPlan> {
    group.validate()?;

    let ctx = RequestContext {
        group: group.name.clone(),
        env_overrides: options.env_overrides.clone(),
    };

    let mut api_version = None;
    let mut planned: HashMap<String, PlannedContainer> = HashMap::new();
    for spec in group.active() {
        if let Some(version) = spec.init_and_validate()? {
            api_version = Some(version);
        }
        let request = build_create_request(spec, &ctx)?;
        let ports = spec.port_specs()?;
        planned.insert(
            spec.alias.clone(),
            PlannedContainer {
                spec: spec.clone(),
                request,
                ports,
            },
        );
    }

    let levels = DependencyGraph::from_group(group)
        .levels()?
        .into_iter()
        .map(|level| {
            level
                .into_iter()
                .filter_map(|alias| planned.remove(&alias))
                .collect()
        })
        .collect();

    Ok(StartPlan {
        group: group.name.clone(),
        levels,
        api_version,
    })
}

struct StartFailure {
    alias: String,
    result: Option<RunResult>,
    cause: ContainerError,
}

fn failed(mut result: RunResult, cause: ContainerError, started_at: Instant) -> StartFailure {
    result.status = RunStatus::Failed;
    result.elapsed = started_at.elapsed();
    result.message = Some(cause.to_string());
    StartFailure {
        alias: result.alias.clone(),
        result: Some(result),
        cause,
    }
}

/// 起動中に共有する状態
struct RunState {
    /// 作成済みコンテナ（作成順）
    started: Mutex<Vec<(String, String)>>,
    results: Mutex<Vec<RunResult>>,
    properties: PortPropertyAccumulator,
    /// 失敗時に立てる打ち切りフラグ
    cancel: watch::Sender<bool>,
}

impl RunState {
    fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            started: Mutex::new(Vec::new()),
            results: Mutex::new(Vec::new()),
            properties: PortPropertyAccumulator::new(),
            cancel,
        }
    }

    fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// 打ち切られるまで待つ
    async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            future::pending::<()>().await;
        }
    }

    fn record_started(&self, alias: &str, id: &str) {
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((alias.to_string(), id.to_string()));
    }

    fn forget_started(&self, id: &str) {
        self.started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(_, started)| started != id);
    }

    fn push_result(&self, result: RunResult) {
        self.results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(result);
    }
}

/// コンテナグループを起動するオーケストレーター
pub struct Orchestrator<E> {
    engine: E,
    options: RunOptions,
    sinks: Vec<Box<dyn PropertySink>>,
}

impl<E: ContainerEngine> Orchestrator<E> {
    pub fn new(engine: E, options: RunOptions) -> Self {
        Self {
            engine,
            options,
            sinks: Vec::new(),
        }
    }

    /// 起動成功時にプロパティを書き出す先を追加
    pub fn with_sink(mut self, sink: impl PropertySink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// エンジンに触れずに全体を検証し、起動計画を作る
    pub fn plan(&self, group: &ContainerGroup) -> Result<StartPlan> {
        plan_group(group, &self.options)
    }

    /// グループを起動する
    ///
    /// どれか1つでも失敗すると、起動済みのコンテナを逆順で削除し
    /// [`ContainerError::StartupAborted`] を返す。
    #[instrument(skip_all, fields(group = %group.name))]
    pub async fn start(&self, group: &ContainerGroup) -> Result<RunReport> {
        let plan = self.plan(group)?;
        if let Some(version) = plan.api_version {
            info!(api_version = version, "Custom network requires minimum API version");
        }
        info!(
            containers = plan.len(),
            levels = plan.levels.len(),
            "Starting container group"
        );

        let run = RunState::new();
        for level in &plan.levels {
            // 失敗しても作成中のものは最後まで待ち、作成済みとして記録させる
            let mut failure = None;
            {
                let mut outcomes =
                    stream::iter(level.iter().map(|c| self.start_container(c, &run)))
                        .buffer_unordered(self.options.max_parallel.max(1));
                while let Some(outcome) = outcomes.next().await {
                    match outcome {
                        Ok(Some(result)) => run.push_result(result),
                        Ok(None) => {}
                        Err(err) if failure.is_none() => {
                            run.cancel();
                            failure = Some(err);
                        }
                        Err(err) => {
                            warn!(alias = %err.alias, error = %err.cause, "Another container failed during abort");
                            if let Some(result) = err.result {
                                run.push_result(result);
                            }
                        }
                    }
                }
            }

            if let Some(failure) = failure {
                return Err(self.abort(failure, run).await);
            }
        }

        let properties = match run.properties.flush(&self.sinks) {
            Ok(properties) => properties,
            Err(cause) => {
                let failure = StartFailure {
                    alias: plan.group.clone(),
                    result: None,
                    cause,
                };
                return Err(self.abort(failure, run).await);
            }
        };

        let results = run.results.into_inner().unwrap_or_else(|e| e.into_inner());
        info!(containers = results.len(), "Container group started");
        Ok(RunReport {
            group: plan.group,
            results,
            properties,
            api_version: plan.api_version,
        })
    }

    /// 起動したコンテナを逆順で停止・削除する
    pub async fn stop(&self, report: &RunReport) -> Result<()> {
        let started: Vec<(String, String)> = report
            .results
            .iter()
            .filter_map(|r| r.container_id.clone().map(|id| (r.alias.clone(), id)))
            .collect();
        match self.teardown(&started).await {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// 1つのコンテナを作成・起動・待機する
    ///
    /// 打ち切られた場合は `Ok(None)`。作成は打ち切りを待たずに完了させ、
    /// IDを記録してから起動以降を打ち切る。
    #[instrument(skip_all, fields(alias = %planned.spec.alias))]
    async fn start_container(
        &self,
        planned: &PlannedContainer,
        run: &RunState,
    ) -> std::result::Result<Option<RunResult>, StartFailure> {
        if run.is_cancelled() {
            return Ok(None);
        }
        let started_at = Instant::now();
        let spec = &planned.spec;
        let mut result = RunResult::new(&spec.alias);

        info!(image = %spec.image, "Creating container");
        let id = match with_timeout(
            "create",
            self.options.engine_timeout,
            self.engine.create(&planned.request),
        )
        .await
        {
            Ok(id) => id,
            Err(e) => return Err(failed(result, e, started_at)),
        };
        run.record_started(&spec.alias, &id);
        result.container_id = Some(id.clone());

        tokio::select! {
            biased;
            () = run.cancelled() => {
                info!("Start cancelled");
                Ok(None)
            }
            outcome = self.bring_up(planned, &id, run, result, started_at) => outcome.map(Some),
        }
    }

    /// 作成済みコンテナの起動・ポート解決・起動待機
    async fn bring_up(
        &self,
        planned: &PlannedContainer,
        id: &str,
        run: &RunState,
        mut result: RunResult,
        started_at: Instant,
    ) -> std::result::Result<RunResult, StartFailure> {
        let spec = &planned.spec;
        let limit = self.options.engine_timeout;
        let fail = |result: RunResult, cause: ContainerError| failed(result, cause, started_at);

        if let Err(e) = with_timeout("start", limit, self.engine.start(id)).await {
            return Err(fail(result, e));
        }

        if !planned.ports.is_empty() || spec.exposed_property_key.is_some() {
            let mapping = match with_timeout("inspect", limit, self.engine.inspect(id))
                .await
                .and_then(|snapshot| {
                    resolve_ports(
                        &spec.alias,
                        &planned.ports,
                        &snapshot,
                        &self.options.port_key_template,
                        spec.exposed_property_key.as_deref(),
                    )
                }) {
                Ok(mapping) => mapping,
                Err(e) => return Err(fail(result, e)),
            };
            run.properties
                .record(spec.port_property_file.as_deref(), &mapping);
            result.ports = mapping.resolved;
        }

        if let Some(wait) = &spec.wait {
            let mut prober = match ReadinessProber::new(&self.engine, wait) {
                Ok(prober) => prober,
                Err(e) => return Err(fail(result, e)),
            };
            let report = prober.wait(id).await;

            let cause = match &report.outcome {
                ReadinessOutcome::Ready => None,
                ReadinessOutcome::TimedOut => Some(ContainerError::ReadinessTimedOut {
                    alias: spec.alias.clone(),
                    waited_ms: report.waited.as_millis() as u64,
                }),
                ReadinessOutcome::Failed(reason) => Some(ContainerError::ReadinessFailed {
                    alias: spec.alias.clone(),
                    reason: reason.clone(),
                }),
            };
            result.readiness = Some(report);

            if let Some(cause) = cause {
                if wait.fail_on_error {
                    return Err(fail(result, cause));
                }
                warn!(reason = %cause, "Readiness failure tolerated");
                result.status = RunStatus::Unready;
                result.message = Some(cause.to_string());

                if wait.shutdown_on_failure {
                    match with_timeout("remove", limit, self.engine.remove(id)).await {
                        Ok(()) => {
                            run.forget_started(id);
                            info!("Unready container removed");
                        }
                        Err(e) => warn!(error = %e, "Failed to remove unready container"),
                    }
                }
            }
        }

        result.elapsed = started_at.elapsed();
        info!(elapsed_ms = result.elapsed.as_millis() as u64, "Container started");
        Ok(result)
    }

    async fn abort(&self, failure: StartFailure, run: RunState) -> ContainerError {
        let RunState {
            started, results, ..
        } = run;
        let started = started.into_inner().unwrap_or_else(|e| e.into_inner());
        let mut results = results.into_inner().unwrap_or_else(|e| e.into_inner());

        if let Some(result) = failure.result {
            results.push(result);
        }
        for (alias, id) in &started {
            if !results.iter().any(|r| r.alias == *alias) {
                results.push(RunResult::cancelled(alias, id));
            }
        }

        error!(alias = %failure.alias, error = %failure.cause, "Startup aborted");
        if let Some(err) = self.teardown(&started).await {
            warn!(error = %err, "Teardown finished with errors");
        }

        ContainerError::StartupAborted {
            alias: failure.alias,
            reason: failure.cause.to_string(),
            results,
        }
    }

    /// 逆順で削除する。失敗しても続行し、最初のエラーを返す
    async fn teardown(&self, started: &[(String, String)]) -> Option<ContainerError> {
        let mut first_error = None;
        for (alias, id) in started.iter().rev() {
            match with_timeout("remove", self.options.engine_timeout, self.engine.remove(id)).await
            {
                Ok(()) => info!(%alias, "Container removed"),
                Err(e) => {
                    warn!(%alias, error = %e, "Failed to remove container");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error
    }
}
