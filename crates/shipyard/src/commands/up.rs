use crate::docker;
use crate::utils;
use colored::Colorize;
use shipyard_container::{
    ContainerError, FilePropertySink, Orchestrator, PropertyKeyTemplate, RunOptions,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct UpArgs {
    pub env: Vec<String>,
    pub max_parallel: usize,
    pub properties: Option<PathBuf>,
    pub key_template: String,
    pub engine_timeout: u64,
}

pub async fn handle(file: Option<&Path>, args: UpArgs) -> anyhow::Result<()> {
    println!("{}", "コンテナグループを起動中...".green());

    let group = utils::load_group(file)?;
    let options = RunOptions {
        max_parallel: args.max_parallel,
        engine_timeout: Duration::from_secs(args.engine_timeout),
        port_key_template: PropertyKeyTemplate::new(args.key_template),
        env_overrides: utils::parse_env_overrides(&args.env)?,
    };

    // 接続前に検証しておく
    let plan = shipyard_container::plan_group(&group, &options)?;
    println!("グループ: {}", plan.group.cyan());
    println!(
        "{}",
        format!("コンテナ ({} 個):", plan.len()).bold()
    );
    for planned in plan.levels.iter().flatten() {
        println!("  • {} ({})", planned.spec.alias.cyan(), planned.spec.image);
    }

    println!();
    println!("{}", "Dockerに接続中...".blue());
    let engine = docker::connect_with_error_handling().await?;

    if let Some(required) = plan.api_version
        && let Ok(Some(server)) = engine.server_api_version().await
        && utils::is_api_older(&server, required)
    {
        eprintln!(
            "  ⚠ Docker APIバージョン {} はカスタムネットワークに必要な {} より古いです",
            server.yellow(),
            required
        );
    }

    let mut orchestrator = Orchestrator::new(engine, options);
    if let Some(path) = &args.properties {
        orchestrator = orchestrator.with_sink(FilePropertySink::new(path));
    }

    println!();
    match orchestrator.start(&group).await {
        Ok(report) => {
            utils::print_results(&report.results);
            if !report.properties.is_empty() {
                println!();
                println!("{}", "ポート割り当て:".bold());
                for (key, value) in &report.properties {
                    println!("  {} = {}", key.cyan(), value);
                }
            }
            println!();
            println!("{}", "✓ 全てのコンテナが起動しました！".green().bold());
            Ok(())
        }
        Err(ContainerError::StartupAborted {
            alias,
            reason,
            results,
        }) => {
            utils::print_results(&results);
            eprintln!();
            eprintln!("{}", format!("✗ '{}' の起動に失敗しました", alias).red().bold());
            eprintln!("  {}", reason);
            eprintln!();
            eprintln!("起動済みのコンテナは削除しました");
            Err(anyhow::anyhow!("コンテナグループの起動に失敗しました"))
        }
        Err(e) => Err(e.into()),
    }
}
