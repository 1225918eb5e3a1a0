mod commands;
mod docker;
mod utils;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "yard")]
#[command(about = "依存するコンテナを、順番どおりに。", long_about = None)]
struct Cli {
    /// グループ定義ファイル（省略時はカレントディレクトリから探す）
    #[arg(short, long, global = true, env = "SHIPYARD_CONFIG_PATH")]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// コンテナグループを依存順に起動
    Up {
        /// 環境変数の上書き（KEY=VALUE、複数指定可）
        #[arg(short, long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
        /// 同時に起動するコンテナ数の上限
        #[arg(long, default_value_t = 4, env = "SHIPYARD_MAX_PARALLEL")]
        max_parallel: usize,
        /// ポート割り当てを書き出すpropertiesファイル
        #[arg(short, long)]
        properties: Option<PathBuf>,
        /// プロパティキーのテンプレート（{alias}, {name}）
        #[arg(long, default_value = "{name}")]
        key_template: String,
        /// Docker API呼び出し1回あたりのタイムアウト（秒）
        #[arg(long, default_value_t = 60)]
        engine_timeout: u64,
    },
    /// 設定を検証して起動順を表示
    Validate,
    /// グループのコンテナを全て削除
    Down {
        /// グループ名（省略時は定義ファイルから）
        #[arg(short, long, env = "SHIPYARD_GROUP")]
        group: Option<String>,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match cli.command {
        Commands::Version => {
            println!("shipyard {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Validate => commands::validate::handle(cli.file.as_deref()),
        Commands::Up {
            env,
            max_parallel,
            properties,
            key_template,
            engine_timeout,
        } => {
            commands::up::handle(
                cli.file.as_deref(),
                commands::up::UpArgs {
                    env,
                    max_parallel,
                    properties,
                    key_template,
                    engine_timeout,
                },
            )
            .await
        }
        Commands::Down { group } => commands::down::handle(cli.file.as_deref(), group).await,
    }
}
