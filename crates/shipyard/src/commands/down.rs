use crate::docker;
use crate::utils;
use colored::Colorize;
use std::path::Path;

/// グループのラベルが付いたコンテナを全て削除
pub async fn handle(file: Option<&Path>, group: Option<String>) -> anyhow::Result<()> {
    let group_name = match group {
        Some(name) => name,
        None => utils::load_group(file)?.name,
    };
    println!("{}", "コンテナグループを停止中...".yellow());
    println!("グループ: {}", group_name.cyan());

    println!();
    println!("{}", "Dockerに接続中...".blue());
    let engine = docker::connect_with_error_handling().await?;

    let removed = engine.remove_group(&group_name).await?;
    if removed.is_empty() {
        println!("  ℹ 該当するコンテナはありません");
        return Ok(());
    }
    for name in &removed {
        println!("  ✓ {} を削除しました", name.cyan());
    }
    println!();
    println!(
        "{}",
        format!("✓ {} 個のコンテナを削除しました", removed.len())
            .green()
            .bold()
    );
    Ok(())
}
