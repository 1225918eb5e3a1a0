use colored::Colorize;
use shipyard_container::{RunResult, RunStatus};
use shipyard_core::ContainerGroup;
use std::collections::BTreeMap;
use std::path::Path;

/// グループ定義を読み込む（パス指定がなければ探す）
pub fn load_group(file: Option<&Path>) -> anyhow::Result<ContainerGroup> {
    let path = match file {
        Some(path) => path.to_path_buf(),
        None => shipyard_core::find_group_file()?,
    };
    println!("📄 {}", path.display().to_string().cyan());
    Ok(shipyard_core::load_group(&path)?)
}

/// `KEY=VALUE` 形式の指定をパース
pub fn parse_env_overrides(entries: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    entries
        .iter()
        .map(|entry| match entry.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.to_string()))
            }
            _ => Err(anyhow::anyhow!(
                "環境変数の指定が不正です: '{}'（KEY=VALUE の形式で指定してください）",
                entry
            )),
        })
        .collect()
}

/// `1.43` 形式のAPIバージョンを比較可能な形に
pub fn parse_api_version(version: &str) -> Option<(u32, u32)> {
    let (major, minor) = version.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// サーバーのAPIバージョンが必要なバージョンより古いか
///
/// どちらかが解釈できなければ判断しない（`false`）。
pub fn is_api_older(server: &str, required: &str) -> bool {
    match (parse_api_version(server), parse_api_version(required)) {
        (Some(server), Some(required)) => server < required,
        _ => false,
    }
}

/// 起動結果を1行ずつ表示
pub fn print_results(results: &[RunResult]) {
    for result in results {
        let mark = match result.status {
            RunStatus::Ready => "✓".green(),
            RunStatus::Unready => "⚠".yellow(),
            RunStatus::Failed => "✗".red(),
            RunStatus::Cancelled => "-".dimmed(),
        };
        let id = result
            .container_id
            .as_deref()
            .map(|id| &id[..id.len().min(12)])
            .unwrap_or("-");
        println!(
            "  {} {} {} ({}ms)",
            mark,
            result.alias.cyan(),
            id.dimmed(),
            result.elapsed.as_millis()
        );
        for port in &result.ports {
            println!("      {} → {}", port.spec, port.host_port);
        }
        if let Some(message) = &result.message {
            println!("      {}", message.yellow());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_overrides() {
        let env = parse_env_overrides(&["A=1".to_string(), "B=x=y".to_string()]).unwrap();
        assert_eq!(env["A"], "1");
        assert_eq!(env["B"], "x=y");
        assert!(parse_env_overrides(&["novalue".to_string()]).is_err());
        assert!(parse_env_overrides(&["=1".to_string()]).is_err());
    }

    #[test]
    fn test_parse_api_version() {
        assert_eq!(parse_api_version("1.43"), Some((1, 43)));
        assert!(parse_api_version("1.21") < parse_api_version("1.43"));
        assert_eq!(parse_api_version("latest"), None);
    }

    #[test]
    fn test_is_api_older() {
        assert!(is_api_older("1.20", "1.21"));
        assert!(!is_api_older("1.43", "1.21"));
        assert!(!is_api_older("1.21", "1.21"));
        // 解釈できないバージョンでは警告しない
        assert!(!is_api_older("unknown", "1.21"));
        assert!(!is_api_older("", "1.21"));
    }
}
