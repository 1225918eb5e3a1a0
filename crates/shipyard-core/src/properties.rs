//! properties形式（`key=value`）ファイルの読み書き

use crate::error::{ConfigError, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// propertiesファイルを読み込む
///
/// 読み込めない場合は [`ConfigError::EnvFileUnreadable`]
pub fn read_properties(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::EnvFileUnreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(parse_properties(&content))
}

/// properties形式の文字列をパース
///
/// - `#` / `!` で始まる行はコメント
/// - 区切りは最初のエスケープされていない `=` または `:`
/// - 行末の `\` で次の行に継続
/// - 同じキーは後勝ち
pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    let mut pending = String::new();

    for raw in content.lines() {
        let line = raw.trim_start();
        if pending.is_empty() && (line.is_empty() || line.starts_with('#') || line.starts_with('!'))
        {
            continue;
        }

        if ends_with_continuation(line) {
            pending.push_str(&line[..line.len() - 1]);
            continue;
        }
        pending.push_str(line);

        let logical = std::mem::take(&mut pending);
        if let Some((key, value)) = split_entry(&logical) {
            props.insert(unescape(key.trim_end()), unescape(value.trim_start()));
        }
    }

    if !pending.is_empty()
        && let Some((key, value)) = split_entry(&pending)
    {
        props.insert(unescape(key.trim_end()), unescape(value.trim_start()));
    }

    props
}

/// properties形式の文字列に変換（キー順）
pub fn format_properties(props: &BTreeMap<String, String>, comment: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(comment) = comment {
        for line in comment.lines() {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
    }
    for (key, value) in props {
        out.push_str(&escape(key, true));
        out.push('=');
        out.push_str(&escape(value, false));
        out.push('\n');
    }
    out
}

fn ends_with_continuation(line: &str) -> bool {
    let trailing = line.chars().rev().take_while(|c| *c == '\\').count();
    trailing % 2 == 1
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    if line.trim().is_empty() {
        return None;
    }
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '=' | ':' if !escaped => return Some((&line[..i], &line[i + 1..])),
            _ => escaped = false,
        }
    }
    Some((line, ""))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn escape(s: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '=' | ':' | ' ' | '#' | '!' if is_key => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let props = parse_properties(
            "# comment\n! another\nTEST_SERVICE=SECURITY\nEXTERNAL_ENV = TRUE\n\nURL: http://x:8080\n",
        );
        assert_eq!(props.len(), 3);
        assert_eq!(props["TEST_SERVICE"], "SECURITY");
        assert_eq!(props["EXTERNAL_ENV"], "TRUE");
        assert_eq!(props["URL"], "http://x:8080");
    }

    #[test]
    fn test_parse_continuation_and_escapes() {
        let props = parse_properties("JAVA_OPTS=-Xmx512m \\\n    -Xms128m\nKEY\\=WITH=eq\n");
        assert_eq!(props["JAVA_OPTS"], "-Xmx512m -Xms128m");
        assert_eq!(props["KEY=WITH"], "eq");
    }

    #[test]
    fn test_last_key_wins() {
        let props = parse_properties("A=1\nA=2\n");
        assert_eq!(props["A"], "2");
    }

    #[test]
    fn test_format_then_parse() {
        let mut props = BTreeMap::new();
        props.insert("db.port".to_string(), "32768".to_string());
        props.insert("odd key".to_string(), "line1\nline2".to_string());

        let text = format_properties(&props, Some("written by test"));
        assert!(text.starts_with("# written by test\n"));
        assert!(text.contains("db.port=32768\n"));
        assert_eq!(parse_properties(&text), props);
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_properties(Path::new("/not/really/a/file")).unwrap_err();
        assert!(matches!(err, ConfigError::EnvFileUnreadable { .. }));
    }
}
