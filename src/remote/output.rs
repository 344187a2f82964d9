//! Parsing of textual remote output.
//!
//! Shell output is framed loosely (headers, padding, banners), so each parser scans for
//! the first line with the expected shape instead of assuming a fixed layout.

use serde_json::{Map, Value as JsonValue};

use super::RemoteError;

/// First line consisting only of ASCII digits, e.g. the result of `SELECT COUNT(*)`.
pub fn parse_count(stdout: &str) -> Option<i64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|line| line.parse().ok())
}

/// First line shaped like `count:max_id:rows`, `rows` being upper-case hex (see the
/// content fingerprint query).
pub fn parse_fingerprint(stdout: &str) -> Option<String> {
    stdout.lines().map(str::trim).find_map(|line| {
        let parts: Vec<&str> = line.split(':').collect();
        let integer = |p: &str| {
            let p = p.strip_prefix('-').unwrap_or(p);
            !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit())
        };
        let hex = |p: &str| {
            !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
        };
        (parts.len() == 3 && integer(parts[0]) && integer(parts[1]) && hex(parts[2]))
            .then(|| line.to_string())
    })
}

/// Rows produced by a `json_group_array(json_object(...))` query.
pub fn parse_json_rows(stdout: &str) -> Result<Vec<Map<String, JsonValue>>, RemoteError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with('['))
        .ok_or_else(|| RemoteError::Malformed("no JSON row array in remote output".into()))?;

    let rows: Vec<JsonValue> =
        serde_json::from_str(line).map_err(|e| RemoteError::Malformed(e.to_string()))?;

    rows.into_iter()
        .map(|row| match row {
            JsonValue::Object(map) => Ok(map),
            other => Err(RemoteError::Malformed(format!(
                "expected JSON object per row, got {other}"
            ))),
        })
        .collect()
}

/// Split a SQL script on `;` outside quotes and comments. Empty statements are dropped.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                current.push(c);
                for inner in chars.by_ref() {
                    current.push(inner);
                    if inner == c {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                // line comment, dropped
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            ';' => {
                let stmt = current.trim();
                if !stmt.is_empty() {
                    statements.push(stmt.to_string());
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }
    statements
}

/// What a dump statement does to which table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpStatement {
    CreateTable(String),
    Insert(String),
}

/// Classify a statement as `CREATE TABLE` or `INSERT` and extract its target table.
pub fn classify(statement: &str) -> Option<DumpStatement> {
    let mut rest = statement.trim_start();

    if take_word(&mut rest, "CREATE") {
        if !take_word(&mut rest, "TABLE") {
            return None;
        }
        if take_word(&mut rest, "IF")
            && !(take_word(&mut rest, "NOT") && take_word(&mut rest, "EXISTS"))
        {
            return None;
        }
        table_name_prefix(rest).map(DumpStatement::CreateTable)
    } else if take_word(&mut rest, "INSERT") {
        if take_word(&mut rest, "OR") {
            let resolved = ["REPLACE", "IGNORE", "ABORT", "FAIL", "ROLLBACK"]
                .iter()
                .any(|action| take_word(&mut rest, action));
            if !resolved {
                return None;
            }
        }
        if !take_word(&mut rest, "INTO") {
            return None;
        }
        table_name_prefix(rest).map(DumpStatement::Insert)
    } else {
        None
    }
}

/// Consume `expected` (case-insensitive) from the front of `rest`.
fn take_word(rest: &mut &str, expected: &str) -> bool {
    let word_len = rest
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(rest.len());
    if rest[..word_len].eq_ignore_ascii_case(expected) {
        *rest = rest[word_len..].trim_start();
        true
    } else {
        false
    }
}

/// Read a possibly quoted table name from the start of `s`.
fn table_name_prefix(s: &str) -> Option<String> {
    let mut chars = s.chars();
    let first = chars.next()?;
    let close = match first {
        '"' => Some('"'),
        '`' => Some('`'),
        '[' => Some(']'),
        '\'' => Some('\''),
        _ => None,
    };
    let name: String = match close {
        Some(close) => chars.take_while(|c| *c != close).collect(),
        None => s
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .collect(),
    };
    (!name.is_empty()).then_some(name)
}

/// Keep only the statements of a full database dump that create or fill `table`.
pub fn filter_dump(script: &str, table: &str) -> Vec<String> {
    split_statements(script)
        .into_iter()
        .filter(|stmt| match classify(stmt) {
            Some(DumpStatement::CreateTable(name)) | Some(DumpStatement::Insert(name)) => {
                name.eq_ignore_ascii_case(table)
            }
            None => false,
        })
        .collect()
}
