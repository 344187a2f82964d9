//! SQL literal and identifier quoting for channels without parameter binding.
//!
//! This is the trust boundary between local row data and the remote shell. Every value
//! that reaches `turso db shell` as text passes through [`quote_literal`]. Rendered
//! literals never contain a raw control character, so a statement always stays on one
//! line and cannot smuggle a shell dot-command onto a new line.

use rusqlite::types::Value;
use std::fmt::Write;

use super::{RemoteError, RemoteStatement};

/// Quote an identifier (`"name"`, embedded quotes doubled).
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render one value as a SQL literal.
///
/// NULL, integers, reals, text, and blobs are supported. Booleans and timestamps
/// already arrive as integers and ISO-8601 text from SQLite.
pub fn quote_literal(value: &Value) -> Result<String, RemoteError> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Integer(i) => Ok(i.to_string()),
        Value::Real(f) => {
            if !f.is_finite() {
                return Err(RemoteError::Malformed(format!(
                    "non-finite real {f} has no SQL literal"
                )));
            }
            // Debug keeps a decimal point or exponent so the remote reads a REAL back
            Ok(format!("{f:?}"))
        }
        Value::Text(s) => Ok(quote_text(s)),
        Value::Blob(bytes) => {
            let mut out = String::with_capacity(bytes.len() * 2 + 3);
            out.push_str("X'");
            for b in bytes {
                let _ = write!(out, "{b:02x}");
            }
            out.push('\'');
            Ok(out)
        }
    }
}

/// Text literal: printable runs in single quotes, control characters as `char(n)`.
fn quote_text(s: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut run = String::new();

    for c in s.chars() {
        if c.is_control() {
            if !run.is_empty() {
                parts.push(format!("'{}'", run.replace('\'', "''")));
                run.clear();
            }
            parts.push(format!("char({})", c as u32));
        } else {
            run.push(c);
        }
    }
    if !run.is_empty() || parts.is_empty() {
        parts.push(format!("'{}'", run.replace('\'', "''")));
    }

    if parts.len() == 1 {
        parts.pop().unwrap_or_default()
    } else {
        format!("({})", parts.join(" || "))
    }
}

/// Inline the parameters of `statement` into its SQL text.
///
/// Supports `?N` (1-based) and bare `?` (next positional) placeholders. Question marks
/// inside string literals, quoted identifiers, and comments are left alone.
pub fn render_statement(statement: &RemoteStatement) -> Result<String, RemoteError> {
    let sql = &statement.sql;
    let mut out = String::with_capacity(sql.len() + statement.params.len() * 8);
    let mut chars = sql.char_indices().peekable();
    let mut next_positional = 0usize;

    while let Some((_, c)) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                out.push(c);
                // copy through the closing quote; doubled quotes re-enter the loop
                for (_, inner) in chars.by_ref() {
                    out.push(inner);
                    if inner == c {
                        break;
                    }
                }
            }
            '-' if matches!(chars.peek(), Some((_, '-'))) => {
                out.push(c);
                for (_, inner) in chars.by_ref() {
                    out.push(inner);
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '?' => {
                let mut digits = String::new();
                while let Some((_, d)) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(*d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let index = if digits.is_empty() {
                    next_positional += 1;
                    next_positional
                } else {
                    let n: usize = digits.parse().map_err(|_| {
                        RemoteError::Malformed(format!("bad placeholder ?{digits}"))
                    })?;
                    next_positional = n;
                    n
                };
                let value = index
                    .checked_sub(1)
                    .and_then(|i| statement.params.get(i))
                    .ok_or_else(|| {
                        RemoteError::Malformed(format!(
                            "placeholder ?{index} has no parameter ({} supplied)",
                            statement.params.len()
                        ))
                    })?;
                out.push_str(&quote_literal(value)?);
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}
