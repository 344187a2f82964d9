//! Remote channel over the libSQL `/v2/pipeline` HTTP endpoint.
//!
//! Statements carry native typed arguments, so the quoter is only needed to render
//! dump output. Result sets are flattened to `|`-separated lines to satisfy the same
//! textual contract as the CLI adapter.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;
use reqwest::header::CONTENT_TYPE;
use rusqlite::types::Value;
use serde_json::{json, Value as JsonValue};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::debug;

use super::quote::{quote_ident, quote_literal};
use super::{BatchOutcome, CommandOutput, RemoteChannel, RemoteError, RemoteStatement};

pub struct PipelineHttp {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

/// Rows of one executed statement.
struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl PipelineHttp {
    pub fn new(url: &str, token: Option<String>) -> anyhow::Result<Self> {
        let base = match url.strip_prefix("libsql://") {
            Some(host) => format!("https://{host}"),
            None => url.to_string(),
        };
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/v2/pipeline", base.trim_end_matches('/')),
            token,
        })
    }

    /// Send one pipeline and return the `results` array, one entry per request.
    async fn pipeline(
        &self,
        requests: Vec<JsonValue>,
        limit: Duration,
    ) -> Result<Vec<JsonValue>, RemoteError> {
        let body = json!({ "requests": requests });
        let bytes =
            serde_json::to_vec(&body).map_err(|e| RemoteError::Malformed(e.to_string()))?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .timeout(limit)
            .body(bytes);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout(limit)
            } else {
                RemoteError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout(limit)
            } else {
                RemoteError::Unavailable(e.to_string())
            }
        })?;

        if !status.is_success() {
            return Err(RemoteError::Rejected {
                exit_code: i32::from(status.as_u16()),
                message: text,
            });
        }

        let parsed: JsonValue =
            serde_json::from_str(&text).map_err(|e| RemoteError::Malformed(e.to_string()))?;
        match parsed.get("results") {
            Some(JsonValue::Array(results)) => Ok(results.clone()),
            _ => Err(RemoteError::Malformed("pipeline response has no results".into())),
        }
    }

    /// Execute one statement. `Ok(Err(message))` is a statement-level error.
    async fn execute(
        &self,
        statement: &RemoteStatement,
        limit: Duration,
    ) -> Result<Result<ResultSet, String>, RemoteError> {
        let requests = vec![
            json!({ "type": "execute", "stmt": stmt_json(statement) }),
            json!({ "type": "close" }),
        ];
        let results = self.pipeline(requests, limit).await?;
        let first = results
            .first()
            .ok_or_else(|| RemoteError::Malformed("empty pipeline results".into()))?;

        if first["type"] == "error" {
            return Ok(Err(error_message(&first["error"])));
        }
        parse_result_set(&first["response"]["result"]).map(Ok)
    }
}

/// Request bound for a batch: the per-statement timeout for every statement.
fn batch_limit(per_statement: Duration, statements: usize) -> Duration {
    per_statement.saturating_mul(u32::try_from(statements).unwrap_or(u32::MAX))
}

fn stmt_json(statement: &RemoteStatement) -> JsonValue {
    json!({
        "sql": statement.sql,
        "args": statement.params.iter().map(to_hrana).collect::<Vec<_>>(),
    })
}

fn error_message(error: &JsonValue) -> String {
    error["message"]
        .as_str()
        .unwrap_or("remote statement failed")
        .to_string()
}

fn to_hrana(value: &Value) -> JsonValue {
    match value {
        Value::Null => json!({ "type": "null" }),
        Value::Integer(i) => json!({ "type": "integer", "value": i.to_string() }),
        Value::Real(f) => json!({ "type": "float", "value": f }),
        Value::Text(s) => json!({ "type": "text", "value": s }),
        Value::Blob(b) => json!({ "type": "blob", "base64": STANDARD_NO_PAD.encode(b) }),
    }
}

fn from_hrana(value: &JsonValue) -> Result<Value, RemoteError> {
    let malformed = || RemoteError::Malformed(format!("bad value {value}"));
    match value["type"].as_str() {
        Some("null") => Ok(Value::Null),
        Some("integer") => value["value"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .map(Value::Integer)
            .ok_or_else(malformed),
        Some("float") => value["value"].as_f64().map(Value::Real).ok_or_else(malformed),
        Some("text") => value["value"]
            .as_str()
            .map(|s| Value::Text(s.to_string()))
            .ok_or_else(malformed),
        Some("blob") => value["base64"]
            .as_str()
            .and_then(|s| STANDARD_NO_PAD.decode(s.trim_end_matches('=')).ok())
            .map(Value::Blob)
            .ok_or_else(malformed),
        _ => Err(malformed()),
    }
}

fn parse_result_set(result: &JsonValue) -> Result<ResultSet, RemoteError> {
    let columns = result["cols"]
        .as_array()
        .map(|cols| {
            cols.iter()
                .map(|c| c["name"].as_str().unwrap_or_default().to_string())
                .collect()
        })
        .unwrap_or_default();

    let rows = match result["rows"].as_array() {
        Some(rows) => rows
            .iter()
            .map(|row| {
                row.as_array()
                    .ok_or_else(|| RemoteError::Malformed("row is not an array".into()))?
                    .iter()
                    .map(from_hrana)
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(ResultSet { columns, rows })
}

/// Plain cell rendering, as a shell would print it.
fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s.clone(),
        Value::Blob(bytes) => bytes.iter().fold(String::new(), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        }),
    }
}

fn render_rows(set: &ResultSet) -> String {
    set.rows
        .iter()
        .map(|row| {
            let cells: Vec<String> = row.iter().map(render_cell).collect();
            format!("{}\n", cells.join("|"))
        })
        .collect()
}

fn rejected(message: String) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: message,
        exit_code: 1,
    }
}

#[async_trait]
impl RemoteChannel for PipelineHttp {
    async fn exec(&self, sql: &str, timeout: Duration) -> Result<CommandOutput, RemoteError> {
        let statement = RemoteStatement::new(sql, Vec::new());
        Ok(match self.execute(&statement, timeout).await? {
            Ok(set) => CommandOutput {
                stdout: render_rows(&set),
                stderr: String::new(),
                exit_code: 0,
            },
            Err(message) => rejected(message),
        })
    }

    async fn dump(&self, table: &str, timeout: Duration) -> Result<CommandOutput, RemoteError> {
        let schema_query = RemoteStatement::new(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
            vec![Value::Text(table.to_string())],
        );
        let schema = match self.execute(&schema_query, timeout).await? {
            Ok(set) => set,
            Err(message) => return Ok(rejected(message)),
        };
        let create = match schema.rows.first().and_then(|row| row.first()) {
            Some(Value::Text(sql)) => sql.clone(),
            _ => return Ok(rejected(format!("no such table: {table}"))),
        };

        let select = RemoteStatement::new(format!("SELECT * FROM {}", quote_ident(table)), vec![]);
        let data = match self.execute(&select, timeout).await? {
            Ok(set) => set,
            Err(message) => return Ok(rejected(message)),
        };

        let column_list = data
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut stdout = format!("{create};\n");
        for row in &data.rows {
            let values = row
                .iter()
                .map(quote_literal)
                .collect::<Result<Vec<_>, _>>()?
                .join(", ");
            let _ = writeln!(
                stdout,
                "INSERT OR REPLACE INTO {} ({column_list}) VALUES ({values});",
                quote_ident(table)
            );
        }
        debug!(table, rows = data.rows.len(), "dumped remote table over http");

        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
            exit_code: 0,
        })
    }

    async fn alive(&self, timeout: Duration) -> bool {
        match self.exec("SELECT 1", timeout).await {
            Ok(output) => output.success() && output.stdout.trim() == "1",
            Err(e) => {
                debug!(error = %e, "liveness probe failed");
                false
            }
        }
    }

    /// One pipeline request; each step only runs if the previous one succeeded.
    async fn exec_batch(&self, statements: &[RemoteStatement], timeout: Duration) -> BatchOutcome {
        if statements.is_empty() {
            return BatchOutcome::default();
        }

        let steps: Vec<JsonValue> = statements
            .iter()
            .enumerate()
            .map(|(i, statement)| {
                if i == 0 {
                    json!({ "stmt": stmt_json(statement) })
                } else {
                    json!({
                        "condition": { "type": "ok", "step": i - 1 },
                        "stmt": stmt_json(statement),
                    })
                }
            })
            .collect();

        let requests = vec![
            json!({ "type": "batch", "batch": { "steps": steps } }),
            json!({ "type": "close" }),
        ];

        let results = match self
            .pipeline(requests, batch_limit(timeout, statements.len()))
            .await
        {
            Ok(results) => results,
            Err(error) => {
                return BatchOutcome {
                    applied: 0,
                    error: Some(error),
                }
            }
        };

        let Some(first) = results.first() else {
            return BatchOutcome {
                applied: 0,
                error: Some(RemoteError::Malformed("empty pipeline results".into())),
            };
        };
        if first["type"] == "error" {
            return BatchOutcome {
                applied: 0,
                error: Some(RemoteError::Rejected {
                    exit_code: 1,
                    message: error_message(&first["error"]),
                }),
            };
        }

        let result = &first["response"]["result"];
        let step_results = result["step_results"].as_array().cloned().unwrap_or_default();
        let applied = step_results.iter().take_while(|r| !r.is_null()).count();

        let error = if applied == statements.len() {
            None
        } else {
            let message = result["step_errors"]
                .get(applied)
                .filter(|e| !e.is_null())
                .map(error_message)
                .unwrap_or_else(|| format!("batch stopped at statement {}", applied + 1));
            Some(RemoteError::Rejected {
                exit_code: 1,
                message,
            })
        };

        BatchOutcome { applied, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_limit_scales_per_statement() {
        let five = Duration::from_secs(5);
        assert_eq!(batch_limit(five, 1), five);
        assert_eq!(batch_limit(five, 12), Duration::from_secs(60));
        assert_eq!(batch_limit(Duration::MAX, 2), Duration::MAX);
    }

    #[test]
    fn libsql_scheme_becomes_https() {
        let remote = PipelineHttp::new("libsql://db-org.turso.io/", None).unwrap();
        assert_eq!(remote.endpoint, "https://db-org.turso.io/v2/pipeline");
    }

    #[test]
    fn hrana_values_convert_both_ways() {
        let values = [
            Value::Null,
            Value::Integer(i64::MAX),
            Value::Real(2.5),
            Value::Text("it's\nfine".into()),
            Value::Blob(vec![0, 1, 254, 255]),
        ];
        for value in values {
            assert_eq!(from_hrana(&to_hrana(&value)).unwrap(), value);
        }
    }

    #[test]
    fn integers_travel_as_strings() {
        assert_eq!(to_hrana(&Value::Integer(7))["value"], "7");
        assert!(from_hrana(&json!({ "type": "integer", "value": 7 })).is_err());
    }

    #[test]
    fn result_set_renders_pipe_lines() {
        let result = json!({
            "cols": [{ "name": "id" }, { "name": "title" }],
            "rows": [
                [{ "type": "integer", "value": "1" }, { "type": "text", "value": "a" }],
                [{ "type": "integer", "value": "2" }, { "type": "null" }],
            ],
        });
        let set = parse_result_set(&result).unwrap();
        assert_eq!(set.columns, vec!["id", "title"]);
        assert_eq!(render_rows(&set), "1|a\n2|\n");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_not_alive() {
        let remote = PipelineHttp::new("http://127.0.0.1:1", None).unwrap();
        assert!(!remote.alive(Duration::from_millis(500)).await);
        let err = remote
            .exec("SELECT 1", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(err.is_unavailable(), "{err:?}");
    }
}
