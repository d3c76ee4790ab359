//! Request log store.
//!
//! Each inbound request gets one row: inserted with zeroed cost metadata
//! before the provider call, updated in place once the outcome is known.
//! A crash mid-request leaves the pending row as evidence.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::cost::CostBreakdown;
use crate::error::Result;
use crate::providers::TokenUsage;

/// Cost metadata attached to a request log row.
///
/// Serialized camelCase to match the external analytics consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMetadata {
    pub config_id: i64,
    pub provider: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

impl LogMetadata {
    /// The zeroed metadata written with the pending row.
    pub fn pending(config_id: i64, provider: &str, model: &str) -> Self {
        Self {
            config_id,
            provider: provider.to_string(),
            model: model.to_string(),
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            input_cost: 0.0,
            output_cost: 0.0,
            total_cost: 0.0,
        }
    }

    /// The provider-reported total is kept as-is; some backends count
    /// tokens the sum of the two directions does not capture.
    pub fn with_usage(mut self, usage: &TokenUsage, cost: &CostBreakdown) -> Self {
        self.input_tokens = usage.prompt_tokens;
        self.output_tokens = usage.completion_tokens;
        self.total_tokens = usage.total_tokens;
        self.input_cost = cost.input_cost;
        self.output_cost = cost.output_cost;
        self.total_cost = cost.total_cost;
        self
    }
}

/// A new log row for an inbound request.
pub struct NewLog {
    pub method: String,
    pub url: String,
    pub headers: Value,
    pub body: Value,
}

/// Insert a pending log row and return its id.
///
/// `response` starts as an empty object; the row is updated once the
/// provider call resolves.
pub async fn insert_pending(pool: &SqlitePool, log: &NewLog, metadata: &LogMetadata) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO logs (method, url, headers, body, response, timestamp, metadata)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&log.method)
    .bind(&log.url)
    .bind(log.headers.to_string())
    .bind(log.body.to_string())
    .bind("{}")
    .bind(Utc::now().to_rfc3339())
    .bind(serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string()))
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Record the successful outcome on an existing row.
pub async fn update_completion(
    pool: &SqlitePool,
    id: i64,
    response: &Value,
    metadata: &LogMetadata,
) -> Result<()> {
    sqlx::query("UPDATE logs SET response = ?, metadata = ? WHERE id = ?")
        .bind(response.to_string())
        .bind(serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record a failure on an existing row.
///
/// The response becomes `{error}`; metadata carries the message plus the
/// debug representation of the error chain.
pub async fn update_failure(pool: &SqlitePool, id: i64, message: &str, detail: &str) -> Result<()> {
    let response = json!({"error": message});
    let metadata = json!({"error": message, "stack": detail});
    sqlx::query("UPDATE logs SET response = ?, metadata = ? WHERE id = ?")
        .bind(response.to_string())
        .bind(metadata.to_string())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Insert an already-failed request in one step (no provider call happened).
pub async fn insert_failed(pool: &SqlitePool, log: &NewLog, message: &str, detail: &str) -> Result<i64> {
    let response = json!({"error": message});
    let metadata = json!({"error": message, "stack": detail});
    let result = sqlx::query(
        "INSERT INTO logs (method, url, headers, body, response, timestamp, metadata)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&log.method)
    .bind(&log.url)
    .bind(log.headers.to_string())
    .bind(log.body.to_string())
    .bind(response.to_string())
    .bind(Utc::now().to_rfc3339())
    .bind(metadata.to_string())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Insert a completed passthrough call in one step, with no cost metadata.
pub async fn insert_passthrough(pool: &SqlitePool, log: &NewLog, response: &Value) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO logs (method, url, headers, body, response, timestamp, metadata)
         VALUES (?, ?, ?, ?, ?, ?, NULL)",
    )
    .bind(&log.method)
    .bind(&log.url)
    .bind(log.headers.to_string())
    .bind(log.body.to_string())
    .bind(response.to_string())
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Spawn a fire-and-forget row update.
///
/// Streaming completions finish after the HTTP response is underway, so
/// their log write cannot block or fail the request. A failed write is
/// logged and dropped.
pub fn spawn_completion_update(pool: &SqlitePool, id: i64, response: Value, metadata: LogMetadata) {
    let pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = update_completion(&pool, id, &response, &metadata).await {
            tracing::warn!(log_id = id, error = %e, "Failed to update request log");
        }
    });
}

/// Like [`spawn_completion_update`] but for stream failures.
pub fn spawn_failure_update(pool: &SqlitePool, id: i64, message: String, detail: String) {
    let pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = update_failure(&pool, id, &message, &detail).await {
            tracing::warn!(log_id = id, error = %e, "Failed to update request log");
        }
    });
}

/// Header names whose values are masked by [`sanitize_logs`].
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "x-api-key",
    "api-key",
    "cookie",
    "set-cookie",
];

const MASK: &str = "[REDACTED]";

/// Mask sensitive header values in a captured header object.
pub fn sanitize_headers(headers: &mut Value) {
    if let Some(map) = headers.as_object_mut() {
        for (name, value) in map.iter_mut() {
            if SENSITIVE_HEADERS.contains(&name.to_lowercase().as_str()) {
                *value = Value::String(MASK.to_string());
            }
        }
    }
}

/// Rewrite all stored log rows, masking sensitive header values in place.
///
/// Returns the number of rows that changed. Intended for retroactive
/// cleanup of logs captured before masking was in effect.
pub async fn sanitize_logs(pool: &SqlitePool) -> Result<u64> {
    let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, headers FROM logs")
        .fetch_all(pool)
        .await?;

    let mut changed = 0u64;
    for (id, raw) in rows {
        let Ok(mut headers) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        sanitize_headers(&mut headers);
        let updated = headers.to_string();
        if updated != raw {
            sqlx::query("UPDATE logs SET headers = ? WHERE id = ?")
                .bind(&updated)
                .bind(id)
                .execute(pool)
                .await?;
            changed += 1;
        }
    }
    Ok(changed)
}
