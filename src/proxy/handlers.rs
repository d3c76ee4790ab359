//! HTTP request handlers.

use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use super::forward::{forward, Forwarded};
use super::server::AppState;
use super::stream::{encode_event_stream, CompletionCallback, StreamOutcome};
use super::types::ChatCompletionRequest;
use crate::cost::{calculate_cost, Price};
use crate::error::Error;
use crate::storage::logging::{
    insert_failed, insert_passthrough, insert_pending, spawn_completion_update,
    spawn_failure_update, update_completion, update_failure,
};
use crate::storage::{configurations, prices, LogMetadata, NewLog};

/// Default upstream for the models-list passthrough.
pub const OPENAI_MODELS_URL: &str = "https://api.openai.com/v1/models";

/// Capture request headers as a JSON object for the log row.
fn headers_to_json(headers: &HeaderMap) -> Value {
    let mut map = serde_json::Map::new();
    for (name, value) in headers.iter() {
        let value = value.to_str().unwrap_or("<non-utf8>");
        map.insert(name.as_str().to_string(), Value::String(value.to_string()));
    }
    Value::Object(map)
}

/// Resolve the price for a request, degrading to zero on store errors.
async fn price_or_zero(pool: &SqlitePool, provider: &str, model: &str) -> Price {
    match prices::get_model_cost(pool, provider, model, Utc::now()).await {
        Ok(price) => price,
        Err(e) => {
            tracing::warn!(error = %e, "Price lookup failed, using zero cost");
            Price::ZERO
        }
    }
}

/// Handle POST /v1/chat/completions (and the unversioned alias).
pub async fn chat_completions(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    let log = NewLog {
        method: "POST".to_string(),
        url: uri.path().to_string(),
        headers: headers_to_json(&headers),
        body: serde_json::to_value(&request).unwrap_or_else(|_| json!({})),
    };

    // Routing follows the active configuration, never the inbound model
    let config = match configurations::get_active_configuration(&state.pool).await {
        Ok(config) => config,
        Err(e) => {
            let detail = format!("{:?}", e);
            if let Err(write_err) = insert_failed(&state.pool, &log, &e.to_string(), &detail).await
            {
                tracing::warn!(error = %write_err, "Failed to write request log");
            }
            return e.into_response();
        }
    };

    tracing::info!(
        provider = %config.provider,
        model = %config.model,
        stream = request.stream,
        "Received chat completion request"
    );

    let metadata = LogMetadata::pending(config.id, &config.provider, &config.model);
    let log_id = match insert_pending(&state.pool, &log, &metadata).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to write request log");
            None
        }
    };

    match forward(&config, &request, &state.registry).await {
        Ok(Forwarded::Complete(output)) => {
            if let Some(id) = log_id {
                let response = serde_json::to_value(&output).unwrap_or_else(|_| json!({}));
                let metadata = match &output.usage {
                    Some(usage) => {
                        let price =
                            price_or_zero(&state.pool, &config.provider, &config.model).await;
                        let cost =
                            calculate_cost(usage.prompt_tokens, usage.completion_tokens, &price);
                        metadata.with_usage(usage, &cost)
                    }
                    // No usage reported: the zeroed pending metadata stands
                    None => metadata,
                };
                if let Err(e) = update_completion(&state.pool, id, &response, &metadata).await {
                    tracing::warn!(log_id = id, error = %e, "Failed to update request log");
                }
            }

            Json(output).into_response()
        }
        Ok(Forwarded::Stream(deltas)) => {
            let callback = completion_logger(&state, log_id, metadata);
            let body = encode_event_stream(deltas, config.model.clone(), callback);

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/event-stream")
                .header(header::CACHE_CONTROL, "no-cache")
                .body(Body::from_stream(body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                provider = %config.provider,
                "Chat completion request failed"
            );
            if let Some(id) = log_id {
                let detail = format!("{:?}", e);
                if let Err(write_err) = update_failure(&state.pool, id, &e.to_string(), &detail).await
                {
                    tracing::warn!(log_id = id, error = %write_err, "Failed to update request log");
                }
            }
            e.into_response()
        }
    }
}

/// Completion callback that finalizes the log row after a stream ends.
///
/// Runs after the HTTP response is underway; the write is spawned so it
/// can neither block nor fail the response.
fn completion_logger(
    state: &AppState,
    log_id: Option<i64>,
    metadata: LogMetadata,
) -> CompletionCallback {
    let pool = state.pool.clone();
    Box::new(move |outcome: Result<StreamOutcome, Error>| {
        let Some(id) = log_id else {
            return;
        };
        match outcome {
            Ok(outcome) => {
                let pool = pool.clone();
                tokio::spawn(async move {
                    let response = json!({
                        "text": outcome.text,
                        "usage": outcome.usage,
                        "finishReason": outcome.finish_reason,
                    });
                    let metadata = match &outcome.usage {
                        Some(usage) => {
                            let price =
                                price_or_zero(&pool, &metadata.provider, &metadata.model).await;
                            let cost = calculate_cost(
                                usage.prompt_tokens,
                                usage.completion_tokens,
                                &price,
                            );
                            metadata.with_usage(usage, &cost)
                        }
                        None => metadata,
                    };
                    spawn_completion_update(&pool, id, response, metadata);
                });
            }
            Err(e) => {
                let detail = format!("{:?}", e);
                spawn_failure_update(&pool, id, e.to_string(), detail);
            }
        }
    })
}

/// Handle GET /models and GET /v1/models: passthrough to the upstream
/// models list, logged like any other call.
pub async fn list_models(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    let log = NewLog {
        method: "GET".to_string(),
        url: uri.path().to_string(),
        headers: headers_to_json(&headers),
        body: json!({}),
    };

    let mut upstream = state.http_client.get(&state.models_url);
    if let Some(key) = (state.env)("OPENAI_API_KEY") {
        upstream = upstream.bearer_auth(key);
    }

    let result: Result<Value, Error> = async {
        let response = upstream
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Failed to fetch models: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "Models endpoint returned {}",
                status
            )));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| Error::Upstream(format!("Failed to parse models response: {}", e)))
    }
    .await;

    match result {
        Ok(models) => {
            if let Err(e) = insert_passthrough(&state.pool, &log, &models).await {
                tracing::warn!(error = %e, "Failed to write request log");
            }
            Json(models).into_response()
        }
        Err(e) => {
            let detail = format!("{:?}", e);
            if let Err(write_err) = insert_failed(&state.pool, &log, &e.to_string(), &detail).await
            {
                tracing::warn!(error = %write_err, "Failed to write request log");
            }
            e.into_response()
        }
    }
}

/// Handle GET /health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
