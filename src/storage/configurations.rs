//! Provider configuration store.
//!
//! A configuration names the provider/model pair and sampling parameters
//! every forwarded request uses. Exactly one row is the default; the
//! forwarding path reads only that row.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::config::DefaultConfiguration;
use crate::error::{Error, Result};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProviderConfiguration {
    pub id: i64,
    pub name: String,
    pub provider: String,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    pub top_p: Option<f64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
    pub is_default: bool,
}

/// Fetch the active (default) configuration.
///
/// Every forwarded request routes through this row; none existing is a
/// hard error, never a silent fallback.
pub async fn get_active_configuration(pool: &SqlitePool) -> Result<ProviderConfiguration> {
    sqlx::query_as::<_, ProviderConfiguration>(
        "SELECT id, name, provider, model, temperature, max_tokens, top_p,
                frequency_penalty, presence_penalty, is_default
         FROM configurations WHERE is_default = 1 LIMIT 1",
    )
    .fetch_optional(pool)
    .await?
    .ok_or(Error::ConfigurationMissing)
}

/// Insert a configuration and return its id.
pub async fn insert_configuration(
    pool: &SqlitePool,
    name: &str,
    provider: &str,
    model: &str,
    temperature: Option<f64>,
    max_tokens: Option<i64>,
    top_p: Option<f64>,
    frequency_penalty: Option<f64>,
    presence_penalty: Option<f64>,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO configurations
            (name, provider, model, temperature, max_tokens, top_p,
             frequency_penalty, presence_penalty, is_default)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)",
    )
    .bind(name)
    .bind(provider)
    .bind(model)
    .bind(temperature)
    .bind(max_tokens)
    .bind(top_p)
    .bind(frequency_penalty)
    .bind(presence_penalty)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Make one configuration the default, atomically.
///
/// Unset-all and set-one happen in a single transaction so concurrent
/// readers never observe zero or two defaults.
pub async fn set_default(pool: &SqlitePool, id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE configurations SET is_default = 0 WHERE is_default = 1")
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE configurations SET is_default = 1 WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Upsert the `[default_configuration]` block from config.toml so a fresh
/// install can route without the external configuration UI.
///
/// Sampling parameters left unset in the file are filled from the model
/// catalog template when one matches.
pub async fn upsert_default(pool: &SqlitePool, wanted: &DefaultConfiguration) -> Result<()> {
    let template = crate::catalog::find_template(&wanted.provider, &wanted.model);

    let name = wanted
        .name
        .clone()
        .unwrap_or_else(|| format!("{}/{}", wanted.provider, wanted.model));
    let temperature = wanted
        .temperature
        .or_else(|| template.and_then(|t| t.temperature));
    let max_tokens = wanted
        .max_tokens
        .map(|m| m as i64)
        .or_else(|| template.and_then(|t| t.max_tokens.map(|m| m as i64)));
    let top_p = wanted.top_p.or_else(|| template.and_then(|t| t.top_p));
    let frequency_penalty = wanted
        .frequency_penalty
        .or_else(|| template.and_then(|t| t.frequency_penalty));
    let presence_penalty = wanted
        .presence_penalty
        .or_else(|| template.and_then(|t| t.presence_penalty));

    let existing: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM configurations WHERE name = ? LIMIT 1")
            .bind(&name)
            .fetch_optional(pool)
            .await?;

    let id = match existing {
        Some((id,)) => {
            sqlx::query(
                "UPDATE configurations
                 SET provider = ?, model = ?, temperature = ?, max_tokens = ?,
                     top_p = ?, frequency_penalty = ?, presence_penalty = ?
                 WHERE id = ?",
            )
            .bind(&wanted.provider)
            .bind(&wanted.model)
            .bind(temperature)
            .bind(max_tokens)
            .bind(top_p)
            .bind(frequency_penalty)
            .bind(presence_penalty)
            .bind(id)
            .execute(pool)
            .await?;
            id
        }
        None => {
            insert_configuration(
                pool,
                &name,
                &wanted.provider,
                &wanted.model,
                temperature,
                max_tokens,
                top_p,
                frequency_penalty,
                presence_penalty,
            )
            .await?
        }
    };

    set_default(pool, id).await?;
    tracing::info!(
        name = %name,
        provider = %wanted.provider,
        model = %wanted.model,
        "Default configuration ready"
    );
    Ok(())
}
