//! Versioned model price store.
//!
//! Prices carry a validity window so historical requests keep the price
//! that was current when they ran. Windows may overlap; the row with the
//! most recent `valid_from` wins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::catalog;
use crate::cost::Price;
use crate::error::Result;

/// Seed rows are stamped with the catalog launch date.
const SEED_VALID_FROM: &str = "2024-08-01T00:00:00+00:00";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ModelPrice {
    pub id: i64,
    pub provider: String,
    pub model: String,
    /// USD per one million input tokens.
    pub input_token_cost: f64,
    /// USD per one million output tokens.
    pub output_token_cost: f64,
    pub valid_from: Option<String>,
    pub valid_to: Option<String>,
}

/// Find the price row whose validity window contains `as_of`.
///
/// Timestamps are RFC3339 TEXT and compare correctly as strings. A NULL
/// bound is open on that side.
pub async fn find_price(
    pool: &SqlitePool,
    provider: &str,
    model: &str,
    as_of: DateTime<Utc>,
) -> Result<Option<ModelPrice>> {
    let as_of = as_of.to_rfc3339();
    let price = sqlx::query_as::<_, ModelPrice>(
        "SELECT id, provider, model, input_token_cost, output_token_cost, valid_from, valid_to
         FROM model_costs
         WHERE provider = ? AND model = ?
           AND (valid_from IS NULL OR valid_from <= ?)
           AND (valid_to IS NULL OR valid_to >= ?)
         ORDER BY valid_from DESC
         LIMIT 1",
    )
    .bind(provider)
    .bind(model)
    .bind(&as_of)
    .bind(&as_of)
    .fetch_optional(pool)
    .await?;
    Ok(price)
}

/// Resolve the per-million price for a (provider, model) pair.
///
/// A missing price degrades to zero cost with a warning so an unpriced
/// model never blocks request handling.
pub async fn get_model_cost(
    pool: &SqlitePool,
    provider: &str,
    model: &str,
    as_of: DateTime<Utc>,
) -> Result<Price> {
    match find_price(pool, provider, model, as_of).await? {
        Some(price) => Ok(Price {
            input_token_cost: price.input_token_cost,
            output_token_cost: price.output_token_cost,
        }),
        None => {
            tracing::warn!(
                provider = %provider,
                model = %model,
                "No price found for model, using zero cost"
            );
            Ok(Price::ZERO)
        }
    }
}

/// Insert one price row.
pub async fn insert_price(
    pool: &SqlitePool,
    provider: &str,
    model: &str,
    input_token_cost: f64,
    output_token_cost: f64,
    valid_from: Option<&str>,
    valid_to: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO model_costs
            (provider, model, input_token_cost, output_token_cost, valid_from, valid_to)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(provider)
    .bind(model)
    .bind(input_token_cost)
    .bind(output_token_cost)
    .bind(valid_from)
    .bind(valid_to)
    .execute(pool)
    .await?;
    Ok(())
}

/// Populate an empty price table from the built-in catalog.
///
/// Runs at startup; a non-empty table is left untouched so operator
/// price edits survive restarts.
pub async fn seed_from_catalog(pool: &SqlitePool) -> Result<()> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM model_costs")
        .fetch_one(pool)
        .await?;
    if count.0 > 0 {
        return Ok(());
    }

    let mut seeded = 0usize;
    for entry in catalog::priced_entries() {
        insert_price(
            pool,
            entry.provider,
            entry.model,
            entry.input_token_cost.unwrap_or(0.0),
            entry.output_token_cost.unwrap_or(0.0),
            Some(SEED_VALID_FROM),
            None,
        )
        .await?;
        seeded += 1;
    }
    tracing::info!(models = seeded, "Seeded model price table from catalog");
    Ok(())
}
