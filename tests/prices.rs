//! Integration tests for versioned price lookup.

use chrono::{TimeZone, Utc};

use llmlens::cost::Price;
use llmlens::storage::{self, prices};

#[tokio::test]
async fn test_single_window_contains_timestamp() {
    let pool = storage::init_memory_pool().await.unwrap();
    prices::insert_price(
        &pool,
        "openai",
        "gpt-4o",
        5.0,
        15.0,
        Some("2024-08-01T00:00:00+00:00"),
        Some("2024-12-31T23:59:59+00:00"),
    )
    .await
    .unwrap();

    let inside = Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, 0).unwrap();
    let price = prices::find_price(&pool, "openai", "gpt-4o", inside)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(price.input_token_cost, 5.0);
    assert_eq!(price.output_token_cost, 15.0);
}

#[tokio::test]
async fn test_most_recent_window_wins_when_overlapping() {
    let pool = storage::init_memory_pool().await.unwrap();
    // Old price, never closed out
    prices::insert_price(
        &pool,
        "openai",
        "gpt-4o",
        5.0,
        15.0,
        Some("2024-08-01T00:00:00+00:00"),
        None,
    )
    .await
    .unwrap();
    // Price cut, overlapping the open-ended old row
    prices::insert_price(
        &pool,
        "openai",
        "gpt-4o",
        2.5,
        10.0,
        Some("2024-10-01T00:00:00+00:00"),
        None,
    )
    .await
    .unwrap();

    let after_cut = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();
    let price = prices::find_price(&pool, "openai", "gpt-4o", after_cut)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(price.input_token_cost, 2.5);

    // Before the cut, the old row is the only match
    let before_cut = Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap();
    let price = prices::find_price(&pool, "openai", "gpt-4o", before_cut)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(price.input_token_cost, 5.0);
}

#[tokio::test]
async fn test_timestamp_outside_every_window_degrades_to_zero() {
    let pool = storage::init_memory_pool().await.unwrap();
    prices::insert_price(
        &pool,
        "openai",
        "gpt-4o",
        5.0,
        15.0,
        Some("2024-08-01T00:00:00+00:00"),
        Some("2024-08-31T23:59:59+00:00"),
    )
    .await
    .unwrap();

    let outside = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    assert!(prices::find_price(&pool, "openai", "gpt-4o", outside)
        .await
        .unwrap()
        .is_none());

    let cost = prices::get_model_cost(&pool, "openai", "gpt-4o", outside)
        .await
        .unwrap();
    assert_eq!(cost, Price::ZERO);
}

#[tokio::test]
async fn test_window_bounds_are_inclusive() {
    let pool = storage::init_memory_pool().await.unwrap();
    prices::insert_price(
        &pool,
        "openai",
        "gpt-4o",
        5.0,
        15.0,
        Some("2024-08-01T00:00:00+00:00"),
        Some("2024-08-31T00:00:00+00:00"),
    )
    .await
    .unwrap();

    let at_start = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();
    assert!(prices::find_price(&pool, "openai", "gpt-4o", at_start)
        .await
        .unwrap()
        .is_some());

    let at_end = Utc.with_ymd_and_hms(2024, 8, 31, 0, 0, 0).unwrap();
    assert!(prices::find_price(&pool, "openai", "gpt-4o", at_end)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_seeded_catalog_prices_resolve() {
    let pool = storage::init_memory_pool().await.unwrap();
    prices::seed_from_catalog(&pool).await.unwrap();

    let now = Utc::now();
    let price = prices::get_model_cost(&pool, "openai", "gpt-4o-mini", now)
        .await
        .unwrap();
    assert_eq!(price.input_token_cost, 0.15);
    assert_eq!(price.output_token_cost, 0.6);
}
