//! Per-request cost math.
//!
//! Prices are denominated in USD per one million tokens; the scaling
//! constant below is load-bearing and must match the price table.

use serde::{Deserialize, Serialize};

/// Tokens covered by one price unit.
pub const TOKENS_PER_PRICE_UNIT: f64 = 1_000_000.0;

/// Input/output price for a (provider, model) pair, per one million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Price {
    pub input_token_cost: f64,
    pub output_token_cost: f64,
}

impl Price {
    /// The zero-cost fallback used when no price entry matches.
    pub const ZERO: Price = Price {
        input_token_cost: 0.0,
        output_token_cost: 0.0,
    };
}

/// Cost of a single request, split by token direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

impl CostBreakdown {
    pub const ZERO: CostBreakdown = CostBreakdown {
        input_cost: 0.0,
        output_cost: 0.0,
        total_cost: 0.0,
    };
}

/// Compute the cost of a request from token counts and a price.
pub fn calculate_cost(input_tokens: u32, output_tokens: u32, price: &Price) -> CostBreakdown {
    let input_cost = (input_tokens as f64 / TOKENS_PER_PRICE_UNIT) * price.input_token_cost;
    let output_cost = (output_tokens as f64 / TOKENS_PER_PRICE_UNIT) * price.output_token_cost;
    CostBreakdown {
        input_cost,
        output_cost,
        total_cost: input_cost + output_cost,
    }
}
