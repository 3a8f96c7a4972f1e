// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-model token pricing.

use crate::types::TokenUsage;

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPrice {
    const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_per_million
            + usage.output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

/// Model-name prefixes and their list prices. Longer prefixes come first so
/// `gpt-4o-mini` is not priced as `gpt-4o`.
const PRICES: &[(&str, ModelPrice)] = &[
    ("gpt-4o-mini", ModelPrice::new(0.15, 0.60)),
    ("gpt-4o", ModelPrice::new(2.50, 10.00)),
    ("gpt-4.1-mini", ModelPrice::new(0.40, 1.60)),
    ("gpt-4.1", ModelPrice::new(2.00, 8.00)),
    ("gpt-4-turbo", ModelPrice::new(10.00, 30.00)),
    ("gpt-4", ModelPrice::new(30.00, 60.00)),
    ("gpt-3.5-turbo", ModelPrice::new(0.50, 1.50)),
    ("o1-mini", ModelPrice::new(1.10, 4.40)),
    ("o1", ModelPrice::new(15.00, 60.00)),
    ("o3-mini", ModelPrice::new(1.10, 4.40)),
    ("text-embedding-3-small", ModelPrice::new(0.02, 0.0)),
    ("text-embedding-3-large", ModelPrice::new(0.13, 0.0)),
    ("claude-opus-4", ModelPrice::new(15.00, 75.00)),
    ("claude-sonnet-4", ModelPrice::new(3.00, 15.00)),
    ("claude-3-5-sonnet", ModelPrice::new(3.00, 15.00)),
    ("claude-3-5-haiku", ModelPrice::new(0.80, 4.00)),
    ("claude-3-opus", ModelPrice::new(15.00, 75.00)),
    ("claude-3-haiku", ModelPrice::new(0.25, 1.25)),
    ("gemini-1.5-flash", ModelPrice::new(0.075, 0.30)),
    ("gemini-1.5-pro", ModelPrice::new(1.25, 5.00)),
    ("gemini-2.0-flash", ModelPrice::new(0.10, 0.40)),
    ("mistral-large", ModelPrice::new(2.00, 6.00)),
    ("mistral-small", ModelPrice::new(0.20, 0.60)),
    ("deepseek-chat", ModelPrice::new(0.27, 1.10)),
    ("deepseek-reasoner", ModelPrice::new(0.55, 2.19)),
];

/// Look up the price of a model, ignoring case and any `vendor/` prefix.
pub fn price_for(model: &str) -> Option<ModelPrice> {
    let lowered = model.trim().to_ascii_lowercase();
    let name = lowered.rsplit('/').next().unwrap_or(&lowered);
    PRICES
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix))
        .map(|(_, price)| *price)
}

/// Estimated cost of a call, when the model is priced.
pub fn estimate_cost(model: &str, usage: &TokenUsage) -> Option<f64> {
    price_for(model).map(|price| price.cost(usage))
}
