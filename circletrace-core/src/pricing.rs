// Copyright 2025 Impact Circle Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Model pricing
//!
//! Static per-token price table for the models the Impact Circle agents
//! call. Lookup falls back to the longest matching prefix so dated model
//! ids ("gemini-1.5-flash-002") resolve to their family entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Per-token pricing for one model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Cost per input token in USD
    pub input_cost_per_token: f64,
    /// Cost per output token in USD
    pub output_cost_per_token: f64,
}

impl ModelPricing {
    /// Pricing quoted per million tokens, the form vendors publish.
    pub fn per_million(input_usd: f64, output_usd: f64) -> Self {
        Self {
            input_cost_per_token: input_usd / 1_000_000.0,
            output_cost_per_token: output_usd / 1_000_000.0,
        }
    }

    /// Calculate the cost for given token counts.
    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_cost_per_token)
            + (output_tokens as f64 * self.output_cost_per_token)
    }

    pub fn is_free(&self) -> bool {
        self.input_cost_per_token == 0.0 && self.output_cost_per_token == 0.0
    }
}

/// Static price table keyed by model id.
#[derive(Debug, Clone)]
pub struct PricingTable {
    models: BTreeMap<String, ModelPricing>,
}

impl PricingTable {
    /// Built-in table covering the model families the agents use.
    /// Prices are USD per million tokens as published by the vendors.
    pub fn builtin() -> Self {
        let mut models = BTreeMap::new();
        let mut add = |id: &str, input: f64, output: f64| {
            models.insert(id.to_string(), ModelPricing::per_million(input, output));
        };

        add("gemini-1.5-flash", 0.35, 1.05);
        add("gemini-1.5-flash-8b", 0.0375, 0.15);
        add("gemini-1.5-pro", 3.50, 10.50);
        add("gemini-2.0-flash", 0.10, 0.40);
        add("gemini-2.0-flash-lite", 0.075, 0.30);
        add("gpt-4o", 2.50, 10.00);
        add("gpt-4o-mini", 0.15, 0.60);
        add("claude-3-5-sonnet", 3.00, 15.00);
        add("claude-3-5-haiku", 0.80, 4.00);

        Self { models }
    }

    /// Insert or override pricing for a model id.
    pub fn set(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.models.insert(model.into(), pricing);
    }

    /// Look up pricing by exact id, then by longest matching prefix.
    pub fn lookup(&self, model: &str) -> Option<ModelPricing> {
        if let Some(pricing) = self.models.get(model) {
            return Some(*pricing);
        }
        self.models
            .iter()
            .filter(|(id, _)| model.starts_with(id.as_str()))
            .max_by_key(|(id, _)| id.len())
            .map(|(_, pricing)| *pricing)
    }

    /// Cost of one call. Unknown models are treated as free and logged,
    /// so cost accounting never blocks a call.
    pub fn cost_for(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        match self.lookup(model) {
            Some(pricing) => pricing.calculate_cost(input_tokens, output_tokens),
            None => {
                warn!(model, "no pricing entry for model, treating as free");
                0.0
            }
        }
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_input_only_cost() {
        let table = PricingTable::builtin();
        let cost = table.cost_for("gemini-1.5-flash", 1_000_000, 0);
        assert!((cost - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_mixed_token_cost() {
        let table = PricingTable::builtin();
        let cost = table.cost_for("gemini-1.5-flash", 500_000, 100_000);
        assert!((cost - (0.175 + 0.105)).abs() < 1e-9);
    }

    #[test]
    fn test_prefix_fallback() {
        let table = PricingTable::builtin();
        let dated = table.lookup("gemini-1.5-flash-002").unwrap();
        let family = table.lookup("gemini-1.5-flash").unwrap();
        assert_eq!(dated.input_cost_per_token, family.input_cost_per_token);
        // The 8b entry is longer, so 8b-dated ids resolve to it instead.
        let small = table.lookup("gemini-1.5-flash-8b-001").unwrap();
        assert!(small.input_cost_per_token < family.input_cost_per_token);
    }

    #[test]
    fn test_unknown_model_is_free() {
        let table = PricingTable::builtin();
        assert_eq!(table.cost_for("mystery-model", 1_000_000, 1_000_000), 0.0);
    }

    #[test]
    fn test_override() {
        let mut table = PricingTable::builtin();
        table.set("local-llama", ModelPricing::per_million(0.0, 0.0));
        assert!(table.lookup("local-llama").unwrap().is_free());
    }
}
