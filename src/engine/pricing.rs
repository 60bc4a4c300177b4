//! The per-(provider, model) price table the budget check consults to
//! compute running cost. Prices are illustrative, matching the static
//! model whitelists in `skillrunner-providers`.

use std::collections::HashMap;

/// Dollars per million tokens, input and output priced separately as
/// real vendor price sheets do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

pub struct PriceTable {
    prices: HashMap<(String, String), ModelPrice>,
    default_price: ModelPrice,
}

impl Default for PriceTable {
    fn default() -> Self {
        let mut prices = HashMap::new();
        prices.insert(
            ("anthropic".to_string(), "claude-opus-4".to_string()),
            ModelPrice { input_per_million: 15.0, output_per_million: 75.0 },
        );
        prices.insert(
            ("anthropic".to_string(), "claude-sonnet-4".to_string()),
            ModelPrice { input_per_million: 3.0, output_per_million: 15.0 },
        );
        prices.insert(
            ("anthropic".to_string(), "claude-haiku-4".to_string()),
            ModelPrice { input_per_million: 0.8, output_per_million: 4.0 },
        );
        prices.insert(
            ("openai".to_string(), "gpt-4o".to_string()),
            ModelPrice { input_per_million: 2.5, output_per_million: 10.0 },
        );
        prices.insert(
            ("openai".to_string(), "gpt-4o-mini".to_string()),
            ModelPrice { input_per_million: 0.15, output_per_million: 0.6 },
        );
        prices.insert(
            ("openai".to_string(), "gpt-4-turbo".to_string()),
            ModelPrice { input_per_million: 10.0, output_per_million: 30.0 },
        );
        prices.insert(
            ("groq".to_string(), "llama-3.3-70b-versatile".to_string()),
            ModelPrice { input_per_million: 0.59, output_per_million: 0.79 },
        );
        prices.insert(
            ("groq".to_string(), "llama-3.1-8b-instant".to_string()),
            ModelPrice { input_per_million: 0.05, output_per_million: 0.08 },
        );
        prices.insert(
            ("groq".to_string(), "mixtral-8x7b-32768".to_string()),
            ModelPrice { input_per_million: 0.24, output_per_million: 0.24 },
        );

        Self {
            prices,
            // Local/unmetered providers (e.g. ollama) and any unknown
            // vendor default to free.
            default_price: ModelPrice { input_per_million: 0.0, output_per_million: 0.0 },
        }
    }
}

impl PriceTable {
    pub fn cost(&self, provider: &str, model_id: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let price = self
            .prices
            .get(&(provider.to_string(), model_id.to_string()))
            .copied()
            .unwrap_or(self.default_price);
        (input_tokens as f64 / 1_000_000.0) * price.input_per_million
            + (output_tokens as f64 / 1_000_000.0) * price.output_per_million
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_prices_nonzero_cost() {
        let table = PriceTable::default();
        let cost = table.cost("openai", "gpt-4o", 1_000_000, 1_000_000);
        assert_eq!(cost, 2.5 + 10.0);
    }

    #[test]
    fn unknown_provider_or_model_defaults_to_free() {
        let table = PriceTable::default();
        assert_eq!(table.cost("ollama", "llama3", 1_000_000, 1_000_000), 0.0);
        assert_eq!(table.cost("openai", "unknown-model", 1_000_000, 1_000_000), 0.0);
    }

    #[test]
    fn cost_scales_with_tokens() {
        let table = PriceTable::default();
        let half = table.cost("groq", "llama-3.3-70b-versatile", 500_000, 0);
        let full = table.cost("groq", "llama-3.3-70b-versatile", 1_000_000, 0);
        assert!((full - 2.0 * half).abs() < 1e-9);
    }
}
