use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use shopassist_config::LlmProviderConfig;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pricing {
	pub input_per_million: f64,
	pub output_per_million: f64,
}
impl From<&LlmProviderConfig> for Pricing {
	fn from(cfg: &LlmProviderConfig) -> Self {
		Self {
			input_per_million: cfg.input_cost_per_million,
			output_per_million: cfg.output_cost_per_million,
		}
	}
}

/// Token counts and cost for one or more generation calls.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct UsageMetadata {
	pub input_tokens: u64,
	pub output_tokens: u64,
	pub total_tokens: u64,
	pub cost: f64,
}
impl UsageMetadata {
	pub fn from_tokens(input_tokens: u64, output_tokens: u64, pricing: Pricing) -> Self {
		let cost = input_tokens as f64 / 1_000_000.0 * pricing.input_per_million
			+ output_tokens as f64 / 1_000_000.0 * pricing.output_per_million;

		Self { input_tokens, output_tokens, total_tokens: input_tokens + output_tokens, cost }
	}
}
impl AddAssign for UsageMetadata {
	fn add_assign(&mut self, rhs: Self) {
		self.input_tokens += rhs.input_tokens;
		self.output_tokens += rhs.output_tokens;
		self.total_tokens += rhs.total_tokens;
		self.cost += rhs.cost;
	}
}

#[cfg(test)]
mod tests {
	use crate::usage::{Pricing, UsageMetadata};

	#[test]
	fn cost_uses_per_million_prices() {
		let pricing = Pricing { input_per_million: 0.40, output_per_million: 1.60 };
		let usage = UsageMetadata::from_tokens(1_000_000, 500_000, pricing);

		assert_eq!(usage.total_tokens, 1_500_000);
		assert!((usage.cost - 1.20).abs() < 1e-9);
	}

	#[test]
	fn usage_accumulates() {
		let pricing = Pricing { input_per_million: 1.0, output_per_million: 2.0 };
		let mut total = UsageMetadata::default();

		total += UsageMetadata::from_tokens(100, 10, pricing);
		total += UsageMetadata::from_tokens(50, 5, pricing);

		assert_eq!(total.input_tokens, 150);
		assert_eq!(total.output_tokens, 15);
		assert_eq!(total.total_tokens, 165);
		assert!((total.cost - 0.00018).abs() < 1e-12);
	}
}
