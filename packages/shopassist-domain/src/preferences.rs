use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::filter::SearchFilters;

const AMOUNT: &str = r"\$?\s*(\d+(?:\.\d+)?)";
const CATEGORY_KEYWORDS: [(&str, &str); 12] = [
	("laptop", "Laptops"),
	("notebook", "Laptops"),
	("computer", "Laptops"),
	("headphone", "Headphones"),
	("earphone", "Headphones"),
	("smartphone", "Smartphones"),
	("phone", "Smartphones"),
	("tablet", "Tablets"),
	("watch", "Smartwatches"),
	("camera", "Cameras"),
	("printer", "Printers"),
	("monitor", "Monitors"),
];

static PRICE_PATTERNS: LazyLock<Vec<(Regex, PriceShape)>> = LazyLock::new(|| {
	[
		(format!(r"(?i)\bunder\s+{AMOUNT}"), PriceShape::Max),
		(format!(r"(?i)\bless\s+than\s+{AMOUNT}"), PriceShape::Max),
		(format!(r"(?i)\bbelow\s+{AMOUNT}"), PriceShape::Max),
		(format!(r"(?i)\bcheaper\s+than\s+{AMOUNT}"), PriceShape::Max),
		(format!(r"(?i)\bbetween\s+{AMOUNT}\s+and\s+{AMOUNT}"), PriceShape::Range),
		(format!(r"(?i){AMOUNT}\s+to\s+{AMOUNT}"), PriceShape::Range),
	]
	.into_iter()
	.filter_map(|(pattern, shape)| Regex::new(&pattern).ok().map(|re| (re, shape)))
	.collect()
});

#[derive(Clone, Copy)]
enum PriceShape {
	Max,
	Range,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct PriceRange {
	pub min: Option<f64>,
	pub max: Option<f64>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct UserPreferences {
	#[serde(default)]
	pub price_range: Option<PriceRange>,
	#[serde(default)]
	pub preferred_categories: Vec<String>,
	#[serde(default)]
	pub preferred_brands: Vec<String>,
	#[serde(default)]
	pub mentioned_products: Vec<String>,
}
impl UserPreferences {
	/// Folds `newer` into `self`. A newer price range replaces the old one; list fields are
	/// unioned in first-seen order.
	pub fn merge(&mut self, newer: UserPreferences) {
		if newer.price_range.is_some() {
			self.price_range = newer.price_range;
		}

		union_into(&mut self.preferred_categories, newer.preferred_categories);
		union_into(&mut self.preferred_brands, newer.preferred_brands);
		union_into(&mut self.mentioned_products, newer.mentioned_products);
	}
}

pub fn extract_price_range(text: &str) -> Option<PriceRange> {
	for (re, shape) in PRICE_PATTERNS.iter() {
		let Some(captures) = re.captures(text) else {
			continue;
		};
		let first = captures.get(1).and_then(|m| m.as_str().parse::<f64>().ok());

		return match shape {
			PriceShape::Max => first.map(|max| PriceRange { min: None, max: Some(max) }),
			PriceShape::Range => {
				let second = captures.get(2).and_then(|m| m.as_str().parse::<f64>().ok());

				match (first, second) {
					(Some(lo), Some(hi)) if lo <= hi => Some(PriceRange { min: Some(lo), max: Some(hi) }),
					(Some(lo), Some(hi)) => Some(PriceRange { min: Some(hi), max: Some(lo) }),
					_ => None,
				}
			},
		};
	}

	None
}

pub fn extract_category(text: &str) -> Option<&'static str> {
	let lowered = text.to_lowercase();

	CATEGORY_KEYWORDS
		.iter()
		.find(|(keyword, _)| lowered.contains(keyword))
		.map(|(_, category)| *category)
}

/// Preferences observable in a single user message.
pub fn extract_preferences(text: &str) -> UserPreferences {
	UserPreferences {
		price_range: extract_price_range(text),
		preferred_categories: extract_category(text).map(|c| vec![c.to_string()]).unwrap_or_default(),
		..Default::default()
	}
}

/// Price filters implied by the query text.
pub fn extract_filters(text: &str) -> SearchFilters {
	let range = extract_price_range(text).unwrap_or_default();

	SearchFilters { min_price: range.min, max_price: range.max, ..Default::default() }
}

fn union_into(target: &mut Vec<String>, incoming: Vec<String>) {
	for item in incoming {
		if !target.contains(&item) {
			target.push(item);
		}
	}
}

#[cfg(test)]
mod tests {
	use crate::preferences::{
		PriceRange, UserPreferences, extract_category, extract_filters, extract_price_range,
	};

	#[test]
	fn upper_bound_phrases_set_max_only() {
		for text in [
			"laptop under $500",
			"Anything less than 500?",
			"headphones below $500",
			"cheaper than $500 please",
		] {
			assert_eq!(
				extract_price_range(text),
				Some(PriceRange { min: None, max: Some(500.0) }),
				"text: {text}"
			);
		}
	}

	#[test]
	fn range_phrases_set_both_bounds() {
		assert_eq!(
			extract_price_range("between $200 and $400"),
			Some(PriceRange { min: Some(200.0), max: Some(400.0) })
		);
		assert_eq!(
			extract_price_range("something from $100 to $250"),
			Some(PriceRange { min: Some(100.0), max: Some(250.0) })
		);
		assert_eq!(
			extract_price_range("between 400 and 200"),
			Some(PriceRange { min: Some(200.0), max: Some(400.0) })
		);
	}

	#[test]
	fn text_without_price_yields_no_filters() {
		assert_eq!(extract_price_range("best noise cancelling headphones"), None);
		assert!(extract_filters("best noise cancelling headphones").is_empty());
	}

	#[test]
	fn category_keywords_match_specific_terms_first() {
		assert_eq!(extract_category("wireless headphones"), Some("Headphones"));
		assert_eq!(extract_category("a new smartphone"), Some("Smartphones"));
		assert_eq!(extract_category("gaming Laptop"), Some("Laptops"));
		assert_eq!(extract_category("return policy"), None);
	}

	#[test]
	fn merge_prefers_recent_price_and_unions_lists() {
		let mut current = UserPreferences {
			price_range: Some(PriceRange { min: None, max: Some(1_000.0) }),
			preferred_categories: vec!["Laptops".to_string()],
			preferred_brands: vec!["Dell".to_string()],
			mentioned_products: vec!["p1".to_string()],
		};

		current.merge(UserPreferences {
			price_range: Some(PriceRange { min: Some(200.0), max: Some(400.0) }),
			preferred_categories: vec!["Laptops".to_string(), "Monitors".to_string()],
			preferred_brands: Vec::new(),
			mentioned_products: vec!["p2".to_string()],
		});

		assert_eq!(current.price_range, Some(PriceRange { min: Some(200.0), max: Some(400.0) }));
		assert_eq!(current.preferred_categories, vec!["Laptops", "Monitors"]);
		assert_eq!(current.preferred_brands, vec!["Dell"]);
		assert_eq!(current.mentioned_products, vec!["p1", "p2"]);

		current.merge(UserPreferences::default());

		assert_eq!(current.price_range, Some(PriceRange { min: Some(200.0), max: Some(400.0) }));
	}
}
