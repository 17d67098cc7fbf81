use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PRICE_FIELD: &str = "price";
pub const CATEGORY_FIELD: &str = "category";
pub const BRAND_FIELD: &str = "brand";

/// Structured product filters as extracted from a query or passed by a tool call.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SearchFilters {
	#[serde(default)]
	pub min_price: Option<f64>,
	#[serde(default)]
	pub max_price: Option<f64>,
	#[serde(default)]
	pub category: Option<String>,
	#[serde(default)]
	pub brand: Option<String>,
	#[serde(default)]
	pub categories: Vec<String>,
}
impl SearchFilters {
	pub fn is_empty(&self) -> bool {
		self.to_expr().is_none()
	}

	pub fn without_categories(&self) -> Self {
		Self { category: None, categories: Vec::new(), ..self.clone() }
	}

	/// Builds the conjunction of every populated field. The category set becomes a single
	/// any-of group.
	pub fn to_expr(&self) -> Option<FilterExpr> {
		let mut clauses = Vec::new();

		if self.min_price.is_some() || self.max_price.is_some() {
			clauses.push(FilterExpr::Range {
				field: PRICE_FIELD.to_string(),
				gte: self.min_price,
				lte: self.max_price,
			});
		}
		if let Some(category) = non_blank(self.category.as_deref()) {
			clauses.push(FilterExpr::Eq {
				field: CATEGORY_FIELD.to_string(),
				value: category.to_string(),
			});
		}
		if let Some(brand) = non_blank(self.brand.as_deref()) {
			clauses.push(FilterExpr::Eq { field: BRAND_FIELD.to_string(), value: brand.to_string() });
		}

		let categories: Vec<String> = self
			.categories
			.iter()
			.filter_map(|category| non_blank(Some(category.as_str())))
			.map(str::to_string)
			.collect();

		if !categories.is_empty() {
			clauses.push(FilterExpr::AnyOf { field: CATEGORY_FIELD.to_string(), values: categories });
		}

		if clauses.is_empty() { None } else { Some(FilterExpr::All(clauses)) }
	}
}

/// Provider-neutral metadata predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterExpr {
	Eq { field: String, value: String },
	Range { field: String, gte: Option<f64>, lte: Option<f64> },
	AnyOf { field: String, values: Vec<String> },
	All(Vec<FilterExpr>),
}
impl FilterExpr {
	pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
		match self {
			Self::Eq { field, value } => {
				metadata.get(field).and_then(Value::as_str).map(|raw| raw == value).unwrap_or(false)
			},
			Self::Range { field, gte, lte } => {
				let Some(raw) = metadata.get(field).and_then(Value::as_f64) else {
					return false;
				};

				gte.map(|min| raw >= min).unwrap_or(true) && lte.map(|max| raw <= max).unwrap_or(true)
			},
			Self::AnyOf { field, values } => metadata
				.get(field)
				.and_then(Value::as_str)
				.map(|raw| values.iter().any(|value| value == raw))
				.unwrap_or(false),
			Self::All(clauses) => clauses.iter().all(|clause| clause.matches(metadata)),
		}
	}
}

fn non_blank(value: Option<&str>) -> Option<&str> {
	value.map(str::trim).filter(|value| !value.is_empty())
}
