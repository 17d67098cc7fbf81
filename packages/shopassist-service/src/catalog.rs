use serde::{Deserialize, Serialize};

use crate::{Error, Result, ShopAssistService, context};
use shopassist_domain::{
	filter::SearchFilters,
	model::{EnrichedResult, Product},
	preferences,
};

pub const DEFAULT_CATALOG_LIMIT: u32 = 20;
pub const MAX_CATALOG_LIMIT: u32 = 100;

/// Structured catalog lookup. At least one criterion is required.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct CatalogQuery {
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub category: Option<String>,
	#[serde(default)]
	pub min_price: Option<f64>,
	#[serde(default)]
	pub max_price: Option<f64>,
	#[serde(default)]
	pub limit: Option<u32>,
}
impl CatalogQuery {
	pub fn validate(&self) -> Result<()> {
		let name = self.name.as_deref().is_some_and(|v| !v.trim().is_empty());
		let category = self.category.as_deref().is_some_and(|v| !v.trim().is_empty());

		if !name && !category && self.min_price.is_none() && self.max_price.is_none() {
			return Err(Error::Validation {
				message: "At least one search parameter must be provided.".to_string(),
			});
		}

		for price in [self.min_price, self.max_price].into_iter().flatten() {
			if !price.is_finite() || price < 0.0 {
				return Err(Error::Validation {
					message: "Price values must be non-negative.".to_string(),
				});
			}
		}

		if let (Some(min), Some(max)) = (self.min_price, self.max_price)
			&& min > max
		{
			return Err(Error::Validation {
				message: "Minimum price cannot be greater than maximum price.".to_string(),
			});
		}

		Ok(())
	}

	fn matches(&self, product: &Product) -> bool {
		let category = self
			.category
			.as_deref()
			.map(str::trim)
			.filter(|v| !v.is_empty())
			.is_none_or(|category| product.category.eq_ignore_ascii_case(category));

		category
			&& self.min_price.is_none_or(|min| product.price >= min)
			&& self.max_price.is_none_or(|max| product.price <= max)
	}
}

#[derive(Clone, Debug, Deserialize)]
pub struct VectorSearchRequest {
	pub query: String,
	#[serde(default)]
	pub top_k: Option<u32>,
	#[serde(default)]
	pub filters: Option<SearchFilters>,
}

#[derive(Clone, Debug, Serialize)]
pub struct VectorSearchResponse {
	pub query: String,
	pub results: Vec<EnrichedResult>,
	pub context: String,
	pub filters_applied: SearchFilters,
}

impl ShopAssistService {
	pub async fn get_product(&self, product_id: &str) -> Result<Product> {
		self.providers
			.repository
			.get_by_id(product_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Product {product_id} not found.") })
	}

	/// Catalog lookup against the document store. A name search takes precedence over a
	/// category search, which takes precedence over a pure price search; the remaining
	/// criteria are applied to the result.
	pub async fn browse_products(&self, query: &CatalogQuery) -> Result<Vec<Product>> {
		query.validate()?;

		let limit = query.limit.unwrap_or(DEFAULT_CATALOG_LIMIT).clamp(1, MAX_CATALOG_LIMIT);
		let repository = &self.providers.repository;
		let name = query.name.as_deref().map(str::trim).filter(|v| !v.is_empty());
		let category = query.category.as_deref().map(str::trim).filter(|v| !v.is_empty());
		let products = match (name, category) {
			(Some(name), _) => repository.search_by_text(name, limit).await?,
			(None, Some(category)) => repository.search_by_category(category, limit).await?,
			(None, None) =>
				repository.search_by_price(query.min_price, query.max_price, limit).await?,
		};

		Ok(products.into_iter().filter(|product| query.matches(product)).collect())
	}

	/// Direct semantic search. Price bounds found in the query text fill in filters the caller
	/// left unset.
	pub async fn vector_search(
		&self,
		request: VectorSearchRequest,
	) -> Result<VectorSearchResponse> {
		let query = request.query.trim();

		if query.is_empty() {
			return Err(Error::Validation { message: "Query must not be empty.".to_string() });
		}

		let extracted = preferences::extract_filters(query);
		let mut filters = request.filters.unwrap_or_default();

		if filters.min_price.is_none() && filters.max_price.is_none() {
			filters.min_price = extracted.min_price;
			filters.max_price = extracted.max_price;
		}

		let top_k =
			request.top_k.unwrap_or(self.cfg.retrieval.product_top_k).clamp(1, MAX_CATALOG_LIMIT);
		let results = self.retrieve(query, top_k, &filters, true).await;
		let budget = self.cfg.context.token_budget as usize;
		let context = context::build_context(&results, budget, &self.tokenizer).text;

		Ok(VectorSearchResponse {
			query: query.to_string(),
			results,
			context,
			filters_applied: filters,
		})
	}
}
