use serde::Deserialize;
use serde_json::json;

use crate::{Error, Result};
use shopassist_domain::filter::SearchFilters;
use shopassist_providers::generation::{ToolCall, ToolSpec};

pub const SEARCH_PRODUCTS: &str = "search_products";
pub const SEARCH_KNOWLEDGE_BASE: &str = "search_knowledge_base";
pub const SEARCH_CATEGORIES: &str = "search_categories";

/// A validated tool request from the model.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolInvocation {
	SearchProducts(SearchProductsArgs),
	SearchKnowledgeBase(QueryArgs),
	SearchCategories(QueryArgs),
}
impl ToolInvocation {
	/// Parses a tool call against the tools offered in this loop. Undeclared tools and
	/// malformed arguments are [`Error::Parse`].
	pub fn parse(call: &ToolCall, offered: &[ToolSpec]) -> Result<Self> {
		if offered.iter().all(|spec| spec.name != call.name) {
			return Err(Error::Parse { message: format!("Tool {} was not offered.", call.name) });
		}

		let raw = if call.arguments.trim().is_empty() { "{}" } else { call.arguments.as_str() };
		let invocation = match call.name.as_str() {
			SEARCH_PRODUCTS => Self::SearchProducts(serde_json::from_str(raw)?),
			SEARCH_KNOWLEDGE_BASE => Self::SearchKnowledgeBase(serde_json::from_str(raw)?),
			SEARCH_CATEGORIES => Self::SearchCategories(serde_json::from_str(raw)?),
			other => return Err(Error::Parse { message: format!("Unknown tool {other}.") }),
		};

		Ok(invocation)
	}
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SearchProductsArgs {
	#[serde(default)]
	pub query: Option<String>,
	/// Names to resolve one by one. Used by the detail and comparison pipelines.
	#[serde(default)]
	pub product_names: Vec<String>,
	#[serde(flatten)]
	pub filters: SearchFilters,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct QueryArgs {
	pub query: String,
}

pub fn search_knowledge_base_spec() -> ToolSpec {
	ToolSpec {
		name: SEARCH_KNOWLEDGE_BASE.to_string(),
		description: "Search store policy documents (returns, shipping, warranty, payments)."
			.to_string(),
		parameters: json!({
			"type": "object",
			"properties": {
				"query": { "type": "string", "description": "Policy question to look up." },
			},
			"required": ["query"],
		}),
	}
}

pub fn search_categories_spec() -> ToolSpec {
	ToolSpec {
		name: SEARCH_CATEGORIES.to_string(),
		description: "Find catalog categories relevant to a shopping request.".to_string(),
		parameters: json!({
			"type": "object",
			"properties": {
				"query": { "type": "string", "description": "Rewritten shopping request." },
			},
			"required": ["query"],
		}),
	}
}

/// Filtered product search used for discovery.
pub fn search_products_spec() -> ToolSpec {
	ToolSpec {
		name: SEARCH_PRODUCTS.to_string(),
		description: "Semantic product search with optional category, price and brand filters."
			.to_string(),
		parameters: json!({
			"type": "object",
			"properties": {
				"query": { "type": "string" },
				"categories": {
					"type": "array",
					"items": { "type": "string" },
					"description": "Category names returned by search_categories.",
				},
				"min_price": { "type": "number" },
				"max_price": { "type": "number" },
				"brand": { "type": "string" },
			},
			"required": ["query"],
		}),
	}
}

/// Name resolution used for detail and comparison questions.
pub fn resolve_products_spec() -> ToolSpec {
	ToolSpec {
		name: SEARCH_PRODUCTS.to_string(),
		description: "Look up specific products by name. Pass every product the user mentions."
			.to_string(),
		parameters: json!({
			"type": "object",
			"properties": {
				"product_names": { "type": "array", "items": { "type": "string" } },
			},
			"required": ["product_names"],
		}),
	}
}

#[cfg(test)]
mod tests {
	use crate::{
		Error,
		tools::{
			QueryArgs, ToolInvocation, search_knowledge_base_spec, search_products_spec,
		},
	};
	use shopassist_providers::generation::ToolCall;

	fn call(name: &str, arguments: &str) -> ToolCall {
		ToolCall { id: "call_1".to_string(), name: name.to_string(), arguments: arguments.to_string() }
	}

	#[test]
	fn parses_product_search_with_flattened_filters() {
		let offered = [search_products_spec()];
		let invocation = ToolInvocation::parse(
			&call(
				"search_products",
				r#"{"query":"gaming laptop","categories":["Laptops"],"max_price":900}"#,
			),
			&offered,
		)
		.expect("Expected valid invocation.");
		let ToolInvocation::SearchProducts(args) = invocation else {
			panic!("Expected product search.");
		};

		assert_eq!(args.query.as_deref(), Some("gaming laptop"));
		assert_eq!(args.filters.categories, vec!["Laptops".to_string()]);
		assert_eq!(args.filters.max_price, Some(900.0));
		assert!(args.product_names.is_empty());
	}

	#[test]
	fn rejects_tools_that_were_not_offered() {
		let offered = [search_knowledge_base_spec()];
		let err = ToolInvocation::parse(&call("search_products", "{}"), &offered)
			.expect_err("Expected rejection.");

		assert!(matches!(err, Error::Parse { .. }));
	}

	#[test]
	fn malformed_arguments_are_parse_errors() {
		let offered = [search_knowledge_base_spec()];
		let err = ToolInvocation::parse(&call("search_knowledge_base", "{\"query\":"), &offered)
			.expect_err("Expected rejection.");

		assert!(matches!(err, Error::Parse { .. }));

		let ok = ToolInvocation::parse(
			&call("search_knowledge_base", r#"{"query":"returns"}"#),
			&offered,
		)
		.expect("Expected valid invocation.");

		assert_eq!(
			ok,
			ToolInvocation::SearchKnowledgeBase(QueryArgs { query: "returns".to_string() })
		);
	}
}
