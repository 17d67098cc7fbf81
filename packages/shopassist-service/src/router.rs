use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
	Error, Result, ShopAssistService,
	pipeline::{self, prompts},
};
use shopassist_domain::{
	model::{Intent, Message, RouteDecision, SubQuery},
	usage::{Pricing, UsageMetadata},
};
use shopassist_providers::generation::ChatMessage;

const SCHEMA_NAME: &str = "route_decision";

/// Wire form of the structured routing answer.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RouterOutput {
	pub routes: Vec<RouteEntry>,
	pub reasoning: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RouteEntry {
	pub agent: String,
	pub query: String,
	pub confidence: f32,
}

impl ShopAssistService {
	/// Classifies a query. When the structured call fails or returns malformed data, falls back
	/// to keyword routing with zero confidence and zero usage.
	pub async fn route(&self, query: &str, history: &[Message]) -> (RouteDecision, UsageMetadata) {
		match self.try_route(query, history).await {
			Ok(routed) => routed,
			Err(err) => {
				tracing::warn!(
					operation = "route",
					query,
					error = %err,
					"Structured routing failed. Falling back to keywords."
				);

				(RouteDecision::fallback(query), UsageMetadata::default())
			},
		}
	}

	async fn try_route(
		&self,
		query: &str,
		history: &[Message],
	) -> Result<(RouteDecision, UsageMetadata)> {
		let cfg = &self.cfg.providers.router;
		let mut messages = vec![ChatMessage::system(prompts::ROUTER)];

		messages.extend(pipeline::history_messages(history));
		messages.push(ChatMessage::user(query));

		let schema = router_schema();
		let (value, completion) = self
			.providers
			.generation
			.generate_structured(cfg, &messages, SCHEMA_NAME, &schema)
			.await?;
		let usage = UsageMetadata::from_tokens(
			completion.input_tokens,
			completion.output_tokens,
			Pricing::from(cfg),
		);
		let output: RouterOutput = serde_json::from_value(value)?;

		Ok((decide(output, query)?, usage))
	}
}

/// Turns the routing answer into a decision. Unknown handler names go to product search; a
/// blank sub-query is replaced by the full query. Sub-queries are kept only when there are
/// several routes.
pub fn decide(output: RouterOutput, query: &str) -> Result<RouteDecision> {
	let mut sub_queries: Vec<SubQuery> = Vec::with_capacity(output.routes.len());
	let mut confidence = None;

	for route in output.routes {
		let intent = Intent::parse(&route.agent).unwrap_or_else(|| {
			tracing::warn!(agent = %route.agent, query, "Unknown route target. Using product search.");

			Intent::ProductSearch
		});
		let sub_query = route.query.trim();
		let sub_query = if sub_query.is_empty() { query } else { sub_query };

		if sub_queries.iter().any(|existing| existing.intent == intent) {
			continue;
		}

		confidence.get_or_insert(route.confidence);
		sub_queries.push(SubQuery { intent, query: sub_query.to_string() });
	}

	let Some(first) = sub_queries.first() else {
		return Err(Error::Parse { message: "Routing answer contains no routes.".to_string() });
	};
	let target = first.intent;
	let confidence = confidence.unwrap_or_default();

	if sub_queries.len() == 1 {
		sub_queries.clear();
	}

	Ok(RouteDecision {
		target,
		confidence: if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 },
		reasoning: output.reasoning,
		sub_queries,
	})
}

fn router_schema() -> Value {
	let agents: Vec<&str> = Intent::ALL.iter().map(|intent| intent.as_str()).collect();

	json!({
		"type": "object",
		"properties": {
			"routes": {
				"type": "array",
				"items": {
					"type": "object",
					"properties": {
						"agent": { "type": "string", "enum": agents },
						"query": { "type": "string" },
						"confidence": { "type": "number" },
					},
					"required": ["agent", "query", "confidence"],
					"additionalProperties": false,
				},
			},
			"reasoning": { "type": "string" },
		},
		"required": ["routes", "reasoning"],
		"additionalProperties": false,
	})
}

#[cfg(test)]
mod tests {
	use crate::{
		Error,
		router::{RouteEntry, RouterOutput, decide},
	};
	use shopassist_domain::model::Intent;

	fn entry(agent: &str, query: &str, confidence: f32) -> RouteEntry {
		RouteEntry { agent: agent.to_string(), query: query.to_string(), confidence }
	}

	#[test]
	fn single_route_has_no_sub_queries() {
		let output = RouterOutput {
			routes: vec![entry("policy", "return policy", 0.93)],
			reasoning: "Asks about returns.".to_string(),
		};
		let decision = decide(output, "what's your return policy").expect("Expected decision.");

		assert_eq!(decision.target, Intent::Policy);
		assert_eq!(decision.confidence, 0.93);
		assert!(decision.sub_queries.is_empty());
	}

	#[test]
	fn multiple_routes_become_sub_queries_without_duplicate_intents() {
		let output = RouterOutput {
			routes: vec![
				entry("product_search", "tablets under $300", 0.8),
				entry("policy", "", 0.7),
				entry("product_search", "cheap tablets", 0.6),
			],
			reasoning: String::new(),
		};
		let decision =
			decide(output, "tablets under $300? also shipping time").expect("Expected decision.");

		assert_eq!(decision.target, Intent::ProductSearch);
		assert_eq!(decision.sub_queries.len(), 2);
		assert_eq!(decision.sub_queries[1].intent, Intent::Policy);
		assert_eq!(decision.sub_queries[1].query, "tablets under $300? also shipping time");
	}

	#[test]
	fn unknown_agents_map_to_product_search_and_confidence_is_clamped() {
		let output =
			RouterOutput { routes: vec![entry("chitchat", "hi", 1.7)], reasoning: String::new() };
		let decision = decide(output, "hi").expect("Expected decision.");

		assert_eq!(decision.target, Intent::ProductSearch);
		assert_eq!(decision.confidence, 1.0);
	}

	#[test]
	fn empty_route_list_is_a_parse_error() {
		let output = RouterOutput { routes: Vec::new(), reasoning: String::new() };

		assert!(matches!(decide(output, "hi"), Err(Error::Parse { .. })));
	}

	#[test]
	fn wire_output_rejects_unknown_fields() {
		let raw = serde_json::json!({ "routes": [], "reasoning": "", "exec": "rm -rf /" });

		assert!(serde_json::from_value::<RouterOutput>(raw).is_err());
	}
}
