use serde_json::json;

use shopassist_domain::{
	model::{Intent, Message, SearchIndex, Source},
	preferences::{PriceRange, UserPreferences},
};
use shopassist_providers::generation::ChatRole;
use shopassist_service::{Error, pipeline::FALLBACK_RESPONSE};
use shopassist_testkit::{Harness, IndexedPoint, StubEmbedding, unit};

use super::{product, product_point, request, stock};

fn source_ids(sources: &[Source]) -> Vec<&str> {
	sources.iter().map(Source::id).collect()
}

#[tokio::test]
async fn empty_query_is_rejected_before_any_model_call() {
	let harness = Harness::new();
	let service = harness.service().expect("Failed to build service.");
	let preferences = UserPreferences::default();
	let result = service.run_pipeline(request(Intent::Policy, "  ", &[], &preferences)).await;

	assert!(matches!(result, Err(Error::Validation { .. })));
	assert_eq!(harness.generation.count(), 0);
	assert_eq!(harness.embedding.count(), 0);
}

#[tokio::test]
async fn policy_answers_cite_knowledge_chunks_and_ignore_history() {
	let harness = Harness::new();

	harness.search.insert(
		SearchIndex::Knowledge,
		IndexedPoint::scored("returns", "Returns are accepted within 30 days.", 0.9)
			.with_metadata("doc_type", "policy"),
	);
	harness
		.generation
		.push_tool_call("search_knowledge_base", &json!({ "query": "return window" }).to_string());
	harness.generation.push_text("You can return items within 30 days.");

	let service = harness.service().expect("Failed to build service.");
	let history = [Message::user("show me laptops"), Message::assistant("Here are some laptops.")];
	let preferences = UserPreferences::default();
	let outcome = service
		.run_pipeline(request(Intent::Policy, "What is the return window?", &history, &preferences))
		.await
		.expect("Expected policy answer.");

	assert_eq!(outcome.response, "You can return items within 30 days.");
	assert_eq!(
		outcome.sources,
		vec![Source::Knowledge {
			doc_id: "returns".to_string(),
			doc_type: "policy".to_string(),
			score: 0.9,
		}]
	);
	assert_eq!(outcome.usage.input_tokens, 200);
	assert_eq!(outcome.usage.output_tokens, 30);
	assert_eq!(outcome.usage.total_tokens, 230);

	let seen = harness.generation.seen();

	assert_eq!(seen[0].len(), 2);
	assert_eq!(seen[0][0].role, ChatRole::System);
	assert_eq!(harness.generation.offered()[0], ["search_knowledge_base"]);

	let tool_result = seen[1].last().and_then(|message| message.content.clone()).unwrap_or_default();

	assert!(tool_result.contains("Source 1 [returns]"));
}

#[tokio::test]
async fn comparison_resolves_each_named_product() {
	let harness = Harness::new().with_embedding(
		StubEmbedding::new().with_vector("Aero 14", unit(4, 0)).with_vector("Volt 15", unit(4, 1)),
	);

	for (item, vector) in [
		(product("aero-14", "Aero 14", "Laptops", 899.0), unit(4, 0)),
		(product("volt-15", "Volt 15", "Laptops", 1099.0), unit(4, 1)),
	] {
		let point = IndexedPoint { score: None, ..product_point(&item, 0.0) }
			.with_vector("embedding", vector);

		harness.search.insert(SearchIndex::Products, point);
		harness.repository.insert_product(item);
	}

	harness.generation.push_tool_call(
		"search_products",
		&json!({ "product_names": ["Aero 14", "Volt 15"] }).to_string(),
	);
	harness.generation.push_text("The Aero 14 is lighter; the Volt 15 is faster.");

	let service = harness.service().expect("Failed to build service.");
	let preferences = UserPreferences::default();
	let outcome = service
		.run_pipeline(request(Intent::Comparison, "Compare Aero 14 and Volt 15", &[], &preferences))
		.await
		.expect("Expected comparison.");

	assert_eq!(outcome.intent, Intent::Comparison);
	assert_eq!(source_ids(&outcome.sources), ["aero-14", "volt-15"]);
	assert_eq!(outcome.response, "The Aero 14 is lighter; the Volt 15 is faster.");
}

#[tokio::test]
async fn tool_loop_stops_at_the_iteration_cap() {
	let harness = Harness::new();

	for _ in 0..6 {
		harness.generation.push_tool_call("search_knowledge_base", r#"{"query":"returns"}"#);
	}

	let service = harness.service().expect("Failed to build service.");
	let preferences = UserPreferences::default();
	let outcome = service
		.run_pipeline(request(Intent::Policy, "returns?", &[], &preferences))
		.await
		.expect("Expected fallback answer.");

	assert_eq!(outcome.response, FALLBACK_RESPONSE);
	assert_eq!(harness.generation.count(), service.cfg.orchestrator.max_tool_iterations as usize);
}

#[tokio::test]
async fn malformed_tool_calls_get_an_empty_result_and_the_loop_continues() {
	let harness = Harness::new();

	harness.generation.push_tool_call("search_products", "{not json");
	harness.generation.push_tool_call("search_knowledge_base", r#"{"query":"returns"}"#);
	harness.generation.push_text("Here are some options.");

	let service = harness.service().expect("Failed to build service.");
	let preferences = UserPreferences::default();
	let outcome = service
		.run_pipeline(request(Intent::ProductSearch, "gaming laptop", &[], &preferences))
		.await
		.expect("Expected answer.");

	assert_eq!(outcome.response, "Here are some options.");
	assert!(outcome.sources.is_empty());

	let seen = harness.generation.seen();

	assert_eq!(seen.len(), 3);

	for call in &seen[1..] {
		let last = call.last().expect("Expected a tool result.");

		assert_eq!(last.role, ChatRole::Tool);
		assert_eq!(last.content.as_deref(), Some("{}"));
	}
}

#[tokio::test]
async fn generation_failure_ends_the_loop_with_the_fallback() {
	let harness = Harness::new();

	harness.generation.push_failure();

	let service = harness.service().expect("Failed to build service.");
	let preferences = UserPreferences::default();
	let outcome = service
		.run_pipeline(request(Intent::ProductSearch, "gaming laptop", &[], &preferences))
		.await
		.expect("Expected fallback answer.");

	assert_eq!(outcome.response, FALLBACK_RESPONSE);
	assert_eq!(harness.generation.count(), 1);
}

#[tokio::test]
async fn product_search_applies_the_remembered_price_range() {
	let harness = Harness::new();

	stock(&harness, product("cheap", "Pulse", "Headphones", 299.0), 0.8);
	stock(&harness, product("dear", "Studio", "Headphones", 799.0), 0.9);
	harness.generation.push_tool_call("search_products", r#"{"query":"headphones"}"#);
	harness.generation.push_text("The Pulse fits your budget.");

	let service = harness.service().expect("Failed to build service.");
	let preferences = UserPreferences {
		price_range: Some(PriceRange { min: None, max: Some(500.0) }),
		..Default::default()
	};
	let outcome = service
		.run_pipeline(request(Intent::ProductSearch, "any headphones?", &[], &preferences))
		.await
		.expect("Expected answer.");

	assert_eq!(source_ids(&outcome.sources), ["cheap"]);
	assert_eq!(outcome.ticket_id, None);
}

#[tokio::test]
async fn product_search_retries_without_categories_when_nothing_matches() {
	let harness = Harness::new();

	stock(&harness, product("p1", "Aero 14", "Laptops", 899.0), 0.8);
	harness
		.generation
		.push_tool_call("search_products", r#"{"query":"laptop","categories":["Notebooks"]}"#);
	harness.generation.push_text("Try the Aero 14.");

	let service = harness.service().expect("Failed to build service.");
	let preferences = UserPreferences::default();
	let outcome = service
		.run_pipeline(request(Intent::ProductSearch, "a laptop", &[], &preferences))
		.await
		.expect("Expected answer.");

	assert_eq!(source_ids(&outcome.sources), ["p1"]);

	let queries = harness.search.queries();

	assert_eq!(queries.len(), 2);
	assert!(queries[0].filter.is_some());
	assert!(queries[1].filter.is_none());
}

#[tokio::test]
async fn category_tool_reports_only_confident_categories() {
	let harness = Harness::new();

	harness.search.insert(
		SearchIndex::Categories,
		IndexedPoint { entity_id: "laptops".to_string(), ..Default::default() }
			.with_metadata("name", "Laptops")
			.with_vector("embedding", unit(4, 0))
			.with_vector("full_embedding", unit(4, 0)),
	);
	harness.search.insert(
		SearchIndex::Categories,
		IndexedPoint { entity_id: "cables".to_string(), ..Default::default() }
			.with_metadata("name", "Cables")
			.with_vector("embedding", unit(4, 1))
			.with_vector("full_embedding", vec![1.0, 1.0, 0.0, 0.0]),
	);
	harness.generation.push_tool_call("search_categories", r#"{"query":"laptop"}"#);
	harness.generation.push_text("Laptops it is.");

	let service = harness.service().expect("Failed to build service.");
	let preferences = UserPreferences::default();

	service
		.run_pipeline(request(Intent::ProductSearch, "a laptop", &[], &preferences))
		.await
		.expect("Expected answer.");

	let seen = harness.generation.seen();
	let tool_result = seen[1].last().and_then(|message| message.content.clone()).unwrap_or_default();

	assert!(tool_result.contains("Laptops"));
	assert!(!tool_result.contains("Cables"));
}

#[tokio::test]
async fn escalation_opens_a_ticket_without_model_calls() {
	let harness = Harness::new();
	let service = harness.service().expect("Failed to build service.");
	let preferences = UserPreferences::default();
	let outcome = service
		.run_pipeline(request(Intent::Escalation, "I want to talk to a human", &[], &preferences))
		.await
		.expect("Expected escalation.");
	let ticket_id = outcome.ticket_id.expect("Expected a ticket.");

	assert!(ticket_id.starts_with("TKT-"));
	assert!(outcome.response.contains(&ticket_id));
	assert!(outcome.response.contains(&service.cfg.orchestrator.escalation_contact));
	assert_eq!(outcome.usage.total_tokens, 0);
	assert_eq!(harness.generation.count(), 0);
}
