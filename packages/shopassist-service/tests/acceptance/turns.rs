use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use shopassist_domain::model::{Intent, Role};
use shopassist_providers::generation::ChatMessage;
use shopassist_service::{Error, TurnRequest, orchestrator::RESPONSE_SEPARATOR};
use shopassist_testkit::{Harness, test_config};

use super::{product, stock};

fn turn(message: &str, session_id: Option<Uuid>) -> TurnRequest {
	TurnRequest { message: message.to_string(), session_id }
}

#[tokio::test]
async fn routing_failure_falls_back_to_keywords() {
	let harness = Harness::new();

	harness.generation.push_text("Returns are accepted within 30 days.");

	let service = harness.service().expect("Failed to build service.");
	let response = service
		.handle_turn(turn("What is your return policy?", None))
		.await
		.expect("Expected a turn response.");

	assert_eq!(response.query_type, Intent::Policy);
	assert_eq!(response.metadata.confidence, 0.0);
	assert_eq!(response.response, "Returns are accepted within 30 days.");
	assert_eq!(harness.generation.structured_count(), 1);
	assert_eq!(response.metadata.tokens, 120);
}

#[tokio::test]
async fn multi_intent_turns_join_answers_in_route_order() {
	let harness = Harness::new();

	harness.generation.push_route(json!({
		"routes": [
			{ "agent": "product_search", "query": "tablets under $300", "confidence": 0.8 },
			{ "agent": "policy", "query": "how long does shipping take", "confidence": 0.7 },
		],
		"reasoning": "Two independent requests.",
	}));
	harness.generation.push_text("The Slate 10 costs $249.");
	harness.generation.push_text("Shipping takes 3-5 days.");

	let service = harness.service().expect("Failed to build service.");
	let response = service
		.handle_turn(turn("Tablets under $300? Also, how long does shipping take?", None))
		.await
		.expect("Expected a turn response.");

	assert_eq!(
		response.response,
		format!("The Slate 10 costs $249.{RESPONSE_SEPARATOR}Shipping takes 3-5 days.")
	);
	assert_eq!(response.query_type, Intent::ProductSearch);
	assert_eq!(response.metadata.confidence, 0.8);
	assert_eq!(response.metadata.input_tokens, 250);
	assert_eq!(response.metadata.output_tokens, 50);
	assert_eq!(response.metadata.tokens, 300);

	let seen = harness.generation.seen();

	assert_eq!(seen[0].last(), Some(&ChatMessage::user("tablets under $300")));
	assert_eq!(seen[1].last(), Some(&ChatMessage::user("how long does shipping take")));
}

#[tokio::test]
async fn escalation_turn_reports_its_ticket() {
	let harness = Harness::new();

	harness.generation.push_route(json!({
		"routes": [{ "agent": "escalation", "query": "", "confidence": 0.95 }],
		"reasoning": "Customer asked for a person.",
	}));

	let service = harness.service().expect("Failed to build service.");
	let response = service
		.handle_turn(turn("Let me speak to a manager.", None))
		.await
		.expect("Expected a turn response.");
	let ticket_id = response.metadata.ticket_id.clone().expect("Expected a ticket.");
	let session = harness.repository.session(response.session_id).expect("Expected session.");
	let stored = &session.messages[1];

	assert_eq!(response.query_type, Intent::Escalation);
	assert!(response.response.contains(&ticket_id));
	assert_eq!(stored.metadata.get("ticket_id"), Some(&json!(ticket_id)));
	assert_eq!(stored.metadata.get("intent"), Some(&json!("escalation")));
	assert_eq!(harness.generation.count(), 0);
}

#[tokio::test]
async fn turns_create_unknown_sessions_and_remember_preferences() {
	let harness = Harness::new();

	stock(&harness, product("p1", "Aero 14", "Laptops", 899.0), 0.8);
	harness.generation.push_tool_call("search_products", r#"{"query":"laptop"}"#);
	harness.generation.push_text("The Aero 14 is a good pick.");

	let service = harness.service().expect("Failed to build service.");
	let session_id = Uuid::new_v4();
	let response = service
		.handle_turn(turn("Show me laptops under $900", Some(session_id)))
		.await
		.expect("Expected a turn response.");

	assert_eq!(response.session_id, session_id);
	assert_eq!(response.metadata.num_sources, 1);
	assert_eq!(harness.repository.commit_count(), 1);

	let session = harness.repository.session(session_id).expect("Expected session.");

	assert_eq!(session.messages.len(), 2);
	assert_eq!(session.messages[0].role, Role::User);
	assert_eq!(session.messages[0].content, "Show me laptops under $900");
	assert_eq!(session.current_intent, Some(Intent::ProductSearch));
	assert_eq!(session.user_preferences.price_range.and_then(|range| range.max), Some(900.0));
	assert_eq!(session.user_preferences.preferred_categories, ["Laptops"]);
	assert_eq!(session.user_preferences.mentioned_products, ["Aero 14"]);
}

#[tokio::test]
async fn follow_up_turns_see_prior_messages() {
	let harness = Harness::new();

	harness.generation.push_text("First answer.");
	harness.generation.push_text("Second answer.");

	let service = harness.service().expect("Failed to build service.");
	let first = service
		.handle_turn(turn("show me laptops", None))
		.await
		.expect("Expected a turn response.");

	service
		.handle_turn(turn("anything lighter?", Some(first.session_id)))
		.await
		.expect("Expected a turn response.");

	let seen = harness.generation.seen();

	assert_eq!(
		seen[1][1..],
		[
			ChatMessage::user("show me laptops"),
			ChatMessage::assistant("First answer."),
			ChatMessage::user("anything lighter?"),
		]
	);
}

#[tokio::test]
async fn concurrent_turns_on_one_session_run_in_order() {
	let harness = Harness::new();

	harness.generation.push_text("First answer.");
	harness.generation.push_text("Second answer.");
	harness.generation.set_delay(Duration::from_millis(20));

	let service = harness.service().expect("Failed to build service.");
	let session_id = Uuid::new_v4();
	let (first, second) = tokio::join!(
		service.handle_turn(turn("show me laptops", Some(session_id))),
		service.handle_turn(turn("anything lighter?", Some(session_id))),
	);

	first.expect("Expected a turn response.");
	second.expect("Expected a turn response.");

	let session = harness.repository.session(session_id).expect("Expected session.");
	let seen = harness.generation.seen();

	assert_eq!(harness.repository.commit_count(), 2);
	assert_eq!(session.messages.len(), 4);
	assert_eq!(seen[1].len(), 4);
	assert_eq!(
		seen[1][1..],
		[
			ChatMessage::user("show me laptops"),
			ChatMessage::assistant("First answer."),
			ChatMessage::user("anything lighter?"),
		]
	);
}

#[tokio::test]
async fn timed_out_turns_write_nothing() {
	let harness = Harness::new();
	let mut cfg = test_config();

	cfg.orchestrator.turn_timeout_ms = 50;
	harness.generation.set_delay(Duration::from_millis(500));

	let service = harness.service_with(cfg).expect("Failed to build service.");
	let session_id = Uuid::new_v4();
	let result = service.handle_turn(turn("show me laptops", Some(session_id))).await;

	assert!(matches!(result, Err(Error::Timeout { timeout_ms: 50 })));
	assert_eq!(harness.repository.commit_count(), 0);
	assert!(harness.repository.session(session_id).is_none());
}

#[tokio::test]
async fn blank_messages_are_rejected() {
	let harness = Harness::new();
	let service = harness.service().expect("Failed to build service.");

	assert!(matches!(
		service.handle_turn(turn(" \n ", None)).await,
		Err(Error::Validation { .. })
	));
	assert_eq!(harness.generation.structured_count(), 0);
	assert_eq!(harness.repository.commit_count(), 0);
}
