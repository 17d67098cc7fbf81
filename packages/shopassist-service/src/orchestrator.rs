use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
	time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{Error, Result, ShopAssistService, TurnCommit, pipeline::PipelineRequest};
use shopassist_domain::{
	history,
	model::{Intent, Message, Session, Source, SubQuery, merge_sources},
	preferences,
	usage::UsageMetadata,
};

/// Separator between answers to the parts of a multi-intent message.
pub const RESPONSE_SEPARATOR: &str = "\n\n";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TurnRequest {
	pub message: String,
	/// A new session is started when absent.
	#[serde(default)]
	pub session_id: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TurnResponse {
	pub session_id: Uuid,
	pub response: String,
	pub sources: Vec<Source>,
	pub query_type: Intent,
	pub metadata: TurnMetadata,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TurnMetadata {
	pub tokens: u64,
	pub input_tokens: u64,
	pub output_tokens: u64,
	pub cost: f64,
	pub num_sources: usize,
	pub confidence: f32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ticket_id: Option<String>,
}

/// One async mutex per session id. Entries nobody holds are pruned on access.
#[derive(Default)]
pub(crate) struct SessionLocks {
	locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}
impl SessionLocks {
	pub(crate) fn get(&self, session_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
		let mut locks = self.locks.lock().unwrap_or_else(|err| err.into_inner());

		locks.retain(|id, lock| *id == session_id || Arc::strong_count(lock) > 1);

		locks.entry(session_id).or_default().clone()
	}
}

struct TurnOutcome {
	response: String,
	sources: Vec<Source>,
	usage: UsageMetadata,
	ticket_id: Option<String>,
}

impl ShopAssistService {
	/// Handles one user message end to end: route, run the pipelines, then persist the turn.
	///
	/// Turns on the same session run one at a time. A turn that exceeds the configured timeout
	/// fails with [`Error::Timeout`] and writes nothing back.
	pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnResponse> {
		let query = request.message.trim();

		if query.is_empty() {
			return Err(Error::Validation { message: "Message must not be empty.".to_string() });
		}

		let session_id = request.session_id.unwrap_or_else(Uuid::new_v4);
		let timeout_ms = self.cfg.orchestrator.turn_timeout_ms;
		let deadline = Instant::now() + Duration::from_millis(timeout_ms);
		let lock = self.sessions.get(session_id);
		let turn = async {
			let _guard = lock.lock().await;

			self.run_turn(session_id, query, deadline).await
		};

		match tokio::time::timeout_at(deadline, turn).await {
			Ok(result) => result,
			Err(_) => {
				tracing::warn!(session_id = %session_id, timeout_ms, "Turn timed out.");

				Err(Error::Timeout { timeout_ms })
			},
		}
	}

	async fn run_turn(
		&self,
		session_id: Uuid,
		query: &str,
		deadline: Instant,
	) -> Result<TurnResponse> {
		let session = self.load_session(session_id).await;
		let window = self.cfg.orchestrator.history_window as usize;
		let history = history::trim_history(&session.messages, window);
		let (decision, routing_usage) = self.route(query, &history).await;

		tracing::info!(
			session_id = %session_id,
			target = decision.target.as_str(),
			confidence = decision.confidence,
			parts = decision.sub_queries.len().max(1),
			"Routed turn."
		);

		let parts = if decision.sub_queries.is_empty() {
			vec![SubQuery { intent: decision.target, query: query.to_string() }]
		} else {
			decision.sub_queries.clone()
		};
		let mut outcome = self.run_parts(&parts, &history, &session, deadline).await?;

		outcome.usage += routing_usage;

		let metadata = TurnMetadata {
			tokens: outcome.usage.total_tokens,
			input_tokens: outcome.usage.input_tokens,
			output_tokens: outcome.usage.output_tokens,
			cost: outcome.usage.cost,
			num_sources: outcome.sources.len(),
			confidence: decision.confidence,
			ticket_id: outcome.ticket_id.clone(),
		};
		let commit = build_commit(session, query, &outcome, decision.target, &metadata);

		if let Err(err) = self.providers.repository.commit_turn(&commit).await {
			tracing::error!(
				operation = "commit_turn",
				session_id = %session_id,
				error = %err,
				"Failed to persist turn."
			);
		}

		Ok(TurnResponse {
			session_id,
			response: outcome.response,
			sources: outcome.sources,
			query_type: decision.target,
			metadata,
		})
	}

	async fn run_parts(
		&self,
		parts: &[SubQuery],
		history: &[Message],
		session: &Session,
		deadline: Instant,
	) -> Result<TurnOutcome> {
		let mut responses = Vec::with_capacity(parts.len());
		let mut sources = Vec::new();
		let mut usage = UsageMetadata::default();
		let mut ticket_id = None;

		for part in parts {
			let request = PipelineRequest {
				intent: part.intent,
				query: &part.query,
				history,
				preferences: &session.user_preferences,
				deadline,
			};
			let outcome = self.run_pipeline(request).await?;

			usage += outcome.usage;
			ticket_id = ticket_id.or(outcome.ticket_id);

			merge_sources(&mut sources, outcome.sources);
			responses.push(outcome.response);
		}

		Ok(TurnOutcome { response: responses.join(RESPONSE_SEPARATOR), sources, usage, ticket_id })
	}

	/// Stored session, or a fresh one when it does not exist or cannot be read.
	async fn load_session(&self, session_id: Uuid) -> Session {
		match self.providers.repository.get_session(session_id).await {
			Ok(Some(session)) => session,
			Ok(None) => Session::new(session_id, None, OffsetDateTime::now_utc()),
			Err(err) => {
				tracing::warn!(
					operation = "get_session",
					session_id = %session_id,
					error = %err,
					"Failed to load session. Continuing without history."
				);

				Session::new(session_id, None, OffsetDateTime::now_utc())
			},
		}
	}
}

fn build_commit(
	session: Session,
	query: &str,
	outcome: &TurnOutcome,
	intent: Intent,
	metadata: &TurnMetadata,
) -> TurnCommit {
	let mut user_preferences = session.user_preferences;
	let mut observed = preferences::extract_preferences(query);

	observed.mentioned_products = outcome
		.sources
		.iter()
		.filter_map(|source| match source {
			Source::Product { name, .. } if !name.is_empty() => Some(name.clone()),
			_ => None,
		})
		.collect();

	user_preferences.merge(observed);

	let mut assistant = Message::assistant(outcome.response.as_str());

	assistant.metadata = assistant_metadata(intent, metadata);

	TurnCommit {
		session_id: session.id,
		messages: vec![Message::user(query), assistant],
		current_intent: Some(intent),
		user_preferences,
		now: OffsetDateTime::now_utc(),
	}
}

fn assistant_metadata(intent: Intent, metadata: &TurnMetadata) -> Map<String, Value> {
	let mut out = Map::new();

	out.insert("intent".to_string(), Value::String(intent.as_str().to_string()));
	out.insert("tokens".to_string(), Value::from(metadata.tokens));
	out.insert("cost".to_string(), Value::from(metadata.cost));
	out.insert("num_sources".to_string(), Value::from(metadata.num_sources));

	if let Some(ticket_id) = metadata.ticket_id.as_ref() {
		out.insert("ticket_id".to_string(), Value::String(ticket_id.clone()));
	}

	out
}
