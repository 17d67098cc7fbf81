mod escalation;
mod policy;
mod product_lookup;
mod product_search;
mod tool_loop;

pub(crate) mod prompts;

pub use escalation::new_ticket_id;

use serde_json::json;
use tokio::time::Instant;

use crate::{
	BoxFuture, Error, Result, ShopAssistService,
	context::{self, ContextItem},
	tools::ToolInvocation,
};
use shopassist_domain::{
	model::{Intent, Message, PipelineOutcome, Role, Source},
	preferences::UserPreferences,
};
use shopassist_providers::generation::ChatMessage;

/// Reply used when no answer could be generated.
pub const FALLBACK_RESPONSE: &str = "I'm sorry, I couldn't complete that request right now. Please try again, or ask to be connected with our support team.";
/// Tool result for searches that matched nothing.
pub const NO_RESULTS_RESPONSE: &str = "No products found matching your query.";

/// Input for one pipeline invocation.
#[derive(Clone, Copy, Debug)]
pub struct PipelineRequest<'a> {
	pub intent: Intent,
	pub query: &'a str,
	/// Prior conversation, already trimmed to the history window.
	pub history: &'a [Message],
	pub preferences: &'a UserPreferences,
	pub deadline: Instant,
}

/// Result handed back to the model for one tool call.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ToolOutput {
	pub(crate) content: String,
	pub(crate) sources: Vec<Source>,
}
impl ToolOutput {
	pub(crate) fn empty() -> Self {
		Self { content: "{}".to_string(), sources: Vec::new() }
	}

	pub(crate) fn no_results() -> Self {
		Self {
			content: json!({ "results": 0, "message": NO_RESULTS_RESPONSE }).to_string(),
			sources: Vec::new(),
		}
	}
}

/// Executes validated tool calls for one pipeline.
pub(crate) trait ToolHandler
where
	Self: Send + Sync,
{
	fn handle<'a>(&'a self, invocation: ToolInvocation) -> BoxFuture<'a, ToolOutput>;
}

impl ShopAssistService {
	/// Runs the pipeline for `request.intent`. An empty query is rejected before any model or
	/// tool call.
	pub async fn run_pipeline(&self, request: PipelineRequest<'_>) -> Result<PipelineOutcome> {
		if request.query.trim().is_empty() {
			return Err(Error::Validation { message: "Query must not be empty.".to_string() });
		}

		match request.intent {
			Intent::Policy => self.run_policy(request).await,
			Intent::ProductSearch => self.run_product_search(request).await,
			Intent::ProductDetail | Intent::Comparison => self.run_product_lookup(request).await,
			Intent::Escalation => Ok(self.run_escalation(request)),
		}
	}

	/// Serializes items into a tool result within the context token budget.
	pub(crate) fn context_output<T>(&self, items: &[T], mut sources: Vec<Source>) -> ToolOutput
	where
		T: ContextItem,
	{
		let budget = self.cfg.context.token_budget as usize;
		let assembled = context::build_context(items, budget, &self.tokenizer);

		if assembled.is_empty() {
			return ToolOutput::no_results();
		}

		sources.truncate(assembled.included);

		ToolOutput {
			content: json!({ "results": assembled.included, "context": assembled.text }).to_string(),
			sources,
		}
	}
}

pub(crate) fn history_messages(history: &[Message]) -> impl Iterator<Item = ChatMessage> + '_ {
	history.iter().map(|message| match message.role {
		Role::User => ChatMessage::user(message.content.as_str()),
		Role::Assistant => ChatMessage::assistant(message.content.as_str()),
	})
}
