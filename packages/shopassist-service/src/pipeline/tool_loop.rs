use tokio::time::Instant;

use crate::{
	Error, Result, ShopAssistService,
	pipeline::{FALLBACK_RESPONSE, ToolHandler, ToolOutput},
	tools::ToolInvocation,
};
use shopassist_domain::{
	model::{Source, merge_sources},
	usage::{Pricing, UsageMetadata},
};
use shopassist_providers::generation::{ChatMessage, ToolSpec};

pub(crate) struct LoopOutcome {
	pub(crate) response: String,
	pub(crate) sources: Vec<Source>,
	pub(crate) usage: UsageMetadata,
}

/// Alternates generation and tool execution until the model answers without a tool call or
/// the iteration cap is reached. At the cap the last generated text is returned.
///
/// Generation failures end the loop with whatever text was produced so far. Malformed tool
/// calls are answered with an empty result and the loop continues.
pub(crate) async fn run<H>(
	service: &ShopAssistService,
	mut messages: Vec<ChatMessage>,
	tools: &[ToolSpec],
	handler: &H,
	query: &str,
	deadline: Instant,
) -> Result<LoopOutcome>
where
	H: ToolHandler,
{
	let cfg = &service.cfg.providers.generation;
	let pricing = Pricing::from(cfg);
	let max_iterations = service.cfg.orchestrator.max_tool_iterations;
	let mut usage = UsageMetadata::default();
	let mut sources = Vec::new();
	let mut last_text: Option<String> = None;

	for iteration in 1..=max_iterations {
		if Instant::now() >= deadline {
			return Err(Error::Timeout { timeout_ms: service.cfg.orchestrator.turn_timeout_ms });
		}

		let completion = match service.providers.generation.generate(cfg, &messages, tools).await {
			Ok(completion) => completion,
			Err(err) => {
				tracing::warn!(
					operation = "generate",
					query,
					iteration,
					error = %err,
					"Generation failed. Ending tool loop."
				);

				break;
			},
		};

		usage += UsageMetadata::from_tokens(completion.input_tokens, completion.output_tokens, pricing);

		let text = completion.text.filter(|text| !text.trim().is_empty());
		let requested = completion.tool_calls.len();
		let Some(call) = completion.tool_calls.into_iter().next() else {
			let response = text.or(last_text).unwrap_or_else(|| FALLBACK_RESPONSE.to_string());

			return Ok(LoopOutcome { response, sources, usage });
		};

		if requested > 1 {
			tracing::debug!(query, requested, "Model requested several tools. Running the first.");
		}
		if text.is_some() {
			last_text = text;
		}

		messages.push(ChatMessage::assistant_tool_calls(vec![call.clone()]));

		let output = match ToolInvocation::parse(&call, tools) {
			Ok(invocation) => handler.handle(invocation).await,
			Err(err) => {
				tracing::warn!(
					operation = "tool_call",
					tool = %call.name,
					query,
					error = %err,
					"Ignoring malformed tool call."
				);

				ToolOutput::empty()
			},
		};

		merge_sources(&mut sources, output.sources);
		messages.push(ChatMessage::tool(call.id, output.content));
	}

	if last_text.is_none() {
		tracing::warn!(query, max_iterations, "Tool loop ended without an answer.");
	}

	Ok(LoopOutcome {
		response: last_text.unwrap_or_else(|| FALLBACK_RESPONSE.to_string()),
		sources,
		usage,
	})
}
