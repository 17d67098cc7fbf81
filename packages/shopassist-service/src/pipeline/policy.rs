use shopassist_domain::model::{PipelineOutcome, Source};
use shopassist_providers::generation::ChatMessage;

use crate::{
	BoxFuture, Result, ShopAssistService,
	pipeline::{PipelineRequest, ToolHandler, ToolOutput, prompts, tool_loop},
	tools::{self, ToolInvocation},
};

struct KnowledgeTools<'s> {
	service: &'s ShopAssistService,
}
impl ToolHandler for KnowledgeTools<'_> {
	fn handle<'a>(&'a self, invocation: ToolInvocation) -> BoxFuture<'a, ToolOutput> {
		Box::pin(async move {
			let ToolInvocation::SearchKnowledgeBase(args) = invocation else {
				return ToolOutput::empty();
			};
			let top_k = self.service.cfg.retrieval.knowledge_top_k;
			let hits = self.service.retrieve_knowledge(&args.query, top_k).await;
			let sources = hits.iter().map(Source::from).collect();

			self.service.context_output(&hits, sources)
		})
	}
}

impl ShopAssistService {
	/// Policy questions are answered from the knowledge base alone. Conversation history is not
	/// sent.
	pub(super) async fn run_policy(&self, request: PipelineRequest<'_>) -> Result<PipelineOutcome> {
		let messages = vec![ChatMessage::system(prompts::policy()), ChatMessage::user(request.query)];
		let tools = [tools::search_knowledge_base_spec()];
		let handler = KnowledgeTools { service: self };
		let outcome =
			tool_loop::run(self, messages, &tools, &handler, request.query, request.deadline).await?;

		Ok(PipelineOutcome {
			intent: request.intent,
			response: outcome.response,
			sources: outcome.sources,
			usage: outcome.usage,
			ticket_id: None,
		})
	}
}
