use std::collections::HashSet;

use futures::future;

use shopassist_domain::{
	filter::SearchFilters,
	model::{EnrichedResult, Intent, PipelineOutcome, Source},
};
use shopassist_providers::generation::ChatMessage;

use crate::{
	BoxFuture, Result, ShopAssistService,
	pipeline::{self, PipelineRequest, ToolHandler, ToolOutput, prompts, tool_loop},
	tools::{self, SearchProductsArgs, ToolInvocation},
};

struct LookupTools<'s> {
	service: &'s ShopAssistService,
	query: &'s str,
}
impl LookupTools<'_> {
	async fn resolve(&self, args: SearchProductsArgs) -> ToolOutput {
		let mut names: Vec<String> = args
			.product_names
			.into_iter()
			.map(|name| name.trim().to_string())
			.filter(|name| !name.is_empty())
			.collect();

		if names.is_empty() {
			let fallback = args.query.filter(|q| !q.trim().is_empty());

			names.push(fallback.unwrap_or_else(|| self.query.to_string()));
		}

		let results = resolve_names(self.service, &names).await;

		if results.is_empty() {
			return ToolOutput::no_results();
		}

		let sources = results.iter().map(Source::from).collect();

		self.service.context_output(&results, sources)
	}
}
impl ToolHandler for LookupTools<'_> {
	fn handle<'a>(&'a self, invocation: ToolInvocation) -> BoxFuture<'a, ToolOutput> {
		Box::pin(async move {
			match invocation {
				ToolInvocation::SearchProducts(args) => self.resolve(args).await,
				_ => ToolOutput::empty(),
			}
		})
	}
}

impl ShopAssistService {
	/// Detail and comparison questions. Each named product is resolved on its own and the
	/// model synthesizes one answer over all of them.
	pub(super) async fn run_product_lookup(
		&self,
		request: PipelineRequest<'_>,
	) -> Result<PipelineOutcome> {
		let system = match request.intent {
			Intent::Comparison => prompts::comparison(),
			_ => prompts::product_detail(),
		};
		let mut messages = vec![ChatMessage::system(system)];

		messages.extend(pipeline::history_messages(request.history));
		messages.push(ChatMessage::user(request.query));

		let tools = [tools::resolve_products_spec()];
		let handler = LookupTools { service: self, query: request.query };
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

/// Resolves every name to its single best match concurrently. Results keep the order of
/// `names`; a product matched by several names appears once.
pub(crate) async fn resolve_names(
	service: &ShopAssistService,
	names: &[String],
) -> Vec<EnrichedResult> {
	let filters = SearchFilters::default();
	let resolved = future::join_all(
		names.iter().map(|name| service.retrieve_adaptive(name, 1, &filters, true)),
	)
	.await;
	let mut seen = HashSet::new();

	resolved
		.into_iter()
		.flatten()
		.filter(|result| seen.insert(result.product.id.clone()))
		.collect()
}
