use serde_json::json;

use shopassist_domain::{
	filter::SearchFilters,
	model::{PipelineOutcome, Source},
	preferences,
};
use shopassist_providers::generation::ChatMessage;

use crate::{
	BoxFuture, Result, ShopAssistService,
	pipeline::{self, PipelineRequest, ToolHandler, ToolOutput, prompts, tool_loop},
	tools::{self, SearchProductsArgs, ToolInvocation},
};

struct DiscoveryTools<'s> {
	service: &'s ShopAssistService,
	query: &'s str,
	/// Price bounds implied by the query or remembered from earlier turns.
	implied: SearchFilters,
}
impl DiscoveryTools<'_> {
	async fn search_categories(&self, query: &str) -> ToolOutput {
		let retrieval = &self.service.cfg.retrieval;
		let categories: Vec<_> = self
			.service
			.retrieve_top_categories(query, retrieval.category_top_k)
			.await
			.into_iter()
			.filter(|category| category.score > retrieval.category_threshold)
			.collect();

		ToolOutput {
			content: json!({ "categories": categories }).to_string(),
			sources: Vec::new(),
		}
	}

	async fn search_products(&self, args: SearchProductsArgs) -> ToolOutput {
		let query = args.query.as_deref().filter(|q| !q.trim().is_empty()).unwrap_or(self.query);
		let filters = self.effective_filters(args.filters);
		let top_k = self.service.cfg.retrieval.product_top_k;
		let mut results = self.service.retrieve(query, top_k, &filters, true).await;

		if results.is_empty() && (filters.category.is_some() || !filters.categories.is_empty()) {
			tracing::debug!(query, "Categorized search found nothing. Retrying without categories.");

			results = self.service.retrieve(query, top_k, &filters.without_categories(), true).await;
		}
		if results.is_empty() {
			return ToolOutput::no_results();
		}

		let sources = results.iter().map(Source::from).collect();

		self.service.context_output(&results, sources)
	}

	fn effective_filters(&self, mut filters: SearchFilters) -> SearchFilters {
		if filters.min_price.is_none() && filters.max_price.is_none() {
			filters.min_price = self.implied.min_price;
			filters.max_price = self.implied.max_price;
		}

		filters
	}
}
impl ToolHandler for DiscoveryTools<'_> {
	fn handle<'a>(&'a self, invocation: ToolInvocation) -> BoxFuture<'a, ToolOutput> {
		Box::pin(async move {
			match invocation {
				ToolInvocation::SearchCategories(args) => self.search_categories(&args.query).await,
				ToolInvocation::SearchProducts(args) => self.search_products(args).await,
				ToolInvocation::SearchKnowledgeBase(_) => ToolOutput::empty(),
			}
		})
	}
}

impl ShopAssistService {
	pub(super) async fn run_product_search(
		&self,
		request: PipelineRequest<'_>,
	) -> Result<PipelineOutcome> {
		let mut messages = vec![ChatMessage::system(prompts::product_search())];

		messages.extend(pipeline::history_messages(request.history));
		messages.push(ChatMessage::user(request.query));

		let tools = [tools::search_categories_spec(), tools::search_products_spec()];
		let handler = DiscoveryTools {
			service: self,
			query: request.query,
			implied: implied_filters(request.query, request.preferences),
		};
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

/// Price filters from the query, else from the remembered price range.
fn implied_filters(query: &str, remembered: &preferences::UserPreferences) -> SearchFilters {
	let filters = preferences::extract_filters(query);

	if filters.min_price.is_some() || filters.max_price.is_some() {
		return filters;
	}

	let range = remembered.price_range.unwrap_or_default();

	SearchFilters { min_price: range.min, max_price: range.max, ..Default::default() }
}
