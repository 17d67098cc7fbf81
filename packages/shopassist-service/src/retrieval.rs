use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::{Error, Result, ShopAssistService};
use shopassist_domain::{
	filter::SearchFilters,
	model::{
		CategoryMatch, EnrichedResult, KnowledgeHit, Product, RankedResult, SearchHit, SearchIndex,
		VectorQuery,
	},
	ranking::{self, AdaptivePolicy, CategoryFusionPolicy},
};

const MATCHED_TEXT_CHARS: usize = 200;
const MIN_CANDIDATES: u32 = 2;

impl ShopAssistService {
	/// Semantic product search, one entry per product, best score first.
	///
	/// Without `enriched`, products are built from the indexed payload only. Upstream failures
	/// are logged and yield an empty list.
	pub async fn retrieve(
		&self,
		query: &str,
		top_k: u32,
		filters: &SearchFilters,
		enriched: bool,
	) -> Vec<EnrichedResult> {
		self.try_retrieve(query, top_k, filters, enriched, None).await.unwrap_or_else(|err| {
			tracing::warn!(operation = "retrieve", query, error = %err, "Product retrieval failed.");

			Vec::new()
		})
	}

	/// Like [`Self::retrieve`], with the score-distribution confidence policy applied to the
	/// first-pass hits before deduplication.
	pub async fn retrieve_adaptive(
		&self,
		query: &str,
		top_k: u32,
		filters: &SearchFilters,
		enriched: bool,
	) -> Vec<EnrichedResult> {
		let policy = AdaptivePolicy::from_config(&self.cfg.retrieval);

		self.try_retrieve(query, top_k, filters, enriched, Some(policy)).await.unwrap_or_else(
			|err| {
				tracing::warn!(
					operation = "retrieve_adaptive",
					query,
					error = %err,
					"Adaptive product retrieval failed."
				);

				Vec::new()
			},
		)
	}

	/// Raw knowledge-base chunks for a query. No deduplication.
	pub async fn retrieve_knowledge(&self, query: &str, top_k: u32) -> Vec<KnowledgeHit> {
		self.try_retrieve_knowledge(query, top_k).await.unwrap_or_else(|err| {
			tracing::warn!(
				operation = "retrieve_knowledge",
				query,
				error = %err,
				"Knowledge retrieval failed."
			);

			Vec::new()
		})
	}

	/// Categories ranked by the fused short-label and full-path similarity.
	pub async fn retrieve_top_categories(&self, query: &str, top_k: u32) -> Vec<CategoryMatch> {
		self.try_retrieve_top_categories(query, top_k).await.unwrap_or_else(|err| {
			tracing::warn!(
				operation = "retrieve_top_categories",
				query,
				error = %err,
				"Category retrieval failed."
			);

			Vec::new()
		})
	}

	pub(crate) async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
		let cfg = &self.cfg.providers.embedding;
		let texts = [query.to_string()];
		let vector = self
			.providers
			.embedding
			.embed(cfg, &texts)
			.await?
			.into_iter()
			.next()
			.ok_or_else(|| Error::upstream("embedding", "Provider returned no vector."))?;

		if vector.len() != cfg.dimensions as usize {
			return Err(Error::upstream(
				"embedding",
				format!("Vector has {} dimensions, expected {}.", vector.len(), cfg.dimensions),
			));
		}

		Ok(vector)
	}

	async fn try_retrieve(
		&self,
		query: &str,
		top_k: u32,
		filters: &SearchFilters,
		enriched: bool,
		policy: Option<AdaptivePolicy>,
	) -> Result<Vec<EnrichedResult>> {
		if top_k == 0 || query.trim().is_empty() {
			return Ok(Vec::new());
		}

		let vector = self.embed_query(query).await?;
		let request = VectorQuery {
			index: SearchIndex::Products,
			field: self.cfg.storage.qdrant.product_vector.clone(),
			vector,
			top_k: candidate_k(top_k, self.cfg.retrieval.candidate_multiplier),
			filter: filters.to_expr(),
			score_threshold: Some(self.cfg.retrieval.baseline_threshold),
			with_vectors: Vec::new(),
		};
		let mut hits = self.providers.vector_search.search(&request).await?;

		if let Some(policy) = policy {
			hits = policy.select(hits);
		}
		if hits.is_empty() {
			return Ok(Vec::new());
		}

		let ranked = ranking::aggregate_by_entity(hits);
		let mut results = if enriched {
			self.enrich(ranked).await?
		} else {
			ranked.into_iter().map(lean_result).collect()
		};

		results.truncate(top_k as usize);

		Ok(results)
	}

	async fn enrich(&self, ranked: Vec<RankedResult>) -> Result<Vec<EnrichedResult>> {
		let ids: Vec<String> = ranked.iter().map(|result| result.entity_id.clone()).collect();
		let mut products: HashMap<String, Product> = self
			.providers
			.repository
			.get_by_ids(&ids)
			.await?
			.into_iter()
			.map(|product| (product.id.clone(), product))
			.collect();
		let mut out = Vec::with_capacity(ranked.len());

		for result in ranked {
			let Some(product) = products.remove(&result.entity_id) else {
				tracing::warn!(
					product_id = %result.entity_id,
					"Search hit has no catalog record. Skipping."
				);

				continue;
			};

			out.push(EnrichedResult {
				product,
				relevance_score: result.score,
				matched_text: matched_text(&result.text),
			});
		}

		out.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

		Ok(out)
	}

	async fn try_retrieve_knowledge(&self, query: &str, top_k: u32) -> Result<Vec<KnowledgeHit>> {
		if top_k == 0 || query.trim().is_empty() {
			return Ok(Vec::new());
		}

		let vector = self.embed_query(query).await?;
		let request = VectorQuery {
			index: SearchIndex::Knowledge,
			field: self.cfg.storage.qdrant.knowledge_vector.clone(),
			vector,
			top_k,
			filter: None,
			score_threshold: Some(self.cfg.retrieval.knowledge_threshold),
			with_vectors: Vec::new(),
		};
		let mut hits: Vec<KnowledgeHit> = self
			.providers
			.vector_search
			.search(&request)
			.await?
			.into_iter()
			.map(|hit| KnowledgeHit {
				doc_type: metadata_str(&hit.metadata, "doc_type").unwrap_or_default().to_string(),
				doc_id: hit.entity_id,
				text: hit.text,
				score: hit.score,
			})
			.collect();

		hits.sort_by(|a, b| b.score.total_cmp(&a.score));

		Ok(hits)
	}

	async fn try_retrieve_top_categories(
		&self,
		query: &str,
		top_k: u32,
	) -> Result<Vec<CategoryMatch>> {
		if top_k == 0 || query.trim().is_empty() {
			return Ok(Vec::new());
		}

		let qdrant = &self.cfg.storage.qdrant;
		let vector = self.embed_query(query).await?;
		let with_vectors =
			vec![qdrant.category_name_vector.clone(), qdrant.category_full_name_vector.clone()];
		let short_request = VectorQuery {
			index: SearchIndex::Categories,
			field: qdrant.category_name_vector.clone(),
			vector: vector.clone(),
			top_k,
			filter: None,
			score_threshold: None,
			with_vectors: with_vectors.clone(),
		};
		let full_request = VectorQuery {
			field: qdrant.category_full_name_vector.clone(),
			..short_request.clone()
		};
		let (short_hits, full_hits) = futures::future::try_join(
			self.providers.vector_search.search(&short_request),
			self.providers.vector_search.search(&full_request),
		)
		.await?;
		let fusion = CategoryFusionPolicy::from(self.cfg.retrieval.category_fusion);
		let sets = [short_hits, full_hits].map(|hits| {
			hits.into_iter()
				.filter_map(|hit| self.fuse_category(&fusion, &vector, hit))
				.collect::<Vec<_>>()
		});

		Ok(fusion.merge(sets, top_k as usize))
	}

	fn fuse_category(
		&self,
		fusion: &CategoryFusionPolicy,
		query_vector: &[f32],
		hit: SearchHit,
	) -> Option<CategoryMatch> {
		let qdrant = &self.cfg.storage.qdrant;
		let similarity = |field: &str| {
			hit.vectors.get(field).and_then(|stored| ranking::cosine_similarity(query_vector, stored))
		};
		let (Some(short), Some(full)) =
			(similarity(&qdrant.category_name_vector), similarity(&qdrant.category_full_name_vector))
		else {
			tracing::warn!(
				category_id = %hit.entity_id,
				"Category hit is missing stored embeddings. Skipping."
			);

			return None;
		};

		Some(CategoryMatch {
			name: metadata_str(&hit.metadata, "name").unwrap_or(&hit.entity_id).to_string(),
			full_name: metadata_str(&hit.metadata, "full_name").unwrap_or_default().to_string(),
			score: fusion.fused_score(full, short),
			id: hit.entity_id,
		})
	}
}

/// Number of first-pass hits requested for a final `top_k`.
pub fn candidate_k(top_k: u32, multiplier: u32) -> u32 {
	top_k.saturating_mul(multiplier).max(MIN_CANDIDATES)
}

fn lean_result(result: RankedResult) -> EnrichedResult {
	let metadata = &result.metadata;
	let product = Product {
		id: result.entity_id.clone(),
		name: metadata_str(metadata, "name").unwrap_or_default().to_string(),
		description: result.text.clone(),
		category: metadata_str(metadata, "category").unwrap_or_default().to_string(),
		price: metadata.get("price").and_then(Value::as_f64).unwrap_or_default(),
		brand: metadata_str(metadata, "brand").unwrap_or_default().to_string(),
		..Default::default()
	};

	EnrichedResult {
		product,
		relevance_score: result.score,
		matched_text: matched_text(&result.text),
	}
}

fn matched_text(text: &str) -> String {
	text.chars().take(MATCHED_TEXT_CHARS).collect()
}

fn metadata_str<'a>(metadata: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
	metadata.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
	use crate::retrieval::{candidate_k, matched_text};

	#[test]
	fn candidate_count_is_multiplied_and_floored() {
		assert_eq!(candidate_k(3, 2), 6);
		assert_eq!(candidate_k(1, 1), 2);
		assert_eq!(candidate_k(u32::MAX, 4), u32::MAX);
	}

	#[test]
	fn matched_text_is_cut_on_char_boundaries() {
		let text = "é".repeat(250);

		assert_eq!(matched_text(&text).chars().count(), 200);
		assert_eq!(matched_text("short"), "short");
	}
}
