use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{filter::FilterExpr, preferences::UserPreferences, usage::UsageMetadata};

const POLICY_KEYWORDS: [&str; 8] =
	["return", "refund", "shipping", "delivery", "warranty", "guarantee", "policy", "exchange"];

/// Target pipeline for a turn.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
	Policy,
	ProductSearch,
	ProductDetail,
	Comparison,
	Escalation,
}
impl Intent {
	pub const ALL: [Self; 5] =
		[Self::Policy, Self::ProductSearch, Self::ProductDetail, Self::Comparison, Self::Escalation];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Policy => "policy",
			Self::ProductSearch => "product_search",
			Self::ProductDetail => "product_detail",
			Self::Comparison => "comparison",
			Self::Escalation => "escalation",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");

		Self::ALL.into_iter().find(|intent| intent.as_str() == normalized)
	}

	/// Keyword classification used when structured routing is unavailable.
	pub fn from_keywords(query: &str) -> Self {
		let lowered = query.to_lowercase();

		if POLICY_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
			Self::Policy
		} else {
			Self::ProductSearch
		}
	}
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Product {
	pub id: String,
	pub name: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub category: String,
	#[serde(default)]
	pub category_full: Vec<String>,
	#[serde(default)]
	pub price: f64,
	#[serde(default)]
	pub brand: String,
	#[serde(default)]
	pub rating: f64,
	#[serde(default)]
	pub review_count: i64,
	#[serde(default)]
	pub availability: Option<String>,
	#[serde(default)]
	pub product_url: Option<String>,
	#[serde(default)]
	pub image_url: Option<String>,
}

/// A single nearest-neighbor match as returned by a vector index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchHit {
	pub entity_id: String,
	pub score: f32,
	pub text: String,
	pub metadata: Map<String, Value>,
	/// Stored vectors requested alongside the hit, keyed by vector field name.
	pub vectors: HashMap<String, Vec<f32>>,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SearchIndex {
	Products,
	Knowledge,
	Categories,
}
impl SearchIndex {
	/// Payload key naming the entity a stored point belongs to.
	pub fn entity_key(self) -> &'static str {
		match self {
			Self::Products => "product_id",
			Self::Knowledge => "doc_id",
			Self::Categories => "category_id",
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct VectorQuery {
	pub index: SearchIndex,
	/// Named vector field to match against.
	pub field: String,
	pub vector: Vec<f32>,
	pub top_k: u32,
	pub filter: Option<FilterExpr>,
	/// Hits scoring below this are not returned.
	pub score_threshold: Option<f32>,
	/// Stored vectors to return with each hit.
	pub with_vectors: Vec<String>,
}

/// Hits collapsed to one entry per owning entity, carrying the best score.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedResult {
	pub entity_id: String,
	pub score: f32,
	pub text: String,
	pub metadata: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EnrichedResult {
	pub product: Product,
	pub relevance_score: f32,
	pub matched_text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KnowledgeHit {
	pub doc_id: String,
	pub doc_type: String,
	pub text: String,
	pub score: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CategoryMatch {
	pub id: String,
	pub name: String,
	pub full_name: String,
	pub score: f32,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SubQuery {
	pub intent: Intent,
	pub query: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteDecision {
	pub target: Intent,
	pub confidence: f32,
	pub reasoning: String,
	/// Present only when the query was decomposed into more than one independent request.
	pub sub_queries: Vec<SubQuery>,
}
impl RouteDecision {
	pub fn fallback(query: &str) -> Self {
		Self {
			target: Intent::from_keywords(query),
			confidence: 0.0,
			reasoning: "Keyword routing fallback.".to_string(),
			sub_queries: Vec::new(),
		}
	}
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
	User,
	Assistant,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Message {
	pub role: Role,
	pub content: String,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}
impl Message {
	pub fn user(content: impl Into<String>) -> Self {
		Self { role: Role::User, content: content.into(), metadata: Map::new() }
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self { role: Role::Assistant, content: content.into(), metadata: Map::new() }
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Session {
	pub id: Uuid,
	pub user_id: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
	pub messages: Vec<Message>,
	pub user_preferences: UserPreferences,
	pub current_intent: Option<Intent>,
	pub metadata: Map<String, Value>,
}
impl Session {
	pub fn new(id: Uuid, user_id: Option<String>, now: OffsetDateTime) -> Self {
		Self {
			id,
			user_id,
			created_at: now,
			updated_at: now,
			messages: Vec::new(),
			user_preferences: UserPreferences::default(),
			current_intent: None,
			metadata: Map::new(),
		}
	}
}

/// Attribution for a turn's answer.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
	Product {
		id: String,
		name: String,
		category: String,
		price: f64,
		brand: String,
		availability: Option<String>,
		product_url: Option<String>,
		image_url: Option<String>,
		relevance_score: f32,
	},
	Knowledge {
		doc_id: String,
		doc_type: String,
		score: f32,
	},
}
impl Source {
	pub fn id(&self) -> &str {
		match self {
			Self::Product { id, .. } => id,
			Self::Knowledge { doc_id, .. } => doc_id,
		}
	}
}
impl From<&EnrichedResult> for Source {
	fn from(result: &EnrichedResult) -> Self {
		let product = &result.product;

		Self::Product {
			id: product.id.clone(),
			name: product.name.clone(),
			category: product.category.clone(),
			price: product.price,
			brand: product.brand.clone(),
			availability: product.availability.clone(),
			product_url: product.product_url.clone(),
			image_url: product.image_url.clone(),
			relevance_score: result.relevance_score,
		}
	}
}
impl From<&KnowledgeHit> for Source {
	fn from(hit: &KnowledgeHit) -> Self {
		Self::Knowledge { doc_id: hit.doc_id.clone(), doc_type: hit.doc_type.clone(), score: hit.score }
	}
}

/// Outcome of one pipeline invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineOutcome {
	pub intent: Intent,
	pub response: String,
	pub sources: Vec<Source>,
	pub usage: UsageMetadata,
	/// Support ticket opened by an escalation.
	pub ticket_id: Option<String>,
}

/// Appends `incoming` to `sources`, skipping ids already present.
pub fn merge_sources(sources: &mut Vec<Source>, incoming: impl IntoIterator<Item = Source>) {
	for source in incoming {
		if sources.iter().all(|existing| existing.id() != source.id()) {
			sources.push(source);
		}
	}
}

#[cfg(test)]
mod tests {
	use crate::model::{Intent, RouteDecision, Source, merge_sources};

	#[test]
	fn intent_parse_accepts_wire_names_and_rejects_unknown() {
		assert_eq!(Intent::parse("product_detail"), Some(Intent::ProductDetail));
		assert_eq!(Intent::parse(" POLICY "), Some(Intent::Policy));
		assert_eq!(Intent::parse("product search"), Some(Intent::ProductSearch));
		assert_eq!(Intent::parse("chitchat"), None);
	}

	#[test]
	fn keyword_fallback_prefers_policy_terms() {
		assert_eq!(Intent::from_keywords("What's your return policy?"), Intent::Policy);
		assert_eq!(Intent::from_keywords("How long does Delivery take"), Intent::Policy);
		assert_eq!(Intent::from_keywords("gaming laptop under $900"), Intent::ProductSearch);

		let decision = RouteDecision::fallback("refund please");

		assert_eq!(decision.target, Intent::Policy);
		assert_eq!(decision.confidence, 0.0);
	}

	#[test]
	fn merge_sources_keeps_first_occurrence_per_id() {
		let knowledge = |id: &str, score: f32| Source::Knowledge {
			doc_id: id.to_string(),
			doc_type: "policy".to_string(),
			score,
		};
		let mut sources = vec![knowledge("returns", 0.9)];

		merge_sources(&mut sources, vec![knowledge("returns", 0.4), knowledge("shipping", 0.7)]);

		assert_eq!(sources.len(), 2);
		assert_eq!(sources[0], knowledge("returns", 0.9));
		assert_eq!(sources[1].id(), "shipping");
	}
}
