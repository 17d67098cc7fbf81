use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub context: Context,
	#[serde(default)]
	pub orchestrator: Orchestrator,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub vector_dim: u32,
	#[serde(default = "default_products_collection")]
	pub products_collection: String,
	#[serde(default = "default_knowledge_collection")]
	pub knowledge_collection: String,
	#[serde(default = "default_categories_collection")]
	pub categories_collection: String,
	#[serde(default = "default_embedding_field")]
	pub product_vector: String,
	#[serde(default = "default_embedding_field")]
	pub knowledge_vector: String,
	/// Named vector holding the short category label embedding, e.g. "Laptops".
	#[serde(default = "default_category_name_vector")]
	pub category_name_vector: String,
	/// Named vector holding the full taxonomy path embedding, e.g. "Electronics > Computers > Laptops".
	#[serde(default = "default_category_full_name_vector")]
	pub category_full_name_vector: String,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub generation: LlmProviderConfig,
	pub router: LlmProviderConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	#[serde(default = "default_batch_size")]
	pub batch_size: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	#[serde(default = "default_max_tokens")]
	pub max_tokens: u32,
	pub timeout_ms: u64,
	/// USD per one million prompt tokens.
	#[serde(default)]
	pub input_cost_per_million: f64,
	/// USD per one million completion tokens.
	#[serde(default)]
	pub output_cost_per_million: f64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub baseline_threshold: f32,
	/// Similarity floor for knowledge-base hits.
	pub knowledge_threshold: f32,
	pub category_threshold: f32,
	pub product_top_k: u32,
	pub knowledge_top_k: u32,
	pub category_top_k: u32,
	pub candidate_multiplier: u32,
	pub adaptive: AdaptiveThreshold,
	pub category_fusion: CategoryFusion,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self {
			baseline_threshold: 0.3,
			knowledge_threshold: 0.3,
			category_threshold: 0.75,
			product_top_k: 3,
			knowledge_top_k: 2,
			category_top_k: 3,
			candidate_multiplier: 2,
			adaptive: AdaptiveThreshold::default(),
			category_fusion: CategoryFusion::default(),
		}
	}
}

/// Confidence policy constants. The defaults carry no documented derivation and should be
/// calibrated against labeled queries before being tuned.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct AdaptiveThreshold {
	pub gap_threshold: f32,
	pub tight_std: f32,
	pub tight_offset: f32,
	pub loose_offset: f32,
}
impl Default for AdaptiveThreshold {
	fn default() -> Self {
		Self { gap_threshold: 0.15, tight_std: 0.05, tight_offset: 0.15, loose_offset: 0.05 }
	}
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct CategoryFusion {
	pub full_weight: f32,
	pub short_weight: f32,
}
impl Default for CategoryFusion {
	fn default() -> Self {
		Self { full_weight: 0.7, short_weight: 0.3 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Context {
	pub token_budget: u32,
	pub tokenizer_repo: Option<String>,
}
impl Default for Context {
	fn default() -> Self {
		Self { token_budget: 2_000, tokenizer_repo: None }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Orchestrator {
	pub max_tool_iterations: u32,
	pub history_window: u32,
	pub turn_timeout_ms: u64,
	pub escalation_contact: String,
}
impl Default for Orchestrator {
	fn default() -> Self {
		Self {
			max_tool_iterations: 4,
			history_window: 10,
			turn_timeout_ms: 30_000,
			escalation_contact: "support@shopassist.example".to_string(),
		}
	}
}

fn default_products_collection() -> String {
	"products_collection".to_string()
}

fn default_knowledge_collection() -> String {
	"knowledge_base_collection".to_string()
}

fn default_categories_collection() -> String {
	"categories_collection".to_string()
}

fn default_embedding_field() -> String {
	"embedding".to_string()
}

fn default_category_name_vector() -> String {
	"embedding".to_string()
}

fn default_category_full_name_vector() -> String {
	"full_embedding".to_string()
}

fn default_batch_size() -> u32 {
	32
}

fn default_max_tokens() -> u32 {
	500
}
