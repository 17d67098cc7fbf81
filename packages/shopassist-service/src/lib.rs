pub mod catalog;
pub mod context;
pub mod orchestrator;
pub mod pipeline;
pub mod retrieval;
pub mod router;
pub mod session;
pub mod tools;

mod error;

pub use catalog::{CatalogQuery, VectorSearchRequest, VectorSearchResponse};
pub use error::{Error, Result};
pub use orchestrator::{TurnMetadata, TurnRequest, TurnResponse};

use std::{future::Future, pin::Pin, sync::Arc};

use reqwest::Client;
use serde_json::Value;
use time::OffsetDateTime;
use tokenizers::Tokenizer;
use uuid::Uuid;

use orchestrator::SessionLocks;
use shopassist_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use shopassist_domain::{
	model::{Intent, Message, Product, SearchHit, Session, VectorQuery},
	preferences::UserPreferences,
};
use shopassist_providers::{
	embedding::{self, EmbeddedText},
	generation::{self, ChatMessage, Completion, ToolSpec},
	registry::{Registry, model_key},
};
use shopassist_storage::{db::Db, qdrant::QdrantStore, queries};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Tokenizer used for context budgeting when none is configured.
pub const DEFAULT_TOKENIZER_REPO: &str = "Xenova/gpt-4o";

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;

	/// Embeds in request batches of at most `batch_size`, preserving input order.
	fn embed_batch<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
		batch_size: usize,
	) -> BoxFuture<'a, Result<Vec<EmbeddedText>>> {
		Box::pin(async move {
			let mut out = Vec::with_capacity(texts.len());

			for batch in texts.chunks(batch_size.max(1)) {
				let vectors = self.embed(cfg, batch).await?;

				out.extend(
					batch
						.iter()
						.zip(vectors)
						.map(|(text, vector)| EmbeddedText { text: text.clone(), vector }),
				);
			}

			Ok(out)
		})
	}
}

pub trait VectorSearchProvider
where
	Self: Send + Sync,
{
	fn search<'a>(&'a self, query: &'a VectorQuery) -> BoxFuture<'a, Result<Vec<SearchHit>>>;
}

pub trait GenerationProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
		tools: &'a [ToolSpec],
	) -> BoxFuture<'a, Result<Completion>>;

	/// Requests a JSON object matching `schema`. The object is parsed as data only.
	fn generate_structured<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
		schema_name: &'a str,
		schema: &'a Value,
	) -> BoxFuture<'a, Result<(Value, Completion)>>;
}

pub trait DocumentRepository
where
	Self: Send + Sync,
{
	fn get_by_id<'a>(&'a self, product_id: &'a str) -> BoxFuture<'a, Result<Option<Product>>>;

	/// Records come back in no particular order.
	fn get_by_ids<'a>(&'a self, product_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<Product>>>;

	fn search_by_category<'a>(
		&'a self,
		category: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Product>>>;

	fn search_by_price<'a>(
		&'a self,
		min_price: Option<f64>,
		max_price: Option<f64>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Product>>>;

	fn search_by_text<'a>(
		&'a self,
		text: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Product>>>;

	fn create_session<'a>(
		&'a self,
		session_id: Uuid,
		user_id: Option<&'a str>,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Session>>;

	fn get_session<'a>(&'a self, session_id: Uuid) -> BoxFuture<'a, Result<Option<Session>>>;

	fn delete_session<'a>(&'a self, session_id: Uuid) -> BoxFuture<'a, Result<bool>>;

	/// Durably appends a finished turn and its state changes. Creates the session when absent.
	fn commit_turn<'a>(&'a self, commit: &'a TurnCommit) -> BoxFuture<'a, Result<()>>;
}

/// Everything a completed turn writes back to its session.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnCommit {
	pub session_id: Uuid,
	pub messages: Vec<Message>,
	pub current_intent: Option<Intent>,
	pub user_preferences: UserPreferences,
	pub now: OffsetDateTime,
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub vector_search: Arc<dyn VectorSearchProvider>,
	pub repository: Arc<dyn DocumentRepository>,
	pub generation: Arc<dyn GenerationProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		vector_search: Arc<dyn VectorSearchProvider>,
		repository: Arc<dyn DocumentRepository>,
		generation: Arc<dyn GenerationProvider>,
	) -> Self {
		Self { embedding, vector_search, repository, generation }
	}

	/// HTTP model providers over Qdrant and Postgres.
	pub fn production(db: Db, qdrant: QdrantStore) -> Self {
		let http = Arc::new(DefaultProviders::default());

		Self {
			embedding: http.clone(),
			vector_search: Arc::new(qdrant),
			repository: Arc::new(db),
			generation: http,
		}
	}
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct HealthReport {
	pub ready: bool,
	pub problems: Vec<String>,
}

pub struct ShopAssistService {
	pub cfg: Config,
	pub providers: Providers,
	pub tokenizer: Arc<Tokenizer>,
	problems: Vec<String>,
	sessions: SessionLocks,
}
impl ShopAssistService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore, tokenizer: Arc<Tokenizer>) -> Self {
		Self::with_providers(cfg, Providers::production(db, qdrant), tokenizer)
	}

	pub fn with_providers(cfg: Config, providers: Providers, tokenizer: Arc<Tokenizer>) -> Self {
		let problems = shopassist_config::check_endpoints(&cfg)
			.into_iter()
			.map(|err| {
				tracing::error!(error = %err, "Configuration problem detected.");

				err.to_string()
			})
			.collect();

		Self { cfg, providers, tokenizer, problems, sessions: SessionLocks::default() }
	}

	pub fn health(&self) -> HealthReport {
		HealthReport { ready: self.problems.is_empty(), problems: self.problems.clone() }
	}
}

/// Loads the context-budget tokenizer through a process-wide registry.
pub fn load_tokenizer(
	registry: &Registry<Tokenizer>,
	repo: Option<&str>,
) -> Result<Arc<Tokenizer>> {
	let repo = repo.unwrap_or(DEFAULT_TOKENIZER_REPO);

	registry
		.get_or_try_init(repo, || shopassist_providers::load_tokenizer(repo))
		.map_err(|err| Error::Configuration { message: err.to_string() })
}

#[derive(Default)]
struct DefaultProviders {
	clients: Registry<Client>,
}
impl DefaultProviders {
	fn client(&self, provider_id: &str, model: &str, timeout_ms: u64) -> Result<Arc<Client>> {
		self.clients
			.get_or_try_init(&model_key(provider_id, model), || {
				shopassist_providers::build_client(timeout_ms)
			})
			.map_err(|err| Error::from_provider("client", err))
	}
}

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			let client = self.client(&cfg.provider_id, &cfg.model, cfg.timeout_ms)?;

			embedding::embed(&client, cfg, texts)
				.await
				.map_err(|err| Error::from_provider("embedding", err))
		})
	}

	fn embed_batch<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
		batch_size: usize,
	) -> BoxFuture<'a, Result<Vec<EmbeddedText>>> {
		Box::pin(async move {
			let client = self.client(&cfg.provider_id, &cfg.model, cfg.timeout_ms)?;

			embedding::embed_batch(&client, cfg, texts, batch_size)
				.await
				.map_err(|err| Error::from_provider("embedding", err))
		})
	}
}

impl GenerationProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
		tools: &'a [ToolSpec],
	) -> BoxFuture<'a, Result<Completion>> {
		Box::pin(async move {
			let client = self.client(&cfg.provider_id, &cfg.model, cfg.timeout_ms)?;

			generation::complete(&client, cfg, messages, tools)
				.await
				.map_err(|err| Error::from_provider("generation", err))
		})
	}

	fn generate_structured<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
		schema_name: &'a str,
		schema: &'a Value,
	) -> BoxFuture<'a, Result<(Value, Completion)>> {
		Box::pin(async move {
			let client = self.client(&cfg.provider_id, &cfg.model, cfg.timeout_ms)?;

			generation::complete_structured::<Value>(&client, cfg, messages, schema_name, schema)
				.await
				.map_err(|err| Error::from_provider("generation", err))
		})
	}
}

impl VectorSearchProvider for QdrantStore {
	fn search<'a>(&'a self, query: &'a VectorQuery) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
		Box::pin(async move { Ok(QdrantStore::search(self, query).await?) })
	}
}

impl DocumentRepository for Db {
	fn get_by_id<'a>(&'a self, product_id: &'a str) -> BoxFuture<'a, Result<Option<Product>>> {
		Box::pin(async move { Ok(queries::get_product(&self.pool, product_id).await?) })
	}

	fn get_by_ids<'a>(&'a self, product_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<Product>>> {
		Box::pin(async move { Ok(queries::get_products(&self.pool, product_ids).await?) })
	}

	fn search_by_category<'a>(
		&'a self,
		category: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Product>>> {
		Box::pin(async move {
			Ok(queries::search_products_by_category(&self.pool, category, i64::from(limit)).await?)
		})
	}

	fn search_by_price<'a>(
		&'a self,
		min_price: Option<f64>,
		max_price: Option<f64>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Product>>> {
		Box::pin(async move {
			Ok(queries::search_products_by_price(&self.pool, min_price, max_price, i64::from(limit))
				.await?)
		})
	}

	fn search_by_text<'a>(
		&'a self,
		text: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Product>>> {
		Box::pin(async move {
			Ok(queries::search_products_by_text(&self.pool, text, i64::from(limit)).await?)
		})
	}

	fn create_session<'a>(
		&'a self,
		session_id: Uuid,
		user_id: Option<&'a str>,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Session>> {
		Box::pin(async move {
			queries::insert_session(&self.pool, session_id, user_id, now).await?;

			let row = queries::get_session_row(&self.pool, session_id).await?.ok_or_else(|| {
				Error::NotFound { message: format!("Session {session_id} vanished after insert.") }
			})?;
			let messages = queries::list_messages(&self.pool, session_id).await?;

			Ok(row.into_session(messages))
		})
	}

	fn get_session<'a>(&'a self, session_id: Uuid) -> BoxFuture<'a, Result<Option<Session>>> {
		Box::pin(async move {
			let Some(row) = queries::get_session_row(&self.pool, session_id).await? else {
				return Ok(None);
			};
			let messages = queries::list_messages(&self.pool, session_id).await?;

			Ok(Some(row.into_session(messages)))
		})
	}

	fn delete_session<'a>(&'a self, session_id: Uuid) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(queries::delete_session(&self.pool, session_id).await?) })
	}

	fn commit_turn<'a>(&'a self, commit: &'a TurnCommit) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let preferences = serde_json::to_value(&commit.user_preferences)?;
			let mut tx = self.pool.begin().await?;

			queries::insert_session(&mut *tx, commit.session_id, None, commit.now).await?;

			for message in &commit.messages {
				queries::insert_message(&mut *tx, commit.session_id, message, commit.now).await?;
			}

			queries::update_session_state(
				&mut *tx,
				commit.session_id,
				commit.current_intent,
				&preferences,
				commit.now,
			)
			.await?;
			tx.commit().await?;

			Ok(())
		})
	}
}
