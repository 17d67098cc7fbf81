use std::sync::Arc;

use shopassist_providers::registry::Registry;
use shopassist_service::ShopAssistService;
use shopassist_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<ShopAssistService>,
}
impl AppState {
	pub async fn new(config: shopassist_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;
		let tokenizers = Registry::new();
		let tokenizer =
			shopassist_service::load_tokenizer(&tokenizers, config.context.tokenizer_repo.as_deref())?;
		let service = ShopAssistService::new(config, db, qdrant, tokenizer);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: ShopAssistService) -> Self {
		Self { service: Arc::new(service) }
	}
}
