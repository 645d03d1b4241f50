use std::sync::Arc;

use recall_service::RecallService;
use recall_storage::{db::Db, qdrant::QdrantStore};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<RecallService>,
}
impl AppState {
	/// Connects the backends and prepares their schema and collection.
	pub async fn new(config: recall_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let qdrant = QdrantStore::new(&config.storage.qdrant)?;

		qdrant.ensure_collection().await?;

		Ok(Self::from_service(RecallService::new(config, db, qdrant)))
	}

	pub fn from_service(service: RecallService) -> Self {
		Self { service: Arc::new(service) }
	}
}
