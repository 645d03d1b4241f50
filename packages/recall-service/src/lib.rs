pub mod admin;
pub mod answer;
pub mod index;
pub mod notes;
pub mod retrieve;
pub mod stores;
pub mod time_serde;

mod error;

pub use admin::{DeadLetter, OutboxReport, ReindexReport, RequeueReport, StatusCount};
pub use answer::{AskRequest, AskResponse, NO_RELEVANT_NOTES};
pub use error::{Error, Result, Stage};
pub use index::IndexOutcome;
pub use notes::{
	CreateNoteRequest, IndexingStatus, ListNotesResponse, NoteResponse, UpdateNoteRequest,
};
pub use retrieve::RetrievedNote;

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use recall_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use recall_providers::{completion, embedding};
use recall_storage::{db::Db, models::Note, qdrant::QdrantStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait CompletionProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<String>>;
}

/// Per-owner similarity index keyed by note id.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	/// Inserts or replaces the record with `record.note_id`.
	fn upsert<'a>(&'a self, record: &'a VectorRecord) -> BoxFuture<'a, Result<()>>;

	/// At most `top_k` hits owned by `owner_id`, best first.
	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		owner_id: &'a str,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<Candidate>>>;

	/// Removing a record that does not exist succeeds.
	fn delete<'a>(&'a self, note_id: Uuid, owner_id: &'a str) -> BoxFuture<'a, Result<()>>;
}

pub trait DocumentStore
where
	Self: Send + Sync,
{
	/// Returns the notes among `note_ids` that exist and belong to `owner_id`, in any order.
	fn fetch_by_ids<'a>(
		&'a self,
		note_ids: &'a [Uuid],
		owner_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<Note>>>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct VectorRecord {
	pub note_id: Uuid,
	pub owner_id: String,
	pub vector: Vec<f32>,
	pub created_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
	pub note_id: Uuid,
	pub score: f32,
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub completion: Arc<dyn CompletionProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		completion: Arc<dyn CompletionProvider>,
	) -> Self {
		Self { embedding, completion }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), completion: provider }
	}
}

pub struct RecallService {
	pub cfg: Config,
	pub db: Db,
	pub providers: Providers,
	pub index: Arc<dyn VectorIndex>,
	pub documents: Arc<dyn DocumentStore>,
}
impl RecallService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Self {
		let documents = Arc::new(db.clone());

		Self { cfg, db, providers: Providers::default(), index: Arc::new(qdrant), documents }
	}

	pub fn with_backends(
		cfg: Config,
		db: Db,
		providers: Providers,
		index: Arc<dyn VectorIndex>,
		documents: Arc<dyn DocumentStore>,
	) -> Self {
		Self { cfg, db, providers, index, documents }
	}

	/// Embeds a single text and checks the vector against the configured dimensionality.
	pub(crate) async fn embed_one(&self, text: String) -> Result<Vec<f32>> {
		let cfg = &self.cfg.providers.embedding;
		let texts = [text];
		let vectors = bounded(
			Stage::Embedding,
			self.cfg.timeouts.embedding(),
			self.providers.embedding.embed(cfg, &texts),
		)
		.await?;
		let expected_dim = self.cfg.storage.qdrant.vector_dim as usize;
		let mut vectors = vectors.into_iter();
		let (Some(vector), None) = (vectors.next(), vectors.next()) else {
			return Err(Error::EmbeddingUnavailable {
				message: "Embedding provider must return exactly one vector.".to_string(),
			});
		};

		if vector.len() != expected_dim {
			return Err(Error::EmbeddingUnavailable {
				message: format!(
					"Embedding dimension {} does not match configured vector_dim {expected_dim}.",
					vector.len()
				),
			});
		}
		if vector.iter().any(|value| !value.is_finite()) {
			return Err(Error::EmbeddingUnavailable {
				message: "Embedding vector contains a non-finite value.".to_string(),
			});
		}

		Ok(vector)
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			embedding::embed(cfg, texts)
				.await
				.map_err(|err| Error::EmbeddingUnavailable { message: err.to_string() })
		})
	}
}
impl CompletionProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			completion::complete(cfg, messages)
				.await
				.map_err(|err| Error::CompletionUnavailable { message: err.to_string() })
		})
	}
}

/// Awaits `fut` for at most `limit`, reporting an expiry as a timeout of `stage`.
pub(crate) async fn bounded<T, F>(stage: Stage, limit: Duration, fut: F) -> Result<T>
where
	F: Future<Output = Result<T>>,
{
	match tokio::time::timeout(limit, fut).await {
		Ok(result) => result,
		Err(_) => {
			let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);

			tracing::warn!(stage = %stage, timeout_ms, "External call timed out.");

			Err(Error::Timeout { stage, timeout_ms })
		},
	}
}

pub(crate) fn require_owner(owner_id: &str) -> Result<()> {
	if owner_id.trim().is_empty() {
		return Err(Error::InvalidRequest { message: "owner_id must be non-empty.".to_string() });
	}

	Ok(())
}
