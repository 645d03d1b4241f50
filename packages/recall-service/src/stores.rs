//! Production backends for the [`VectorIndex`] and [`DocumentStore`] seams.

use uuid::Uuid;

use crate::{BoxFuture, Candidate, DocumentStore, Error, Result, VectorIndex, VectorRecord};
use recall_storage::{db::Db, models::Note, qdrant::QdrantStore, queries};

impl VectorIndex for QdrantStore {
	fn upsert<'a>(&'a self, record: &'a VectorRecord) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			self.upsert_point(record.note_id, &record.owner_id, &record.vector, record.created_at)
				.await
				.map_err(index_error)
		})
	}

	fn query<'a>(
		&'a self,
		vector: &'a [f32],
		owner_id: &'a str,
		top_k: u32,
	) -> BoxFuture<'a, Result<Vec<Candidate>>> {
		Box::pin(async move {
			let hits = self.query_owner(vector, owner_id, top_k).await.map_err(index_error)?;

			Ok(hits
				.into_iter()
				.map(|hit| Candidate { note_id: hit.note_id, score: hit.score })
				.collect())
		})
	}

	fn delete<'a>(&'a self, note_id: Uuid, owner_id: &'a str) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { self.delete_point(note_id, owner_id).await.map_err(index_error) })
	}
}

impl DocumentStore for Db {
	fn fetch_by_ids<'a>(
		&'a self,
		note_ids: &'a [Uuid],
		owner_id: &'a str,
	) -> BoxFuture<'a, Result<Vec<Note>>> {
		Box::pin(async move {
			queries::fetch_notes_by_ids(&self.pool, note_ids, owner_id)
				.await
				.map_err(|err| Error::DocumentStoreUnavailable { message: err.to_string() })
		})
	}
}

fn index_error(err: recall_storage::Error) -> Error {
	Error::IndexUnavailable { message: err.to_string() }
}
