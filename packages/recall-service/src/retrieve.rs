use std::collections::HashMap;

use uuid::Uuid;

use crate::{Error, RecallService, Result, Stage, bounded, require_owner};
use recall_storage::models::Note;

#[derive(Clone, Debug)]
pub struct RetrievedNote {
	pub note: Note,
	pub score: f32,
}

impl RecallService {
	/// Finds the owner's notes closest to `question`, best first.
	///
	/// `top_k` falls back to `retrieval.top_k` and is clamped to `1..=retrieval.max_top_k`.
	/// Candidates the document store cannot resolve for this owner are dropped, so the result
	/// may be shorter than `top_k`.
	pub async fn retrieve(
		&self,
		owner_id: &str,
		question: &str,
		top_k: Option<u32>,
	) -> Result<Vec<RetrievedNote>> {
		require_owner(owner_id)?;

		if question.trim().is_empty() {
			return Err(Error::InvalidRequest {
				message: "question must be non-empty.".to_string(),
			});
		}

		let top_k = self.resolve_top_k(top_k);
		let vector = self.embed_one(question.to_string()).await?;
		let mut candidates = bounded(
			Stage::VectorIndex,
			self.cfg.timeouts.vector_index(),
			self.index.query(&vector, owner_id, top_k),
		)
		.await?;

		if candidates.is_empty() {
			tracing::debug!(owner_id, top_k, "No candidates for question.");

			return Ok(Vec::new());
		}

		candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
		candidates.truncate(top_k as usize);

		let ids: Vec<Uuid> = candidates.iter().map(|candidate| candidate.note_id).collect();
		let notes = bounded(
			Stage::DocumentStore,
			self.cfg.timeouts.document_store(),
			self.documents.fetch_by_ids(&ids, owner_id),
		)
		.await?;
		let mut by_id: HashMap<Uuid, Note> = notes
			.into_iter()
			.filter(|note| note.owner_id == owner_id)
			.map(|note| (note.note_id, note))
			.collect();
		let mut out = Vec::with_capacity(candidates.len());

		for candidate in candidates.iter() {
			if let Some(note) = by_id.remove(&candidate.note_id) {
				out.push(RetrievedNote { note, score: candidate.score });
			}
		}

		tracing::debug!(
			owner_id,
			candidates = candidates.len(),
			resolved = out.len(),
			"Retrieved notes."
		);

		Ok(out)
	}

	pub(crate) fn resolve_top_k(&self, requested: Option<u32>) -> u32 {
		let max_top_k = self.cfg.retrieval.max_top_k.max(1);

		requested.unwrap_or(self.cfg.retrieval.top_k).clamp(1, max_top_k)
	}
}
