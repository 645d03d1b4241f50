use uuid::Uuid;

use crate::{Error, RecallService, Result, Stage, VectorRecord, bounded, require_owner};
use recall_storage::models::Note;

/// Result of an absorb-and-report indexing attempt.
#[derive(Debug)]
pub enum IndexOutcome {
	Indexed,
	/// The vector index was not updated. The outbox job stays pending and is retried.
	Deferred { error: Error },
}
impl IndexOutcome {
	pub fn is_indexed(&self) -> bool {
		matches!(self, Self::Indexed)
	}
}

/// The text a note is embedded from.
pub fn note_embedding_text(note: &Note) -> String {
	format!("{}\n\n{}", note.title, note.body)
}

impl RecallService {
	/// Embeds the note and writes its vector record, propagating any failure.
	pub async fn index_note(&self, note: &Note) -> Result<()> {
		require_owner(&note.owner_id)?;

		let vector = self.embed_one(note_embedding_text(note)).await?;
		let record = VectorRecord {
			note_id: note.note_id,
			owner_id: note.owner_id.clone(),
			vector,
			created_at: note.created_at,
		};

		bounded(Stage::VectorIndex, self.cfg.timeouts.vector_index(), self.index.upsert(&record))
			.await?;

		tracing::debug!(note_id = %note.note_id, owner_id = %note.owner_id, "Indexed note.");

		Ok(())
	}

	pub async fn remove_note_vector(&self, note_id: Uuid, owner_id: &str) -> Result<()> {
		require_owner(owner_id)?;
		bounded(
			Stage::VectorIndex,
			self.cfg.timeouts.vector_index(),
			self.index.delete(note_id, owner_id),
		)
		.await?;

		tracing::debug!(note_id = %note_id, owner_id, "Removed note vector.");

		Ok(())
	}

	/// Indexes a freshly written note. Never fails; a failed attempt is logged and reported.
	pub async fn on_note_written(&self, note: &Note) -> IndexOutcome {
		match self.index_note(note).await {
			Ok(()) => IndexOutcome::Indexed,
			Err(error) => {
				tracing::warn!(
					note_id = %note.note_id,
					owner_id = %note.owner_id,
					stage = ?error.stage(),
					error = %error,
					"Indexing deferred."
				);

				IndexOutcome::Deferred { error }
			},
		}
	}

	pub async fn on_note_deleted(&self, note_id: Uuid, owner_id: &str) -> IndexOutcome {
		match self.remove_note_vector(note_id, owner_id).await {
			Ok(()) => IndexOutcome::Indexed,
			Err(error) => {
				tracing::warn!(
					note_id = %note_id,
					owner_id,
					stage = ?error.stage(),
					error = %error,
					"Vector removal deferred."
				);

				IndexOutcome::Deferred { error }
			},
		}
	}
}
