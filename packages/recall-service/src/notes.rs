use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, IndexOutcome, RecallService, Result, Stage, bounded, require_owner};
use recall_storage::{
	models::Note,
	outbox::{self, OutboxOp},
	queries,
};

const MAX_TITLE_CHARS: usize = 512;
const MAX_BODY_CHARS: usize = 65_536;
const DEFAULT_LIST_LIMIT: u32 = 100;
const MAX_LIST_LIMIT: u32 = 1_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateNoteRequest {
	pub title: String,
	pub body: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdateNoteRequest {
	#[serde(default)]
	pub title: Option<String>,
	#[serde(default)]
	pub body: Option<String>,
}

/// Whether the vector index reflects a write at response time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
	Indexed,
	Queued,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NoteResponse {
	pub note_id: Uuid,
	pub title: String,
	pub body: String,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub indexing: Option<IndexingStatus>,
}
impl NoteResponse {
	fn from_note(note: Note, indexing: Option<IndexingStatus>) -> Self {
		Self {
			note_id: note.note_id,
			title: note.title,
			body: note.body,
			created_at: note.created_at,
			updated_at: note.updated_at,
			indexing,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListNotesResponse {
	pub notes: Vec<NoteResponse>,
}

impl RecallService {
	pub async fn create_note(
		&self,
		owner_id: &str,
		req: CreateNoteRequest,
	) -> Result<NoteResponse> {
		require_owner(owner_id)?;

		let title = validate_title(&req.title)?;
		let body = validate_body(&req.body)?;
		let now = OffsetDateTime::now_utc();
		let note = Note {
			note_id: Uuid::new_v4(),
			owner_id: owner_id.to_string(),
			title,
			body,
			created_at: now,
			updated_at: now,
		};
		let outbox_id = bounded(Stage::DocumentStore, self.cfg.timeouts.document_store(), async {
			let mut tx = self.db.pool.begin().await?;

			queries::insert_note(&mut *tx, &note).await?;

			let outbox_id =
				outbox::enqueue_outbox(&mut *tx, note.note_id, owner_id, OutboxOp::Upsert).await?;

			tx.commit().await?;

			Ok::<_, Error>(outbox_id)
		})
		.await?;

		tracing::info!(note_id = %note.note_id, owner_id, "Note created.");

		let indexing = self.index_after_upsert(outbox_id, &note).await;

		Ok(NoteResponse::from_note(note, Some(indexing)))
	}

	pub async fn get_note(&self, owner_id: &str, note_id: Uuid) -> Result<NoteResponse> {
		require_owner(owner_id)?;

		let note = bounded(Stage::DocumentStore, self.cfg.timeouts.document_store(), async {
			Ok::<_, Error>(queries::fetch_note(&self.db.pool, note_id, owner_id).await?)
		})
		.await?
		.ok_or_else(|| note_not_found(note_id))?;

		Ok(NoteResponse::from_note(note, None))
	}

	/// Newest modification first.
	pub async fn list_notes(
		&self,
		owner_id: &str,
		limit: Option<u32>,
	) -> Result<ListNotesResponse> {
		require_owner(owner_id)?;

		let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
		let notes = bounded(Stage::DocumentStore, self.cfg.timeouts.document_store(), async {
			Ok::<_, Error>(queries::list_notes(&self.db.pool, owner_id, i64::from(limit)).await?)
		})
		.await?;

		Ok(ListNotesResponse {
			notes: notes.into_iter().map(|note| NoteResponse::from_note(note, None)).collect(),
		})
	}

	pub async fn update_note(
		&self,
		owner_id: &str,
		note_id: Uuid,
		req: UpdateNoteRequest,
	) -> Result<NoteResponse> {
		require_owner(owner_id)?;

		if req.title.is_none() && req.body.is_none() {
			return Err(Error::InvalidRequest {
				message: "At least one of title or body is required.".to_string(),
			});
		}

		let title = req.title.as_deref().map(validate_title).transpose()?;
		let body = req.body.as_deref().map(validate_body).transpose()?;
		let (note, outbox_id) =
			bounded(Stage::DocumentStore, self.cfg.timeouts.document_store(), async {
				let mut tx = self.db.pool.begin().await?;
				let mut note = queries::fetch_note_for_update(&mut *tx, note_id, owner_id)
					.await?
					.ok_or_else(|| note_not_found(note_id))?;

				if let Some(title) = title {
					note.title = title;
				}
				if let Some(body) = body {
					note.body = body;
				}

				note.updated_at = OffsetDateTime::now_utc();

				queries::update_note(&mut *tx, &note).await?;

				let outbox_id =
					outbox::enqueue_outbox(&mut *tx, note_id, owner_id, OutboxOp::Upsert).await?;

				tx.commit().await?;

				Ok::<_, Error>((note, outbox_id))
			})
			.await?;

		tracing::info!(note_id = %note_id, owner_id, "Note updated.");

		let indexing = self.index_after_upsert(outbox_id, &note).await;

		Ok(NoteResponse::from_note(note, Some(indexing)))
	}

	/// Deletes the note and its vector record. The vector removal is retried through the outbox
	/// when the index is unavailable.
	pub async fn delete_note(&self, owner_id: &str, note_id: Uuid) -> Result<IndexingStatus> {
		require_owner(owner_id)?;

		let deleted_at = OffsetDateTime::now_utc();
		let outbox_id = bounded(Stage::DocumentStore, self.cfg.timeouts.document_store(), async {
			let mut tx = self.db.pool.begin().await?;

			if !queries::delete_note(&mut *tx, note_id, owner_id).await? {
				return Err(note_not_found(note_id));
			}

			let outbox_id =
				outbox::enqueue_outbox(&mut *tx, note_id, owner_id, OutboxOp::Delete).await?;

			tx.commit().await?;

			Ok::<_, Error>(outbox_id)
		})
		.await?;

		tracing::info!(note_id = %note_id, owner_id, "Note deleted.");

		if !self.cfg.indexing.inline {
			return Ok(IndexingStatus::Queued);
		}

		let outcome = self.on_note_deleted(note_id, owner_id).await;

		Ok(self.settle_inline(outbox_id, deleted_at, outcome).await)
	}

	async fn index_after_upsert(&self, outbox_id: Uuid, note: &Note) -> IndexingStatus {
		if !self.cfg.indexing.inline {
			return IndexingStatus::Queued;
		}

		let outcome = self.on_note_written(note).await;

		self.settle_inline(outbox_id, note.updated_at, outcome).await
	}

	/// Marks the outbox job done after a successful inline attempt. The job stays pending for
	/// the worker when the attempt was deferred, or when a later write to the same note was
	/// queued after `since` and the inline result may be stale.
	async fn settle_inline(
		&self,
		outbox_id: Uuid,
		since: OffsetDateTime,
		outcome: IndexOutcome,
	) -> IndexingStatus {
		if !outcome.is_indexed() {
			return IndexingStatus::Queued;
		}

		match outbox::mark_done_unless_superseded(&self.db.pool, outbox_id, since).await {
			Ok(true) => IndexingStatus::Indexed,
			Ok(false) => {
				tracing::debug!(
					outbox_id = %outbox_id,
					"Note changed during inline indexing. Leaving the job to the worker."
				);

				IndexingStatus::Queued
			},
			Err(err) => {
				tracing::warn!(
					outbox_id = %outbox_id,
					error = %err,
					"Failed to mark inline indexing job done. The worker will repeat it."
				);

				IndexingStatus::Indexed
			},
		}
	}
}

fn validate_title(raw: &str) -> Result<String> {
	let title = raw.trim();

	if title.is_empty() {
		return Err(Error::InvalidRequest { message: "title must be non-empty.".to_string() });
	}
	if title.chars().count() > MAX_TITLE_CHARS {
		return Err(Error::InvalidRequest {
			message: format!("title must be at most {MAX_TITLE_CHARS} characters."),
		});
	}

	Ok(title.to_string())
}

fn validate_body(raw: &str) -> Result<String> {
	if raw.trim().is_empty() {
		return Err(Error::InvalidRequest { message: "body must be non-empty.".to_string() });
	}
	if raw.chars().count() > MAX_BODY_CHARS {
		return Err(Error::InvalidRequest {
			message: format!("body must be at most {MAX_BODY_CHARS} characters."),
		});
	}

	Ok(raw.trim().to_string())
}

fn note_not_found(note_id: Uuid) -> Error {
	Error::NotFound { message: format!("Note {note_id} not found.") }
}
