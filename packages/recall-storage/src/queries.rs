use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{Result, models::Note};

pub async fn insert_note<'e, E>(executor: E, note: &Note) -> Result<()>
where
	E: Executor<'e, Database = Postgres>,
{
	sqlx::query(
		"\
INSERT INTO notes (
	note_id,
	owner_id,
	title,
	body,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6)",
	)
	.bind(note.note_id)
	.bind(note.owner_id.as_str())
	.bind(note.title.as_str())
	.bind(note.body.as_str())
	.bind(note.created_at)
	.bind(note.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn update_note<'e, E>(executor: E, note: &Note) -> Result<()>
where
	E: Executor<'e, Database = Postgres>,
{
	let result = sqlx::query(
		"\
UPDATE notes
SET
	title = $1,
	body = $2,
	updated_at = $3
WHERE note_id = $4 AND owner_id = $5",
	)
	.bind(note.title.as_str())
	.bind(note.body.as_str())
	.bind(note.updated_at)
	.bind(note.note_id)
	.bind(note.owner_id.as_str())
	.execute(executor)
	.await?;

	if result.rows_affected() == 0 {
		return Err(crate::Error::NotFound(format!("Note {} not found.", note.note_id)));
	}

	Ok(())
}

/// Returns whether a row owned by `owner_id` was removed.
pub async fn delete_note<'e, E>(executor: E, note_id: Uuid, owner_id: &str) -> Result<bool>
where
	E: Executor<'e, Database = Postgres>,
{
	let result = sqlx::query("DELETE FROM notes WHERE note_id = $1 AND owner_id = $2")
		.bind(note_id)
		.bind(owner_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn fetch_note<'e, E>(executor: E, note_id: Uuid, owner_id: &str) -> Result<Option<Note>>
where
	E: Executor<'e, Database = Postgres>,
{
	let note = sqlx::query_as::<_, Note>(
		"\
SELECT
	note_id,
	owner_id,
	title,
	body,
	created_at,
	updated_at
FROM notes
WHERE note_id = $1 AND owner_id = $2",
	)
	.bind(note_id)
	.bind(owner_id)
	.fetch_optional(executor)
	.await?;

	Ok(note)
}

pub async fn fetch_note_for_update<'e, E>(
	executor: E,
	note_id: Uuid,
	owner_id: &str,
) -> Result<Option<Note>>
where
	E: Executor<'e, Database = Postgres>,
{
	let note = sqlx::query_as::<_, Note>(
		"\
SELECT
	note_id,
	owner_id,
	title,
	body,
	created_at,
	updated_at
FROM notes
WHERE note_id = $1 AND owner_id = $2
FOR UPDATE",
	)
	.bind(note_id)
	.bind(owner_id)
	.fetch_optional(executor)
	.await?;

	Ok(note)
}

/// Loads the subset of `note_ids` owned by `owner_id`. Unknown ids and ids owned by someone else
/// are left out; row order is unspecified.
pub async fn fetch_notes_by_ids<'e, E>(
	executor: E,
	note_ids: &[Uuid],
	owner_id: &str,
) -> Result<Vec<Note>>
where
	E: Executor<'e, Database = Postgres>,
{
	if note_ids.is_empty() {
		return Ok(Vec::new());
	}

	let notes = sqlx::query_as::<_, Note>(
		"\
SELECT
	note_id,
	owner_id,
	title,
	body,
	created_at,
	updated_at
FROM notes
WHERE owner_id = $1 AND note_id = ANY($2)",
	)
	.bind(owner_id)
	.bind(note_ids)
	.fetch_all(executor)
	.await?;

	Ok(notes)
}

pub async fn list_notes<'e, E>(executor: E, owner_id: &str, limit: i64) -> Result<Vec<Note>>
where
	E: Executor<'e, Database = Postgres>,
{
	let notes = sqlx::query_as::<_, Note>(
		"\
SELECT
	note_id,
	owner_id,
	title,
	body,
	created_at,
	updated_at
FROM notes
WHERE owner_id = $1
ORDER BY updated_at DESC, note_id
LIMIT $2",
	)
	.bind(owner_id)
	.bind(limit)
	.fetch_all(executor)
	.await?;

	Ok(notes)
}
