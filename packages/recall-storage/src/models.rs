use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Note {
	pub note_id: Uuid,
	pub owner_id: String,
	pub title: String,
	pub body: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct IndexingOutboxEntry {
	pub outbox_id: Uuid,
	pub note_id: Uuid,
	pub owner_id: String,
	pub op: String,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct OutboxStatusCount {
	pub status: String,
	pub count: i64,
}
