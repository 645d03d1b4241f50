use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, RecallService, Result};
use recall_storage::outbox;

const DEFAULT_DEAD_LETTER_LIMIT: u32 = 50;
const MAX_DEAD_LETTER_LIMIT: u32 = 500;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReindexReport {
	pub enqueued: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequeueReport {
	pub requeued: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusCount {
	pub status: String,
	pub count: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeadLetter {
	pub outbox_id: Uuid,
	pub note_id: Uuid,
	pub owner_id: String,
	pub op: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutboxReport {
	pub counts: Vec<StatusCount>,
	pub dead: Vec<DeadLetter>,
}

impl RecallService {
	/// Queues a re-index of every note, or of one owner's notes. The worker performs it.
	pub async fn reindex(&self, owner_id: Option<&str>) -> Result<ReindexReport> {
		let owner_id = owner_id.map(str::trim);

		if owner_id.is_some_and(str::is_empty) {
			return Err(Error::InvalidRequest {
				message: "owner_id must be non-empty when provided.".to_string(),
			});
		}

		let enqueued = outbox::enqueue_all_upserts(&self.db.pool, owner_id).await?;

		tracing::info!(enqueued, owner_id = owner_id.unwrap_or("*"), "Queued re-index.");

		Ok(ReindexReport { enqueued })
	}

	pub async fn outbox_report(&self, dead_limit: Option<u32>) -> Result<OutboxReport> {
		let limit = dead_limit.unwrap_or(DEFAULT_DEAD_LETTER_LIMIT).clamp(1, MAX_DEAD_LETTER_LIMIT);
		let counts = outbox::status_counts(&self.db.pool)
			.await?
			.into_iter()
			.map(|row| StatusCount { status: row.status, count: row.count })
			.collect();
		let dead = outbox::list_dead(&self.db.pool, i64::from(limit))
			.await?
			.into_iter()
			.map(|entry| DeadLetter {
				outbox_id: entry.outbox_id,
				note_id: entry.note_id,
				owner_id: entry.owner_id,
				op: entry.op,
				attempts: entry.attempts,
				last_error: entry.last_error,
				updated_at: entry.updated_at,
			})
			.collect();

		Ok(OutboxReport { counts, dead })
	}

	pub async fn requeue_dead_letters(&self) -> Result<RequeueReport> {
		let requeued = outbox::requeue_dead(&self.db.pool).await?;

		tracing::info!(requeued, "Requeued dead indexing jobs.");

		Ok(RequeueReport { requeued })
	}
}
