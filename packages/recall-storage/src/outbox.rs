use std::fmt::{Display, Formatter};

use sqlx::{Executor, Postgres};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
	Error, Result,
	db::Db,
	models::{IndexingOutboxEntry, OutboxStatusCount},
};

pub const MAX_OUTBOX_ERROR_CHARS: usize = 1_024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboxOp {
	Upsert,
	Delete,
}
impl OutboxOp {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Upsert => "UPSERT",
			Self::Delete => "DELETE",
		}
	}

	pub fn parse(raw: &str) -> Result<Self> {
		match raw {
			"UPSERT" => Ok(Self::Upsert),
			"DELETE" => Ok(Self::Delete),
			other => Err(Error::InvalidArgument(format!("Unsupported outbox op: {other}."))),
		}
	}
}
impl Display for OutboxOp {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// What happened to a job after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureDisposition {
	Retry { available_at: OffsetDateTime },
	Dead,
}

pub async fn enqueue_outbox<'e, E>(
	executor: E,
	note_id: Uuid,
	owner_id: &str,
	op: OutboxOp,
) -> Result<Uuid>
where
	E: Executor<'e, Database = Postgres>,
{
	let outbox_id = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();

	sqlx::query(
		"\
INSERT INTO indexing_outbox (
	outbox_id,
	note_id,
	owner_id,
	op,
	status,
	attempts,
	available_at,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, 'PENDING', 0, $5, $5, $5)",
	)
	.bind(outbox_id)
	.bind(note_id)
	.bind(owner_id)
	.bind(op.as_str())
	.bind(now)
	.execute(executor)
	.await?;

	Ok(outbox_id)
}

/// Queues an upsert for every stored note, or only those of `owner_id` when given. Returns the
/// number of jobs created.
pub async fn enqueue_all_upserts<'e, E>(executor: E, owner_id: Option<&str>) -> Result<u64>
where
	E: Executor<'e, Database = Postgres>,
{
	let now = OffsetDateTime::now_utc();
	let result = sqlx::query(
		"\
INSERT INTO indexing_outbox (
	outbox_id,
	note_id,
	owner_id,
	op,
	status,
	attempts,
	available_at,
	created_at,
	updated_at
)
SELECT gen_random_uuid(), note_id, owner_id, 'UPSERT', 'PENDING', 0, $1, $1, $1
FROM notes
WHERE $2::text IS NULL OR owner_id = $2::text",
	)
	.bind(now)
	.bind(owner_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

/// Claims the oldest due job and pushes its `available_at` forward by `lease` so other
/// workers skip it until the lease lapses. The claim counts as an attempt, so a job whose
/// worker dies mid-run still spends its budget.
pub async fn fetch_next_job(
	db: &Db,
	now: OffsetDateTime,
	lease: Duration,
) -> Result<Option<IndexingOutboxEntry>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, IndexingOutboxEntry>(
		"\
SELECT
	outbox_id,
	note_id,
	owner_id,
	op,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM indexing_outbox
WHERE status IN ('PENDING','FAILED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let job = if let Some(mut job) = row {
		let lease_until = now + lease;

		sqlx::query(
			"\
UPDATE indexing_outbox
SET attempts = attempts + 1,
	available_at = $1,
	updated_at = $2
WHERE outbox_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(job.outbox_id)
		.execute(&mut *tx)
		.await?;

		job.attempts = job.attempts.saturating_add(1);
		job.available_at = lease_until;
		job.updated_at = now;

		Some(job)
	} else {
		None
	};

	tx.commit().await?;

	Ok(job)
}

/// Completes a job unless another job for the same note was queued at or after `since`, the
/// moment the caller read the note. Returns `false` when the job stays open because the note
/// may have changed after that read.
pub async fn mark_done_unless_superseded<'e, E>(
	executor: E,
	outbox_id: Uuid,
	since: OffsetDateTime,
) -> Result<bool>
where
	E: Executor<'e, Database = Postgres>,
{
	let now = OffsetDateTime::now_utc();
	let result = sqlx::query(
		"\
UPDATE indexing_outbox AS job
SET status = 'DONE', updated_at = $1
WHERE job.outbox_id = $2
	AND NOT EXISTS (
		SELECT 1
		FROM indexing_outbox AS newer
		WHERE newer.note_id = job.note_id
			AND newer.outbox_id <> job.outbox_id
			AND newer.created_at >= $3
	)",
	)
	.bind(now)
	.bind(outbox_id)
	.bind(since)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Hands a claimed job back for an immediate retry without spending an attempt.
pub async fn release_claim<'e, E>(executor: E, outbox_id: Uuid) -> Result<()>
where
	E: Executor<'e, Database = Postgres>,
{
	let now = OffsetDateTime::now_utc();

	sqlx::query(
		"\
UPDATE indexing_outbox
SET attempts = GREATEST(attempts - 1, 0),
	available_at = $1,
	updated_at = $1
WHERE outbox_id = $2",
	)
	.bind(now)
	.bind(outbox_id)
	.execute(executor)
	.await?;

	Ok(())
}

/// Records a failed attempt. `attempts` already includes the failed one, as counted by
/// [`fetch_next_job`]. Once it reaches `max_attempts` the job is parked as `DEAD` and no longer
/// claimed.
pub async fn mark_failed<'e, E>(
	executor: E,
	outbox_id: Uuid,
	attempts: i32,
	error: &str,
	policy: &recall_config::Indexing,
) -> Result<FailureDisposition>
where
	E: Executor<'e, Database = Postgres>,
{
	let now = OffsetDateTime::now_utc();
	let disposition = failure_disposition(attempts, now, policy);
	let (status, available_at) = match disposition {
		FailureDisposition::Retry { available_at } => ("FAILED", available_at),
		FailureDisposition::Dead => ("DEAD", now),
	};
	let error_text = sanitize_outbox_error(error);

	sqlx::query(
		"\
UPDATE indexing_outbox
SET status = $1,
	attempts = $2,
	last_error = $3,
	available_at = $4,
	updated_at = $5
WHERE outbox_id = $6",
	)
	.bind(status)
	.bind(attempts)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(outbox_id)
	.execute(executor)
	.await?;

	Ok(disposition)
}

pub async fn list_dead<'e, E>(executor: E, limit: i64) -> Result<Vec<IndexingOutboxEntry>>
where
	E: Executor<'e, Database = Postgres>,
{
	let rows = sqlx::query_as::<_, IndexingOutboxEntry>(
		"\
SELECT
	outbox_id,
	note_id,
	owner_id,
	op,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM indexing_outbox
WHERE status = 'DEAD'
ORDER BY updated_at DESC
LIMIT $1",
	)
	.bind(limit)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

/// Moves every `DEAD` job back to `PENDING` with a fresh attempt budget.
pub async fn requeue_dead<'e, E>(executor: E) -> Result<u64>
where
	E: Executor<'e, Database = Postgres>,
{
	let now = OffsetDateTime::now_utc();
	let result = sqlx::query(
		"\
UPDATE indexing_outbox
SET status = 'PENDING',
	attempts = 0,
	available_at = $1,
	updated_at = $1
WHERE status = 'DEAD'",
	)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected())
}

pub async fn status_counts<'e, E>(executor: E) -> Result<Vec<OutboxStatusCount>>
where
	E: Executor<'e, Database = Postgres>,
{
	let rows = sqlx::query_as::<_, OutboxStatusCount>(
		"\
SELECT status, COUNT(*)::BIGINT AS count
FROM indexing_outbox
GROUP BY status
ORDER BY status",
	)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub fn failure_disposition(
	attempts: i32,
	now: OffsetDateTime,
	policy: &recall_config::Indexing,
) -> FailureDisposition {
	if attempts >= policy.max_attempts as i32 {
		return FailureDisposition::Dead;
	}

	let backoff = backoff_for_attempt(attempts, policy.base_backoff_ms, policy.max_backoff_ms);

	FailureDisposition::Retry { available_at: now + backoff }
}

pub fn backoff_for_attempt(attempt: i32, base_ms: u64, max_ms: u64) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(16);
	let base = base_ms.saturating_mul(1 << exp);
	let capped = base.min(max_ms);

	Duration::milliseconds(capped.min(i64::MAX as u64) as i64)
}

/// Redacts bearer tokens and `key=value` secrets, then caps the text at
/// [`MAX_OUTBOX_ERROR_CHARS`].
pub fn sanitize_outbox_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_OUTBOX_ERROR_CHARS {
		out = out.chars().take(MAX_OUTBOX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}
