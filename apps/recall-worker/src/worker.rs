use std::time::Duration as StdDuration;

use color_eyre::Result;
use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;
use uuid::Uuid;

use recall_service::RecallService;
use recall_storage::{
	models::IndexingOutboxEntry,
	outbox::{self, FailureDisposition, OutboxOp},
	queries,
};

pub struct WorkerState {
	pub service: RecallService,
}

/// What one poll of the outbox did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
	Idle,
	Done { outbox_id: Uuid },
	/// The note changed while the job ran. The job is handed back for another pass.
	Deferred { outbox_id: Uuid },
	Retry { outbox_id: Uuid, available_at: OffsetDateTime },
	Dead { outbox_id: Uuid },
}

pub async fn run_worker(state: WorkerState) -> Result<()> {
	let poll_interval = poll_interval(&state.service.cfg.indexing);

	loop {
		match process_indexing_outbox_once(&state).await {
			// Drain due jobs before sleeping again.
			Ok(
				JobOutcome::Done { .. }
				| JobOutcome::Deferred { .. }
				| JobOutcome::Retry { .. }
				| JobOutcome::Dead { .. },
			) => continue,
			Ok(JobOutcome::Idle) => {},
			Err(err) => tracing::error!(error = %err, "Indexing outbox processing failed."),
		}

		tokio_time::sleep(poll_interval).await;
	}
}

/// Claims and runs at most one due indexing job.
pub async fn process_indexing_outbox_once(state: &WorkerState) -> Result<JobOutcome> {
	let service = &state.service;
	let policy = &service.cfg.indexing;
	let now = OffsetDateTime::now_utc();
	let Some(job) = outbox::fetch_next_job(&service.db, now, claim_lease(policy)).await? else {
		return Ok(JobOutcome::Idle);
	};

	if lease_exhausted(&job, policy) {
		return fail_job(service, &job, "Claim lease expired before the job finished.").await;
	}

	match run_job(service, &job).await {
		Ok(()) => {
			if !outbox::mark_done_unless_superseded(&service.db.pool, job.outbox_id, now).await? {
				outbox::release_claim(&service.db.pool, job.outbox_id).await?;

				tracing::debug!(
					outbox_id = %job.outbox_id,
					note_id = %job.note_id,
					"Note changed while the outbox job ran. Released for another pass."
				);

				return Ok(JobOutcome::Deferred { outbox_id: job.outbox_id });
			}

			tracing::debug!(
				outbox_id = %job.outbox_id,
				note_id = %job.note_id,
				op = %job.op,
				"Outbox job done."
			);

			Ok(JobOutcome::Done { outbox_id: job.outbox_id })
		},
		Err(err) => fail_job(service, &job, &err.to_string()).await,
	}
}

async fn fail_job(
	service: &RecallService,
	job: &IndexingOutboxEntry,
	error: &str,
) -> Result<JobOutcome> {
	let policy = &service.cfg.indexing;
	let disposition =
		outbox::mark_failed(&service.db.pool, job.outbox_id, job.attempts, error, policy).await?;

	match disposition {
		FailureDisposition::Retry { available_at } => {
			tracing::warn!(
				outbox_id = %job.outbox_id,
				note_id = %job.note_id,
				attempts = job.attempts,
				error = %error,
				"Outbox job failed. Retrying later."
			);

			Ok(JobOutcome::Retry { outbox_id: job.outbox_id, available_at })
		},
		FailureDisposition::Dead => {
			tracing::error!(
				outbox_id = %job.outbox_id,
				note_id = %job.note_id,
				owner_id = %job.owner_id,
				attempts = job.attempts,
				error = %error,
				"Outbox job exhausted its attempts. Moved to dead letters."
			);

			Ok(JobOutcome::Dead { outbox_id: job.outbox_id })
		},
	}
}

async fn run_job(service: &RecallService, job: &IndexingOutboxEntry) -> Result<()> {
	match OutboxOp::parse(&job.op)? {
		OutboxOp::Upsert => handle_upsert(service, job).await,
		OutboxOp::Delete => {
			service.remove_note_vector(job.note_id, &job.owner_id).await?;

			Ok(())
		},
	}
}

async fn handle_upsert(service: &RecallService, job: &IndexingOutboxEntry) -> Result<()> {
	let note = queries::fetch_note(&service.db.pool, job.note_id, &job.owner_id).await?;
	let Some(note) = note else {
		// The note was deleted after this job was queued. Clear any vector a racing write left.
		service.remove_note_vector(job.note_id, &job.owner_id).await?;

		tracing::info!(note_id = %job.note_id, "Note missing for outbox job. Removed its vector.");

		return Ok(());
	};

	service.index_note(&note).await?;

	Ok(())
}

/// A claim beyond the budget means earlier claims lapsed without recording an outcome.
fn lease_exhausted(job: &IndexingOutboxEntry, policy: &recall_config::Indexing) -> bool {
	job.attempts > policy.max_attempts as i32
}

fn claim_lease(policy: &recall_config::Indexing) -> Duration {
	Duration::seconds(policy.claim_lease_seconds.max(1))
}

fn poll_interval(policy: &recall_config::Indexing) -> StdDuration {
	StdDuration::from_millis(policy.poll_interval_ms.max(1))
}
