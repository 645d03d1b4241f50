use std::sync::Arc;

use uuid::Uuid;

use super::{
	fakes::{MemoryIndex, Mode, SpyCompletion, VocabEmbedding},
	test_config,
};
use recall_service::{
	CreateNoteRequest, Error, IndexingStatus, NO_RELEVANT_NOTES, Providers, RecallService,
	UpdateNoteRequest,
};
use recall_storage::{db::Db, outbox};
use recall_testkit::TestDatabase;

struct DbHarness {
	service: RecallService,
	index: Arc<MemoryIndex>,
	test_db: TestDatabase,
}
impl DbHarness {
	/// Postgres serves as the document store; the index and providers are in memory.
	async fn new(base_dsn: &str) -> Self {
		let test_db = TestDatabase::new(base_dsn).await.expect("Failed to create test database.");
		let cfg = test_config(test_db.dsn().to_string());
		let db = Db::connect(&cfg.storage.postgres).await.expect("Failed to connect to Postgres.");

		db.ensure_schema().await.expect("Failed to ensure schema.");

		let index = Arc::new(MemoryIndex::default());
		let providers = Providers::new(
			Arc::new(VocabEmbedding::default()),
			Arc::new(SpyCompletion::default()),
		);
		let service =
			RecallService::with_backends(cfg, db.clone(), providers, index.clone(), Arc::new(db));

		Self { service, index, test_db }
	}

	async fn status_count(&self, status: &str) -> i64 {
		outbox::status_counts(&self.service.db.pool)
			.await
			.expect("Failed to count outbox rows.")
			.into_iter()
			.find(|row| row.status == status)
			.map(|row| row.count)
			.unwrap_or(0)
	}

	async fn cleanup(self) {
		let Self { service, test_db, .. } = self;

		service.db.pool.close().await;
		test_db.cleanup().await.expect("Failed to cleanup test database.");
	}
}

fn note(title: &str, body: &str) -> CreateNoteRequest {
	CreateNoteRequest { title: title.to_string(), body: body.to_string() }
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RECALL_PG_DSN to run."]
async fn note_lifecycle_is_owner_scoped_and_indexed() {
	let Some(base_dsn) = recall_testkit::env_dsn() else {
		eprintln!("Skipping note_lifecycle_is_owner_scoped_and_indexed; set RECALL_PG_DSN to run this test.");

		return;
	};
	let harness = DbHarness::new(&base_dsn).await;
	let service = &harness.service;
	let created = service
		.create_note("u1", note(" Trip ", "Flight to Paris on June 3"))
		.await
		.expect("Create failed.");

	assert_eq!(created.title, "Trip");
	assert_eq!(created.indexing, Some(IndexingStatus::Indexed));
	assert_eq!(harness.index.len().await, 1);
	assert_eq!(harness.status_count("DONE").await, 1);

	let fetched = service.get_note("u1", created.note_id).await.expect("Get failed.");

	assert_eq!(fetched.body, "Flight to Paris on June 3");

	let err = service.get_note("u2", created.note_id).await.expect_err("Expected not found.");

	assert!(matches!(err, Error::NotFound { .. }), "Unexpected error: {err}");

	let updated = service
		.update_note(
			"u1",
			created.note_id,
			UpdateNoteRequest { title: None, body: Some("Flight to Lisbon on June 9".to_string()) },
		)
		.await
		.expect("Update failed.");

	assert_eq!(updated.title, "Trip");
	assert!(updated.updated_at >= created.updated_at);

	let answer = service.answer("u1", "Lisbon flight").await.expect("Answer failed.");

	assert!(answer.contains("June 9"), "Unexpected answer: {answer}");

	let err = service
		.update_note("u2", created.note_id, UpdateNoteRequest {
			title: Some("Mine now".to_string()),
			body: None,
		})
		.await
		.expect_err("Expected not found.");

	assert!(matches!(err, Error::NotFound { .. }), "Unexpected error: {err}");

	service.create_note("u2", note("Errands", "Renew passport")).await.expect("Create failed.");

	let listed = service.list_notes("u1", None).await.expect("List failed.");

	assert_eq!(listed.notes.len(), 1);

	let status = service.delete_note("u1", created.note_id).await.expect("Delete failed.");

	assert_eq!(status, IndexingStatus::Indexed);
	assert_eq!(harness.index.len().await, 1, "Only the other owner's record remains.");
	assert_eq!(
		service.answer("u1", "Lisbon flight").await.expect("Answer failed."),
		NO_RELEVANT_NOTES
	);

	let err = service.delete_note("u1", created.note_id).await.expect_err("Expected not found.");

	assert!(matches!(err, Error::NotFound { .. }), "Unexpected error: {err}");

	harness.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RECALL_PG_DSN to run."]
async fn failed_inline_indexing_leaves_job_pending() {
	let Some(base_dsn) = recall_testkit::env_dsn() else {
		eprintln!("Skipping failed_inline_indexing_leaves_job_pending; set RECALL_PG_DSN to run this test.");

		return;
	};
	let harness = DbHarness::new(&base_dsn).await;

	harness.index.set_mode(Mode::Failing);

	let created = harness
		.service
		.create_note("u1", note("Trip", "Flight to Paris on June 3"))
		.await
		.expect("A note write must succeed while the index is down.");

	assert_eq!(created.indexing, Some(IndexingStatus::Queued));
	assert_eq!(harness.status_count("PENDING").await, 1);
	assert_eq!(harness.status_count("DONE").await, 0);

	let fetched =
		harness.service.get_note("u1", created.note_id).await.expect("Note must be stored.");

	assert_eq!(fetched.note_id, created.note_id);

	harness.cleanup().await;
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set RECALL_PG_DSN to run."]
async fn admin_reindex_and_reports() {
	let Some(base_dsn) = recall_testkit::env_dsn() else {
		eprintln!("Skipping admin_reindex_and_reports; set RECALL_PG_DSN to run this test.");

		return;
	};
	let harness = DbHarness::new(&base_dsn).await;
	let service = &harness.service;

	service.create_note("u1", note("Trip", "Flight to Paris")).await.expect("Create failed.");
	service.create_note("u1", note("Groceries", "Buy milk")).await.expect("Create failed.");
	service.create_note("u2", note("Errands", "Renew passport")).await.expect("Create failed.");

	let report = service.reindex(Some("u1")).await.expect("Reindex failed.");

	assert_eq!(report.enqueued, 2);

	let report = service.reindex(None).await.expect("Reindex failed.");

	assert_eq!(report.enqueued, 3);
	assert_eq!(harness.status_count("PENDING").await, 5);

	let err = service.reindex(Some("  ")).await.expect_err("Expected invalid request.");

	assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");

	let dead_id = outbox::enqueue_outbox(
		&service.db.pool,
		Uuid::new_v4(),
		"u1",
		outbox::OutboxOp::Delete,
	)
	.await
	.expect("Failed to enqueue outbox.");

	sqlx::query("UPDATE indexing_outbox SET status = 'DEAD', attempts = 8 WHERE outbox_id = $1")
		.bind(dead_id)
		.execute(&service.db.pool)
		.await
		.expect("Failed to mark job dead.");

	let report = service.outbox_report(None).await.expect("Report failed.");

	assert_eq!(report.dead.len(), 1);
	assert_eq!(report.dead[0].outbox_id, dead_id);
	assert!(report.counts.iter().any(|row| row.status == "DEAD" && row.count == 1));

	let requeued = service.requeue_dead_letters().await.expect("Requeue failed.");

	assert_eq!(requeued.requeued, 1);
	assert_eq!(harness.status_count("DEAD").await, 0);

	harness.cleanup().await;
}
