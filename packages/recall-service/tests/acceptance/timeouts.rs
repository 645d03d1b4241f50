use super::{Harness, fakes::Mode};
use recall_service::{Error, IndexOutcome, Stage};

#[tokio::test(start_paused = true)]
async fn stalled_embedding_times_out() {
	let harness = Harness::new();

	harness.embedding.set_mode(Mode::Stalled);

	let err = harness
		.service
		.answer("u1", "When is my flight?")
		.await
		.expect_err("Expected timeout.");

	assert!(
		matches!(err, Error::Timeout { stage: Stage::Embedding, timeout_ms: 5_000 }),
		"Unexpected error: {err}"
	);
	assert_eq!(err.stage(), Some(Stage::Embedding));
}

#[tokio::test(start_paused = true)]
async fn stalled_index_query_times_out() {
	let harness = Harness::new();

	harness.index.set_mode(Mode::Stalled);

	let err = harness
		.service
		.retrieve("u1", "When is my flight?", None)
		.await
		.expect_err("Expected timeout.");

	assert!(
		matches!(err, Error::Timeout { stage: Stage::VectorIndex, .. }),
		"Unexpected error: {err}"
	);
}

#[tokio::test(start_paused = true)]
async fn stalled_document_store_times_out() {
	let harness = Harness::new();

	harness.write_note("u1", "Trip", "Flight to Paris on June 3").await;
	harness.documents.set_mode(Mode::Stalled);

	let err = harness
		.service
		.retrieve("u1", "When is my flight?", None)
		.await
		.expect_err("Expected timeout.");

	assert!(
		matches!(err, Error::Timeout { stage: Stage::DocumentStore, .. }),
		"Unexpected error: {err}"
	);
}

#[tokio::test(start_paused = true)]
async fn stalled_completion_times_out() {
	let harness = Harness::new();

	harness.write_note("u1", "Trip", "Flight to Paris on June 3").await;
	harness.completion.set_mode(Mode::Stalled);

	let err = harness
		.service
		.answer("u1", "When is my flight?")
		.await
		.expect_err("Expected timeout.");

	assert!(
		matches!(err, Error::Timeout { stage: Stage::Completion, timeout_ms: 30_000 }),
		"Unexpected error: {err}"
	);
}

#[tokio::test(start_paused = true)]
async fn stalled_upsert_defers_indexing() {
	let harness = Harness::new();
	let note = harness.store_note("u1", "Trip", "Flight to Paris on June 3").await;

	harness.index.set_mode(Mode::Stalled);

	let outcome = harness.service.on_note_written(&note).await;

	assert!(matches!(
		outcome,
		IndexOutcome::Deferred { error: Error::Timeout { stage: Stage::VectorIndex, .. } }
	));
}
