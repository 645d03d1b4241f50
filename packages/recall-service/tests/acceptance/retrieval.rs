use std::sync::atomic::Ordering;

use time::OffsetDateTime;
use uuid::Uuid;

use super::{
	Harness,
	fakes::{Mode, vocab_vector},
};
use recall_service::{Error, VectorRecord};

#[tokio::test]
async fn retrieval_never_crosses_owners() {
	let harness = Harness::new();
	let mine = harness.write_note("u1", "Groceries", "Buy milk and eggs").await;
	let theirs = harness.write_note("u2", "Trip", "Flight to Paris on June 3").await;
	let results =
		harness.service.retrieve("u1", "When is my flight?", None).await.expect("Retrieve failed.");

	assert!(results.iter().all(|item| item.note.owner_id == "u1"));
	assert!(results.iter().all(|item| item.note.note_id != theirs.note_id));
	assert_eq!(results.len(), 1);
	assert_eq!(results[0].note.note_id, mine.note_id);
}

#[tokio::test]
async fn results_follow_similarity_order() {
	let harness = Harness::new();
	let paris = harness.write_note("u1", "Trip", "Flight to Paris on June 3").await;
	let lisbon = harness.write_note("u1", "Work", "Flight to Lisbon").await;
	let passport = harness.write_note("u1", "Errands", "Renew passport").await;
	let results = harness
		.service
		.retrieve("u1", "Paris flight in June", None)
		.await
		.expect("Retrieve failed.");
	let ids: Vec<Uuid> = results.iter().map(|item| item.note.note_id).collect();

	assert_eq!(ids, vec![paris.note_id, lisbon.note_id, passport.note_id]);

	for pair in results.windows(2) {
		assert!(pair[0].score >= pair[1].score, "Scores must not increase down the ranking.");
	}
}

#[tokio::test]
async fn unresolvable_candidates_are_dropped() {
	let harness = Harness::new();
	let kept = harness.write_note("u1", "Trip", "Flight to Paris on June 3").await;
	let deleted = harness.write_note("u1", "Trip", "Flight to Oslo").await;

	harness.documents.remove(deleted.note_id).await;
	harness
		.index
		.put(VectorRecord {
			note_id: Uuid::new_v4(),
			owner_id: "u1".to_string(),
			vector: vocab_vector("flight"),
			created_at: OffsetDateTime::now_utc(),
		})
		.await;

	let results =
		harness.service.retrieve("u1", "When is my flight?", None).await.expect("Retrieve failed.");

	assert_eq!(results.len(), 1);
	assert_eq!(results[0].note.note_id, kept.note_id);
}

#[tokio::test]
async fn empty_candidate_set_skips_document_store() {
	let harness = Harness::new();
	let results =
		harness.service.retrieve("u1", "When is my flight?", None).await.expect("Retrieve failed.");

	assert!(results.is_empty());
	assert_eq!(harness.documents.count(), 0);
}

#[tokio::test]
async fn embedding_failure_stops_before_index_and_store() {
	let harness = Harness::new();

	harness.write_note("u1", "Trip", "Flight to Paris on June 3").await;
	harness.embedding.set_mode(Mode::Failing);

	let err = harness
		.service
		.answer("u1", "When is my flight?")
		.await
		.expect_err("Expected embedding failure.");

	assert!(matches!(err, Error::EmbeddingUnavailable { .. }), "Unexpected error: {err}");
	assert_eq!(harness.index.queries.load(Ordering::SeqCst), 0);
	assert_eq!(harness.documents.count(), 0);
	assert_eq!(harness.completion.count(), 0);
}

#[tokio::test]
async fn wrong_embedding_dimension_is_rejected() {
	let harness = Harness::new();

	harness.embedding.set_mode(Mode::WrongDimension);

	let err = harness
		.service
		.retrieve("u1", "When is my flight?", None)
		.await
		.expect_err("Expected dimension error.");

	assert!(matches!(err, Error::EmbeddingUnavailable { .. }), "Unexpected error: {err}");
	assert_eq!(harness.index.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn index_and_store_failures_propagate() {
	let harness = Harness::new();

	harness.write_note("u1", "Trip", "Flight to Paris on June 3").await;
	harness.documents.set_mode(Mode::Failing);

	let err = harness
		.service
		.retrieve("u1", "When is my flight?", None)
		.await
		.expect_err("Expected document store failure.");

	assert!(matches!(err, Error::DocumentStoreUnavailable { .. }), "Unexpected error: {err}");

	harness.index.set_mode(Mode::Failing);

	let err = harness
		.service
		.answer("u1", "When is my flight?")
		.await
		.expect_err("Expected index failure.");

	assert!(matches!(err, Error::IndexUnavailable { .. }), "Unexpected error: {err}");
	assert_eq!(harness.completion.count(), 0);
}

#[tokio::test]
async fn top_k_is_clamped_to_configured_bounds() {
	let harness = Harness::new();

	harness.service.retrieve("u1", "flight", Some(1_000)).await.expect("Retrieve failed.");

	assert_eq!(harness.index.last_top_k.load(Ordering::SeqCst), 20);

	harness.service.retrieve("u1", "flight", Some(0)).await.expect("Retrieve failed.");

	assert_eq!(harness.index.last_top_k.load(Ordering::SeqCst), 1);

	harness.service.retrieve("u1", "flight", None).await.expect("Retrieve failed.");

	assert_eq!(harness.index.last_top_k.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn blank_owner_or_question_is_rejected_without_backend_calls() {
	let harness = Harness::new();

	for (owner, question) in [("", "When is my flight?"), ("u1", "   ")] {
		let err = harness
			.service
			.retrieve(owner, question, None)
			.await
			.expect_err("Expected invalid request.");

		assert!(matches!(err, Error::InvalidRequest { .. }), "Unexpected error: {err}");
	}

	assert_eq!(harness.embedding.count(), 0);
}
