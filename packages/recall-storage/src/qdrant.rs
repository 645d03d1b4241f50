use std::collections::HashMap;

use qdrant_client::{
	client::Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
		DeletePointsBuilder, Distance, FieldType, Filter, PointId, PointStruct, Query,
		QueryPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
		point_id::PointIdOptions,
	},
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::{Error, Result};

pub const NOTE_ID_FIELD: &str = "note_id";
pub const OWNER_ID_FIELD: &str = "owner_id";
pub const CREATED_AT_FIELD: &str = "created_at";

/// A nearest-neighbour hit. `score` is cosine similarity, higher is closer.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredNote {
	pub note_id: Uuid,
	pub score: f32,
}

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &recall_config::Qdrant) -> Result<Self> {
		let mut builder = qdrant_client::Qdrant::from_url(&cfg.url);

		if let Some(api_key) = cfg.api_key.as_deref() {
			builder = builder.api_key(api_key.to_string());
		}

		let client = builder.build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the collection and its owner index when missing. Safe to call from several
	/// processes at once.
	pub async fn ensure_collection(&self) -> Result<()> {
		if !self.client.collection_exists(self.collection.clone()).await? {
			let builder = CreateCollectionBuilder::new(self.collection.clone())
				.vectors_config(VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine));

			if let Err(err) = self.client.create_collection(builder).await {
				if !is_already_exists_error(&err) {
					return Err(err.into());
				}

				tracing::info!(
					collection = %self.collection,
					"Qdrant collection created concurrently."
				);
			} else {
				tracing::info!(collection = %self.collection, "Created Qdrant collection.");
			}
		}

		let index = CreateFieldIndexCollectionBuilder::new(
			self.collection.clone(),
			OWNER_ID_FIELD,
			FieldType::Keyword,
		)
		.wait(true);

		if let Err(err) = self.client.create_field_index(index).await
			&& !is_already_exists_error(&err)
		{
			return Err(err.into());
		}

		Ok(())
	}

	/// Writes one point keyed by the note id. Re-upserting the same note replaces the point.
	pub async fn upsert_point(
		&self,
		note_id: Uuid,
		owner_id: &str,
		vector: &[f32],
		created_at: OffsetDateTime,
	) -> Result<()> {
		self.validate_vector_dim(vector)?;

		let mut payload_map = HashMap::new();

		payload_map.insert(NOTE_ID_FIELD.to_string(), Value::from(note_id.to_string()));
		payload_map.insert(OWNER_ID_FIELD.to_string(), Value::from(owner_id.to_string()));
		payload_map
			.insert(CREATED_AT_FIELD.to_string(), Value::from(format_timestamp(created_at)?));

		let point =
			PointStruct::new(note_id.to_string(), vector.to_vec(), Payload::from(payload_map));
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	/// Returns at most `limit` hits owned by `owner_id`, best first.
	pub async fn query_owner(
		&self,
		vector: &[f32],
		owner_id: &str,
		limit: u32,
	) -> Result<Vec<ScoredNote>> {
		self.validate_vector_dim(vector)?;

		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector.to_vec()))
			.filter(owner_filter(owner_id))
			.with_payload(false)
			.limit(limit as u64);
		let response = self.client.query(search).await?;
		let mut hits = Vec::with_capacity(response.result.len());

		for point in response.result {
			let Some(note_id) = point.id.as_ref().and_then(point_id_to_uuid) else {
				tracing::warn!(
					collection = %self.collection,
					"Skipping Qdrant point without a UUID id."
				);

				continue;
			};

			hits.push(ScoredNote { note_id, score: point.score });
		}

		hits.sort_by(|a, b| b.score.total_cmp(&a.score));

		Ok(hits)
	}

	/// Removes the point for `note_id` when it belongs to `owner_id`. A missing point is not an
	/// error.
	pub async fn delete_point(&self, note_id: Uuid, owner_id: &str) -> Result<()> {
		let filter = Filter::must([
			Condition::matches(NOTE_ID_FIELD, note_id.to_string()),
			Condition::matches(OWNER_ID_FIELD, owner_id.to_string()),
		]);
		let delete = DeletePointsBuilder::new(self.collection.clone()).points(filter).wait(true);

		match self.client.delete_points(delete).await {
			Ok(_) => {},
			Err(err) =>
				if is_not_found_error(&err) {
					tracing::info!(note_id = %note_id, "Qdrant point missing during delete.");
				} else {
					return Err(err.into());
				},
		}

		Ok(())
	}

	fn validate_vector_dim(&self, vector: &[f32]) -> Result<()> {
		if vector.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Vector dimension {} does not match configured vector_dim {}.",
				vector.len(),
				self.vector_dim
			)));
		}

		Ok(())
	}
}

pub fn owner_filter(owner_id: &str) -> Filter {
	Filter::must([Condition::matches(OWNER_ID_FIELD, owner_id.to_string())])
}

pub fn point_id_to_uuid(point_id: &PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}

fn format_timestamp(ts: OffsetDateTime) -> Result<String> {
	ts.format(&Rfc3339)
		.map_err(|_| Error::InvalidArgument("Failed to format timestamp.".to_string()))
}

fn is_not_found_error(err: &qdrant_client::QdrantError) -> bool {
	let message = err.to_string().to_lowercase();
	let point_not_found =
		(message.contains("not found") || message.contains("404")) && message.contains("point");
	let no_point_found = message.contains("no point") && message.contains("found");

	point_not_found || no_point_found
}

fn is_already_exists_error(err: &qdrant_client::QdrantError) -> bool {
	let message = err.to_string().to_lowercase();

	message.contains("already exists")
}
