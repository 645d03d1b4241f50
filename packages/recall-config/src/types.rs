use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub retrieval: Retrieval,
	#[serde(default)]
	pub timeouts: Timeouts,
	#[serde(default)]
	pub indexing: Indexing,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub admin_bind: String,
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	#[serde(default)]
	pub api_key: Option<String>,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub completion: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	/// Number of candidate notes requested from the vector index when a question does not
	/// specify one.
	pub top_k: u32,
	/// Upper bound applied to caller-supplied `top_k` values.
	pub max_top_k: u32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self { top_k: 5, max_top_k: 20 }
	}
}

/// Per-stage bounds for external calls. Completion gets the widest bound because model latency
/// dominates the answer path.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Timeouts {
	pub embedding_ms: u64,
	pub vector_index_ms: u64,
	pub document_store_ms: u64,
	pub completion_ms: u64,
}
impl Timeouts {
	pub fn embedding(&self) -> Duration {
		Duration::from_millis(self.embedding_ms)
	}

	pub fn vector_index(&self) -> Duration {
		Duration::from_millis(self.vector_index_ms)
	}

	pub fn document_store(&self) -> Duration {
		Duration::from_millis(self.document_store_ms)
	}

	pub fn completion(&self) -> Duration {
		Duration::from_millis(self.completion_ms)
	}
}
impl Default for Timeouts {
	fn default() -> Self {
		Self {
			embedding_ms: 5_000,
			vector_index_ms: 5_000,
			document_store_ms: 5_000,
			completion_ms: 30_000,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Indexing {
	/// Index in the request path right after the note commits. The outbox still guarantees a
	/// retry when this attempt fails.
	pub inline: bool,
	pub max_attempts: u32,
	pub base_backoff_ms: u64,
	pub max_backoff_ms: u64,
	pub poll_interval_ms: u64,
	pub claim_lease_seconds: i64,
}
impl Default for Indexing {
	fn default() -> Self {
		Self {
			inline: true,
			max_attempts: 8,
			base_backoff_ms: 500,
			max_backoff_ms: 30_000,
			poll_interval_ms: 500,
			claim_lease_seconds: 30,
		}
	}
}
