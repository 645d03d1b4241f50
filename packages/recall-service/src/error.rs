use std::fmt::{Display, Formatter};

use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The external dependency an operation was waiting on when it failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Embedding,
	VectorIndex,
	DocumentStore,
	Completion,
}
impl Stage {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Embedding => "embedding",
			Self::VectorIndex => "vector_index",
			Self::DocumentStore => "document_store",
			Self::Completion => "completion",
		}
	}
}
impl Display for Stage {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Embedding service unavailable: {message}")]
	EmbeddingUnavailable { message: String },
	#[error("Vector index unavailable: {message}")]
	IndexUnavailable { message: String },
	#[error("Document store unavailable: {message}")]
	DocumentStoreUnavailable { message: String },
	#[error("Completion service unavailable: {message}")]
	CompletionUnavailable { message: String },
	#[error("Stage {stage} timed out after {timeout_ms} ms.")]
	Timeout { stage: Stage, timeout_ms: u64 },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
}
impl Error {
	pub fn unavailable(stage: Stage, message: impl Into<String>) -> Self {
		let message = message.into();

		match stage {
			Stage::Embedding => Self::EmbeddingUnavailable { message },
			Stage::VectorIndex => Self::IndexUnavailable { message },
			Stage::DocumentStore => Self::DocumentStoreUnavailable { message },
			Stage::Completion => Self::CompletionUnavailable { message },
		}
	}

	/// The backend stage behind this error, if any. Request errors have none.
	pub fn stage(&self) -> Option<Stage> {
		match self {
			Self::EmbeddingUnavailable { .. } => Some(Stage::Embedding),
			Self::IndexUnavailable { .. } => Some(Stage::VectorIndex),
			Self::DocumentStoreUnavailable { .. } => Some(Stage::DocumentStore),
			Self::CompletionUnavailable { .. } => Some(Stage::Completion),
			Self::Timeout { stage, .. } => Some(*stage),
			Self::InvalidRequest { .. } | Self::NotFound { .. } => None,
		}
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::DocumentStoreUnavailable { message: err.to_string() }
	}
}
impl From<recall_storage::Error> for Error {
	fn from(err: recall_storage::Error) -> Self {
		match err {
			recall_storage::Error::Sqlx(inner) =>
				Self::DocumentStoreUnavailable { message: inner.to_string() },
			recall_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			recall_storage::Error::NotFound(message) => Self::NotFound { message },
			recall_storage::Error::Qdrant(inner) =>
				Self::IndexUnavailable { message: inner.to_string() },
		}
	}
}
