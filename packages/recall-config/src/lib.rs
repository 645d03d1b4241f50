mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, Indexing, LlmProviderConfig, Postgres, Providers, Qdrant,
	Retrieval, Service, Storage, Timeouts,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.admin_bind", &cfg.service.admin_bind),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("completion", &cfg.providers.completion.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	let temperature = cfg.providers.completion.temperature;

	if !temperature.is_finite() {
		return Err(Error::Validation {
			message: "providers.completion.temperature must be a finite number.".to_string(),
		});
	}
	if !(0.0..=2.0).contains(&temperature) {
		return Err(Error::Validation {
			message: "providers.completion.temperature must be in the range 0.0-2.0.".to_string(),
		});
	}
	if cfg.retrieval.top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.top_k > cfg.retrieval.max_top_k {
		return Err(Error::Validation {
			message: "retrieval.top_k must be less than or equal to retrieval.max_top_k."
				.to_string(),
		});
	}

	for (label, value) in [
		("timeouts.embedding_ms", cfg.timeouts.embedding_ms),
		("timeouts.vector_index_ms", cfg.timeouts.vector_index_ms),
		("timeouts.document_store_ms", cfg.timeouts.document_store_ms),
		("timeouts.completion_ms", cfg.timeouts.completion_ms),
	] {
		if value == 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if cfg.indexing.max_attempts == 0 {
		return Err(Error::Validation {
			message: "indexing.max_attempts must be greater than zero.".to_string(),
		});
	}
	if cfg.indexing.base_backoff_ms == 0 {
		return Err(Error::Validation {
			message: "indexing.base_backoff_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.indexing.base_backoff_ms > cfg.indexing.max_backoff_ms {
		return Err(Error::Validation {
			message: "indexing.base_backoff_ms must not exceed indexing.max_backoff_ms."
				.to_string(),
		});
	}
	if cfg.indexing.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "indexing.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.indexing.claim_lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "indexing.claim_lease_seconds must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.storage.qdrant.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		cfg.storage.qdrant.api_key = None;
	}
}
