pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures talking to the embedding or completion endpoint.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Provider request failed: {0}")]
	Http(#[from] reqwest::Error),
	#[error("Provider returned malformed JSON: {0}")]
	Decode(#[from] serde_json::Error),
	#[error("Invalid provider header name: {0}")]
	HeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error("Invalid provider header value: {0}")]
	HeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
}
