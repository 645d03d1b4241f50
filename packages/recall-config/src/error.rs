use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Cannot read Recall config at {path:?}.")]
	ReadConfig { path: PathBuf, source: std::io::Error },
	#[error("Recall config at {path:?} is not valid TOML: {source}")]
	ParseConfig { path: PathBuf, source: toml::de::Error },
	#[error("Invalid Recall config: {message}")]
	Validation { message: String },
}
