pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	Validation { message: String },
	#[error("Upstream {operation} unavailable: {message}")]
	UpstreamUnavailable { operation: String, message: String },
	#[error("Malformed payload: {message}")]
	Parse { message: String },
	#[error("Configuration error: {message}")]
	Configuration { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Turn timed out after {timeout_ms} ms.")]
	Timeout { timeout_ms: u64 },
}
impl Error {
	pub(crate) fn upstream(operation: &str, err: impl std::fmt::Display) -> Self {
		Self::UpstreamUnavailable { operation: operation.to_string(), message: err.to_string() }
	}

	pub(crate) fn from_provider(operation: &str, err: shopassist_providers::Error) -> Self {
		match err {
			shopassist_providers::Error::MalformedOutput { message } => Self::Parse { message },
			shopassist_providers::Error::InvalidConfig { message } => Self::Configuration { message },
			other => Self::upstream(operation, other),
		}
	}
}

impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::upstream("repository", err)
	}
}

impl From<shopassist_storage::Error> for Error {
	fn from(err: shopassist_storage::Error) -> Self {
		match err {
			shopassist_storage::Error::Sqlx(inner) => Self::upstream("repository", inner),
			shopassist_storage::Error::SerdeJson(inner) => Self::Parse { message: inner.to_string() },
			shopassist_storage::Error::InvalidArgument(message) => Self::Validation { message },
			shopassist_storage::Error::NotFound(message) => Self::NotFound { message },
			shopassist_storage::Error::Qdrant(inner) => Self::upstream("vector_search", inner),
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Parse { message: err.to_string() }
	}
}
