pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Encoding error: {message}")]
	Encoding { message: String },
	#[error("Collection {collection} unavailable: {message}")]
	CollectionUnavailable { collection: String, message: String },
	#[error("Merge error: {message}")]
	Merge { message: String },
	#[error("Relevance filter reply could not be parsed: {message}")]
	FilterParse { message: String },
	#[error("Graph lookup failed for {uid}: {message}")]
	GraphLookup { uid: String, message: String },
	#[error("Notifier error: {message}")]
	Notifier { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
	#[error("Request exceeded its {timeout_ms} ms deadline.")]
	Timeout { timeout_ms: u64 },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<lexgraph_storage::Error> for Error {
	fn from(err: lexgraph_storage::Error) -> Self {
		match err {
			lexgraph_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			lexgraph_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			lexgraph_storage::Error::NotFound(message) => Self::Storage { message },
			lexgraph_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}

impl From<lexgraph_providers::Error> for Error {
	fn from(err: lexgraph_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
