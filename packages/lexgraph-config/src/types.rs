use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub providers: Providers,
	pub corpora: Corpora,
	#[serde(default)]
	pub retrieval: Retrieval,
	pub graph: Graph,
	#[serde(default)]
	pub notifier: Notifier,
	#[serde(default)]
	pub pipeline: Pipeline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub llm: LlmProviderConfig,
}

/// Wire shape spoken by the embedding endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingKind {
	/// Hosted, OpenAI-compatible `/embeddings` API.
	Openai,
	/// Self-hosted text-embeddings-inference `/embed` endpoint serving a domain encoder.
	Tei,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub kind: EmbeddingKind,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Corpora {
	pub legal: Vec<Collection>,
	pub internal: Vec<Collection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Collection {
	/// Qdrant endpoint URL.
	pub location: String,
	pub name: String,
	/// Optional. Named vector to search when the collection stores several.
	#[serde(default)]
	pub vector_name: Option<String>,
	#[serde(default)]
	pub score_kind: ScoreKind,
	/// Optional. Rejects query vectors of another length before searching.
	#[serde(default)]
	pub vector_dim: Option<u32>,
}

/// How a collection's reported score relates to distance (lower is closer).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
	/// Higher is closer; distance is `1 - score`.
	#[default]
	Similarity,
	/// Already a distance.
	Distance,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Retrieval {
	pub legal_top_k: u32,
	pub internal_top_k: u32,
}
impl Default for Retrieval {
	fn default() -> Self {
		Self { legal_top_k: 5, internal_top_k: 3 }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Graph {
	pub postgres: Postgres,
	#[serde(default = "default_fallback_score")]
	pub fallback_score: f32,
	/// When true, one failed lineage lookup aborts the whole expansion.
	#[serde(default = "default_strict_lookup")]
	pub strict_lookup: bool,
	#[serde(default = "default_preview_chars")]
	pub preview_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Notifier {
	pub enabled: bool,
	pub program: String,
	pub args: Vec<String>,
	pub queue_capacity: usize,
}
impl Default for Notifier {
	fn default() -> Self {
		Self { enabled: false, program: String::new(), args: Vec::new(), queue_capacity: 64 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pipeline {
	pub request_timeout_ms: u64,
	/// Words that route a question to the internal clause pipeline.
	pub internal_keywords: Vec<String>,
}
impl Default for Pipeline {
	fn default() -> Self {
		Self {
			request_timeout_ms: 60_000,
			internal_keywords: ["my", "system", "changes", "change"]
				.into_iter()
				.map(str::to_string)
				.collect(),
		}
	}
}

fn default_fallback_score() -> f32 {
	0.74
}

fn default_strict_lookup() -> bool {
	true
}

fn default_preview_chars() -> usize {
	100
}
