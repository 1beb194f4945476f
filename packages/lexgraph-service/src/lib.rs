pub mod answer;
pub mod ask;
pub mod filter;
pub mod lineage;
pub mod notifier;
pub mod qdrant;
pub mod registry;
pub mod retrieval;
pub mod search;

mod error;

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use serde_json::Value;

pub use answer::{AnswerPayload, AnswerReference, parse_answer};
pub use ask::{AskRequest, AskResponse, AskRoute, LegalReference, route_for};
pub use error::{Error, Result};
pub use filter::{LlmRelevanceFilter, RelevanceFilter, closest_uids, parse_uid_list};
pub use lineage::{
	ExpandOptions, ExpandedResultRecord, Expansion, FALLBACK_SCORE, INTERNAL_DOCUMENT_TYPE,
	InfluenceGraph, LineageSkip, expand,
};
pub use notifier::{Launcher, Notifier, ProcessLauncher};
pub use qdrant::QdrantConnector;
pub use registry::{CollectionConnector, CollectionKey, CollectionRegistry, VectorCollection};
pub use retrieval::{
	CandidateRecord, CollectionOutcome, CollectionRef, RetrievalReport, Retriever, merge_ranked,
};
pub use search::{
	InternalSearchRequest, InternalSearchResponse, LegalSearchRequest, LegalSearchResponse,
};

use lexgraph_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use lexgraph_providers::{embedding, llm};
use lexgraph_storage::db::Db;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait LlmProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<String>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub llm: Arc<dyn LlmProvider>,
}

/// Backends a [`LexService`] is assembled from.
pub struct Components {
	pub connector: Arc<dyn CollectionConnector>,
	pub graph: Arc<dyn InfluenceGraph>,
	pub providers: Providers,
	/// `None` selects the LLM-backed filter built from `providers.llm`.
	pub filter: Option<Arc<dyn RelevanceFilter>>,
	pub notifier: Notifier,
}

pub struct LexService {
	pub cfg: Config,
	pub registry: Arc<CollectionRegistry>,
	pub graph: Arc<dyn InfluenceGraph>,
	pub providers: Providers,
	pub filter: Arc<dyn RelevanceFilter>,
	pub notifier: Notifier,
}

struct DefaultProviders;

impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}

impl LlmProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move { Ok(llm::complete(cfg, messages).await?) })
	}
}

impl Providers {
	pub fn new(embedding: Arc<dyn EmbeddingProvider>, llm: Arc<dyn LlmProvider>) -> Self {
		Self { embedding, llm }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), llm: provider }
	}
}

impl LexService {
	pub fn new(cfg: Config, db: Db, notifier: Notifier) -> Self {
		let components = Components {
			connector: Arc::new(QdrantConnector::default()),
			graph: Arc::new(db),
			providers: Providers::default(),
			filter: None,
			notifier,
		};

		Self::with_components(cfg, components)
	}

	pub fn with_components(cfg: Config, components: Components) -> Self {
		let Components { connector, graph, providers, filter, notifier } = components;
		let filter = filter.unwrap_or_else(|| {
			Arc::new(LlmRelevanceFilter::new(providers.llm.clone(), cfg.providers.llm.clone()))
		});

		Self {
			cfg,
			registry: Arc::new(CollectionRegistry::new(connector)),
			graph,
			providers,
			filter,
			notifier,
		}
	}

	pub fn retriever(&self) -> Retriever<'_> {
		Retriever {
			registry: &self.registry,
			embedding: self.providers.embedding.as_ref(),
			embedding_cfg: &self.cfg.providers.embedding,
		}
	}

	pub fn expand_options(&self) -> ExpandOptions {
		ExpandOptions::from_config(&self.cfg.graph)
	}

	/// Runs `fut` under the configured request deadline.
	pub(crate) async fn with_deadline<F, T>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		let timeout_ms = self.cfg.pipeline.request_timeout_ms;

		tokio::time::timeout(Duration::from_millis(timeout_ms), fut)
			.await
			.map_err(|_| Error::Timeout { timeout_ms })?
	}
}

pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
	match text.char_indices().nth(max_chars) {
		Some((end, _)) => text[..end].to_string(),
		None => text.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn truncate_chars_respects_char_boundaries() {
		assert_eq!(truncate_chars("abcdef", 3), "abc");
		assert_eq!(truncate_chars("abc", 3), "abc");
		assert_eq!(truncate_chars("§§§§", 2), "§§");
		assert_eq!(truncate_chars("", 5), "");
	}
}
