use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::{CollectionKey, CollectionRegistry, EmbeddingProvider, Error, Result};
use lexgraph_config::{Collection, EmbeddingProviderConfig, ScoreKind};

/// Where a collection lives and how to read its scores.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
	pub location: String,
	pub name: String,
	pub vector_name: Option<String>,
	pub score_kind: ScoreKind,
	pub vector_dim: Option<u32>,
}
impl CollectionRef {
	pub fn new(location: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			location: location.into(),
			name: name.into(),
			vector_name: None,
			score_kind: ScoreKind::default(),
			vector_dim: None,
		}
	}

	pub fn from_configs(collections: &[Collection]) -> Vec<Self> {
		collections.iter().map(Self::from).collect()
	}

	pub fn key(&self) -> CollectionKey {
		CollectionKey { location: self.location.clone(), name: self.name.clone() }
	}

	pub fn label(&self) -> String {
		format!("{}/{}", self.location, self.name)
	}
}

impl From<&Collection> for CollectionRef {
	fn from(collection: &Collection) -> Self {
		Self {
			location: collection.location.clone(),
			name: collection.name.clone(),
			vector_name: collection.vector_name.clone(),
			score_kind: collection.score_kind,
			vector_dim: collection.vector_dim,
		}
	}
}

/// One hit from a corpus collection. Lower `distance` means closer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
	pub id: Option<String>,
	pub uid: Option<String>,
	pub chunk: Option<String>,
	pub part_title: Option<String>,
	pub chapter_title: Option<String>,
	pub section_title: Option<String>,
	pub page: Option<i64>,
	pub source: Option<String>,
	#[serde(rename = "score")]
	pub distance: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollectionOutcome {
	Searched { collection: String, hits: usize },
	Skipped { collection: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalReport {
	pub records: Vec<CandidateRecord>,
	/// One entry per requested collection, in configured order.
	pub outcomes: Vec<CollectionOutcome>,
}
impl RetrievalReport {
	pub fn skipped(&self) -> impl Iterator<Item = &str> {
		self.outcomes.iter().filter_map(|outcome| match outcome {
			CollectionOutcome::Skipped { collection, .. } => Some(collection.as_str()),
			CollectionOutcome::Searched { .. } => None,
		})
	}
}

/// Nearest-neighbour retrieval across a configured set of collections.
pub struct Retriever<'a> {
	pub registry: &'a Arc<CollectionRegistry>,
	pub embedding: &'a dyn EmbeddingProvider,
	pub embedding_cfg: &'a EmbeddingProviderConfig,
}
impl Retriever<'_> {
	pub async fn retrieve(
		&self,
		query: &str,
		collections: &[CollectionRef],
		top_k: u32,
	) -> Result<Vec<CandidateRecord>> {
		Ok(self.retrieve_report(query, collections, top_k).await?.records)
	}

	/// Encodes `query` once, searches every collection concurrently, and merges the hits.
	///
	/// A collection that cannot be opened or searched is logged and skipped. Only an encoding
	/// failure or an unmergeable result set fails the call.
	pub async fn retrieve_report(
		&self,
		query: &str,
		collections: &[CollectionRef],
		top_k: u32,
	) -> Result<RetrievalReport> {
		if collections.is_empty() || top_k == 0 {
			return Ok(RetrievalReport::default());
		}

		let vector: Arc<[f32]> = self.encode(query).await?.into();
		let mut tasks = JoinSet::new();

		for (index, collection) in collections.iter().cloned().enumerate() {
			let registry = Arc::clone(self.registry);
			let vector = Arc::clone(&vector);

			tasks.spawn(async move {
				(index, search_collection(&registry, &collection, &vector, top_k).await)
			});
		}

		let mut slots: Vec<Option<Result<Vec<CandidateRecord>>>> =
			collections.iter().map(|_| None).collect();

		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok((index, result)) => slots[index] = Some(result),
				Err(err) => warn!(error = %err, "Collection search task did not complete."),
			}
		}

		let mut outcomes = Vec::with_capacity(collections.len());
		let mut batches = Vec::with_capacity(collections.len());

		for (collection, slot) in collections.iter().zip(slots) {
			let label = collection.label();

			match slot {
				Some(Ok(records)) => {
					debug!(collection = %label, hits = records.len(), "Collection searched.");

					outcomes.push(CollectionOutcome::Searched { collection: label, hits: records.len() });
					batches.push(records);
				},
				Some(Err(err)) => {
					warn!(collection = %label, error = %err, "Skipping unavailable collection.");

					outcomes.push(CollectionOutcome::Skipped { collection: label, reason: err.to_string() });
				},
				None => {
					outcomes.push(CollectionOutcome::Skipped {
						collection: label,
						reason: "Search task aborted.".to_string(),
					});
				},
			}
		}

		let records = merge_ranked(batches, top_k as usize)?;

		Ok(RetrievalReport { records, outcomes })
	}

	async fn encode(&self, query: &str) -> Result<Vec<f32>> {
		let embeddings = self
			.embedding
			.embed(self.embedding_cfg, std::slice::from_ref(&query.to_string()))
			.await
			.map_err(|err| Error::Encoding { message: err.to_string() })?;
		let vector = embeddings.into_iter().next().ok_or_else(|| Error::Encoding {
			message: "Embedding provider returned no vectors.".to_string(),
		})?;

		if vector.is_empty() {
			return Err(Error::Encoding {
				message: "Embedding provider returned an empty vector.".to_string(),
			});
		}
		if vector.len() != self.embedding_cfg.dimensions as usize {
			return Err(Error::Encoding {
				message: format!(
					"Embedding provider returned {} dimensions; expected {}.",
					vector.len(),
					self.embedding_cfg.dimensions
				),
			});
		}

		Ok(vector)
	}
}

async fn search_collection(
	registry: &CollectionRegistry,
	collection: &CollectionRef,
	vector: &[f32],
	top_k: u32,
) -> Result<Vec<CandidateRecord>> {
	let unavailable = |message: String| Error::CollectionUnavailable {
		collection: collection.label(),
		message,
	};

	if let Some(dim) = collection.vector_dim
		&& dim as usize != vector.len()
	{
		return Err(unavailable(format!(
			"Query vector has {} dimensions; collection expects {dim}.",
			vector.len()
		)));
	}

	let handle = registry.get(collection).await.map_err(|err| unavailable(err.to_string()))?;

	handle
		.search(collection, vector, u64::from(top_k))
		.await
		.map_err(|err| unavailable(err.to_string()))
}

/// Concatenates per-collection batches in order, ranks by ascending distance, and keeps `top_k`.
///
/// Ranking needs a distance on every record. Without one the concatenation order is kept.
/// The sort is stable, so ties keep collection order.
pub fn merge_ranked(batches: Vec<Vec<CandidateRecord>>, top_k: usize) -> Result<Vec<CandidateRecord>> {
	let mut records: Vec<CandidateRecord> = batches.into_iter().flatten().collect();

	if records.is_empty() {
		return Ok(records);
	}

	if records.iter().all(|record| record.distance.is_some()) {
		if records.iter().any(|record| record.distance.is_some_and(f32::is_nan)) {
			return Err(Error::Merge {
				message: "Candidate distance is NaN; results cannot be ranked.".to_string(),
			});
		}

		records.sort_by(|left, right| distance_of(left).total_cmp(&distance_of(right)));
	} else {
		warn!(
			records = records.len(),
			"Candidates are missing distances; keeping collection order."
		);
	}

	records.truncate(top_k);

	Ok(records)
}

fn distance_of(record: &CandidateRecord) -> f32 {
	record.distance.unwrap_or(f32::INFINITY)
}
