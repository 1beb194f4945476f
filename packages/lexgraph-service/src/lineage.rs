use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{BoxFuture, CandidateRecord, Error, Result};
use lexgraph_storage::{db::Db, lineage as graph_store, models::ClauseNode};

/// Score given to expanded nodes that were not themselves retrieved.
pub const FALLBACK_SCORE: f32 = 0.74;
pub const INTERNAL_DOCUMENT_TYPE: &str = "Internal Agreement";

/// Read access to the clause influence graph.
pub trait InfluenceGraph
where
	Self: Send + Sync,
{
	/// Terminal ancestors of `uid`, or `None` when the graph has no such node.
	fn resolve_roots<'a>(&'a self, uid: &'a str) -> BoxFuture<'a, Result<Option<Vec<String>>>>;

	/// `root` plus every node reachable from it.
	fn subtree<'a>(&'a self, root: &'a str) -> BoxFuture<'a, Result<Vec<ClauseNode>>>;
}

impl InfluenceGraph for Db {
	fn resolve_roots<'a>(&'a self, uid: &'a str) -> BoxFuture<'a, Result<Option<Vec<String>>>> {
		Box::pin(async move {
			let mut conn = self.pool.acquire().await?;

			Ok(graph_store::resolve_roots(&mut conn, uid).await?)
		})
	}

	fn subtree<'a>(&'a self, root: &'a str) -> BoxFuture<'a, Result<Vec<ClauseNode>>> {
		Box::pin(async move {
			let mut conn = self.pool.acquire().await?;

			Ok(graph_store::fetch_subtree(&mut conn, root).await?)
		})
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedResultRecord {
	pub uid: String,
	pub id: String,
	pub title: String,
	pub content_preview: Option<String>,
	pub content: Option<String>,
	pub document_type: String,
	pub source: String,
	pub score: f32,
	pub chunk: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExpandOptions {
	pub fallback_score: f32,
	/// Abort on the first failed lookup instead of skipping that candidate.
	pub strict: bool,
	pub preview_chars: usize,
}
impl ExpandOptions {
	pub fn from_config(cfg: &lexgraph_config::Graph) -> Self {
		Self {
			fallback_score: cfg.fallback_score,
			strict: cfg.strict_lookup,
			preview_chars: cfg.preview_chars,
		}
	}
}

impl Default for ExpandOptions {
	fn default() -> Self {
		Self { fallback_score: FALLBACK_SCORE, strict: true, preview_chars: 100 }
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageSkip {
	pub uid: String,
	pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Expansion {
	/// Distinct roots in discovery order.
	pub roots: Vec<String>,
	/// Distinct nodes of every expanded subtree.
	pub records: Vec<ExpandedResultRecord>,
	/// Candidates unknown to the graph.
	pub missing: Vec<String>,
	/// Candidates whose lookup failed in non-strict mode.
	pub skipped: Vec<LineageSkip>,
}

enum LineageOutcome {
	Missing,
	Found { roots: Vec<String>, nodes: Vec<ClauseNode> },
}

/// Replaces each candidate uid with the full subtrees of its terminal ancestors.
///
/// Each root is expanded once and each node appears once. A node keeps the smallest distance it
/// was retrieved with; nodes reached only through the graph get `opts.fallback_score`.
pub async fn expand(
	graph: &dyn InfluenceGraph,
	candidate_uids: &[String],
	scored: &[CandidateRecord],
	opts: &ExpandOptions,
) -> Result<Expansion> {
	let distances = distance_index(scored);
	let mut expansion = Expansion::default();
	let mut seen_roots = HashSet::new();
	let mut seen_nodes = HashSet::new();

	for uid in candidate_uids {
		match lookup_lineage(graph, uid, &seen_roots).await {
			Ok(LineageOutcome::Missing) => {
				debug!(uid = %uid, "Candidate is not in the influence graph.");

				expansion.missing.push(uid.clone());
			},
			Ok(LineageOutcome::Found { roots, nodes }) => {
				for root in roots {
					if seen_roots.insert(root.clone()) {
						expansion.roots.push(root);
					}
				}
				for node in nodes {
					if seen_nodes.insert(node.uid.clone()) {
						expansion.records.push(expanded_record(node, &distances, opts));
					}
				}
			},
			Err(err) if opts.strict => return Err(err),
			Err(err) => {
				warn!(uid = %uid, error = %err, "Skipping candidate after graph lookup failure.");

				expansion.skipped.push(LineageSkip { uid: uid.clone(), reason: err.to_string() });
			},
		}
	}

	Ok(expansion)
}

async fn lookup_lineage(
	graph: &dyn InfluenceGraph,
	uid: &str,
	expanded_roots: &HashSet<String>,
) -> Result<LineageOutcome> {
	let lookup_failed =
		|err: Error| Error::GraphLookup { uid: uid.to_string(), message: err.to_string() };
	let Some(roots) = graph.resolve_roots(uid).await.map_err(lookup_failed)? else {
		return Ok(LineageOutcome::Missing);
	};
	let mut nodes = Vec::new();

	for root in &roots {
		if expanded_roots.contains(root) {
			continue;
		}

		nodes.extend(graph.subtree(root).await.map_err(lookup_failed)?);
	}

	Ok(LineageOutcome::Found { roots, nodes })
}

fn distance_index(scored: &[CandidateRecord]) -> HashMap<&str, f32> {
	let mut distances: HashMap<&str, f32> = HashMap::new();

	for record in scored {
		let (Some(uid), Some(distance)) = (record.uid.as_deref(), record.distance) else {
			continue;
		};

		if distance.is_nan() {
			continue;
		}

		distances
			.entry(uid)
			.and_modify(|current| *current = current.min(distance))
			.or_insert(distance);
	}

	distances
}

fn expanded_record(
	node: ClauseNode,
	distances: &HashMap<&str, f32>,
	opts: &ExpandOptions,
) -> ExpandedResultRecord {
	let score = distances.get(node.uid.as_str()).copied().unwrap_or(opts.fallback_score);
	let title = display_title(&node);
	let content_preview =
		node.chunk.as_deref().map(|chunk| crate::truncate_chars(chunk, opts.preview_chars));

	ExpandedResultRecord {
		id: node.uid.clone(),
		uid: node.uid,
		title,
		content_preview,
		content: node.chunk.clone(),
		document_type: INTERNAL_DOCUMENT_TYPE.to_string(),
		source: node.title.unwrap_or_default(),
		score,
		chunk: node.chunk,
	}
}

fn display_title(node: &ClauseNode) -> String {
	let mut title = node.title.clone().unwrap_or_default();

	if let Some(section) = node.section_number.as_deref() {
		title.push_str(" Section ");
		title.push_str(section);
	}
	if let Some(clause) = node.clause_number.as_deref() {
		title.push_str(" clause ");
		title.push_str(clause);
	}

	title.trim().to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn node(uid: &str) -> ClauseNode {
		ClauseNode {
			uid: uid.to_string(),
			title: Some("Master Services Agreement".to_string()),
			section_number: Some("4".to_string()),
			clause_number: Some("2".to_string()),
			chunk: Some("The supplier shall deliver the services described in Schedule A.".to_string()),
		}
	}

	#[test]
	fn builds_display_title_from_numbers() {
		assert_eq!(display_title(&node("c-1")), "Master Services Agreement Section 4 clause 2");

		let bare = ClauseNode { section_number: None, clause_number: None, ..node("c-2") };

		assert_eq!(display_title(&bare), "Master Services Agreement");
	}

	#[test]
	fn retrieved_node_keeps_smallest_distance() {
		let scored = vec![
			CandidateRecord { uid: Some("c-1".to_string()), distance: Some(0.4), ..Default::default() },
			CandidateRecord { uid: Some("c-1".to_string()), distance: Some(0.2), ..Default::default() },
		];
		let distances = distance_index(&scored);
		let record = expanded_record(node("c-1"), &distances, &ExpandOptions::default());

		assert_eq!(record.score, 0.2);
		assert_eq!(record.document_type, INTERNAL_DOCUMENT_TYPE);
		assert_eq!(record.source, "Master Services Agreement");
		assert_eq!(record.id, record.uid);
	}

	#[test]
	fn unretrieved_node_gets_fallback_score_and_short_preview() {
		let opts = ExpandOptions { preview_chars: 10, ..Default::default() };
		let record = expanded_record(node("c-9"), &HashMap::new(), &opts);

		assert_eq!(record.score, FALLBACK_SCORE);
		assert_eq!(record.content_preview.as_deref(), Some("The suppli"));
		assert_eq!(record.content, record.chunk);
	}
}
