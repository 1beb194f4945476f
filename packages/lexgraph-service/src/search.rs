use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
	CandidateRecord, CollectionRef, Error, ExpandedResultRecord, LexService, LineageSkip, Result,
	lineage,
};

#[derive(Debug, Clone, Deserialize)]
pub struct LegalSearchRequest {
	pub query: String,
	/// Overrides `retrieval.legal_top_k`.
	#[serde(default)]
	pub top_k: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegalSearchResponse {
	pub items: Vec<CandidateRecord>,
	pub skipped_collections: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InternalSearchRequest {
	pub query: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InternalSearchResponse {
	pub roots: Vec<String>,
	pub items: Vec<ExpandedResultRecord>,
	pub selected_uids: Vec<String>,
	pub skipped_collections: Vec<String>,
	pub skipped_uids: Vec<LineageSkip>,
}

impl LexService {
	/// Ranked passages from the legal corpus.
	pub async fn search_legal(&self, req: LegalSearchRequest) -> Result<LegalSearchResponse> {
		let query = require_text(&req.query, "query")?;
		let top_k = req.top_k.unwrap_or(self.cfg.retrieval.legal_top_k);

		if top_k == 0 {
			return Err(Error::InvalidRequest { message: "top_k must be greater than zero.".to_string() });
		}

		self.with_deadline(self.legal_candidates(query, top_k)).await
	}

	/// Internal clauses matching the query, grown to their full influence lineage.
	pub async fn search_internal(
		&self,
		req: InternalSearchRequest,
	) -> Result<InternalSearchResponse> {
		let query = require_text(&req.query, "query")?;

		self.with_deadline(self.internal_pipeline(query)).await
	}

	pub(crate) async fn legal_candidates(
		&self,
		query: &str,
		top_k: u32,
	) -> Result<LegalSearchResponse> {
		let collections = CollectionRef::from_configs(&self.cfg.corpora.legal);
		let report = self.retriever().retrieve_report(query, &collections, top_k).await?;
		let skipped_collections = report.skipped().map(str::to_string).collect();

		debug!(records = report.records.len(), "Legal retrieval finished.");

		Ok(LegalSearchResponse { items: report.records, skipped_collections })
	}

	/// Retrieve, filter, expand, then announce the roots.
	pub(crate) async fn internal_pipeline(&self, query: &str) -> Result<InternalSearchResponse> {
		let collections = CollectionRef::from_configs(&self.cfg.corpora.internal);
		let report = self
			.retriever()
			.retrieve_report(query, &collections, self.cfg.retrieval.internal_top_k)
			.await?;
		let skipped_collections: Vec<String> = report.skipped().map(str::to_string).collect();
		let candidates: Vec<CandidateRecord> =
			report.records.into_iter().filter(|record| record.uid.is_some()).collect();

		if candidates.is_empty() {
			info!("No internal candidates matched the query.");

			return Ok(InternalSearchResponse { skipped_collections, ..Default::default() });
		}

		let selected_uids = self.filter.select_relevant(query, &candidates).await?;

		debug!(
			candidates = candidates.len(),
			selected = selected_uids.len(),
			"Relevance filter finished."
		);

		let expansion =
			lineage::expand(self.graph.as_ref(), &selected_uids, &candidates, &self.expand_options())
				.await?;

		info!(
			roots = expansion.roots.len(),
			records = expansion.records.len(),
			skipped = expansion.skipped.len(),
			"Lineage expansion finished."
		);

		self.notifier.notify(expansion.roots.clone());

		Ok(InternalSearchResponse {
			roots: expansion.roots,
			items: expansion.records,
			selected_uids,
			skipped_collections,
			skipped_uids: expansion.skipped,
		})
	}
}

pub(crate) fn require_text<'a>(text: &'a str, field: &str) -> Result<&'a str> {
	let trimmed = text.trim();

	if trimmed.is_empty() {
		return Err(Error::InvalidRequest { message: format!("{field} must not be empty.") });
	}

	Ok(trimmed)
}
