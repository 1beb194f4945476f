use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
	CandidateRecord, ExpandedResultRecord, LexService, Result, answer, search::require_text,
};

const LEGAL_PREVIEW_CHARS: usize = 300;
const LEGAL_DOCUMENT_TYPE: &str = "Law";

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
	pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AskRoute {
	Legal,
	Internal,
}

/// A retrieved legal passage cited by an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegalReference {
	pub id: String,
	pub title: String,
	pub content_preview: Option<String>,
	pub content: Option<String>,
	pub document_type: String,
	pub source: Option<String>,
	pub score: Option<f32>,
	pub page: Option<i64>,
	pub relevance: f32,
	pub excerpt: Option<String>,
}
impl LegalReference {
	pub fn from_record(record: &CandidateRecord, cited: &answer::AnswerReference) -> Self {
		let title = [&record.part_title, &record.chapter_title, &record.section_title]
			.into_iter()
			.filter_map(|part| part.as_deref().map(str::trim))
			.filter(|part| !part.is_empty() && !part.eq_ignore_ascii_case("nan"))
			.collect::<Vec<_>>()
			.join(" ");

		Self {
			id: cited.id.clone(),
			title,
			content_preview: record
				.chunk
				.as_deref()
				.map(|chunk| crate::truncate_chars(chunk, LEGAL_PREVIEW_CHARS)),
			content: record.chunk.clone(),
			document_type: LEGAL_DOCUMENT_TYPE.to_string(),
			source: record.source.clone(),
			score: record.distance,
			page: record.page,
			relevance: cited.relevance,
			excerpt: cited.excerpt.clone(),
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
	pub route: AskRoute,
	pub answer: String,
	/// Set on the legal route.
	pub legal_references: Vec<LegalReference>,
	/// Set on the internal route.
	pub internal_references: Vec<ExpandedResultRecord>,
}

impl LexService {
	/// Answers a question from the legal corpus, or from internal clauses when it mentions one of
	/// the configured internal keywords.
	pub async fn ask(&self, req: AskRequest) -> Result<AskResponse> {
		let message = require_text(&req.message, "message")?;
		let route = route_for(message, &self.cfg.pipeline.internal_keywords);

		info!(route = ?route, "Answering question.");

		match route {
			AskRoute::Legal => self.with_deadline(self.ask_legal(message)).await,
			AskRoute::Internal => self.with_deadline(self.ask_internal(message)).await,
		}
	}

	async fn ask_legal(&self, message: &str) -> Result<AskResponse> {
		let retrieved = self.legal_candidates(message, self.cfg.retrieval.legal_top_k).await?.items;
		let messages = legal_prompt(message, &retrieved);
		let reply = self.providers.llm.complete(&self.cfg.providers.llm, &messages).await?;
		let parsed = answer::parse_answer(&reply);
		let cited = parsed.references.len();
		let legal_references: Vec<LegalReference> = parsed
			.references
			.iter()
			.filter_map(|reference| {
				retrieved
					.iter()
					.find(|record| record.id.as_deref() == Some(reference.id.as_str()))
					.map(|record| LegalReference::from_record(record, reference))
			})
			.collect();

		if legal_references.len() < cited {
			debug!(
				cited,
				resolved = legal_references.len(),
				"Dropped references to passages that were not retrieved."
			);
		}

		Ok(AskResponse {
			route: AskRoute::Legal,
			answer: parsed.answer,
			legal_references,
			internal_references: Vec::new(),
		})
	}

	async fn ask_internal(&self, message: &str) -> Result<AskResponse> {
		let expanded = self.internal_pipeline(message).await?;
		let messages = internal_prompt(message, &expanded.items);
		let answer = self.providers.llm.complete(&self.cfg.providers.llm, &messages).await?;

		Ok(AskResponse {
			route: AskRoute::Internal,
			answer,
			legal_references: Vec::new(),
			internal_references: expanded.items,
		})
	}
}

/// Internal when any whole word of `message`, lowercased, is one of `keywords`.
pub fn route_for(message: &str, keywords: &[String]) -> AskRoute {
	let lowered = message.to_lowercase();
	let internal = lowered
		.split(|c: char| !c.is_alphanumeric())
		.filter(|word| !word.is_empty())
		.any(|word| keywords.iter().any(|keyword| keyword == word));

	if internal { AskRoute::Internal } else { AskRoute::Legal }
}

fn legal_prompt(question: &str, retrieved: &[CandidateRecord]) -> Vec<Value> {
	let context: Vec<Value> = retrieved
		.iter()
		.map(|record| {
			let distance = record.distance.map(|d| d.to_string()).unwrap_or_default();
			let title = [
				distance.as_str(),
				record.chapter_title.as_deref().unwrap_or_default(),
				record.section_title.as_deref().unwrap_or_default(),
			]
			.join(" ");

			serde_json::json!({
				"id": record.id,
				"title": title.trim(),
				"type": record.source,
				"summary": record.chunk,
			})
		})
		.collect();
	let system = "You are a legal assistant for financial regulation and company law. \
Answer from the supplied legal context and cite the passages you rely on. \
Reply with a JSON object with two keys: \"answer\", your response to the question, and \
\"references\", a list of objects with \"id\" (a passage id from the context), \"relevance\" \
(0 to 100) and \"excerpt\" (the supporting text). Sort references by relevance, highest first. \
If nothing is relevant, cite the three closest passages. Be concise and factual.";
	let user = format!("Question: {question}\n\nLegal context:\n{}", Value::Array(context));

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": user }),
	]
}

fn internal_prompt(question: &str, records: &[ExpandedResultRecord]) -> Vec<Value> {
	let context = serde_json::to_value(records).unwrap_or(Value::Array(Vec::new()));
	let system = "You are a legal assistant for financial regulation and company law. \
You are given clauses from the organisation's internal agreements that may relate to the question, \
including clauses derived from or amended by them. For every relevant clause, explain what it \
means for the question and describe any changes the user asks for. Be concise and factual.";
	let user = format!("Question: {question}\n\nInternal clauses:\n{context}");

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": user }),
	]
}
