use std::{collections::HashSet, sync::Arc};

use serde_json::Value;
use tracing::warn;

use crate::{BoxFuture, CandidateRecord, Error, LlmProvider, Result};
use lexgraph_config::LlmProviderConfig;

/// Number of closest candidates kept when the model selects nothing.
const FALLBACK_SELECTION: usize = 3;
const REPLY_EXCERPT_CHARS: usize = 120;

/// Narrows retrieved candidates to the uids relevant to a query.
pub trait RelevanceFilter
where
	Self: Send + Sync,
{
	fn select_relevant<'a>(
		&'a self,
		query: &'a str,
		candidates: &'a [CandidateRecord],
	) -> BoxFuture<'a, Result<Vec<String>>>;
}

pub struct LlmRelevanceFilter {
	llm: Arc<dyn LlmProvider>,
	cfg: LlmProviderConfig,
}
impl LlmRelevanceFilter {
	pub fn new(llm: Arc<dyn LlmProvider>, cfg: LlmProviderConfig) -> Self {
		Self { llm, cfg }
	}
}

impl RelevanceFilter for LlmRelevanceFilter {
	fn select_relevant<'a>(
		&'a self,
		query: &'a str,
		candidates: &'a [CandidateRecord],
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			if candidates.is_empty() {
				return Ok(Vec::new());
			}

			let messages = build_filter_messages(query, candidates);
			let reply = self.llm.complete(&self.cfg, &messages).await?;
			let uids = dedup_in_order(parse_uid_list(&reply)?);

			if uids.is_empty() {
				let fallback = closest_uids(candidates, FALLBACK_SELECTION);

				warn!(
					candidates = candidates.len(),
					selected = fallback.len(),
					"Relevance filter selected nothing; using closest candidates."
				);

				return Ok(fallback);
			}

			Ok(uids)
		})
	}
}

fn build_filter_messages(query: &str, candidates: &[CandidateRecord]) -> Vec<Value> {
	let documents: Vec<Value> = candidates
		.iter()
		.map(|candidate| {
			serde_json::json!({
				"uid": candidate.uid,
				"title": candidate.source,
				"chunk": candidate.chunk,
				"distance": candidate.distance,
			})
		})
		.collect();
	let system = "You are a legal assistant reviewing internal agreement clauses. \
Given a question and candidate clauses, return the uids of the clauses that answer the question \
or may affect, or be affected by, what it asks about. If no clause matches exactly, return the \
three closest. Reply with a list of uid strings only, for example [\"uid-1\", \"uid-2\"].";
	let user = format!("Question: {query}\n\nCandidate clauses:\n{}", Value::Array(documents));

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": user }),
	]
}

/// Parses a model reply holding a list of uid strings.
///
/// Accepts a JSON array or a list literal with single or double quotes, optionally wrapped in a
/// code fence. Anything else is a [`Error::FilterParse`].
pub fn parse_uid_list(reply: &str) -> Result<Vec<String>> {
	let body = strip_code_fence(reply.trim());

	if let Ok(uids) = serde_json::from_str::<Vec<String>>(body) {
		return Ok(uids);
	}

	parse_list_literal(body).ok_or_else(|| Error::FilterParse {
		message: format!(
			"Expected a list of uid strings, got {:?}.",
			crate::truncate_chars(reply, REPLY_EXCERPT_CHARS)
		),
	})
}

/// Uids of the `limit` lowest-distance candidates. Candidates without a distance rank last.
pub fn closest_uids(candidates: &[CandidateRecord], limit: usize) -> Vec<String> {
	let mut ranked: Vec<&CandidateRecord> =
		candidates.iter().filter(|candidate| candidate.uid.is_some()).collect();

	ranked.sort_by(|left, right| {
		let left = left.distance.unwrap_or(f32::INFINITY);
		let right = right.distance.unwrap_or(f32::INFINITY);

		left.total_cmp(&right)
	});

	dedup_in_order(ranked.into_iter().filter_map(|candidate| candidate.uid.clone()).collect())
		.into_iter()
		.take(limit)
		.collect()
}

fn dedup_in_order(uids: Vec<String>) -> Vec<String> {
	let mut seen = HashSet::new();

	uids.into_iter().filter(|uid| seen.insert(uid.clone())).collect()
}

fn strip_code_fence(text: &str) -> &str {
	let Some(rest) = text.strip_prefix("```") else {
		return text;
	};
	let rest = rest.strip_suffix("```").unwrap_or(rest);

	match rest.find('\n') {
		Some(pos) if rest[..pos].trim().chars().all(|c| c.is_ascii_alphanumeric()) =>
			rest[pos + 1..].trim(),
		_ => rest.trim(),
	}
}

fn parse_list_literal(text: &str) -> Option<Vec<String>> {
	let inner = text.strip_prefix('[')?.strip_suffix(']')?;
	let mut chars = inner.chars().peekable();
	let mut uids = Vec::new();

	loop {
		while chars.next_if(|c| c.is_whitespace()).is_some() {}

		let Some(quote) = chars.next() else {
			return Some(uids);
		};

		if quote != '\'' && quote != '"' {
			return None;
		}

		let mut uid = String::new();

		loop {
			match chars.next()? {
				'\\' => uid.push(chars.next()?),
				c if c == quote => break,
				c => uid.push(c),
			}
		}

		uids.push(uid);

		while chars.next_if(|c| c.is_whitespace()).is_some() {}

		match chars.next() {
			None => return Some(uids),
			Some(',') => continue,
			Some(_) => return None,
		}
	}
}
