use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const NO_ANSWER: &str = "I couldn't find specific information about that topic.";
const DEFAULT_RELEVANCE: f32 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerReference {
	pub id: String,
	/// 0 to 100.
	pub relevance: f32,
	pub excerpt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerPayload {
	pub answer: String,
	pub references: Vec<AnswerReference>,
}

/// Reads a model reply that should hold `{"answer": ..., "references": [...]}`.
///
/// The object may arrive bare or inside a fenced code block. A reply that holds no parsable
/// object becomes the answer text with no references.
pub fn parse_answer(raw: &str) -> AnswerPayload {
	if let Some(payload) = parse_object(raw.trim()) {
		return payload;
	}

	if let Some(block) = fenced_block(raw)
		&& let Some(payload) = parse_object(block)
	{
		debug!("Parsed answer from fenced block.");

		return payload;
	}

	warn!("Answer reply is not structured; returning it verbatim.");

	AnswerPayload { answer: raw.to_string(), references: Vec::new() }
}

fn fenced_block(raw: &str) -> Option<&str> {
	let pattern = Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").ok()?;

	pattern.captures(raw).and_then(|captures| captures.get(1)).map(|block| block.as_str())
}

fn parse_object(text: &str) -> Option<AnswerPayload> {
	let Value::Object(object) = serde_json::from_str::<Value>(text).ok()? else {
		return None;
	};
	let answer = object
		.get("answer")
		.and_then(Value::as_str)
		.map(str::to_string)
		.unwrap_or_else(|| NO_ANSWER.to_string());
	let references = object
		.get("references")
		.and_then(Value::as_array)
		.map(|items| items.iter().filter_map(parse_reference).collect())
		.unwrap_or_default();

	Some(AnswerPayload { answer, references })
}

fn parse_reference(item: &Value) -> Option<AnswerReference> {
	match item {
		Value::String(id) =>
			Some(AnswerReference { id: id.clone(), relevance: DEFAULT_RELEVANCE, excerpt: None }),
		Value::Number(id) =>
			Some(AnswerReference { id: id.to_string(), relevance: DEFAULT_RELEVANCE, excerpt: None }),
		Value::Object(fields) => {
			let id = match fields.get("id")? {
				Value::String(id) => id.clone(),
				Value::Number(id) => id.to_string(),
				_ => return None,
			};
			let relevance = fields.get("relevance").and_then(parse_relevance).unwrap_or(DEFAULT_RELEVANCE);
			let excerpt = fields.get("excerpt").and_then(Value::as_str).map(str::to_string);

			Some(AnswerReference { id, relevance, excerpt })
		},
		_ => None,
	}
}

/// Accepts numbers and numeric strings, clamped to 0..=100.
fn parse_relevance(value: &Value) -> Option<f32> {
	let relevance = match value {
		Value::Number(number) => number.as_f64()? as f32,
		Value::String(text) => text.trim().trim_end_matches('%').trim().parse().ok()?,
		_ => return None,
	};

	relevance.is_finite().then(|| relevance.clamp(0.0, 100.0))
}
