use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use lexgraph_config::{Config, EmbeddingKind, Error, ScoreKind};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_value() -> Value {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.")
}

fn table_mut<'a>(value: &'a mut Value, path: &[&str]) -> &'a mut toml::Table {
	let mut current = value.as_table_mut().expect("Template config must be a table.");

	for key in path {
		current = current
			.get_mut(*key)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{key}]."));
	}

	current
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("lexgraph_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_value(value: &Value) -> lexgraph_config::Result<Config> {
	let payload = toml::to_string(value).expect("Failed to render template config.");
	let path = write_temp_config(payload);
	let result = lexgraph_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_validation(value: &Value, expected: &str) {
	let err = load_value(value).expect_err("Expected validation error.");

	assert!(matches!(err, Error::Validation { .. }), "Unexpected error kind: {err:?}");

	let message = err.to_string();

	assert!(message.contains(expected), "Unexpected error message: {message}");
}

#[test]
fn sample_config_loads() {
	let cfg = load_value(&sample_value()).expect("Sample config must load.");

	assert_eq!(cfg.providers.embedding.kind, EmbeddingKind::Tei);
	assert_eq!(cfg.corpora.legal.len(), 3);
	assert_eq!(cfg.corpora.internal[0].vector_name.as_deref(), Some("chunk_embedding"));
	assert_eq!(cfg.corpora.internal[0].score_kind, ScoreKind::Similarity);
	assert_eq!(cfg.graph.fallback_score, 0.74);
	assert!(cfg.graph.strict_lookup);
}

#[test]
fn optional_sections_fall_back_to_defaults() {
	let mut value = sample_value();
	let root = value.as_table_mut().expect("Template config must be a table.");

	root.remove("retrieval");
	root.remove("notifier");
	root.remove("pipeline");

	let graph = table_mut(&mut value, &["graph"]);

	graph.remove("fallback_score");
	graph.remove("strict_lookup");
	graph.remove("preview_chars");

	let cfg = load_value(&value).expect("Config without optional sections must load.");

	assert_eq!(cfg.retrieval.legal_top_k, 5);
	assert_eq!(cfg.retrieval.internal_top_k, 3);
	assert_eq!(cfg.graph.fallback_score, 0.74);
	assert!(cfg.graph.strict_lookup);
	assert_eq!(cfg.graph.preview_chars, 100);
	assert!(!cfg.notifier.enabled);
	assert_eq!(cfg.pipeline.internal_keywords, vec!["my", "system", "changes", "change"]);
}

#[test]
fn blank_vector_name_is_normalized_away() {
	let mut value = sample_value();
	let internal = value
		.get_mut("corpora")
		.and_then(|corpora| corpora.get_mut("internal"))
		.and_then(Value::as_array_mut)
		.expect("Template config must include [[corpora.internal]].");

	internal[0]
		.as_table_mut()
		.expect("Collection must be a table.")
		.insert("vector_name".to_string(), Value::String("  ".to_string()));

	let cfg = load_value(&value).expect("Config must load.");

	assert_eq!(cfg.corpora.internal[0].vector_name, None);
}

#[test]
fn internal_keywords_are_lowercased_and_trimmed() {
	let mut value = sample_value();

	table_mut(&mut value, &["pipeline"]).insert(
		"internal_keywords".to_string(),
		Value::Array(vec![Value::String(" Policy ".to_string()), Value::String(String::new())]),
	);

	let cfg = load_value(&value).expect("Config must load.");

	assert_eq!(cfg.pipeline.internal_keywords, vec!["policy"]);
}

#[test]
fn empty_legal_corpus_is_rejected() {
	let mut value = sample_value();

	table_mut(&mut value, &["corpora"]).insert("legal".to_string(), Value::Array(Vec::new()));

	expect_validation(&value, "corpora.legal must be non-empty.");
}

#[test]
fn zero_top_k_is_rejected() {
	let mut value = sample_value();

	table_mut(&mut value, &["retrieval"]).insert("internal_top_k".to_string(), Value::Integer(0));

	expect_validation(&value, "retrieval.internal_top_k must be greater than zero.");
}

#[test]
fn openai_embedding_requires_api_key() {
	let mut value = sample_value();

	table_mut(&mut value, &["providers", "embedding"])
		.insert("kind".to_string(), Value::String("openai".to_string()));

	expect_validation(&value, "Provider embedding api_key must be non-empty for kind openai.");
}

#[test]
fn enabled_notifier_requires_program() {
	let mut value = sample_value();
	let notifier = table_mut(&mut value, &["notifier"]);

	notifier.insert("enabled".to_string(), Value::Boolean(true));
	notifier.insert("program".to_string(), Value::String(" ".to_string()));

	expect_validation(&value, "notifier.program must be non-empty when enabled.");
}

#[test]
fn zero_request_timeout_is_rejected() {
	let mut value = sample_value();

	table_mut(&mut value, &["pipeline"])
		.insert("request_timeout_ms".to_string(), Value::Integer(0));

	expect_validation(&value, "pipeline.request_timeout_ms must be greater than zero.");
}

#[test]
fn unknown_score_kind_fails_to_parse() {
	let mut value = sample_value();
	let legal = value
		.get_mut("corpora")
		.and_then(|corpora| corpora.get_mut("legal"))
		.and_then(Value::as_array_mut)
		.expect("Template config must include [[corpora.legal]].");

	legal[0]
		.as_table_mut()
		.expect("Collection must be a table.")
		.insert("score_kind".to_string(), Value::String("cosine".to_string()));

	let err = load_value(&value).expect_err("Expected parse error.");

	assert!(matches!(err, Error::ParseConfig { .. }), "Unexpected error kind: {err:?}");
}

#[test]
fn missing_file_reports_read_error() {
	let path = env::temp_dir().join("lexgraph_config_test_missing_file.toml");
	let err = lexgraph_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }), "Unexpected error kind: {err:?}");
}
