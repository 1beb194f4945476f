use std::{sync::Arc, time::Duration};

use lexgraph_config::{EmbeddingProviderConfig, ScoreKind};
use lexgraph_service::{
	CandidateRecord, CollectionOutcome, CollectionRef, CollectionRegistry, Error, RetrievalReport,
	Retriever,
};
use lexgraph_testkit::{
	stubs::{FailingEmbedding, FixedEmbedding, StubConnector, candidate},
	test_config,
};

fn embedding_cfg() -> EmbeddingProviderConfig {
	test_config(&["legal"], &["internal"]).providers.embedding
}

fn refs(names: &[&str]) -> Vec<CollectionRef> {
	names.iter().map(|name| CollectionRef::new("memory://corpus", *name)).collect()
}

fn ids(records: &[CandidateRecord]) -> Vec<String> {
	records.iter().filter_map(|record| record.id.clone()).collect()
}

fn batch(prefix: &str, distances: &[f32]) -> Vec<CandidateRecord> {
	distances
		.iter()
		.enumerate()
		.map(|(index, distance)| candidate(&format!("{prefix}-{index}"), None, Some(*distance)))
		.collect()
}

async fn run(
	connector: StubConnector,
	collections: &[CollectionRef],
	top_k: u32,
) -> lexgraph_service::Result<RetrievalReport> {
	let registry = Arc::new(CollectionRegistry::new(Arc::new(connector)));
	let embedding = FixedEmbedding::new(vec![0.1, 0.2, 0.3]);
	let cfg = embedding_cfg();
	let retriever = Retriever { registry: &registry, embedding: &embedding, embedding_cfg: &cfg };

	retriever.retrieve_report("duties of directors", collections, top_k).await
}

#[tokio::test]
async fn caps_at_top_k_and_sorts_ascending() {
	let connector = StubConnector::new()
		.with_records("companies_act", batch("c", &[0.30, 0.10, 0.50]))
		.with_records("bankruptcy_act", batch("b", &[0.20, 0.05, 0.40]));
	let report = run(connector, &refs(&["companies_act", "bankruptcy_act"]), 4)
		.await
		.expect("retrieval failed");
	let distances: Vec<f32> = report.records.iter().filter_map(|record| record.distance).collect();

	assert_eq!(report.records.len(), 4);
	assert_eq!(distances, vec![0.05, 0.10, 0.20, 0.30]);
}

#[tokio::test]
async fn identical_inputs_give_identical_output() {
	let build = || {
		StubConnector::new()
			.with_records("a", batch("a", &[0.4, 0.2, 0.2]))
			.with_records("b", batch("b", &[0.2, 0.1]))
	};
	let collections = refs(&["a", "b"]);
	let first = run(build(), &collections, 5).await.expect("retrieval failed");
	let second = run(build(), &collections, 5).await.expect("retrieval failed");

	assert_eq!(first.records, second.records);
	assert_eq!(ids(&first.records), vec!["b-1", "a-1", "a-2", "b-0", "a-0"]);
}

#[tokio::test]
async fn one_failing_collection_is_skipped() {
	let connector = StubConnector::new()
		.with_records("companies_act", batch("c", &[0.1, 0.2, 0.3, 0.4, 0.5]))
		.failing_open("bankruptcy_act", "connection refused")
		.with_records("constitution", batch("k", &[0.15, 0.25, 0.35, 0.45, 0.55]));
	let report = run(connector, &refs(&["companies_act", "bankruptcy_act", "constitution"]), 5)
		.await
		.expect("retrieval failed");

	assert_eq!(report.records.len(), 5);
	assert_eq!(report.skipped().collect::<Vec<_>>(), vec!["memory://corpus/bankruptcy_act"]);
	assert!(matches!(
		&report.outcomes[0],
		CollectionOutcome::Searched { hits: 5, .. }
	));
}

#[tokio::test]
async fn search_failures_and_panics_are_skipped() {
	let connector = StubConnector::new()
		.failing_search("broken", "timeout")
		.panicking("explosive")
		.with_records("healthy", batch("h", &[0.3]));
	let report = run(connector, &refs(&["broken", "explosive", "healthy"]), 5)
		.await
		.expect("retrieval failed");

	assert_eq!(ids(&report.records), vec!["h-0"]);
	assert_eq!(report.skipped().count(), 2);
}

#[tokio::test]
async fn no_collections_or_all_failing_returns_empty() {
	let empty = run(StubConnector::new(), &[], 5).await.expect("retrieval failed");

	assert!(empty.records.is_empty());

	let connector = StubConnector::new().failing_open("a", "down").failing_search("b", "down");
	let failed = run(connector, &refs(&["a", "b", "missing"]), 5).await.expect("retrieval failed");

	assert!(failed.records.is_empty());
	assert_eq!(failed.skipped().count(), 3);
}

#[tokio::test]
async fn missing_distances_keep_collection_order() {
	let connector = StubConnector::new()
		.with_records("a", vec![candidate("a-0", None, Some(0.9)), candidate("a-1", None, None)])
		.with_records("b", vec![candidate("b-0", None, Some(0.1))]);
	let report = run(connector, &refs(&["a", "b"]), 5).await.expect("retrieval failed");

	assert_eq!(ids(&report.records), vec!["a-0", "a-1", "b-0"]);
}

#[tokio::test]
async fn dimension_mismatch_skips_collection() {
	let connector = StubConnector::new()
		.with_records("narrow", batch("n", &[0.1]))
		.with_records("wide", batch("w", &[0.2]));
	let mut collections = refs(&["narrow", "wide"]);

	collections[0].vector_dim = Some(768);
	collections[1].vector_dim = Some(3);

	let report = run(connector, &collections, 5).await.expect("retrieval failed");

	assert_eq!(ids(&report.records), vec!["w-0"]);
}

#[tokio::test]
async fn encoding_failure_fails_the_call() {
	let registry = Arc::new(CollectionRegistry::new(Arc::new(
		StubConnector::new().with_records("a", batch("a", &[0.1])),
	)));
	let cfg = embedding_cfg();
	let retriever =
		Retriever { registry: &registry, embedding: &FailingEmbedding, embedding_cfg: &cfg };
	let err = retriever.retrieve("anything", &refs(&["a"]), 5).await.expect_err("expected error");

	assert!(matches!(err, Error::Encoding { .. }));
}

#[tokio::test]
async fn empty_vector_is_an_encoding_failure() {
	let registry = Arc::new(CollectionRegistry::new(Arc::new(StubConnector::new())));
	let embedding = FixedEmbedding::new(Vec::new());
	let cfg = embedding_cfg();
	let retriever = Retriever { registry: &registry, embedding: &embedding, embedding_cfg: &cfg };
	let err = retriever.retrieve("anything", &refs(&["a"]), 5).await.expect_err("expected error");

	assert!(matches!(err, Error::Encoding { .. }));
}

#[tokio::test]
async fn vector_length_must_match_configured_dimensions() {
	let registry = Arc::new(CollectionRegistry::new(Arc::new(
		StubConnector::new().with_records("a", batch("a", &[0.1])),
	)));
	let embedding = FixedEmbedding::new(vec![0.1, 0.2, 0.3, 0.4]);
	let cfg = embedding_cfg();
	let retriever = Retriever { registry: &registry, embedding: &embedding, embedding_cfg: &cfg };
	let err = retriever.retrieve("anything", &refs(&["a"]), 5).await.expect_err("expected error");

	assert!(matches!(err, Error::Encoding { .. }));
	assert!(err.to_string().contains("expected 3"));
}

#[tokio::test]
async fn query_is_encoded_once() {
	let registry = Arc::new(CollectionRegistry::new(Arc::new(
		StubConnector::new()
			.with_records("a", batch("a", &[0.1]))
			.with_records("b", batch("b", &[0.2]))
			.with_records("c", batch("c", &[0.3])),
	)));
	let embedding = FixedEmbedding::new(vec![1.0, 0.0, 0.0]);
	let cfg = embedding_cfg();
	let retriever = Retriever { registry: &registry, embedding: &embedding, embedding_cfg: &cfg };

	retriever.retrieve("anything", &refs(&["a", "b", "c"]), 5).await.expect("retrieval failed");

	assert_eq!(embedding.calls(), 1);
}

#[tokio::test]
async fn registry_opens_each_collection_once_under_concurrency() {
	let connector = Arc::new(
		StubConnector::new()
			.with_records("a", batch("a", &[0.1]))
			.with_records("b", batch("b", &[0.2]))
			.with_open_delay(Duration::from_millis(20)),
	);
	let registry = Arc::new(CollectionRegistry::new(connector.clone()));
	let embedding = Arc::new(FixedEmbedding::new(vec![1.0, 0.0, 0.0]));
	let cfg = Arc::new(embedding_cfg());
	let collections = Arc::new(refs(&["a", "b"]));
	let mut tasks = Vec::new();

	for _ in 0..8 {
		let registry = registry.clone();
		let embedding = embedding.clone();
		let cfg = cfg.clone();
		let collections = collections.clone();

		tasks.push(tokio::spawn(async move {
			let retriever = Retriever {
				registry: &registry,
				embedding: embedding.as_ref(),
				embedding_cfg: cfg.as_ref(),
			};

			retriever.retrieve("query", &collections, 5).await
		}));
	}

	for task in tasks {
		let records = task.await.expect("task panicked").expect("retrieval failed");

		assert_eq!(records.len(), 2);
	}

	assert_eq!(connector.opens(), 2);
	assert_eq!(registry.opened(), 2);
}

#[tokio::test]
async fn failed_open_is_retried_on_next_request() {
	let connector = Arc::new(StubConnector::new().failing_open("flaky", "down"));
	let registry = CollectionRegistry::new(connector.clone());
	let collection = CollectionRef::new("memory://corpus", "flaky");

	assert!(registry.get(&collection).await.is_err());
	assert!(registry.get(&collection).await.is_err());
	assert_eq!(connector.opens(), 2);
	assert_eq!(registry.opened(), 0);
}

#[tokio::test]
async fn shared_handle_searches_with_each_refs_vector_settings() {
	let connector = Arc::new(StubConnector::new().with_records("docs", batch("d", &[0.1])));
	let registry = Arc::new(CollectionRegistry::new(connector.clone()));
	let embedding = FixedEmbedding::new(vec![1.0, 0.0, 0.0]);
	let cfg = embedding_cfg();
	let retriever = Retriever { registry: &registry, embedding: &embedding, embedding_cfg: &cfg };
	let mut legal = CollectionRef::new("http://qdrant:6334", "docs");
	let mut internal = legal.clone();

	legal.vector_name = Some("text".to_string());
	internal.vector_name = Some("chunk_embedding".to_string());
	internal.score_kind = ScoreKind::Distance;

	retriever.retrieve("duties", std::slice::from_ref(&legal), 5).await.expect("retrieval failed");
	retriever
		.retrieve("duties", std::slice::from_ref(&internal), 5)
		.await
		.expect("retrieval failed");

	let searched = connector.searched();

	assert_eq!(connector.opens(), 1);
	assert_eq!(searched.len(), 2);
	assert_eq!(searched[0].vector_name.as_deref(), Some("text"));
	assert_eq!(searched[1].vector_name.as_deref(), Some("chunk_embedding"));
	assert_eq!(searched[1].score_kind, ScoreKind::Distance);
}
