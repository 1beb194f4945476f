use std::sync::Arc;

use qdrant_client::{
	Payload, Qdrant,
	qdrant::{CreateCollectionBuilder, Distance, PointStruct, UpsertPointsBuilder, VectorParamsBuilder},
};

use lexgraph_config::ScoreKind;
use lexgraph_service::{
	Components, InternalSearchRequest, LexService, Notifier, Providers, QdrantConnector,
};
use lexgraph_storage::db::Db;
use lexgraph_testkit::{
	TestDatabase, clause, seed_graph,
	stubs::{FixedEmbedding, FixedFilter, ScriptedLlm},
	test_config,
};

async fn seed_collection(client: &Qdrant, name: &str) {
	client
		.create_collection(
			CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(3, Distance::Cosine)),
		)
		.await
		.expect("Failed to create collection.");

	let points = [(1_u64, "A", [1.0_f32, 0.0, 0.0]), (2, "X", [0.0, 1.0, 0.0])]
		.into_iter()
		.map(|(id, uid, vector)| {
			let payload: Payload = serde_json::json!({
				"uid": uid,
				"chunk": format!("Clause text for {uid}."),
				"source": "Master Services Agreement",
			})
			.try_into()
			.expect("Payload must be an object.");

			PointStruct::new(id, vector.to_vec(), payload)
		})
		.collect::<Vec<_>>();

	client
		.upsert_points(UpsertPointsBuilder::new(name, points).wait(true))
		.await
		.expect("Failed to upsert points.");
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set LEXGRAPH_PG_DSN and LEXGRAPH_QDRANT_URL to run."]
async fn internal_search_reads_qdrant_and_postgres() {
	let (Some(base_dsn), Some(qdrant_url)) =
		(lexgraph_testkit::env_dsn(), lexgraph_testkit::env_qdrant_url())
	else {
		eprintln!(
			"Skipping internal_search_reads_qdrant_and_postgres; set LEXGRAPH_PG_DSN and LEXGRAPH_QDRANT_URL to run this test."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = Db::connect(&test_db.postgres()).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	{
		let mut conn = db.pool.acquire().await.expect("Failed to acquire connection.");
		let nodes: Vec<_> = ["Root", "A", "C"].into_iter().map(clause).collect();

		seed_graph(&mut conn, &nodes, &[("Root", "A"), ("Root", "C")])
			.await
			.expect("Failed to seed graph.");
	}

	let collection = test_db.collection_name("company_docs");
	let client = Qdrant::from_url(&qdrant_url).build().expect("Failed to build Qdrant client.");

	seed_collection(&client, &collection).await;

	let mut cfg = test_config(&["unused"], &[]);
	let mut internal = lexgraph_testkit::memory_collection(&collection);

	internal.location = qdrant_url.clone();
	internal.score_kind = ScoreKind::Similarity;
	cfg.corpora.internal = vec![internal];

	let service = LexService::with_components(
		cfg,
		Components {
			connector: Arc::new(QdrantConnector::default()),
			graph: Arc::new(db),
			providers: Providers::new(
				Arc::new(FixedEmbedding::new(vec![1.0, 0.0, 0.0])),
				Arc::new(ScriptedLlm::default()),
			),
			filter: Some(Arc::new(FixedFilter::new(&["A"]))),
			notifier: Notifier::disabled(),
		},
	);
	let response = service
		.search_internal(InternalSearchRequest { query: "liability cap".to_string() })
		.await
		.expect("Internal search failed.");
	let uids: Vec<_> = response.items.iter().map(|item| item.uid.as_str()).collect();

	assert_eq!(response.roots, vec!["Root"]);
	assert_eq!(uids, vec!["Root", "A", "C"]);
	assert!(response.items[1].score.abs() < 1e-4);
	assert_eq!(response.items[0].score, 0.74);

	drop(service);
	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
