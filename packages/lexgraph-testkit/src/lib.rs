pub mod stubs;

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, sync::Mutex};

use qdrant_client::Qdrant;
use serde_json::Map;
use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use uuid::Uuid;

use lexgraph_config::{
	Collection, Config, Corpora, EmbeddingKind, EmbeddingProviderConfig, Graph, LlmProviderConfig,
	Notifier, Pipeline, Postgres, Providers, Retrieval, ScoreKind, Service,
};
use lexgraph_storage::{lineage, models::ClauseNode};

const MEMORY_LOCATION: &str = "memory://corpus";

/// A scratch Postgres database created from `LEXGRAPH_PG_DSN`, plus the Qdrant collections named
/// through it. Call [`TestDatabase::cleanup`] at the end of the test to drop both.
pub struct TestDatabase {
	name: String,
	dsn: String,
	admin_options: PgConnectOptions,
	collections: Mutex<Vec<String>>,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base_options = PgConnectOptions::from_str(base_dsn)?;
		let admin_options = base_options.clone().database("postgres");
		let name = format!("lexgraph_test_{}", Uuid::new_v4().simple());
		let mut admin_conn = PgConnection::connect_with(&admin_options).await?;

		admin_conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str()).await?;
		admin_conn.close().await?;

		let dsn = base_options.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin_options, collections: Mutex::new(Vec::new()) })
	}

	pub fn postgres(&self) -> Postgres {
		Postgres { dsn: self.dsn.clone(), pool_max_conns: 2 }
	}

	/// A collection name unique to this database, deleted on cleanup.
	pub fn collection_name(&self, prefix: &str) -> String {
		let collection = format!("{prefix}_{}", self.name);

		self.collections.lock().unwrap_or_else(|err| err.into_inner()).push(collection.clone());

		collection
	}

	pub async fn cleanup(self) -> Result<()> {
		let collections = self.collections.into_inner().unwrap_or_else(|err| err.into_inner());

		if !collections.is_empty()
			&& let Some(qdrant_url) = env_qdrant_url()
		{
			let client = Qdrant::from_url(&qdrant_url).build()?;

			for collection in collections {
				client.delete_collection(collection).await?;
			}
		}

		let mut admin_conn = PgConnection::connect_with(&self.admin_options).await?;

		admin_conn
			.execute(format!(r#"DROP DATABASE IF EXISTS "{}" WITH (FORCE)"#, self.name).as_str())
			.await?;

		Ok(())
	}
}

pub fn env_dsn() -> Option<String> {
	env::var("LEXGRAPH_PG_DSN").ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("LEXGRAPH_QDRANT_URL").ok()
}

/// Loads clause nodes and `(source, target)` influence edges into a migrated database.
pub async fn seed_graph(
	conn: &mut PgConnection,
	nodes: &[ClauseNode],
	edges: &[(&str, &str)],
) -> Result<()> {
	for node in nodes {
		lineage::upsert_node(&mut *conn, node).await?;
	}
	for (source, target) in edges {
		lineage::insert_influence(&mut *conn, source, target).await?;
	}

	Ok(())
}

pub fn clause(uid: &str) -> ClauseNode {
	ClauseNode {
		uid: uid.to_string(),
		title: Some(format!("Agreement {uid}")),
		section_number: Some("1".to_string()),
		clause_number: None,
		chunk: Some(format!("Clause text for {uid}.")),
	}
}

/// A collection served by the in-memory stubs.
pub fn memory_collection(name: &str) -> Collection {
	Collection {
		location: MEMORY_LOCATION.to_string(),
		name: name.to_string(),
		vector_name: None,
		score_kind: ScoreKind::Distance,
		vector_dim: None,
	}
}

/// A valid configuration whose corpora point at the in-memory stubs.
pub fn test_config(legal: &[&str], internal: &[&str]) -> Config {
	Config {
		service: Service { http_bind: "127.0.0.1:0".to_string(), log_level: "debug".to_string() },
		providers: Providers {
			embedding: EmbeddingProviderConfig {
				kind: EmbeddingKind::Tei,
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: String::new(),
				path: "/embed".to_string(),
				model: "test-encoder".to_string(),
				dimensions: 3,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			llm: LlmProviderConfig {
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: "test-key".to_string(),
				path: "/chat/completions".to_string(),
				model: "test-chat".to_string(),
				temperature: 0.0,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
		corpora: Corpora {
			legal: legal.iter().map(|name| memory_collection(name)).collect(),
			internal: internal.iter().map(|name| memory_collection(name)).collect(),
		},
		retrieval: Retrieval::default(),
		graph: Graph {
			postgres: Postgres {
				dsn: "postgres://lexgraph@127.0.0.1:1/lexgraph".to_string(),
				pool_max_conns: 1,
			},
			fallback_score: 0.74,
			strict_lookup: true,
			preview_chars: 100,
		},
		notifier: Notifier::default(),
		pipeline: Pipeline::default(),
	}
}
