use std::sync::Arc;

use lexgraph_service::{LexService, Notifier};
use lexgraph_storage::db::Db;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<LexService>,
}
impl AppState {
	pub async fn new(config: lexgraph_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.graph.postgres).await?;

		db.ensure_schema().await?;

		let notifier = Notifier::from_config(&config.notifier);

		tracing::info!(
			legal_collections = config.corpora.legal.len(),
			internal_collections = config.corpora.internal.len(),
			notifier = notifier.is_enabled(),
			"Service initialized."
		);

		let service = LexService::new(config, db, notifier);

		Ok(Self::from_service(service))
	}

	pub fn from_service(service: LexService) -> Self {
		Self { service: Arc::new(service) }
	}
}
