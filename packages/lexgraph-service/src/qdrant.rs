use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};

use qdrant_client::{
	Qdrant,
	qdrant::{PointId, ScoredPoint, Value, point_id::PointIdOptions, value::Kind},
};

use crate::{
	BoxFuture, CandidateRecord, CollectionConnector, CollectionRef, Result, VectorCollection,
};
use lexgraph_config::ScoreKind;
use lexgraph_storage::qdrant as store;

/// Opens Qdrant collections, sharing one client per endpoint.
#[derive(Default)]
pub struct QdrantConnector {
	clients: Mutex<HashMap<String, Arc<Qdrant>>>,
}
impl QdrantConnector {
	fn client_for(&self, location: &str) -> Result<Arc<Qdrant>> {
		let mut clients = self.clients.lock().unwrap_or_else(|err| err.into_inner());

		if let Some(client) = clients.get(location) {
			return Ok(client.clone());
		}

		let client = Arc::new(store::connect(location)?);

		clients.insert(location.to_string(), client.clone());

		Ok(client)
	}
}

impl CollectionConnector for QdrantConnector {
	fn open<'a>(
		&'a self,
		collection: &'a CollectionRef,
	) -> BoxFuture<'a, Result<Arc<dyn VectorCollection>>> {
		Box::pin(async move {
			let client = self.client_for(&collection.location)?;

			store::ensure_collection(&client, &collection.name).await?;

			let handle: Arc<dyn VectorCollection> =
				Arc::new(QdrantCollection { client, name: collection.name.clone() });

			Ok(handle)
		})
	}
}

struct QdrantCollection {
	client: Arc<Qdrant>,
	name: String,
}

impl VectorCollection for QdrantCollection {
	fn search<'a>(
		&'a self,
		collection: &'a CollectionRef,
		vector: &'a [f32],
		limit: u64,
	) -> BoxFuture<'a, Result<Vec<CandidateRecord>>> {
		Box::pin(async move {
			let points = store::search_nearest(
				&self.client,
				&self.name,
				collection.vector_name.as_deref(),
				vector.to_vec(),
				limit,
			)
			.await?;
			let score_kind = collection.score_kind;

			Ok(points.iter().map(|point| candidate_from_point(point, score_kind)).collect())
		})
	}
}

fn candidate_from_point(point: &ScoredPoint, score_kind: ScoreKind) -> CandidateRecord {
	let payload = &point.payload;
	let distance = match score_kind {
		ScoreKind::Similarity => 1.0 - point.score,
		ScoreKind::Distance => point.score,
	};

	CandidateRecord {
		id: payload_text(payload, "id").or_else(|| point.id.as_ref().and_then(point_id_text)),
		uid: payload_text(payload, "uid"),
		chunk: payload_string(payload, "chunk").or_else(|| payload_string(payload, "doc_chunk")),
		part_title: payload_string(payload, "part_title"),
		chapter_title: payload_string(payload, "chapter_title"),
		section_title: payload_string(payload, "section_title"),
		page: payload_i64(payload, "page"),
		source: payload_string(payload, "source").or_else(|| payload_string(payload, "doc_title")),
		distance: Some(distance),
	}
}

fn payload_kind<'a>(payload: &'a HashMap<String, Value>, key: &str) -> Option<&'a Kind> {
	payload.get(key).and_then(|value| value.kind.as_ref())
}

fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	match payload_kind(payload, key)? {
		Kind::StringValue(text) => Some(text.clone()),
		_ => None,
	}
}

/// Identifiers may be stored as strings or integers.
fn payload_text(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	match payload_kind(payload, key)? {
		Kind::StringValue(text) => Some(text.clone()),
		Kind::IntegerValue(number) => Some(number.to_string()),
		_ => None,
	}
}

fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
	match payload_kind(payload, key)? {
		Kind::IntegerValue(number) => Some(*number),
		Kind::DoubleValue(number) if number.is_finite() && number.fract() == 0.0 =>
			Some(*number as i64),
		Kind::StringValue(text) => text.trim().parse().ok(),
		_ => None,
	}
}

fn point_id_text(id: &PointId) -> Option<String> {
	match id.point_id_options.as_ref()? {
		PointIdOptions::Num(number) => Some(number.to_string()),
		PointIdOptions::Uuid(uuid) => Some(uuid.clone()),
	}
}
