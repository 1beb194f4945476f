use qdrant_client::{
	Qdrant,
	qdrant::{Query, QueryPointsBuilder, ScoredPoint},
};

use crate::{Error, Result};

pub fn connect(location: &str) -> Result<Qdrant> {
	let client = Qdrant::from_url(location).build()?;

	Ok(client)
}

pub async fn ensure_collection(client: &Qdrant, name: &str) -> Result<()> {
	if !client.collection_exists(name).await? {
		return Err(Error::NotFound(format!("Qdrant collection {name:?} does not exist.")));
	}

	Ok(())
}

pub async fn search_nearest(
	client: &Qdrant,
	name: &str,
	vector_name: Option<&str>,
	vector: Vec<f32>,
	limit: u64,
) -> Result<Vec<ScoredPoint>> {
	let mut search = QueryPointsBuilder::new(name)
		.query(Query::new_nearest(vector))
		.limit(limit)
		.with_payload(true);

	if let Some(using) = vector_name {
		search = search.using(using);
	}

	let response = client.query(search).await?;

	Ok(response.result)
}
