use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};

use tokio::sync::OnceCell;

use crate::{BoxFuture, CandidateRecord, CollectionRef, Result};

/// Opens collection handles. Called at most once per [`CollectionKey`] by the registry.
pub trait CollectionConnector
where
	Self: Send + Sync,
{
	fn open<'a>(
		&'a self,
		collection: &'a CollectionRef,
	) -> BoxFuture<'a, Result<Arc<dyn VectorCollection>>>;
}

/// An opened, searchable collection.
///
/// One handle serves every [`CollectionRef`] with the same location and name, so the named vector
/// and score kind are read from `collection` on each search.
pub trait VectorCollection
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		collection: &'a CollectionRef,
		vector: &'a [f32],
		limit: u64,
	) -> BoxFuture<'a, Result<Vec<CandidateRecord>>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionKey {
	pub location: String,
	pub name: String,
}

type HandleCell = Arc<OnceCell<Arc<dyn VectorCollection>>>;

/// Append-only cache of opened collections, shared by concurrent requests.
///
/// Each key owns a `OnceCell`, so concurrent first use of one key opens it once while other keys
/// proceed independently. A failed open leaves the cell empty and the next request retries.
pub struct CollectionRegistry {
	connector: Arc<dyn CollectionConnector>,
	handles: Mutex<HashMap<CollectionKey, HandleCell>>,
}
impl CollectionRegistry {
	pub fn new(connector: Arc<dyn CollectionConnector>) -> Self {
		Self { connector, handles: Mutex::new(HashMap::new()) }
	}

	pub async fn get(&self, collection: &CollectionRef) -> Result<Arc<dyn VectorCollection>> {
		let cell = {
			let mut handles = self.handles.lock().unwrap_or_else(|err| err.into_inner());

			handles.entry(collection.key()).or_default().clone()
		};
		let handle = cell.get_or_try_init(|| self.connector.open(collection)).await?;

		Ok(handle.clone())
	}

	/// Number of keys holding an opened handle.
	pub fn opened(&self) -> usize {
		let handles = self.handles.lock().unwrap_or_else(|err| err.into_inner());

		handles.values().filter(|cell| cell.initialized()).count()
	}
}
