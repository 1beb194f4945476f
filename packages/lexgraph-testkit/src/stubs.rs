//! In-memory stand-ins for the service's external backends.

use std::{
	collections::{BTreeMap, HashMap, HashSet, VecDeque},
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::Value;
use tokio::sync::Notify;

use lexgraph_config::{EmbeddingProviderConfig, LlmProviderConfig};
use lexgraph_service::{
	BoxFuture, CandidateRecord, CollectionConnector, CollectionRef, EmbeddingProvider, Error,
	InfluenceGraph, Launcher, LlmProvider, RelevanceFilter, Result, VectorCollection,
};
use lexgraph_storage::models::ClauseNode;

#[derive(Clone)]
enum Behavior {
	Records(Vec<CandidateRecord>),
	FailOpen(String),
	FailSearch(String),
	Panic,
}

/// Serves named collections from memory. Unknown names fail to open.
#[derive(Default)]
pub struct StubConnector {
	collections: HashMap<String, Behavior>,
	open_delay: Duration,
	opens: AtomicUsize,
	searches: Arc<Mutex<Vec<CollectionRef>>>,
}
impl StubConnector {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_records(mut self, name: &str, records: Vec<CandidateRecord>) -> Self {
		self.collections.insert(name.to_string(), Behavior::Records(records));

		self
	}

	pub fn failing_open(mut self, name: &str, message: &str) -> Self {
		self.collections.insert(name.to_string(), Behavior::FailOpen(message.to_string()));

		self
	}

	pub fn failing_search(mut self, name: &str, message: &str) -> Self {
		self.collections.insert(name.to_string(), Behavior::FailSearch(message.to_string()));

		self
	}

	/// Searching this collection panics inside its task.
	pub fn panicking(mut self, name: &str) -> Self {
		self.collections.insert(name.to_string(), Behavior::Panic);

		self
	}

	pub fn with_open_delay(mut self, delay: Duration) -> Self {
		self.open_delay = delay;

		self
	}

	/// Number of `open` calls seen, including failed ones.
	pub fn opens(&self) -> usize {
		self.opens.load(Ordering::SeqCst)
	}

	/// Every ref passed to a search, in call order.
	pub fn searched(&self) -> Vec<CollectionRef> {
		self.searches.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}

impl CollectionConnector for StubConnector {
	fn open<'a>(
		&'a self,
		collection: &'a CollectionRef,
	) -> BoxFuture<'a, Result<Arc<dyn VectorCollection>>> {
		Box::pin(async move {
			self.opens.fetch_add(1, Ordering::SeqCst);

			if !self.open_delay.is_zero() {
				tokio::time::sleep(self.open_delay).await;
			}

			match self.collections.get(&collection.name) {
				None => Err(Error::Qdrant {
					message: format!("Collection {:?} does not exist.", collection.name),
				}),
				Some(Behavior::FailOpen(message)) => Err(Error::Qdrant { message: message.clone() }),
				Some(behavior) => {
					let handle: Arc<dyn VectorCollection> =
						Arc::new(StubCollection {
							behavior: behavior.clone(),
							searches: Arc::clone(&self.searches),
						});

					Ok(handle)
				},
			}
		})
	}
}

struct StubCollection {
	behavior: Behavior,
	searches: Arc<Mutex<Vec<CollectionRef>>>,
}

impl VectorCollection for StubCollection {
	fn search<'a>(
		&'a self,
		collection: &'a CollectionRef,
		_vector: &'a [f32],
		limit: u64,
	) -> BoxFuture<'a, Result<Vec<CandidateRecord>>> {
		Box::pin(async move {
			self.searches.lock().unwrap_or_else(|err| err.into_inner()).push(collection.clone());

			match &self.behavior {
				Behavior::Records(records) =>
					Ok(records.iter().take(limit as usize).cloned().collect()),
				Behavior::FailSearch(message) | Behavior::FailOpen(message) =>
					Err(Error::Qdrant { message: message.clone() }),
				Behavior::Panic => panic!("stub collection panicked during search"),
			}
		})
	}
}

/// A record as a collection would return it.
pub fn candidate(id: &str, uid: Option<&str>, distance: Option<f32>) -> CandidateRecord {
	CandidateRecord {
		id: Some(id.to_string()),
		uid: uid.map(str::to_string),
		chunk: Some(format!("Passage {id}.")),
		source: Some("Companies Act".to_string()),
		distance,
		..Default::default()
	}
}

/// Directed influence graph held in memory.
#[derive(Default)]
pub struct MemoryGraph {
	nodes: BTreeMap<String, ClauseNode>,
	edges: Vec<(String, String)>,
	failing: HashSet<String>,
	root_queries: AtomicUsize,
	subtree_queries: AtomicUsize,
}
impl MemoryGraph {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_clause(mut self, node: ClauseNode) -> Self {
		self.nodes.insert(node.uid.clone(), node);

		self
	}

	pub fn with_node(self, uid: &str) -> Self {
		self.with_clause(crate::clause(uid))
	}

	/// Adds `source -> target`, creating either node if missing.
	pub fn with_edge(mut self, source: &str, target: &str) -> Self {
		for uid in [source, target] {
			if !self.nodes.contains_key(uid) {
				self.nodes.insert(uid.to_string(), crate::clause(uid));
			}
		}

		self.edges.push((source.to_string(), target.to_string()));

		self
	}

	/// Every lookup that touches `uid` fails.
	pub fn failing_on(mut self, uid: &str) -> Self {
		self.failing.insert(uid.to_string());

		self
	}

	pub fn root_queries(&self) -> usize {
		self.root_queries.load(Ordering::SeqCst)
	}

	pub fn subtree_queries(&self) -> usize {
		self.subtree_queries.load(Ordering::SeqCst)
	}

	fn check(&self, uid: &str) -> Result<()> {
		if self.failing.contains(uid) {
			return Err(Error::Storage { message: format!("Injected graph failure for {uid}.") });
		}

		Ok(())
	}

	fn roots_of(&self, uid: &str) -> Vec<String> {
		let mut visited = HashSet::from([uid.to_string()]);
		let mut queue = VecDeque::from([uid.to_string()]);

		while let Some(current) = queue.pop_front() {
			for (source, target) in &self.edges {
				if *target == current && visited.insert(source.clone()) {
					queue.push_back(source.clone());
				}
			}
		}

		let mut roots: Vec<String> = visited
			.into_iter()
			.filter(|candidate| !self.edges.iter().any(|(_, target)| target == candidate))
			.collect();

		roots.sort();

		if roots.is_empty() {
			roots.push(uid.to_string());
		}

		roots
	}

	fn descendants_of(&self, root: &str) -> Vec<ClauseNode> {
		let mut visited = HashSet::from([root.to_string()]);
		let mut order = vec![root.to_string()];
		let mut queue = VecDeque::from([root.to_string()]);

		while let Some(current) = queue.pop_front() {
			for (source, target) in &self.edges {
				if *source == current && visited.insert(target.clone()) {
					order.push(target.clone());
					queue.push_back(target.clone());
				}
			}
		}

		order.iter().filter_map(|uid| self.nodes.get(uid).cloned()).collect()
	}
}

impl InfluenceGraph for MemoryGraph {
	fn resolve_roots<'a>(&'a self, uid: &'a str) -> BoxFuture<'a, Result<Option<Vec<String>>>> {
		Box::pin(async move {
			self.root_queries.fetch_add(1, Ordering::SeqCst);
			self.check(uid)?;

			if !self.nodes.contains_key(uid) {
				return Ok(None);
			}

			Ok(Some(self.roots_of(uid)))
		})
	}

	fn subtree<'a>(&'a self, root: &'a str) -> BoxFuture<'a, Result<Vec<ClauseNode>>> {
		Box::pin(async move {
			self.subtree_queries.fetch_add(1, Ordering::SeqCst);
			self.check(root)?;

			Ok(self.descendants_of(root))
		})
	}
}

/// Returns the same vector for every input.
pub struct FixedEmbedding {
	vector: Vec<f32>,
	calls: AtomicUsize,
}
impl FixedEmbedding {
	pub fn new(vector: Vec<f32>) -> Self {
		Self { vector, calls: AtomicUsize::new(0) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}

impl EmbeddingProvider for FixedEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Ok(texts.iter().map(|_| self.vector.clone()).collect())
		})
	}
}

pub struct FailingEmbedding;

impl EmbeddingProvider for FailingEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		_texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			Err(Error::Provider { message: "Encoder endpoint is unreachable.".to_string() })
		})
	}
}

/// Replies with queued texts in order and records every request.
#[derive(Default)]
pub struct ScriptedLlm {
	replies: Mutex<VecDeque<String>>,
	requests: Mutex<Vec<Vec<Value>>>,
}
impl ScriptedLlm {
	pub fn new<I, S>(replies: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
			requests: Mutex::new(Vec::new()),
		}
	}

	pub fn requests(&self) -> Vec<Vec<Value>> {
		self.requests.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}

impl LlmProvider for ScriptedLlm {
	fn complete<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			self.requests.lock().unwrap_or_else(|err| err.into_inner()).push(messages.to_vec());

			self.replies.lock().unwrap_or_else(|err| err.into_inner()).pop_front().ok_or_else(
				|| Error::Provider { message: "No scripted reply left.".to_string() },
			)
		})
	}
}

/// Selects a fixed uid list regardless of input.
pub struct FixedFilter {
	uids: Vec<String>,
}
impl FixedFilter {
	pub fn new(uids: &[&str]) -> Self {
		Self { uids: uids.iter().map(|uid| uid.to_string()).collect() }
	}
}

impl RelevanceFilter for FixedFilter {
	fn select_relevant<'a>(
		&'a self,
		_query: &'a str,
		_candidates: &'a [CandidateRecord],
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move { Ok(self.uids.clone()) })
	}
}

/// Records launched root sets instead of starting a process.
#[derive(Default)]
pub struct RecordingLauncher {
	launched: Mutex<Vec<Vec<String>>>,
	delay: Duration,
	fail: bool,
	signal: Notify,
}
impl RecordingLauncher {
	pub fn new() -> Self {
		Self::default()
	}

	/// Each launch sleeps for `delay` before recording.
	pub fn with_delay(delay: Duration) -> Self {
		Self { delay, ..Self::default() }
	}

	/// Records each attempt, then reports a launch failure.
	pub fn failing() -> Self {
		Self { fail: true, ..Self::default() }
	}

	pub fn launched(&self) -> Vec<Vec<String>> {
		self.launched.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	/// Waits until at least `count` launches were recorded or `timeout` elapses.
	pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Vec<String>> {
		let deadline = tokio::time::Instant::now() + timeout;

		loop {
			let notified = self.signal.notified();
			let launched = self.launched();

			if launched.len() >= count {
				return launched;
			}
			if tokio::time::timeout_at(deadline, notified).await.is_err() {
				return self.launched();
			}
		}
	}
}

impl Launcher for RecordingLauncher {
	fn launch<'a>(&'a self, root_uids: &'a [String]) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			if !self.delay.is_zero() {
				tokio::time::sleep(self.delay).await;
			}

			self.launched.lock().unwrap_or_else(|err| err.into_inner()).push(root_uids.to_vec());
			self.signal.notify_waiters();

			if self.fail {
				return Err(Error::Notifier { message: "Viewer failed to start.".to_string() });
			}

			Ok(())
		})
	}
}
