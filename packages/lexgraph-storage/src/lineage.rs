use std::collections::{HashMap, VecDeque};

use sqlx::PgConnection;

use crate::{Error, Result, models::ClauseNode};

pub async fn node_exists(executor: &mut PgConnection, uid: &str) -> Result<bool> {
	let exists: bool =
		sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM clause_nodes WHERE uid = $1)")
			.bind(uid)
			.fetch_one(&mut *executor)
			.await?;

	Ok(exists)
}

/// Returns the terminal ancestors of `uid`, or `None` when the node is unknown.
///
/// A node without predecessors is its own root. When every ancestor sits on a cycle there is no
/// terminal node, and the node itself is reported as the root.
pub async fn resolve_roots(executor: &mut PgConnection, uid: &str) -> Result<Option<Vec<String>>> {
	if !node_exists(&mut *executor, uid).await? {
		return Ok(None);
	}

	let roots: Vec<String> = sqlx::query_scalar(
		"\
WITH RECURSIVE ancestors(uid) AS (
	SELECT uid
	FROM clause_nodes
	WHERE uid = $1
	UNION
	SELECT e.source_uid
	FROM clause_influences e
	JOIN ancestors a ON e.target_uid = a.uid
)
SELECT a.uid
FROM ancestors a
WHERE NOT EXISTS (
	SELECT 1
	FROM clause_influences e
	WHERE e.target_uid = a.uid
)
ORDER BY a.uid",
	)
	.bind(uid)
	.fetch_all(&mut *executor)
	.await?;

	if roots.is_empty() {
		return Ok(Some(vec![uid.to_string()]));
	}

	Ok(Some(roots))
}

/// Returns `root` and every node reachable from it, nearest first.
///
/// The walk keeps one row per node, so shared descendants and cycles are visited once. Nodes at
/// the same depth are ordered by uid.
pub async fn fetch_subtree(executor: &mut PgConnection, root: &str) -> Result<Vec<ClauseNode>> {
	let nodes = sqlx::query_as::<_, ClauseNode>(
		"\
WITH RECURSIVE walk(uid) AS (
	SELECT $1::text
	UNION
	SELECT e.target_uid
	FROM walk w
	JOIN clause_influences e ON e.source_uid = w.uid
)
SELECT
	n.uid,
	n.title,
	n.section_number,
	n.clause_number,
	n.chunk
FROM walk w
JOIN clause_nodes n ON n.uid = w.uid",
	)
	.bind(root)
	.fetch_all(&mut *executor)
	.await?;
	let edges = sqlx::query_as::<_, (String, String)>(
		"\
WITH RECURSIVE walk(uid) AS (
	SELECT $1::text
	UNION
	SELECT e.target_uid
	FROM walk w
	JOIN clause_influences e ON e.source_uid = w.uid
)
SELECT e.source_uid, e.target_uid
FROM walk w
JOIN clause_influences e ON e.source_uid = w.uid",
	)
	.bind(root)
	.fetch_all(&mut *executor)
	.await?;

	Ok(order_by_depth(root, nodes, &edges))
}

fn order_by_depth(
	root: &str,
	mut nodes: Vec<ClauseNode>,
	edges: &[(String, String)],
) -> Vec<ClauseNode> {
	let mut children: HashMap<&str, Vec<&str>> = HashMap::new();

	for (source, target) in edges {
		children.entry(source.as_str()).or_default().push(target.as_str());
	}

	let mut depths: HashMap<&str, usize> = HashMap::from([(root, 0)]);
	let mut queue = VecDeque::from([root]);

	while let Some(current) = queue.pop_front() {
		let depth = depths.get(current).copied().unwrap_or_default();

		for &child in children.get(current).into_iter().flatten() {
			if !depths.contains_key(child) {
				depths.insert(child, depth + 1);
				queue.push_back(child);
			}
		}
	}

	nodes.sort_by(|left, right| {
		let left_depth = depths.get(left.uid.as_str()).copied().unwrap_or(usize::MAX);
		let right_depth = depths.get(right.uid.as_str()).copied().unwrap_or(usize::MAX);

		left_depth.cmp(&right_depth).then_with(|| left.uid.cmp(&right.uid))
	});

	nodes
}

pub async fn upsert_node(executor: &mut PgConnection, node: &ClauseNode) -> Result<()> {
	if node.uid.trim().is_empty() {
		return Err(Error::InvalidArgument("clause uid must not be empty".to_string()));
	}

	sqlx::query(
		"\
INSERT INTO clause_nodes (uid, title, section_number, clause_number, chunk)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (uid) DO UPDATE
SET
	title = EXCLUDED.title,
	section_number = EXCLUDED.section_number,
	clause_number = EXCLUDED.clause_number,
	chunk = EXCLUDED.chunk,
	updated_at = now()",
	)
	.bind(node.uid.as_str())
	.bind(node.title.as_deref())
	.bind(node.section_number.as_deref())
	.bind(node.clause_number.as_deref())
	.bind(node.chunk.as_deref())
	.execute(&mut *executor)
	.await?;

	Ok(())
}

pub async fn insert_influence(
	executor: &mut PgConnection,
	source_uid: &str,
	target_uid: &str,
) -> Result<()> {
	if source_uid == target_uid {
		return Err(Error::InvalidArgument(format!(
			"clause cannot influence itself; uid={source_uid}"
		)));
	}

	sqlx::query(
		"\
INSERT INTO clause_influences (source_uid, target_uid)
VALUES ($1, $2)
ON CONFLICT (source_uid, target_uid) DO NOTHING",
	)
	.bind(source_uid)
	.bind(target_uid)
	.execute(&mut *executor)
	.await?;

	Ok(())
}
