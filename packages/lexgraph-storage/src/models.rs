/// One clause in the influence graph, keyed by `uid`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ClauseNode {
	pub uid: String,
	pub title: Option<String>,
	pub section_number: Option<String>,
	pub clause_number: Option<String>,
	pub chunk: Option<String>,
}
