use std::{
	collections::HashMap,
	sync::{
		Mutex,
		atomic::{AtomicBool, Ordering},
	},
};

use serde_json::{Map, Value};

use shopassist_domain::{
	model::{SearchHit, SearchIndex, VectorQuery},
	ranking,
};
use shopassist_service::{BoxFuture, Error, Result, VectorSearchProvider};

/// A stored point. With `score` set the point always matches at that score, otherwise it is
/// scored by cosine similarity against the queried vector field.
#[derive(Clone, Debug, Default)]
pub struct IndexedPoint {
	pub entity_id: String,
	pub text: String,
	pub metadata: Map<String, Value>,
	pub vectors: HashMap<String, Vec<f32>>,
	pub score: Option<f32>,
}
impl IndexedPoint {
	pub fn scored(entity_id: &str, text: &str, score: f32) -> Self {
		Self {
			entity_id: entity_id.to_string(),
			text: text.to_string(),
			score: Some(score),
			..Default::default()
		}
	}

	pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
		self.metadata.insert(key.to_string(), value.into());

		self
	}

	pub fn with_vector(mut self, field: &str, vector: Vec<f32>) -> Self {
		self.vectors.insert(field.to_string(), vector);

		self
	}
}

pub struct InMemoryVectorSearch {
	points: Mutex<HashMap<SearchIndex, Vec<IndexedPoint>>>,
	queries: Mutex<Vec<VectorQuery>>,
	failing: AtomicBool,
}
impl InMemoryVectorSearch {
	pub fn new() -> Self {
		Self {
			points: Mutex::new(HashMap::new()),
			queries: Mutex::new(Vec::new()),
			failing: AtomicBool::new(false),
		}
	}

	pub fn insert(&self, index: SearchIndex, point: IndexedPoint) {
		let mut points = self.points.lock().unwrap_or_else(|err| err.into_inner());

		points.entry(index).or_default().push(point);
	}

	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	/// Every query received so far, in order.
	pub fn queries(&self) -> Vec<VectorQuery> {
		self.queries.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn count(&self) -> usize {
		self.queries.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	fn run(&self, query: &VectorQuery) -> Vec<SearchHit> {
		let points = self.points.lock().unwrap_or_else(|err| err.into_inner());
		let mut hits: Vec<SearchHit> = points
			.get(&query.index)
			.into_iter()
			.flatten()
			.filter(|point| {
				query.filter.as_ref().is_none_or(|filter| filter.matches(&point.metadata))
			})
			.filter_map(|point| {
				let score = match point.score {
					Some(score) => score,
					None => ranking::cosine_similarity(
						&query.vector,
						point.vectors.get(&query.field)?,
					)?,
				};

				if query.score_threshold.is_some_and(|threshold| score < threshold) {
					return None;
				}

				let vectors = query
					.with_vectors
					.iter()
					.filter_map(|name| point.vectors.get(name).map(|v| (name.clone(), v.clone())))
					.collect();

				Some(SearchHit {
					entity_id: point.entity_id.clone(),
					score,
					text: point.text.clone(),
					metadata: point.metadata.clone(),
					vectors,
				})
			})
			.collect();

		hits.sort_by(|a, b| b.score.total_cmp(&a.score));
		hits.truncate(query.top_k as usize);

		hits
	}
}
impl Default for InMemoryVectorSearch {
	fn default() -> Self {
		Self::new()
	}
}
impl VectorSearchProvider for InMemoryVectorSearch {
	fn search<'a>(&'a self, query: &'a VectorQuery) -> BoxFuture<'a, Result<Vec<SearchHit>>> {
		self.queries.lock().unwrap_or_else(|err| err.into_inner()).push(query.clone());

		let result = if self.failing.load(Ordering::SeqCst) {
			Err(Error::UpstreamUnavailable {
				operation: "vector_search".to_string(),
				message: "In-memory index is offline.".to_string(),
			})
		} else {
			Ok(self.run(query))
		};

		Box::pin(async move { result })
	}
}
