use std::collections::HashMap;

use qdrant_client::qdrant::{
	Condition, Filter, PointId, Query, QueryPoints, QueryPointsBuilder, Range, ScoredPoint, Value as QdrantValue,
	VectorsSelector, point_id::PointIdOptions, value::Kind, vector_output,
	vectors_output::VectorsOptions,
};
use serde_json::{Map, Number, Value};

use crate::Result;
use shopassist_domain::{
	filter::FilterExpr,
	model::{SearchHit, SearchIndex, VectorQuery},
};

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub products_collection: String,
	pub knowledge_collection: String,
	pub categories_collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &shopassist_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self {
			client,
			products_collection: cfg.products_collection.clone(),
			knowledge_collection: cfg.knowledge_collection.clone(),
			categories_collection: cfg.categories_collection.clone(),
			vector_dim: cfg.vector_dim,
		})
	}

	pub fn collection(&self, index: SearchIndex) -> &str {
		match index {
			SearchIndex::Products => &self.products_collection,
			SearchIndex::Knowledge => &self.knowledge_collection,
			SearchIndex::Categories => &self.categories_collection,
		}
	}

	pub async fn search(&self, query: &VectorQuery) -> Result<Vec<SearchHit>> {
		let request = to_request(self.collection(query.index), query);
		let response = self.client.query(request).await?;

		Ok(response.result.into_iter().filter_map(|point| to_hit(point, query.index)).collect())
	}
}

pub fn to_request(collection: &str, query: &VectorQuery) -> QueryPoints {
	let mut search = QueryPointsBuilder::new(collection)
		.query(Query::new_nearest(query.vector.clone()))
		.using(query.field.as_str())
		.limit(u64::from(query.top_k))
		.with_payload(true);

	if let Some(expr) = query.filter.as_ref() {
		search = search.filter(to_filter(expr));
	}
	if !query.with_vectors.is_empty() {
		search = search.with_vectors(VectorsSelector { names: query.with_vectors.clone() });
	}
	if let Some(threshold) = query.score_threshold {
		search = search.score_threshold(threshold);
	}

	search.build()
}

/// Translates a predicate into a Qdrant filter. Conjunctions become `must`; any-of groups become
/// a nested `should`.
pub fn to_filter(expr: &FilterExpr) -> Filter {
	match expr {
		FilterExpr::All(clauses) => Filter::must(clauses.iter().map(to_condition)),
		other => Filter::must([to_condition(other)]),
	}
}

fn to_condition(expr: &FilterExpr) -> Condition {
	match expr {
		FilterExpr::Eq { field, value } => Condition::matches(field.as_str(), value.clone()),
		FilterExpr::Range { field, gte, lte } => Condition::range(
			field.as_str(),
			Range { gte: *gte, lte: *lte, ..Default::default() },
		),
		FilterExpr::AnyOf { field, values } => Condition::from(Filter::should(
			values.iter().map(|value| Condition::matches(field.as_str(), value.clone())),
		)),
		FilterExpr::All(clauses) => Condition::from(Filter::must(clauses.iter().map(to_condition))),
	}
}

fn to_hit(point: ScoredPoint, index: SearchIndex) -> Option<SearchHit> {
	let ScoredPoint { id, payload, score, vectors, .. } = point;
	let entity_id = payload_string(&payload, index.entity_key())
		.or_else(|| id.as_ref().and_then(point_id_to_string));
	let Some(entity_id) = entity_id else {
		tracing::warn!(entity_key = index.entity_key(), "Search hit missing entity id.");

		return None;
	};
	let text = payload_string(&payload, "text").unwrap_or_default();
	let metadata: Map<String, Value> =
		payload.into_iter().map(|(key, value)| (key, to_json(value))).collect();
	let vectors = vectors
		.and_then(|output| output.vectors_options)
		.map(named_vectors)
		.unwrap_or_default();

	Some(SearchHit { entity_id, score, text, metadata, vectors })
}

#[allow(deprecated)]
fn named_vectors(options: VectorsOptions) -> HashMap<String, Vec<f32>> {
	let dense = |output: qdrant_client::qdrant::VectorOutput| match output.vector {
		Some(vector_output::Vector::Dense(dense)) => dense.data,
		_ => output.data,
	};

	match options {
		VectorsOptions::Vectors(named) => {
			named.vectors.into_iter().map(|(name, output)| (name, dense(output))).collect()
		},
		VectorsOptions::Vector(output) => HashMap::from([(String::new(), dense(output))]),
	}
}

fn point_id_to_string(point_id: &PointId) -> Option<String> {
	match point_id.point_id_options.as_ref()? {
		PointIdOptions::Uuid(id) => Some(id.clone()),
		PointIdOptions::Num(id) => Some(id.to_string()),
	}
}

fn payload_string(payload: &HashMap<String, QdrantValue>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

fn to_json(value: QdrantValue) -> Value {
	match value.kind {
		Some(Kind::StringValue(text)) => Value::String(text),
		Some(Kind::IntegerValue(number)) => Value::from(number),
		Some(Kind::DoubleValue(number)) =>
			Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null),
		Some(Kind::BoolValue(flag)) => Value::Bool(flag),
		Some(Kind::ListValue(list)) => Value::Array(list.values.into_iter().map(to_json).collect()),
		Some(Kind::StructValue(object)) => Value::Object(
			object.fields.into_iter().map(|(key, value)| (key, to_json(value))).collect(),
		),
		Some(Kind::NullValue(_)) | None => Value::Null,
	}
}
