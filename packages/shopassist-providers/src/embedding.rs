use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};
use shopassist_config::EmbeddingProviderConfig;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EmbeddedText {
	pub text: String,
	pub vector: Vec<f32>,
}

pub async fn embed(
	client: &Client,
	cfg: &EmbeddingProviderConfig,
	texts: &[String],
) -> Result<Vec<Vec<f32>>> {
	if texts.is_empty() {
		return Ok(Vec::new());
	}

	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;
	let vectors = parse_embedding_response(json)?;

	if vectors.len() != texts.len() {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding response has {} vectors for {} inputs.",
				vectors.len(),
				texts.len()
			),
		});
	}

	for vector in &vectors {
		check_dimensions(vector, cfg.dimensions)?;
	}

	Ok(vectors)
}

/// Embeds `texts` in request batches of at most `batch_size`, preserving input order.
pub async fn embed_batch(
	client: &Client,
	cfg: &EmbeddingProviderConfig,
	texts: &[String],
	batch_size: usize,
) -> Result<Vec<EmbeddedText>> {
	let mut out = Vec::with_capacity(texts.len());

	for batch in texts.chunks(batch_size.max(1)) {
		let vectors = embed(client, cfg, batch).await?;

		out.extend(
			batch
				.iter()
				.zip(vectors)
				.map(|(text, vector)| EmbeddedText { text: text.clone(), vector }),
		);
	}

	Ok(out)
}

pub fn check_dimensions(vector: &[f32], expected: u32) -> Result<()> {
	if vector.len() != expected as usize {
		return Err(Error::InvalidResponse {
			message: format!(
				"Embedding has {} dimensions, expected {expected}.",
				vector.len()
			),
		});
	}

	Ok(())
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json.get("data").and_then(|v| v.as_array()).ok_or_else(|| {
		Error::InvalidResponse { message: "Embedding response is missing data array.".to_string() }
	})?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item.get("embedding").and_then(|v| v.as_array()).ok_or_else(|| {
			Error::InvalidResponse { message: "Embedding item missing embedding array.".to_string() }
		})?;
		let mut vec = Vec::with_capacity(embedding.len());

		for value in embedding {
			let number = value.as_f64().ok_or_else(|| Error::InvalidResponse {
				message: "Embedding value must be numeric.".to_string(),
			})?;

			vec.push(number as f32);
		}

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}
