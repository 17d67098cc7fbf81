mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	AdaptiveThreshold, CategoryFusion, Config, Context, EmbeddingProviderConfig,
	LlmProviderConfig, Orchestrator, Postgres, Providers, Qdrant, Retrieval, Service, Storage,
};

use std::{fs, path::Path};

const FUSION_WEIGHT_TOLERANCE: f32 = 1e-3;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}
	if cfg.providers.embedding.batch_size == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.batch_size must be greater than zero.".to_string(),
		});
	}

	for (label, value) in [
		("retrieval.baseline_threshold", cfg.retrieval.baseline_threshold),
		("retrieval.knowledge_threshold", cfg.retrieval.knowledge_threshold),
		("retrieval.category_threshold", cfg.retrieval.category_threshold),
		("retrieval.adaptive.gap_threshold", cfg.retrieval.adaptive.gap_threshold),
		("retrieval.adaptive.tight_std", cfg.retrieval.adaptive.tight_std),
		("retrieval.adaptive.tight_offset", cfg.retrieval.adaptive.tight_offset),
		("retrieval.adaptive.loose_offset", cfg.retrieval.adaptive.loose_offset),
	] {
		if !value.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if value < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}

	let fusion = cfg.retrieval.category_fusion;

	for (label, weight) in [
		("retrieval.category_fusion.full_weight", fusion.full_weight),
		("retrieval.category_fusion.short_weight", fusion.short_weight),
	] {
		if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
			return Err(Error::Validation {
				message: format!("{label} must be in the range 0.0-1.0."),
			});
		}
	}

	if (fusion.full_weight + fusion.short_weight - 1.0).abs() > FUSION_WEIGHT_TOLERANCE {
		return Err(Error::Validation {
			message: "retrieval.category_fusion weights must sum to 1.0.".to_string(),
		});
	}
	if cfg.retrieval.product_top_k == 0 {
		return Err(Error::Validation {
			message: "retrieval.product_top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.retrieval.candidate_multiplier == 0 {
		return Err(Error::Validation {
			message: "retrieval.candidate_multiplier must be greater than zero.".to_string(),
		});
	}
	if cfg.context.token_budget == 0 {
		return Err(Error::Validation {
			message: "context.token_budget must be greater than zero.".to_string(),
		});
	}
	if cfg.orchestrator.max_tool_iterations == 0 {
		return Err(Error::Validation {
			message: "orchestrator.max_tool_iterations must be greater than zero.".to_string(),
		});
	}
	if cfg.orchestrator.history_window < 2 {
		return Err(Error::Validation {
			message: "orchestrator.history_window must be at least 2.".to_string(),
		});
	}
	if cfg.orchestrator.turn_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "orchestrator.turn_timeout_ms must be greater than zero.".to_string(),
		});
	}

	for (label, temperature) in [
		("providers.generation.temperature", cfg.providers.generation.temperature),
		("providers.router.temperature", cfg.providers.router.temperature),
	] {
		if !temperature.is_finite() || temperature < 0.0 {
			return Err(Error::Validation {
				message: format!("{label} must be a finite number, zero or greater."),
			});
		}
	}

	Ok(())
}

/// Lists required endpoints that are absent. These never fail a load; callers surface them
/// through health reporting.
pub fn check_endpoints(cfg: &Config) -> Vec<Error> {
	let mut missing = Vec::new();

	for (field, value) in [
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
		("storage.qdrant.url", &cfg.storage.qdrant.url),
		("providers.embedding.api_base", &cfg.providers.embedding.api_base),
		("providers.embedding.api_key", &cfg.providers.embedding.api_key),
		("providers.generation.api_base", &cfg.providers.generation.api_base),
		("providers.generation.api_key", &cfg.providers.generation.api_key),
		("providers.router.api_base", &cfg.providers.router.api_base),
		("providers.router.api_key", &cfg.providers.router.api_key),
	] {
		if value.trim().is_empty() {
			missing.push(Error::MissingEndpoint { field: field.to_string() });
		}
	}

	missing
}

fn normalize(cfg: &mut Config) {
	if cfg.context.tokenizer_repo.as_deref().map(|repo| repo.trim().is_empty()).unwrap_or(false) {
		cfg.context.tokenizer_repo = None;
	}
	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}
