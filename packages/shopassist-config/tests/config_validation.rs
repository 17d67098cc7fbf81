use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use shopassist_config::{Config, Error};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_toml_with(section: &[&str], key: &str, value: Value) -> String {
	let mut root: Value =
		toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let mut table = root.as_table_mut().expect("Sample config must be a table.");

	for name in section {
		table = table
			.get_mut(*name)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Sample config must include [{name}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render sample config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("shopassist_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn base_config() -> Config {
	toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse test config.")
}

#[test]
fn sample_config_loads_and_normalizes() {
	let path = write_temp_config(SAMPLE_CONFIG_TOML.to_string());
	let result = shopassist_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Expected sample config to load.");

	assert_eq!(cfg.context.tokenizer_repo, None);
	assert_eq!(cfg.retrieval.adaptive.gap_threshold, 0.15);
	assert_eq!(cfg.retrieval.category_fusion.full_weight, 0.7);
	assert_eq!(cfg.storage.qdrant.category_full_name_vector, "full_embedding");
}

#[test]
fn missing_sections_fall_back_to_documented_defaults() {
	let mut root: Value = toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse config.");
	let table = root.as_table_mut().expect("Sample config must be a table.");

	table.remove("retrieval");
	table.remove("orchestrator");

	let cfg: Config = toml::from_str(&toml::to_string(&root).expect("Failed to render config."))
		.expect("Failed to parse trimmed config.");

	assert_eq!(cfg.retrieval.baseline_threshold, 0.3);
	assert_eq!(cfg.retrieval.knowledge_threshold, 0.3);
	assert_eq!(cfg.retrieval.adaptive.tight_std, 0.05);
	assert_eq!(cfg.retrieval.adaptive.tight_offset, 0.15);
	assert_eq!(cfg.retrieval.adaptive.loose_offset, 0.05);
	assert_eq!(cfg.retrieval.category_fusion.short_weight, 0.3);
	assert_eq!(cfg.orchestrator.history_window, 10);
	assert!(shopassist_config::validate(&cfg).is_ok());
}

#[test]
fn embedding_dimensions_must_match_vector_dim() {
	let payload = sample_toml_with(&["storage", "qdrant"], "vector_dim", Value::Integer(768));
	let path = write_temp_config(payload);
	let result = shopassist_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let err = result.expect_err("Expected dimension mismatch validation error.");

	assert!(
		err.to_string()
			.contains("providers.embedding.dimensions must match storage.qdrant.vector_dim."),
		"Unexpected error: {err}"
	);
}

#[test]
fn unreadable_config_reports_path() {
	let path = env::temp_dir().join("shopassist_config_missing_file.toml");
	let err = shopassist_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }), "Unexpected error: {err}");
}

#[test]
fn fusion_weights_must_sum_to_one() {
	let mut cfg = base_config();

	cfg.retrieval.category_fusion.full_weight = 0.8;

	let err = shopassist_config::validate(&cfg).expect_err("Expected fusion weight error.");

	assert!(
		err.to_string().contains("retrieval.category_fusion weights must sum to 1.0."),
		"Unexpected error: {err}"
	);
}

#[test]
fn fusion_weights_must_be_in_unit_range() {
	let mut cfg = base_config();

	cfg.retrieval.category_fusion.full_weight = 1.3;
	cfg.retrieval.category_fusion.short_weight = -0.3;

	let err = shopassist_config::validate(&cfg).expect_err("Expected fusion range error.");

	assert!(
		err.to_string().contains("retrieval.category_fusion.full_weight must be in the range"),
		"Unexpected error: {err}"
	);
}

#[test]
fn adaptive_offsets_must_be_non_negative_and_finite() {
	let mut cfg = base_config();

	cfg.retrieval.adaptive.tight_offset = -0.1;

	let err = shopassist_config::validate(&cfg).expect_err("Expected negative offset error.");

	assert!(
		err.to_string().contains("retrieval.adaptive.tight_offset must be zero or greater."),
		"Unexpected error: {err}"
	);

	cfg = base_config();
	cfg.retrieval.adaptive.gap_threshold = f32::NAN;

	let err = shopassist_config::validate(&cfg).expect_err("Expected non-finite gap error.");

	assert!(
		err.to_string().contains("retrieval.adaptive.gap_threshold must be a finite number."),
		"Unexpected error: {err}"
	);
}

#[test]
fn history_window_requires_anchor_and_tail() {
	let mut cfg = base_config();

	cfg.orchestrator.history_window = 1;

	let err = shopassist_config::validate(&cfg).expect_err("Expected history window error.");

	assert!(
		err.to_string().contains("orchestrator.history_window must be at least 2."),
		"Unexpected error: {err}"
	);
}

#[test]
fn tool_iterations_and_budget_must_be_positive() {
	let mut cfg = base_config();

	cfg.orchestrator.max_tool_iterations = 0;

	let err = shopassist_config::validate(&cfg).expect_err("Expected tool iteration error.");

	assert!(
		err.to_string().contains("orchestrator.max_tool_iterations must be greater than zero."),
		"Unexpected error: {err}"
	);

	cfg = base_config();
	cfg.context.token_budget = 0;

	let err = shopassist_config::validate(&cfg).expect_err("Expected token budget error.");

	assert!(
		err.to_string().contains("context.token_budget must be greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn check_endpoints_lists_missing_endpoints_without_failing_validation() {
	let mut cfg = base_config();

	cfg.storage.qdrant.url = String::new();
	cfg.providers.router.api_key = "  ".to_string();

	assert!(shopassist_config::validate(&cfg).is_ok());

	let missing: Vec<String> =
		shopassist_config::check_endpoints(&cfg).iter().map(ToString::to_string).collect();

	assert_eq!(
		missing,
		vec![
			"Missing required endpoint storage.qdrant.url.".to_string(),
			"Missing required endpoint providers.router.api_key.".to_string(),
		]
	);
}

#[test]
fn complete_config_has_no_missing_endpoints() {
	assert!(shopassist_config::check_endpoints(&base_config()).is_empty());
}
