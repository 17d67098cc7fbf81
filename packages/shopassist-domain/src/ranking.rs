use std::{cmp::Ordering, collections::HashMap};

use shopassist_config::{AdaptiveThreshold, CategoryFusion, Retrieval};

use crate::model::{CategoryMatch, RankedResult, SearchHit};

/// Collapses hits to one result per owning entity, keeping the highest-scoring hit, ordered by
/// score descending.
pub fn aggregate_by_entity(hits: Vec<SearchHit>) -> Vec<RankedResult> {
	let mut best: HashMap<String, SearchHit> = HashMap::new();

	for hit in hits {
		match best.get(&hit.entity_id) {
			Some(existing) if existing.score >= hit.score => {},
			_ => {
				best.insert(hit.entity_id.clone(), hit);
			},
		}
	}

	let mut out: Vec<RankedResult> = best
		.into_values()
		.map(|hit| RankedResult {
			entity_id: hit.entity_id,
			score: hit.score,
			text: hit.text,
			metadata: hit.metadata,
		})
		.collect();

	out.sort_by(|a, b| cmp_score_desc(a.score, b.score).then_with(|| a.entity_id.cmp(&b.entity_id)));

	out
}

/// Score-distribution confidence policy applied to first-pass hits.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdaptivePolicy {
	pub baseline: f32,
	pub gap_threshold: f32,
	pub tight_std: f32,
	pub tight_offset: f32,
	pub loose_offset: f32,
}
impl AdaptivePolicy {
	pub fn new(baseline: f32, adaptive: AdaptiveThreshold) -> Self {
		Self {
			baseline,
			gap_threshold: adaptive.gap_threshold,
			tight_std: adaptive.tight_std,
			tight_offset: adaptive.tight_offset,
			loose_offset: adaptive.loose_offset,
		}
	}

	pub fn from_config(cfg: &Retrieval) -> Self {
		Self::new(cfg.baseline_threshold, cfg.adaptive)
	}

	/// Acceptance threshold for a score set. Tightly clustered scores get the larger offset.
	/// Never below the baseline.
	pub fn cutoff(&self, scores: &[f32]) -> f32 {
		let offset =
			if population_std(scores) < self.tight_std { self.tight_offset } else { self.loose_offset };

		self.baseline + offset.max(0.0)
	}

	/// Keeps the single best hit when it stands out from the runner-up by more than the gap
	/// threshold; otherwise keeps every hit at or above [`Self::cutoff`]. Output is ordered by
	/// score descending.
	pub fn select(&self, mut hits: Vec<SearchHit>) -> Vec<SearchHit> {
		hits.sort_by(|a, b| cmp_score_desc(a.score, b.score));

		if hits.len() >= 2 && hits[0].score - hits[1].score > self.gap_threshold {
			hits.truncate(1);
			hits.retain(|hit| hit.score >= self.baseline);

			return hits;
		}

		let scores: Vec<f32> = hits.iter().map(|hit| hit.score).collect();
		let cutoff = self.cutoff(&scores);

		hits.retain(|hit| hit.score >= cutoff);

		hits
	}
}

/// Weighted blend of full-path and short-label category similarities.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CategoryFusionPolicy {
	pub full_weight: f32,
	pub short_weight: f32,
}
impl CategoryFusionPolicy {
	pub fn fused_score(&self, full_similarity: f32, short_similarity: f32) -> f32 {
		self.full_weight * full_similarity + self.short_weight * short_similarity
	}

	/// Unions several scored category lists, keeping the higher score per id, and returns the
	/// best `top_k`.
	pub fn merge<I>(&self, sets: I, top_k: usize) -> Vec<CategoryMatch>
	where
		I: IntoIterator<Item = Vec<CategoryMatch>>,
	{
		let mut best: HashMap<String, CategoryMatch> = HashMap::new();

		for candidate in sets.into_iter().flatten() {
			match best.get(&candidate.id) {
				Some(existing) if existing.score >= candidate.score => {},
				_ => {
					best.insert(candidate.id.clone(), candidate);
				},
			}
		}

		let mut out: Vec<CategoryMatch> = best.into_values().collect();

		out.sort_by(|a, b| cmp_score_desc(a.score, b.score).then_with(|| a.id.cmp(&b.id)));
		out.truncate(top_k);

		out
	}
}
impl From<CategoryFusion> for CategoryFusionPolicy {
	fn from(cfg: CategoryFusion) -> Self {
		Self { full_weight: cfg.full_weight, short_weight: cfg.short_weight }
	}
}

pub fn cosine_similarity(lhs: &[f32], rhs: &[f32]) -> Option<f32> {
	if lhs.is_empty() || lhs.len() != rhs.len() {
		return None;
	}

	let mut dot = 0.0_f32;
	let mut lhs_norm = 0.0_f32;
	let mut rhs_norm = 0.0_f32;

	for (l, r) in lhs.iter().zip(rhs.iter()) {
		dot += l * r;
		lhs_norm += l * l;
		rhs_norm += r * r;
	}

	if lhs_norm <= f32::EPSILON || rhs_norm <= f32::EPSILON {
		return None;
	}

	Some((dot / (lhs_norm.sqrt() * rhs_norm.sqrt())).clamp(-1.0, 1.0))
}

pub fn population_std(scores: &[f32]) -> f32 {
	if scores.is_empty() {
		return 0.0;
	}

	let n = scores.len() as f32;
	let mean = scores.iter().sum::<f32>() / n;
	let variance = scores.iter().map(|score| (score - mean).powi(2)).sum::<f32>() / n;

	variance.sqrt()
}

fn cmp_score_desc(a: f32, b: f32) -> Ordering {
	b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

#[cfg(test)]
mod tests {
	use shopassist_config::AdaptiveThreshold;

	use crate::{
		model::{CategoryMatch, SearchHit},
		ranking::{
			AdaptivePolicy, CategoryFusionPolicy, aggregate_by_entity, cosine_similarity,
			population_std,
		},
	};

	const BASELINE: f32 = 0.3;

	fn policy() -> AdaptivePolicy {
		AdaptivePolicy::new(BASELINE, AdaptiveThreshold::default())
	}

	fn hit(entity_id: &str, score: f32) -> SearchHit {
		SearchHit { entity_id: entity_id.to_string(), score, ..Default::default() }
	}

	fn category(id: &str, score: f32) -> CategoryMatch {
		CategoryMatch {
			id: id.to_string(),
			name: id.to_string(),
			full_name: format!("Electronics > {id}"),
			score,
		}
	}

	#[test]
	fn aggregation_keeps_max_score_per_entity_in_descending_order() {
		let ranked = aggregate_by_entity(vec![
			hit("a", 0.40),
			hit("b", 0.70),
			hit("a", 0.90),
			hit("c", 0.55),
			hit("b", 0.20),
		]);
		let ids: Vec<&str> = ranked.iter().map(|r| r.entity_id.as_str()).collect();
		let scores: Vec<f32> = ranked.iter().map(|r| r.score).collect();

		assert_eq!(ids, vec!["a", "b", "c"]);
		assert_eq!(scores, vec![0.90, 0.70, 0.55]);
	}

	#[test]
	fn standout_best_hit_is_kept_alone() {
		let selected = policy().select(vec![hit("a", 0.70), hit("b", 0.95), hit("c", 0.65)]);

		assert_eq!(selected.len(), 1);
		assert_eq!(selected[0].entity_id, "b");
	}

	#[test]
	fn standout_best_hit_below_baseline_is_dropped() {
		assert!(policy().select(vec![hit("a", 0.25), hit("b", 0.05)]).is_empty());
	}

	#[test]
	fn tight_cluster_raises_cutoff_by_the_larger_offset() {
		let cutoff = policy().cutoff(&[0.60, 0.61, 0.59]);

		assert!((cutoff - (BASELINE + 0.15)).abs() < 1e-6, "cutoff: {cutoff}");
	}

	#[test]
	fn spread_scores_raise_cutoff_by_the_smaller_offset() {
		let cutoff = policy().cutoff(&[0.60, 0.40]);

		assert!((cutoff - (BASELINE + 0.05)).abs() < 1e-6, "cutoff: {cutoff}");
	}

	#[test]
	fn cutoff_never_drops_below_baseline() {
		let adaptive = AdaptiveThreshold { tight_offset: -0.2, loose_offset: -0.2, ..Default::default() };
		let policy = AdaptivePolicy::new(BASELINE, adaptive);

		assert!(policy.cutoff(&[0.5, 0.5]) >= BASELINE);
		assert!(policy.cutoff(&[0.9, 0.1]) >= BASELINE);
	}

	#[test]
	fn ambiguous_hits_below_cutoff_are_dropped() {
		let selected = policy().select(vec![hit("a", 0.50), hit("b", 0.48), hit("c", 0.30)]);
		let ids: Vec<&str> = selected.iter().map(|h| h.entity_id.as_str()).collect();

		assert_eq!(ids, vec!["a", "b"]);
	}

	#[test]
	fn nothing_survives_when_all_scores_are_weak() {
		assert!(policy().select(vec![hit("a", 0.33), hit("b", 0.32)]).is_empty());
		assert!(policy().select(Vec::new()).is_empty());
	}

	#[test]
	fn category_merge_keeps_higher_score_per_id() {
		let fusion = CategoryFusionPolicy { full_weight: 0.7, short_weight: 0.3 };
		let merged = fusion.merge(
			vec![
				vec![category("laptops", 0.81), category("tablets", 0.60)],
				vec![category("laptops", 0.76), category("monitors", 0.70)],
			],
			5,
		);

		assert_eq!(merged.iter().filter(|c| c.id == "laptops").count(), 1);
		assert_eq!(merged[0].id, "laptops");
		assert_eq!(merged[0].score, 0.81);
		assert_eq!(merged.len(), 3);
		assert_eq!(fusion.merge(vec![merged], 2).len(), 2);
	}

	#[test]
	fn fused_score_is_weighted_blend() {
		let fusion = CategoryFusionPolicy { full_weight: 0.7, short_weight: 0.3 };

		assert!((fusion.fused_score(0.9, 0.5) - 0.78).abs() < 1e-6);
	}

	#[test]
	fn cosine_similarity_handles_degenerate_vectors() {
		assert_eq!(cosine_similarity(&[], &[]), None);
		assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), None);
		assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
		assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap_or_default() - 1.0).abs() < 1e-6);
	}

	#[test]
	fn population_std_of_single_value_is_zero() {
		assert_eq!(population_std(&[0.7]), 0.0);
		assert!((population_std(&[0.6, 0.4]) - 0.1).abs() < 1e-6);
	}
}
