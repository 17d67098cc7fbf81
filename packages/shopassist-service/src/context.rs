use tokenizers::Tokenizer;

use shopassist_domain::model::{EnrichedResult, KnowledgeHit};

/// Separator placed between serialized context items.
pub const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Something that can be serialized into a prompt context block.
pub trait ContextItem {
	/// Renders the item as the `position`-th (1-based) block.
	fn render(&self, position: usize) -> String;
}
impl ContextItem for EnrichedResult {
	fn render(&self, position: usize) -> String {
		let product = &self.product;

		format!(
			"Product {position}: {}\nPrice: ${:.2}\nCategory: {}\nBrand: {}\nAvailable: {}\nDescription: {}\nRelevance Score: {:.3}",
			product.name,
			product.price,
			product.category,
			product.brand,
			product.availability.as_deref().unwrap_or("Unknown"),
			product.description,
			self.relevance_score,
		)
	}
}
impl ContextItem for KnowledgeHit {
	fn render(&self, position: usize) -> String {
		format!("Source {position} [{}]:\n{}", self.doc_id, self.text)
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssembledContext {
	pub text: String,
	/// Tokens spent on included items.
	pub token_count: usize,
	/// Number of leading items that fit.
	pub included: usize,
}
impl AssembledContext {
	pub fn is_empty(&self) -> bool {
		self.included == 0
	}
}

/// Packs items in order until the next one would exceed `token_budget`. Items are never
/// truncated.
pub fn build_context<T>(items: &[T], token_budget: usize, tokenizer: &Tokenizer) -> AssembledContext
where
	T: ContextItem,
{
	let mut blocks = Vec::new();
	let mut token_count = 0;

	for (idx, item) in items.iter().enumerate() {
		let block = item.render(idx + 1);
		let tokens = match tokenizer.encode(block.as_str(), false) {
			Ok(encoding) => encoding.len(),
			Err(err) => {
				tracing::error!(error = %err, position = idx + 1, "Failed to tokenize context item.");

				break;
			},
		};

		if token_count + tokens > token_budget {
			break;
		}

		token_count += tokens;

		blocks.push(block);
	}

	AssembledContext { included: blocks.len(), text: blocks.join(CONTEXT_DELIMITER), token_count }
}

#[cfg(test)]
mod tests {
	use ahash::AHashMap;
	use tokenizers::{Tokenizer, models::wordlevel::WordLevel, pre_tokenizers::whitespace::Whitespace};

	use crate::context::{CONTEXT_DELIMITER, ContextItem, build_context};
	use shopassist_domain::model::{EnrichedResult, KnowledgeHit, Product};

	fn tokenizer() -> Tokenizer {
		let mut vocab = AHashMap::new();

		vocab.insert("<unk>".to_string(), 0);

		let model = WordLevel::builder()
			.vocab(vocab)
			.unk_token("<unk>".to_string())
			.build()
			.expect("Failed to build test tokenizer.");
		let mut tokenizer = Tokenizer::new(model);

		tokenizer.with_pre_tokenizer(Some(Whitespace));

		tokenizer
	}

	fn chunk(doc_id: &str, words: usize) -> KnowledgeHit {
		KnowledgeHit {
			doc_id: doc_id.to_string(),
			doc_type: "policy".to_string(),
			text: vec!["word"; words].join(" "),
			score: 0.5,
		}
	}

	fn cost(item: &KnowledgeHit, position: usize, tokenizer: &Tokenizer) -> usize {
		tokenizer.encode(item.render(position).as_str(), false).expect("encode failed").len()
	}

	#[test]
	fn stops_before_the_item_that_would_overflow() {
		let tokenizer = tokenizer();
		let items = vec![chunk("a", 10), chunk("b", 10), chunk("c", 10)];
		let first = cost(&items[0], 1, &tokenizer);
		let second = cost(&items[1], 2, &tokenizer);
		let budget = first + second + 3;
		let context = build_context(&items, budget, &tokenizer);

		assert_eq!(context.included, 2);
		assert_eq!(context.token_count, first + second);
		assert!(context.token_count <= budget);
		assert_eq!(context.text.matches(CONTEXT_DELIMITER).count(), 1);
		assert!(context.text.starts_with("Source 1 [a]:\n"));
		assert!(!context.text.contains("[c]"));
	}

	#[test]
	fn never_exceeds_budget_for_any_budget() {
		let tokenizer = tokenizer();
		let items: Vec<KnowledgeHit> = (0..6).map(|i| chunk(&format!("d{i}"), 3 + i * 4)).collect();

		for budget in 0..120 {
			let context = build_context(&items, budget, &tokenizer);

			assert!(context.token_count <= budget);

			if context.included > 0 {
				let last = cost(&items[context.included - 1], context.included, &tokenizer);

				assert!(context.token_count - last <= budget);
			}
		}
	}

	#[test]
	fn an_oversized_first_item_yields_empty_context() {
		let tokenizer = tokenizer();
		let context = build_context(&[chunk("big", 50), chunk("small", 1)], 10, &tokenizer);

		assert!(context.is_empty());
		assert_eq!(context.text, "");
	}

	#[test]
	fn assembly_is_deterministic() {
		let tokenizer = tokenizer();
		let items = vec![chunk("a", 4), chunk("b", 4)];

		assert_eq!(build_context(&items, 40, &tokenizer), build_context(&items, 40, &tokenizer));
	}

	#[test]
	fn products_render_price_and_score() {
		let result = EnrichedResult {
			product: Product {
				id: "p1".to_string(),
				name: "Aero 14".to_string(),
				price: 899.5,
				category: "Laptops".to_string(),
				brand: "Acme".to_string(),
				availability: Some("In Stock".to_string()),
				description: "Light laptop.".to_string(),
				..Default::default()
			},
			relevance_score: 0.8234,
			matched_text: String::new(),
		};
		let block = result.render(2);

		assert!(block.starts_with("Product 2: Aero 14\nPrice: $899.50\n"));
		assert!(block.contains("Available: In Stock"));
		assert!(block.ends_with("Relevance Score: 0.823"));
	}
}
