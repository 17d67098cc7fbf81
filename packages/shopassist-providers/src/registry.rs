use std::{
	collections::HashMap,
	sync::{Arc, Mutex},
};

/// Process-wide cache of expensive clients and models keyed by model identity.
///
/// Construction for a key happens at most once; the registry lock is held while the
/// initializer runs. Entries are shared read-only afterwards.
pub struct Registry<T> {
	entries: Mutex<HashMap<String, Arc<T>>>,
}
impl<T> Registry<T> {
	pub fn new() -> Self {
		Self { entries: Mutex::new(HashMap::new()) }
	}

	pub fn get_or_try_init<F, E>(&self, key: &str, init: F) -> Result<Arc<T>, E>
	where
		F: FnOnce() -> Result<T, E>,
	{
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		if let Some(existing) = entries.get(key) {
			return Ok(existing.clone());
		}

		let value = Arc::new(init()?);

		entries.insert(key.to_string(), value.clone());

		Ok(value)
	}

	pub fn get(&self, key: &str) -> Option<Arc<T>> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner()).get(key).cloned()
	}

	pub fn len(&self) -> usize {
		self.entries.lock().unwrap_or_else(|err| err.into_inner()).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
impl<T> Default for Registry<T> {
	fn default() -> Self {
		Self::new()
	}
}

pub fn model_key(provider_id: &str, model: &str) -> String {
	format!("{provider_id}:{model}")
}
