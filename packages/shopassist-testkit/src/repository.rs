use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use time::OffsetDateTime;
use uuid::Uuid;

use shopassist_domain::model::{Product, Session};
use shopassist_service::{BoxFuture, DocumentRepository, Result, TurnCommit};

/// Product catalog and session store held in process memory.
pub struct InMemoryRepository {
	products: Mutex<Vec<Product>>,
	sessions: Mutex<HashMap<Uuid, Session>>,
	commits: Arc<AtomicUsize>,
}
impl InMemoryRepository {
	pub fn new() -> Self {
		Self {
			products: Mutex::new(Vec::new()),
			sessions: Mutex::new(HashMap::new()),
			commits: Arc::new(AtomicUsize::new(0)),
		}
	}

	pub fn insert_product(&self, product: Product) {
		let mut products = self.products.lock().unwrap_or_else(|err| err.into_inner());

		products.retain(|existing| existing.id != product.id);
		products.push(product);
	}

	pub fn session(&self, session_id: Uuid) -> Option<Session> {
		self.sessions.lock().unwrap_or_else(|err| err.into_inner()).get(&session_id).cloned()
	}

	/// Number of turns committed.
	pub fn commit_count(&self) -> usize {
		self.commits.load(Ordering::SeqCst)
	}

	fn select<F>(&self, limit: u32, keep: F) -> Vec<Product>
	where
		F: Fn(&Product) -> bool,
	{
		let products = self.products.lock().unwrap_or_else(|err| err.into_inner());

		products.iter().filter(|product| keep(product)).take(limit as usize).cloned().collect()
	}
}
impl Default for InMemoryRepository {
	fn default() -> Self {
		Self::new()
	}
}
impl DocumentRepository for InMemoryRepository {
	fn get_by_id<'a>(&'a self, product_id: &'a str) -> BoxFuture<'a, Result<Option<Product>>> {
		let found = self.select(1, |product| product.id == product_id).into_iter().next();

		Box::pin(async move { Ok(found) })
	}

	fn get_by_ids<'a>(&'a self, product_ids: &'a [String]) -> BoxFuture<'a, Result<Vec<Product>>> {
		let found = self.select(u32::MAX, |product| product_ids.contains(&product.id));

		Box::pin(async move { Ok(found) })
	}

	fn search_by_category<'a>(
		&'a self,
		category: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Product>>> {
		let found = self.select(limit, |product| product.category == category);

		Box::pin(async move { Ok(found) })
	}

	fn search_by_price<'a>(
		&'a self,
		min_price: Option<f64>,
		max_price: Option<f64>,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Product>>> {
		let found = self.select(limit, |product| {
			min_price.is_none_or(|min| product.price >= min)
				&& max_price.is_none_or(|max| product.price <= max)
		});

		Box::pin(async move { Ok(found) })
	}

	fn search_by_text<'a>(
		&'a self,
		text: &'a str,
		limit: u32,
	) -> BoxFuture<'a, Result<Vec<Product>>> {
		let needle = text.to_lowercase();
		let found = self.select(limit, |product| {
			product.name.to_lowercase().contains(&needle)
				|| product.description.to_lowercase().contains(&needle)
		});

		Box::pin(async move { Ok(found) })
	}

	fn create_session<'a>(
		&'a self,
		session_id: Uuid,
		user_id: Option<&'a str>,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Session>> {
		let session = Session::new(session_id, user_id.map(str::to_string), now);

		self.sessions
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.insert(session_id, session.clone());

		Box::pin(async move { Ok(session) })
	}

	fn get_session<'a>(&'a self, session_id: Uuid) -> BoxFuture<'a, Result<Option<Session>>> {
		let found = self.session(session_id);

		Box::pin(async move { Ok(found) })
	}

	fn delete_session<'a>(&'a self, session_id: Uuid) -> BoxFuture<'a, Result<bool>> {
		let removed =
			self.sessions.lock().unwrap_or_else(|err| err.into_inner()).remove(&session_id);

		Box::pin(async move { Ok(removed.is_some()) })
	}

	fn commit_turn<'a>(&'a self, commit: &'a TurnCommit) -> BoxFuture<'a, Result<()>> {
		let mut sessions = self.sessions.lock().unwrap_or_else(|err| err.into_inner());
		let session = sessions
			.entry(commit.session_id)
			.or_insert_with(|| Session::new(commit.session_id, None, commit.now));

		session.messages.extend(commit.messages.iter().cloned());
		session.user_preferences = commit.user_preferences.clone();
		session.current_intent = commit.current_intent;
		session.updated_at = commit.now;

		drop(sessions);
		self.commits.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move { Ok(()) })
	}
}
