use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use shopassist_domain::{
	model::{Intent, Message, Product, Role, Session},
	preferences::UserPreferences,
};

#[derive(Debug, sqlx::FromRow)]
pub struct ProductRow {
	pub product_id: String,
	pub name: String,
	pub description: String,
	pub category: String,
	pub category_full: Vec<String>,
	pub price: f64,
	pub brand: String,
	pub rating: f64,
	pub review_count: i64,
	pub availability: Option<String>,
	pub product_url: Option<String>,
	pub image_url: Option<String>,
}
impl From<ProductRow> for Product {
	fn from(row: ProductRow) -> Self {
		Self {
			id: row.product_id,
			name: row.name,
			description: row.description,
			category: row.category,
			category_full: row.category_full,
			price: row.price,
			brand: row.brand,
			rating: row.rating,
			review_count: row.review_count,
			availability: row.availability,
			product_url: row.product_url,
			image_url: row.image_url,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct SessionRow {
	pub session_id: Uuid,
	pub user_id: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	pub user_preferences: Value,
	pub current_intent: Option<String>,
	pub metadata: Value,
}
impl SessionRow {
	pub fn into_session(self, messages: Vec<Message>) -> Session {
		let user_preferences: UserPreferences = serde_json::from_value(self.user_preferences)
			.unwrap_or_else(|err| {
				tracing::warn!(
					error = %err,
					session_id = %self.session_id,
					"Stored user preferences are malformed. Using defaults."
				);

				UserPreferences::default()
			});

		Session {
			id: self.session_id,
			user_id: self.user_id,
			created_at: self.created_at,
			updated_at: self.updated_at,
			messages,
			user_preferences,
			current_intent: self.current_intent.as_deref().and_then(Intent::parse),
			metadata: object_or_empty(self.metadata),
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRow {
	pub role: String,
	pub content: String,
	pub metadata: Value,
}
impl MessageRow {
	pub fn into_message(self) -> Option<Message> {
		let role = match self.role.as_str() {
			"user" => Role::User,
			"assistant" => Role::Assistant,
			other => {
				tracing::warn!(role = other, "Skipping stored message with unknown role.");

				return None;
			},
		};

		Some(Message { role, content: self.content, metadata: object_or_empty(self.metadata) })
	}
}

pub fn role_str(role: Role) -> &'static str {
	match role {
		Role::User => "user",
		Role::Assistant => "assistant",
	}
}

fn object_or_empty(value: Value) -> Map<String, Value> {
	match value {
		Value::Object(map) => map,
		_ => Map::new(),
	}
}
