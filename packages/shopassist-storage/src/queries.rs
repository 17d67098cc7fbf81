use serde_json::Value;
use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{MessageRow, ProductRow, SessionRow, role_str},
};
use shopassist_domain::model::{Intent, Message, Product};

const PRODUCT_COLUMNS: &str = "\
product_id,
	name,
	description,
	category,
	category_full,
	price,
	brand,
	rating,
	review_count,
	availability,
	product_url,
	image_url";

pub async fn get_product<'e, E>(executor: E, product_id: &str) -> Result<Option<Product>>
where
	E: PgExecutor<'e>,
{
	let sql = format!("SELECT\n\t{PRODUCT_COLUMNS}\nFROM products\nWHERE product_id = $1\nLIMIT 1");
	let row = sqlx::query_as::<_, ProductRow>(&sql).bind(product_id).fetch_optional(executor).await?;

	Ok(row.map(Product::from))
}

/// Rows come back in no particular order; callers join by id.
pub async fn get_products<'e, E>(executor: E, product_ids: &[String]) -> Result<Vec<Product>>
where
	E: PgExecutor<'e>,
{
	if product_ids.is_empty() {
		return Ok(Vec::new());
	}

	let sql = format!("SELECT\n\t{PRODUCT_COLUMNS}\nFROM products\nWHERE product_id = ANY($1)");
	let rows = sqlx::query_as::<_, ProductRow>(&sql).bind(product_ids).fetch_all(executor).await?;

	Ok(rows.into_iter().map(Product::from).collect())
}

pub async fn search_products_by_category<'e, E>(
	executor: E,
	category: &str,
	limit: i64,
) -> Result<Vec<Product>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT\n\t{PRODUCT_COLUMNS}\nFROM products\nWHERE category = $1\nORDER BY rating DESC, product_id\nLIMIT $2"
	);
	let rows = sqlx::query_as::<_, ProductRow>(&sql)
		.bind(category)
		.bind(limit)
		.fetch_all(executor)
		.await?;

	Ok(rows.into_iter().map(Product::from).collect())
}

pub async fn search_products_by_price<'e, E>(
	executor: E,
	min_price: Option<f64>,
	max_price: Option<f64>,
	limit: i64,
) -> Result<Vec<Product>>
where
	E: PgExecutor<'e>,
{
	let sql = format!(
		"SELECT\n\t{PRODUCT_COLUMNS}\nFROM products\nWHERE ($1::float8 IS NULL OR price >= $1)\n\tAND ($2::float8 IS NULL OR price <= $2)\nORDER BY price, product_id\nLIMIT $3"
	);
	let rows = sqlx::query_as::<_, ProductRow>(&sql)
		.bind(min_price)
		.bind(max_price)
		.bind(limit)
		.fetch_all(executor)
		.await?;

	Ok(rows.into_iter().map(Product::from).collect())
}

pub async fn search_products_by_text<'e, E>(
	executor: E,
	text: &str,
	limit: i64,
) -> Result<Vec<Product>>
where
	E: PgExecutor<'e>,
{
	let pattern = format!("%{}%", escape_like(text.trim()));
	let sql = format!(
		"SELECT\n\t{PRODUCT_COLUMNS}\nFROM products\nWHERE name ILIKE $1 OR description ILIKE $1\nORDER BY rating DESC, product_id\nLIMIT $2"
	);
	let rows = sqlx::query_as::<_, ProductRow>(&sql)
		.bind(pattern)
		.bind(limit)
		.fetch_all(executor)
		.await?;

	Ok(rows.into_iter().map(Product::from).collect())
}

pub async fn insert_session<'e, E>(
	executor: E,
	session_id: Uuid,
	user_id: Option<&str>,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO sessions (session_id, user_id, created_at, updated_at)
VALUES ($1, $2, $3, $3)
ON CONFLICT (session_id) DO NOTHING",
	)
	.bind(session_id)
	.bind(user_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_session_row<'e, E>(executor: E, session_id: Uuid) -> Result<Option<SessionRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, SessionRow>(
		"\
SELECT
	session_id,
	user_id,
	created_at,
	updated_at,
	user_preferences,
	current_intent,
	metadata
FROM sessions
WHERE session_id = $1",
	)
	.bind(session_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn list_messages<'e, E>(executor: E, session_id: Uuid) -> Result<Vec<Message>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, MessageRow>(
		"\
SELECT role, content, metadata
FROM session_messages
WHERE session_id = $1
ORDER BY message_id",
	)
	.bind(session_id)
	.fetch_all(executor)
	.await?;

	Ok(rows.into_iter().filter_map(MessageRow::into_message).collect())
}

pub async fn delete_session<'e, E>(executor: E, session_id: Uuid) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query("DELETE FROM sessions WHERE session_id = $1")
		.bind(session_id)
		.execute(executor)
		.await?;

	Ok(result.rows_affected() > 0)
}

pub async fn insert_message<'e, E>(
	executor: E,
	session_id: Uuid,
	message: &Message,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO session_messages (session_id, role, content, metadata, created_at)
VALUES ($1, $2, $3, $4, $5)",
	)
	.bind(session_id)
	.bind(role_str(message.role))
	.bind(message.content.as_str())
	.bind(Value::Object(message.metadata.clone()))
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn update_session_state<'e, E>(
	executor: E,
	session_id: Uuid,
	current_intent: Option<Intent>,
	user_preferences: &Value,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE sessions
SET current_intent = $2, user_preferences = $3, updated_at = $4
WHERE session_id = $1",
	)
	.bind(session_id)
	.bind(current_intent.map(Intent::as_str))
	.bind(user_preferences)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

fn escape_like(raw: &str) -> String {
	raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
	use crate::queries::escape_like;

	#[test]
	fn like_wildcards_are_escaped() {
		assert_eq!(escape_like("100%_cotton\\"), "100\\%\\_cotton\\\\");
		assert_eq!(escape_like("usb c"), "usb c");
	}
}
