use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Error, Result, ShopAssistService};
use shopassist_domain::model::Session;

impl ShopAssistService {
	pub async fn create_session(&self, user_id: Option<&str>) -> Result<Session> {
		let session_id = Uuid::new_v4();
		let session = self
			.providers
			.repository
			.create_session(session_id, user_id, OffsetDateTime::now_utc())
			.await?;

		tracing::info!(session_id = %session_id, "Created session.");

		Ok(session)
	}

	pub async fn get_session(&self, session_id: Uuid) -> Result<Session> {
		self.providers
			.repository
			.get_session(session_id)
			.await?
			.ok_or_else(|| Error::NotFound { message: format!("Session {session_id} not found.") })
	}

	/// Deletes a session once any in-flight turn on it has committed.
	pub async fn delete_session(&self, session_id: Uuid) -> Result<()> {
		let lock = self.sessions.get(session_id);
		let _guard = lock.lock().await;

		if !self.providers.repository.delete_session(session_id).await? {
			return Err(Error::NotFound { message: format!("Session {session_id} not found.") });
		}

		tracing::info!(session_id = %session_id, "Deleted session.");

		Ok(())
	}
}
