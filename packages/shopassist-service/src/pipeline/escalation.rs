use uuid::Uuid;

use shopassist_domain::{model::PipelineOutcome, usage::UsageMetadata};

use crate::{ShopAssistService, pipeline::PipelineRequest};

/// Short human-readable support ticket reference.
pub fn new_ticket_id() -> String {
	let id = Uuid::new_v4().simple().to_string().to_ascii_uppercase();

	format!("TKT-{}", &id[..10])
}

impl ShopAssistService {
	/// Hands the conversation to human support. No model or tool calls.
	pub(super) fn run_escalation(&self, request: PipelineRequest<'_>) -> PipelineOutcome {
		let ticket_id = new_ticket_id();
		let contact = &self.cfg.orchestrator.escalation_contact;

		tracing::info!(ticket_id = %ticket_id, query = request.query, "Escalating to human support.");

		PipelineOutcome {
			intent: request.intent,
			response: format!(
				"I've passed your request to our support team. Your ticket reference is {ticket_id}. A specialist will contact you shortly, and you can also reach us at {contact}."
			),
			sources: Vec::new(),
			usage: UsageMetadata::default(),
			ticket_id: Some(ticket_id),
		}
	}
}
