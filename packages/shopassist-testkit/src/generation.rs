use std::{
	collections::VecDeque,
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use serde_json::Value;

use shopassist_config::LlmProviderConfig;
use shopassist_providers::generation::{ChatMessage, Completion, ToolCall, ToolSpec};
use shopassist_service::{BoxFuture, Error, GenerationProvider, Result};

/// Text returned once the scripted completions run out.
pub const DEFAULT_REPLY: &str = "Scripted answer.";

/// Replays queued completions in order. Structured calls fail when nothing is queued, which
/// exercises the routing fallback.
pub struct ScriptedGeneration {
	replies: Mutex<VecDeque<Option<Completion>>>,
	structured: Mutex<VecDeque<Value>>,
	seen: Mutex<Vec<Vec<ChatMessage>>>,
	offered: Mutex<Vec<Vec<String>>>,
	calls: Arc<AtomicUsize>,
	structured_calls: Arc<AtomicUsize>,
	delay: Mutex<Option<Duration>>,
}
impl ScriptedGeneration {
	pub fn new() -> Self {
		Self {
			replies: Mutex::new(VecDeque::new()),
			structured: Mutex::new(VecDeque::new()),
			seen: Mutex::new(Vec::new()),
			offered: Mutex::new(Vec::new()),
			calls: Arc::new(AtomicUsize::new(0)),
			structured_calls: Arc::new(AtomicUsize::new(0)),
			delay: Mutex::new(None),
		}
	}

	pub fn push_text(&self, text: &str) {
		self.push(Some(Completion {
			text: Some(text.to_string()),
			tool_calls: Vec::new(),
			input_tokens: 100,
			output_tokens: 20,
		}));
	}

	pub fn push_tool_call(&self, name: &str, arguments: &str) {
		let call = ToolCall {
			id: format!("call_{}", self.calls.load(Ordering::SeqCst)),
			name: name.to_string(),
			arguments: arguments.to_string(),
		};

		self.push(Some(Completion {
			text: None,
			tool_calls: vec![call],
			input_tokens: 100,
			output_tokens: 10,
		}));
	}

	/// Queues a failed generation call.
	pub fn push_failure(&self) {
		self.push(None);
	}

	pub fn push_route(&self, route: Value) {
		self.structured.lock().unwrap_or_else(|err| err.into_inner()).push_back(route);
	}

	/// Holds every call for `delay` before answering.
	pub fn set_delay(&self, delay: Duration) {
		*self.delay.lock().unwrap_or_else(|err| err.into_inner()) = Some(delay);
	}

	/// Number of tool-capable generation calls.
	pub fn count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn structured_count(&self) -> usize {
		self.structured_calls.load(Ordering::SeqCst)
	}

	/// Messages sent on each tool-capable call, in call order.
	pub fn seen(&self) -> Vec<Vec<ChatMessage>> {
		self.seen.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	/// Tool names offered on each tool-capable call, in call order.
	pub fn offered(&self) -> Vec<Vec<String>> {
		self.offered.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn push(&self, reply: Option<Completion>) {
		self.replies.lock().unwrap_or_else(|err| err.into_inner()).push_back(reply);
	}

	fn delay(&self) -> Option<Duration> {
		*self.delay.lock().unwrap_or_else(|err| err.into_inner())
	}
}
impl Default for ScriptedGeneration {
	fn default() -> Self {
		Self::new()
	}
}
impl GenerationProvider for ScriptedGeneration {
	fn generate<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
		tools: &'a [ToolSpec],
	) -> BoxFuture<'a, Result<Completion>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.seen.lock().unwrap_or_else(|err| err.into_inner()).push(messages.to_vec());
			self.offered
				.lock()
				.unwrap_or_else(|err| err.into_inner())
				.push(tools.iter().map(|tool| tool.name.clone()).collect());

			if let Some(delay) = self.delay() {
				tokio::time::sleep(delay).await;
			}

			let next = self.replies.lock().unwrap_or_else(|err| err.into_inner()).pop_front();

			match next {
				Some(Some(completion)) => Ok(completion),
				Some(None) => Err(Error::UpstreamUnavailable {
					operation: "generation".to_string(),
					message: "Scripted failure.".to_string(),
				}),
				None => Ok(Completion {
					text: Some(DEFAULT_REPLY.to_string()),
					tool_calls: Vec::new(),
					input_tokens: 10,
					output_tokens: 5,
				}),
			}
		})
	}

	fn generate_structured<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_messages: &'a [ChatMessage],
		schema_name: &'a str,
		_schema: &'a Value,
	) -> BoxFuture<'a, Result<(Value, Completion)>> {
		Box::pin(async move {
			self.structured_calls.fetch_add(1, Ordering::SeqCst);

			if let Some(delay) = self.delay() {
				tokio::time::sleep(delay).await;
			}

			let next = self.structured.lock().unwrap_or_else(|err| err.into_inner()).pop_front();

			match next {
				Some(value) => {
					let completion =
						Completion { input_tokens: 50, output_tokens: 10, ..Default::default() };

					Ok((value, completion))
				},
				None => Err(Error::Parse { message: format!("No scripted {schema_name} answer.") }),
			}
		})
	}
}
