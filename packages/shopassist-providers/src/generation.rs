use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{Error, Result};
use shopassist_config::LlmProviderConfig;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
	System,
	User,
	Assistant,
	Tool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ToolCall {
	pub id: String,
	pub name: String,
	/// Raw JSON arguments as produced by the model. Not validated here.
	pub arguments: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
	pub role: ChatRole,
	pub content: Option<String>,
	pub tool_calls: Vec<ToolCall>,
	pub tool_call_id: Option<String>,
}
impl ChatMessage {
	pub fn system(content: impl Into<String>) -> Self {
		Self::text(ChatRole::System, content)
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self::text(ChatRole::User, content)
	}

	pub fn assistant(content: impl Into<String>) -> Self {
		Self::text(ChatRole::Assistant, content)
	}

	pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
		Self { role: ChatRole::Assistant, content: None, tool_calls, tool_call_id: None }
	}

	pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
		Self {
			role: ChatRole::Tool,
			content: Some(content.into()),
			tool_calls: Vec::new(),
			tool_call_id: Some(tool_call_id.into()),
		}
	}

	fn text(role: ChatRole, content: impl Into<String>) -> Self {
		Self { role, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
	}

	pub fn to_wire(&self) -> Value {
		let mut obj = serde_json::Map::new();

		obj.insert("role".to_string(), serde_json::to_value(self.role).unwrap_or(Value::Null));
		obj.insert(
			"content".to_string(),
			self.content.as_ref().map(|c| Value::String(c.clone())).unwrap_or(Value::Null),
		);

		if !self.tool_calls.is_empty() {
			let calls = self
				.tool_calls
				.iter()
				.map(|call| {
					serde_json::json!({
						"id": call.id,
						"type": "function",
						"function": { "name": call.name, "arguments": call.arguments },
					})
				})
				.collect();

			obj.insert("tool_calls".to_string(), Value::Array(calls));
		}
		if let Some(id) = self.tool_call_id.as_ref() {
			obj.insert("tool_call_id".to_string(), Value::String(id.clone()));
		}

		Value::Object(obj)
	}
}

/// Function tool declaration offered to the model.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSpec {
	pub name: String,
	pub description: String,
	pub parameters: Value,
}
impl ToolSpec {
	fn to_wire(&self) -> Value {
		serde_json::json!({
			"type": "function",
			"function": {
				"name": self.name,
				"description": self.description,
				"parameters": self.parameters,
			},
		})
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
	pub text: Option<String>,
	pub tool_calls: Vec<ToolCall>,
	pub input_tokens: u64,
	pub output_tokens: u64,
}

pub async fn complete(
	client: &Client,
	cfg: &LlmProviderConfig,
	messages: &[ChatMessage],
	tools: &[ToolSpec],
) -> Result<Completion> {
	let mut body = base_body(cfg, messages);

	if !tools.is_empty() {
		body["tools"] = Value::Array(tools.iter().map(ToolSpec::to_wire).collect());
		body["tool_choice"] = Value::String("auto".to_string());
	}

	let json = post(client, cfg, &body).await?;

	parse_completion(json)
}

/// Requests a JSON object matching `schema` and parses it into `T`. Output that does not
/// deserialize is reported as [`Error::MalformedOutput`].
pub async fn complete_structured<T>(
	client: &Client,
	cfg: &LlmProviderConfig,
	messages: &[ChatMessage],
	schema_name: &str,
	schema: &Value,
) -> Result<(T, Completion)>
where
	T: DeserializeOwned,
{
	let mut body = base_body(cfg, messages);

	body["response_format"] = serde_json::json!({
		"type": "json_schema",
		"json_schema": { "name": schema_name, "schema": schema, "strict": true },
	});

	let json = post(client, cfg, &body).await?;
	let completion = parse_completion(json)?;
	let content = completion.text.as_deref().ok_or_else(|| Error::MalformedOutput {
		message: "Structured completion has no content.".to_string(),
	})?;
	let parsed = parse_structured(content)?;

	Ok((parsed, completion))
}

/// Strict JSON parse of model output. Surrounding whitespace and a single Markdown code fence
/// are tolerated; nothing else is.
pub fn parse_structured<T>(content: &str) -> Result<T>
where
	T: DeserializeOwned,
{
	let trimmed = strip_code_fence(content.trim());

	serde_json::from_str(trimmed).map_err(|err| Error::MalformedOutput { message: err.to_string() })
}

fn strip_code_fence(content: &str) -> &str {
	let Some(rest) = content.strip_prefix("```") else {
		return content;
	};
	let rest = rest.strip_prefix("json").unwrap_or(rest);

	rest.strip_suffix("```").map(str::trim).unwrap_or(content)
}

fn base_body(cfg: &LlmProviderConfig, messages: &[ChatMessage]) -> Value {
	serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_tokens,
		"messages": messages.iter().map(ChatMessage::to_wire).collect::<Vec<_>>(),
	})
}

async fn post(client: &Client, cfg: &LlmProviderConfig, body: &Value) -> Result<Value> {
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(body)
		.send()
		.await?;

	Ok(res.error_for_status()?.json().await?)
}

fn parse_completion(json: Value) -> Result<Completion> {
	let message = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.ok_or_else(|| Error::InvalidResponse {
			message: "Completion response is missing choices[0].message.".to_string(),
		})?;
	let text = message
		.get("content")
		.and_then(|c| c.as_str())
		.map(str::to_string)
		.filter(|c| !c.trim().is_empty());
	let mut tool_calls = Vec::new();

	if let Some(calls) = message.get("tool_calls").and_then(|v| v.as_array()) {
		for (idx, call) in calls.iter().enumerate() {
			let Some(function) = call.get("function") else {
				tracing::warn!(index = idx, "Tool call missing function object.");

				continue;
			};
			let Some(name) = function.get("name").and_then(|v| v.as_str()) else {
				tracing::warn!(index = idx, "Tool call missing function name.");

				continue;
			};
			let arguments = match function.get("arguments") {
				Some(Value::String(raw)) => raw.clone(),
				Some(other) => other.to_string(),
				None => "{}".to_string(),
			};
			let id = call
				.get("id")
				.and_then(|v| v.as_str())
				.map(str::to_string)
				.unwrap_or_else(|| format!("call_{idx}"));

			tool_calls.push(ToolCall { id, name: name.to_string(), arguments });
		}
	}

	let usage = json.get("usage");
	let input_tokens =
		usage.and_then(|u| u.get("prompt_tokens")).and_then(|v| v.as_u64()).unwrap_or(0);
	let output_tokens =
		usage.and_then(|u| u.get("completion_tokens")).and_then(|v| v.as_u64()).unwrap_or(0);

	Ok(Completion { text, tool_calls, input_tokens, output_tokens })
}
