//! Content extraction from heterogeneous provider wire payloads.
//!
//! Two response shapes are handled without assuming either: the
//! `choices[0].message` form and the typed-block `content` list form, with a
//! plain `text` field as last fallback. Extraction never fails; unexpected
//! shapes degrade to skipped entries or empty fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use traceherd_types::Event;

use crate::summary::{TokenTotals, model_key, text_form, usage_count};

/// Request parameters copied verbatim into extracts, except `tools` which is
/// reduced to tool names.
const PARAM_KEYS: [&str; 11] = [
    "temperature",
    "max_tokens",
    "top_p",
    "top_k",
    "frequency_penalty",
    "presence_penalty",
    "stop",
    "stream",
    "tools",
    "tool_choice",
    "response_format",
];

/// Truncate to `max_chars` characters, marking truncation with an ellipsis.
/// Character-based so multi-byte content never splits.
fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let clipped: String = text.chars().take(max_chars).collect();
        format!("{}...", clipped)
    } else {
        text.to_string()
    }
}

/// First `max_chars` characters, no marker.
fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// String form of an optional value, treating null/absent/empty as absent.
fn nonempty_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => Some(text_form(v)).filter(|s| !s.is_empty()),
    }
}

/// Flatten message content that may be a plain string or a list of blocks.
/// Blocks are filtered by `type` when one is required; `None` keeps every
/// mapping block (system prompts concatenate all of them).
fn flatten_content(content: &Value, block_type: Option<&str>) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter_map(Value::as_object)
                .filter(|block| match block_type {
                    Some(wanted) => block.get("type").and_then(Value::as_str) == Some(wanted),
                    None => true,
                })
                .map(|block| block.get("text").and_then(Value::as_str).unwrap_or(""))
                .collect();
            texts.join(" ")
        }
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One system prompt found in an event's request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPromptInfo {
    /// Position of the source event in the event list.
    pub index: usize,
    pub provider: String,
    pub model: String,
    /// Truncated to 500 characters.
    pub content: String,
    pub full_length: usize,
}

/// Find each event's system prompt: a `role == "system"` entry of
/// `request.messages` first, the top-level `request.system` field as
/// fallback. Events with neither are skipped.
pub fn extract_system_prompts(events: &[Event]) -> Vec<SystemPromptInfo> {
    let mut prompts = Vec::new();
    for (index, event) in events.iter().enumerate() {
        let Some(request) = &event.request else {
            continue;
        };

        let mut system_content = request
            .get("messages")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .find(|msg| msg.get("role").and_then(Value::as_str) == Some("system"))
            .map(|msg| flatten_content(msg.get("content").unwrap_or(&Value::Null), None))
            .unwrap_or_default();

        if system_content.is_empty() {
            system_content = request
                .get("system")
                .map(|s| flatten_content(s, None))
                .unwrap_or_default();
        }

        if system_content.is_empty() {
            continue;
        }

        prompts.push(SystemPromptInfo {
            index,
            provider: event.provider.clone(),
            model: model_key(request),
            full_length: system_content.chars().count(),
            content: preview(&system_content, 500),
        });
    }
    prompts
}

/// Sampling/tooling parameters of one request, allow-list filtered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestParamsInfo {
    pub index: usize,
    pub provider: String,
    pub api: String,
    pub model: String,
    /// The allow-listed keys present on this request, values verbatim
    /// (`tools` reduced to a name list).
    #[serde(flatten)]
    pub params: Map<String, Value>,
    /// Last user message, truncated to 200 characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message_preview: Option<String>,
}

fn tool_name(entry: &Value) -> Value {
    match entry.as_object() {
        Some(tool) => Value::String(
            tool.get("function")
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        ),
        None => Value::String(text_form(entry)),
    }
}

pub fn extract_request_params(events: &[Event]) -> Vec<RequestParamsInfo> {
    let mut params_list = Vec::new();
    for (index, event) in events.iter().enumerate() {
        let Some(request) = &event.request else {
            continue;
        };

        let mut params = Map::new();
        for key in PARAM_KEYS {
            let Some(value) = request.get(key) else {
                continue;
            };
            if key == "tools" && let Value::Array(tools) = value {
                params.insert(
                    key.to_string(),
                    Value::Array(tools.iter().map(tool_name).collect()),
                );
            } else {
                params.insert(key.to_string(), value.clone());
            }
        }

        let user_message_preview = request
            .get("messages")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
            .filter(|msg| msg.get("role").and_then(Value::as_str) == Some("user"))
            .next_back()
            .map(|msg| {
                let content =
                    flatten_content(msg.get("content").unwrap_or(&Value::Null), Some("text"));
                preview(&content, 200)
            });

        params_list.push(RequestParamsInfo {
            index,
            provider: event.provider.clone(),
            api: event.api.clone(),
            model: model_key(request),
            params,
            user_message_preview,
        });
    }
    params_list
}

/// One tool invocation surfaced from a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallInfo {
    pub name: String,
    /// First 100 characters of the arguments' string form.
    pub arguments_preview: String,
}

/// One response's extracted content and metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseInfo {
    pub index: usize,
    pub provider: String,
    pub model: String,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenTotals>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallInfo>,
    /// Truncated to 300 characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_preview: Option<String>,
    /// Untruncated length of the extracted content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

pub fn extract_responses(events: &[Event]) -> Vec<ResponseInfo> {
    let mut responses = Vec::new();
    for (index, event) in events.iter().enumerate() {
        let Some(response) = &event.response else {
            continue;
        };

        let model = nonempty_text(response.get("model"))
            .or_else(|| {
                event
                    .request
                    .as_ref()
                    .and_then(|request| nonempty_text(request.get("model")))
            })
            .unwrap_or_else(|| "unknown".to_string());

        let tokens = response
            .get("usage")
            .filter(|u| u.as_object().is_some_and(|m| !m.is_empty()))
            .map(|usage| TokenTotals {
                input: usage_count(usage, "prompt_tokens", "input_tokens"),
                output: usage_count(usage, "completion_tokens", "output_tokens"),
                total: usage
                    .get("total_tokens")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            });

        let mut content = String::new();
        let mut tool_calls = Vec::new();

        // choices[0].message shape
        let choices = response.get("choices").and_then(Value::as_array);
        if let Some(first) = choices.and_then(|c| c.first())
            && let Some(message) = first.get("message").and_then(Value::as_object)
        {
            if let Some(text) = message.get("content").and_then(Value::as_str) {
                content = text.to_string();
            }
            let calls: Vec<ToolCallInfo> = message
                .get("tool_calls")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_object)
                .map(|tc| {
                    let function = tc.get("function").and_then(Value::as_object);
                    ToolCallInfo {
                        name: function
                            .and_then(|f| f.get("name"))
                            .and_then(Value::as_str)
                            .unwrap_or("unknown")
                            .to_string(),
                        arguments_preview: clip(
                            &function
                                .and_then(|f| f.get("arguments"))
                                .map(text_form)
                                .unwrap_or_default(),
                            100,
                        ),
                    }
                })
                .collect();
            if !calls.is_empty() {
                tool_calls = calls;
            }
        }

        // typed content-block shape
        if content.is_empty() {
            match response.get("content") {
                Some(Value::Array(blocks)) => {
                    content = flatten_content(&Value::Array(blocks.clone()), Some("text"));
                    let uses: Vec<ToolCallInfo> = blocks
                        .iter()
                        .filter_map(Value::as_object)
                        .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
                        .map(|tu| ToolCallInfo {
                            name: tu
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or("unknown")
                                .to_string(),
                            arguments_preview: clip(
                                &tu.get("input").map(text_form).unwrap_or_default(),
                                100,
                            ),
                        })
                        .collect();
                    if !uses.is_empty() {
                        tool_calls = uses;
                    }
                }
                Some(Value::String(text)) => content = text.clone(),
                _ => {}
            }
        }

        // last fallback: plain text field
        if content.is_empty()
            && let Some(text) = response.get("text").and_then(Value::as_str)
        {
            content = text.to_string();
        }

        let (content_preview, content_length) = if content.is_empty() {
            (None, None)
        } else {
            (Some(preview(&content, 300)), Some(content.chars().count()))
        };

        let stop_reason = nonempty_text(response.get("stop_reason")).or_else(|| {
            choices
                .and_then(|c| c.first())
                .and_then(|first| nonempty_text(first.get("finish_reason")))
        });

        responses.push(ResponseInfo {
            index,
            provider: event.provider.clone(),
            model,
            duration_ms: event.duration_ms,
            tokens,
            tool_calls,
            content_preview,
            content_length,
            stop_reason,
        });
    }
    responses
}
