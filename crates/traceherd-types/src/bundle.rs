use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// The provider returns one atomic bundle per query. Shapes vary between
// provider versions, so every field is defaulted: a missing key must never
// fail deserialization, it just degrades to "nothing recorded".

/// One recorded agent run with metadata and a time span.
///
/// Immutable once received; identity is the `id` string, nothing more.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Session {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Unix epoch seconds.
    #[serde(default)]
    pub started_at: f64,
    /// Unix epoch seconds; absent while the session is still open.
    #[serde(default)]
    pub ended_at: Option<f64>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}

impl Session {
    /// Wall-clock span in milliseconds, when both endpoints were recorded.
    pub fn duration_ms(&self) -> Option<f64> {
        match self.ended_at {
            Some(ended) if ended != 0.0 && self.started_at != 0.0 => {
                Some((ended - self.started_at) * 1000.0)
            }
            _ => None,
        }
    }
}

/// One LLM request/response pair captured within a session.
///
/// `request` and `response` are provider wire payloads and carry no schema;
/// consumers probe them defensively.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Event {
    /// Foreign key into [`Session::id`]. Referential integrity is not
    /// enforced upstream; orphaned events are tolerated everywhere.
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub api: String,
    #[serde(default)]
    pub request: Option<Value>,
    #[serde(default)]
    pub response: Option<Value>,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub evaluations: Vec<Value>,
}

impl Event {
    /// Model name from the request payload, if one was recorded.
    pub fn model(&self) -> Option<&str> {
        self.request.as_ref()?.get("model")?.as_str()
    }

    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }
}

/// One instrumented function-call capture within a session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FunctionEvent {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub module: String,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub evaluations: Vec<Value>,
}

impl FunctionEvent {
    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }
}

/// One node of the hierarchical call tree captured for a session.
///
/// A node is either a provider call or a function call; `children` form an
/// ordered forest (multiple roots allowed). The tree is provider-constructed
/// at capture time and contains no cycles.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TraceNode {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub request: Option<Value>,
    #[serde(default)]
    pub duration_ms: f64,
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub evaluations: Vec<Value>,
    #[serde(default)]
    pub children: Vec<TraceNode>,
}

/// The atomic bundle returned by the trace provider for a session-set or
/// single-session query.
///
/// Every event's `session_id` *should* reference an entry of `sessions`, but
/// consumers filter by set membership rather than assuming it does.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionsResponse {
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub function_events: Vec<FunctionEvent>,
    #[serde(default)]
    pub trace_tree: Vec<TraceNode>,
    #[serde(default)]
    pub enh_prompt_traces: Vec<Value>,
    #[serde(default)]
    pub generated_at: f64,
    #[serde(default)]
    pub version: String,
}
