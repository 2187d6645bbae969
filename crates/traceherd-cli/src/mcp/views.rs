//! Serializable view models for tool results.
//!
//! Views carry formatted timestamps/durations next to the raw numbers so an
//! agent reading the result needs no further conversion.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use traceherd_engine::{EvalCounts, TokenTotals, format_duration, format_timestamp};
use traceherd_types::{Event, FunctionEvent, Session, TraceNode};

/// One session with computed per-session counters.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: String,
    pub name: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub duration_ms: Option<f64>,
    pub duration: Option<String>,
    pub llm_call_count: usize,
    pub function_call_count: usize,
    pub total_event_count: usize,
    pub labels: BTreeMap<String, String>,
    pub meta: BTreeMap<String, Value>,
}

impl SessionView {
    pub fn new(session: &Session, events: &[Event], function_events: &[FunctionEvent]) -> Self {
        let llm_call_count = events
            .iter()
            .filter(|e| e.session_id == session.id)
            .count();
        let function_call_count = function_events
            .iter()
            .filter(|e| e.session_id == session.id)
            .count();
        let duration_ms = session.duration_ms();

        Self {
            id: session.id.clone(),
            name: session.name.clone(),
            started_at: format_timestamp(session.started_at),
            ended_at: session
                .ended_at
                .filter(|&ts| ts != 0.0)
                .map(format_timestamp),
            duration_ms,
            duration: duration_ms.map(format_duration),
            llm_call_count,
            function_call_count,
            total_event_count: llm_call_count + function_call_count,
            labels: session.labels.clone(),
            meta: session.meta.clone(),
        }
    }
}

/// Evaluation fields surfaced on trace nodes.
#[derive(Debug, Serialize)]
pub struct TraceEvalView {
    #[serde(rename = "type")]
    pub eval_type: Value,
    pub passed: Value,
    pub score: Value,
    pub feedback: Value,
}

/// Evaluation fields surfaced on LLM-call previews.
#[derive(Debug, Serialize)]
pub struct CallEvalView {
    #[serde(rename = "type")]
    pub eval_type: Value,
    pub passed: Value,
    pub score: Value,
}

fn field(evaluation: &Value, key: &str) -> Value {
    evaluation.get(key).cloned().unwrap_or(Value::Null)
}

impl TraceEvalView {
    fn new(evaluation: &Value) -> Self {
        Self {
            eval_type: field(evaluation, "eval_type"),
            passed: field(evaluation, "passed"),
            score: field(evaluation, "score"),
            feedback: field(evaluation, "feedback"),
        }
    }
}

impl CallEvalView {
    fn new(evaluation: &Value) -> Self {
        Self {
            eval_type: field(evaluation, "eval_type"),
            passed: field(evaluation, "passed"),
            score: field(evaluation, "score"),
        }
    }
}

/// One trace node, simplified for reading: type resolved, durations
/// formatted, children rendered recursively.
#[derive(Debug, Serialize)]
pub struct TraceNodeView {
    #[serde(rename = "type")]
    pub node_type: String,
    pub provider: Option<String>,
    pub api: Option<String>,
    pub duration_ms: f64,
    pub duration: String,
    pub span_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evaluations: Vec<TraceEvalView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TraceNodeView>,
}

impl TraceNodeView {
    pub fn new(node: &TraceNode) -> Self {
        let named = node.name.as_deref().is_some_and(|n| !n.is_empty());
        let node_type = node
            .event_type
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| {
                if named {
                    "function".to_string()
                } else {
                    "provider".to_string()
                }
            });

        Self {
            node_type,
            provider: node.provider.clone(),
            api: node.api.clone(),
            duration_ms: node.duration_ms,
            duration: format_duration(node.duration_ms),
            span_id: node.span_id.clone(),
            function_name: if named { node.name.clone() } else { None },
            module: if named { node.module.clone() } else { None },
            model: node.request.as_ref().and_then(|r| r.get("model")).cloned(),
            error: node.error.clone().filter(|e| !e.is_empty()),
            evaluations: node.evaluations.iter().map(TraceEvalView::new).collect(),
            children: node.children.iter().map(TraceNodeView::new).collect(),
        }
    }
}

/// LLM-call preview row in session detail.
#[derive(Debug, Serialize)]
pub struct LlmCallView {
    pub provider: String,
    pub api: String,
    pub model: Option<Value>,
    pub duration_ms: f64,
    pub tokens: Option<Value>,
    pub error: Option<String>,
    pub evaluations: Vec<CallEvalView>,
}

impl LlmCallView {
    pub fn new(event: &Event) -> Self {
        Self {
            provider: event.provider.clone(),
            api: event.api.clone(),
            model: event.request.as_ref().and_then(|r| r.get("model")).cloned(),
            duration_ms: event.duration_ms,
            tokens: event
                .response
                .as_ref()
                .and_then(|r| r.get("usage"))
                .cloned(),
            error: event.error.clone(),
            evaluations: event.evaluations.iter().map(CallEvalView::new).collect(),
        }
    }
}

/// Function-call preview row in session detail.
#[derive(Debug, Serialize)]
pub struct FunctionCallView {
    pub name: String,
    pub module: String,
    pub duration_ms: f64,
    pub error: Option<String>,
}

impl FunctionCallView {
    pub fn new(event: &FunctionEvent) -> Self {
        Self {
            name: event.name.clone(),
            module: event.module.clone(),
            duration_ms: event.duration_ms,
            error: event.error.clone(),
        }
    }
}

/// Aggregate statistics block of session detail.
#[derive(Debug, Serialize)]
pub struct SessionSummaryView {
    pub total_llm_calls: usize,
    pub total_function_calls: usize,
    pub total_tokens: TokenTotals,
    pub avg_latency_ms: f64,
    pub providers_used: Vec<String>,
    pub models_used: Vec<String>,
    pub provider_distribution: BTreeMap<String, usize>,
    pub model_distribution: BTreeMap<String, usize>,
    pub evaluations: EvalCounts,
    pub errors: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionDetailView {
    pub session: SessionView,
    pub summary: SessionSummaryView,
    pub trace_tree: Vec<TraceNodeView>,
    pub llm_calls: Vec<LlmCallView>,
    pub function_calls: Vec<FunctionCallView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListSessionsView {
    pub sessions: Vec<SessionView>,
    pub total: usize,
    pub returned: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchSessionsView {
    pub sessions: Vec<SessionView>,
    pub total_matches: usize,
    pub returned: usize,
    /// Echo of the non-default criteria that were applied.
    pub filters_applied: serde_json::Map<String, Value>,
}
