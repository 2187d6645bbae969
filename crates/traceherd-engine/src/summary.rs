//! Stateless reducers over event and function-event lists.
//!
//! All inputs come from an adversarial, schema-less upstream: reducers never
//! fail on unexpected shapes, they degrade to zero / "unknown" / skip.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use traceherd_types::{Event, FunctionEvent, TraceNode};

/// Hard ceiling on trace recursion. Provider-constructed trees are acyclic,
/// but depth is still capped rather than trusted.
const MAX_TRACE_DEPTH: usize = 256;

/// Token totals accumulated from `response.usage` payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

/// Usage counter with a fallback key: the primary key wins unless it is
/// missing or zero (providers disagree on naming and some emit zeros).
pub(crate) fn usage_count(usage: &Value, primary: &str, fallback: &str) -> u64 {
    let read = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
    match read(primary) {
        0 => read(fallback),
        n => n,
    }
}

pub fn calc_total_tokens(events: &[Event]) -> TokenTotals {
    let mut totals = TokenTotals::default();
    for event in events {
        let Some(usage) = event.response.as_ref().and_then(|r| r.get("usage")) else {
            continue;
        };
        totals.input += usage_count(usage, "prompt_tokens", "input_tokens");
        totals.output += usage_count(usage, "completion_tokens", "output_tokens");
        totals.total += usage.get("total_tokens").and_then(Value::as_u64).unwrap_or(0);
    }
    totals
}

/// Arithmetic mean of event latencies; 0 for an empty sequence.
pub fn calc_avg_latency(events: &[Event]) -> f64 {
    if events.is_empty() {
        return 0.0;
    }
    events.iter().map(|e| e.duration_ms).sum::<f64>() / events.len() as f64
}

pub fn count_errors(events: &[Event], function_events: &[FunctionEvent]) -> usize {
    events.iter().filter(|e| e.has_error()).count()
        + function_events.iter().filter(|e| e.has_error()).count()
}

pub fn provider_distribution(events: &[Event]) -> BTreeMap<String, usize> {
    let mut dist = BTreeMap::new();
    for event in events {
        *dist.entry(event.provider.clone()).or_insert(0) += 1;
    }
    dist
}

/// String form used wherever untyped JSON values are matched or displayed:
/// strings verbatim, everything else as its JSON rendering.
pub(crate) fn text_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Model name for distribution purposes: `"unknown"` when the request
/// carries no model key.
pub(crate) fn model_key(request: &Value) -> String {
    request
        .get("model")
        .map(text_form)
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn model_distribution(events: &[Event]) -> BTreeMap<String, usize> {
    let mut dist = BTreeMap::new();
    for event in events {
        if let Some(request) = &event.request {
            *dist.entry(model_key(request)).or_insert(0) += 1;
        }
    }
    dist
}

pub fn function_counts(function_events: &[FunctionEvent]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for event in function_events {
        if !event.name.is_empty() {
            *counts.entry(event.name.clone()).or_insert(0) += 1;
        }
    }
    counts
}

/// The canonical evaluation-failure rule, used everywhere pass/fail is
/// computed: failed iff `passed == false`, `result == false`, `status`
/// (lowercased) is one of failed/fail/error, or `success == false`.
/// Non-mapping values are never failed.
pub fn eval_is_failed(evaluation: &Value) -> bool {
    let Some(map) = evaluation.as_object() else {
        return false;
    };
    if map.get("passed").and_then(Value::as_bool) == Some(false) {
        return true;
    }
    if map.get("result").and_then(Value::as_bool) == Some(false) {
        return true;
    }
    if let Some(status) = map.get("status") {
        let status = match status {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if matches!(status.to_lowercase().as_str(), "failed" | "fail" | "error") {
            return true;
        }
    }
    map.get("success").and_then(Value::as_bool) == Some(false)
}

/// Evaluation pass/fail tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl EvalCounts {
    /// Always within [0, 1]; exactly 0 when nothing was evaluated.
    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.passed as f64 / self.total as f64
    }
}

pub fn count_evaluations(events: &[Event], function_events: &[FunctionEvent]) -> EvalCounts {
    let all_evals = events
        .iter()
        .flat_map(|e| e.evaluations.iter())
        .chain(function_events.iter().flat_map(|e| e.evaluations.iter()));

    let mut counts = EvalCounts::default();
    for evaluation in all_evals {
        counts.total += 1;
        if eval_is_failed(evaluation) {
            counts.failed += 1;
        } else {
            counts.passed += 1;
        }
    }
    counts
}

fn node_depth(node: &TraceNode, remaining: usize) -> usize {
    if node.children.is_empty() || remaining == 0 {
        return 1;
    }
    1 + node
        .children
        .iter()
        .map(|c| node_depth(c, remaining - 1))
        .max()
        .unwrap_or(0)
}

/// Maximum depth of the trace forest: a leaf counts 1, the empty forest 0.
pub fn trace_depth(nodes: &[TraceNode]) -> usize {
    nodes
        .iter()
        .map(|n| node_depth(n, MAX_TRACE_DEPTH))
        .max()
        .unwrap_or(0)
}

/// Human-readable error lines: `[provider/api] message` for LLM calls,
/// `[fn:name] message` for function calls. No deduplication.
pub fn errors_list(events: &[Event], function_events: &[FunctionEvent]) -> Vec<String> {
    let mut errors = Vec::new();
    for event in events {
        if let Some(error) = event.error.as_deref().filter(|e| !e.is_empty()) {
            errors.push(format!("[{}/{}] {}", event.provider, event.api, error));
        }
    }
    for event in function_events {
        if let Some(error) = event.error.as_deref().filter(|e| !e.is_empty()) {
            errors.push(format!("[fn:{}] {}", event.name, error));
        }
    }
    errors
}

/// Format milliseconds for display: "500ms", "5.5s", "1.5m".
pub fn format_duration(ms: f64) -> String {
    if ms < 1000.0 {
        format!("{:.0}ms", ms)
    } else if ms < 60_000.0 {
        format!("{:.1}s", ms / 1000.0)
    } else {
        format!("{:.1}m", ms / 60_000.0)
    }
}

/// Format Unix seconds as an ISO-style timestamp (UTC, second precision).
pub fn format_timestamp(ts: f64) -> String {
    let secs = ts.trunc() as i64;
    let nanos = ((ts - ts.trunc()) * 1e9) as u32;
    match chrono::DateTime::from_timestamp(secs, nanos) {
        Some(dt) => dt.naive_utc().format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

/// Round to two decimals for reported averages and deltas.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_with_duration(duration_ms: f64) -> Event {
        Event {
            session_id: "s1".to_string(),
            duration_ms,
            ..Default::default()
        }
    }

    #[test]
    fn test_avg_latency_empty_is_zero() {
        assert_eq!(calc_avg_latency(&[]), 0.0);
    }

    #[test]
    fn test_avg_latency_is_arithmetic_mean() {
        let events = vec![event_with_duration(100.0), event_with_duration(300.0)];
        assert_eq!(calc_avg_latency(&events), 200.0);
    }

    #[test]
    fn test_token_totals_with_fallback_keys() {
        let events = vec![
            Event {
                response: Some(json!({"usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}})),
                ..Default::default()
            },
            // Zero primary keys fall back to the alternate naming.
            Event {
                response: Some(json!({"usage": {"prompt_tokens": 0, "input_tokens": 7, "output_tokens": 3, "total_tokens": 10}})),
                ..Default::default()
            },
            // No usage at all contributes nothing.
            Event {
                response: Some(json!({"choices": []})),
                ..Default::default()
            },
            Event::default(),
        ];

        let totals = calc_total_tokens(&events);
        assert_eq!(totals.input, 17);
        assert_eq!(totals.output, 8);
        assert_eq!(totals.total, 25);
    }

    #[test]
    fn test_eval_failure_rule() {
        assert!(!eval_is_failed(&json!({})));
        assert!(eval_is_failed(&json!({"passed": false})));
        assert!(!eval_is_failed(&json!({"passed": true})));
        assert!(eval_is_failed(&json!({"result": false})));
        assert!(eval_is_failed(&json!({"status": "ERROR"})));
        assert!(eval_is_failed(&json!({"status": "Fail"})));
        assert!(!eval_is_failed(&json!({"status": "ok"})));
        assert!(eval_is_failed(&json!({"success": false})));
        assert!(!eval_is_failed(&json!("not a mapping")));
        assert!(!eval_is_failed(&json!(null)));
    }

    #[test]
    fn test_count_evaluations_across_event_kinds() {
        let events = vec![Event {
            evaluations: vec![json!({"passed": true}), json!({"passed": false})],
            ..Default::default()
        }];
        let function_events = vec![FunctionEvent {
            evaluations: vec![json!({"status": "failed"})],
            ..Default::default()
        }];

        let counts = count_evaluations(&events, &function_events);
        assert_eq!(counts.total, 3);
        assert_eq!(counts.passed, 1);
        assert_eq!(counts.failed, 2);
    }

    #[test]
    fn test_pass_rate_bounds() {
        assert_eq!(EvalCounts::default().pass_rate(), 0.0);
        let counts = EvalCounts {
            total: 4,
            passed: 3,
            failed: 1,
        };
        assert_eq!(counts.pass_rate(), 0.75);
    }

    #[test]
    fn test_trace_depth() {
        assert_eq!(trace_depth(&[]), 0);

        let leaf = TraceNode::default();
        assert_eq!(trace_depth(std::slice::from_ref(&leaf)), 1);

        let two_deep = TraceNode {
            children: vec![TraceNode::default()],
            ..Default::default()
        };
        let three_deep = TraceNode {
            children: vec![two_deep],
            ..Default::default()
        };
        assert_eq!(trace_depth(&[three_deep, leaf]), 3);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(500.0), "500ms");
        assert_eq!(format_duration(5500.0), "5.5s");
        assert_eq!(format_duration(90_000.0), "1.5m");
    }

    #[test]
    fn test_format_timestamp_is_utc_iso() {
        assert_eq!(format_timestamp(0.0), "1970-01-01T00:00:00");
        assert_eq!(format_timestamp(90.0), "1970-01-01T00:01:30");
    }

    #[test]
    fn test_errors_list_formatting() {
        let events = vec![Event {
            provider: "openai".to_string(),
            api: "chat".to_string(),
            error: Some("rate limited".to_string()),
            ..Default::default()
        }];
        let function_events = vec![FunctionEvent {
            name: "fetch".to_string(),
            error: Some("timeout".to_string()),
            ..Default::default()
        }];

        let errors = errors_list(&events, &function_events);
        assert_eq!(errors, vec!["[openai/chat] rate limited", "[fn:fetch] timeout"]);
    }

    #[test]
    fn test_model_distribution_skips_requestless_events() {
        let events = vec![
            Event {
                request: Some(json!({"model": "gpt-4o"})),
                ..Default::default()
            },
            Event {
                request: Some(json!({})),
                ..Default::default()
            },
            Event::default(),
        ];

        let dist = model_distribution(&events);
        assert_eq!(dist.get("gpt-4o"), Some(&1));
        assert_eq!(dist.get("unknown"), Some(&1));
        assert_eq!(dist.len(), 2);
    }
}
