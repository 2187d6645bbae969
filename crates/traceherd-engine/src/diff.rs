//! Two-session structural diff.
//!
//! Each facet is computed independently from the two single-session bundles
//! and composed into one serializable document. Numeric deltas are always
//! `session2 - session1`; set comparisons are `set2 - set1` / `set1 - set2`
//! / intersection.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;
use traceherd_types::{Session, SessionsResponse};

use crate::error::{Error, Result};
use crate::extract::{
    RequestParamsInfo, ResponseInfo, SystemPromptInfo, extract_request_params, extract_responses,
    extract_system_prompts,
};
use crate::summary::{
    EvalCounts, TokenTotals, calc_avg_latency, calc_total_tokens, count_errors, count_evaluations,
    errors_list, format_duration, format_timestamp, function_counts, model_distribution,
    provider_distribution, round2, trace_depth,
};

/// A facet reported for both sessions without a computed delta.
#[derive(Debug, Clone, Serialize)]
pub struct SideBySide<T> {
    pub session1: T,
    pub session2: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionMeta {
    pub id: String,
    pub name: String,
    pub started_at: String,
    pub duration_ms: f64,
    pub duration: String,
}

impl SessionMeta {
    fn new(session: &Session) -> Self {
        let duration_ms = session.duration_ms().unwrap_or(0.0);
        Self {
            id: session.id.clone(),
            name: session.name.clone(),
            started_at: format_timestamp(session.started_at),
            duration_ms,
            duration: format_duration(duration_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataDiff {
    pub session1: SessionMeta,
    pub session2: SessionMeta,
    pub duration_delta_ms: f64,
    /// Labels present in session2 but not session1; a changed value shows up
    /// here *and* in `labels_removed` (set difference over (key,value) pairs).
    pub labels_added: BTreeMap<String, String>,
    pub labels_removed: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmCallStats {
    pub total: usize,
    pub tokens: TokenTotals,
    pub avg_latency_ms: f64,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenDelta {
    pub input: i64,
    pub output: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmCallDelta {
    pub total: i64,
    pub tokens: TokenDelta,
    pub avg_latency_ms: f64,
    pub errors: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmCallsDiff {
    pub session1: LlmCallStats,
    pub session2: LlmCallStats,
    pub delta: LlmCallDelta,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionStats {
    pub total: usize,
    pub unique: usize,
    pub counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionsDiff {
    pub session1: FunctionStats,
    pub session2: FunctionStats,
    pub only_in_session1: Vec<String>,
    pub only_in_session2: Vec<String>,
    pub in_both: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceStats {
    pub depth: usize,
    pub root_nodes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalDelta {
    pub total: i64,
    pub passed: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationsDiff {
    pub session1: EvalCounts,
    pub session2: EvalCounts,
    pub delta: EvalDelta,
    pub pass_rate1: f64,
    pub pass_rate2: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemPromptsDiff {
    pub session1: Vec<SystemPromptInfo>,
    pub session2: Vec<SystemPromptInfo>,
    pub unique_to_session1: Vec<String>,
    pub unique_to_session2: Vec<String>,
    pub common: Vec<String>,
    pub changed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestParamsSummary {
    pub avg_temperature: Option<f64>,
    pub avg_max_tokens: Option<f64>,
    pub tools_used: Vec<String>,
    pub streaming_requests: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestParamsSide {
    pub requests: Vec<RequestParamsInfo>,
    pub summary: RequestParamsSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestParamsDiff {
    pub session1: RequestParamsSide,
    pub session2: RequestParamsSide,
    pub tools_added: Vec<String>,
    pub tools_removed: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesSummary {
    pub total_content_length: usize,
    pub avg_content_length: f64,
    pub tool_call_count: usize,
    pub stop_reasons: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesSide {
    pub responses: Vec<ResponseInfo>,
    pub summary: ResponsesSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesDelta {
    pub avg_content_length: f64,
    pub tool_call_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponsesDiff {
    pub session1: ResponsesSide,
    pub session2: ResponsesSide,
    pub delta: ResponsesDelta,
}

/// The complete diff document for two sessions.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDiff {
    pub metadata: MetadataDiff,
    pub llm_calls: LlmCallsDiff,
    pub providers: SideBySide<BTreeMap<String, usize>>,
    pub models: SideBySide<BTreeMap<String, usize>>,
    pub functions: FunctionsDiff,
    pub trace: SideBySide<TraceStats>,
    pub evaluations: EvaluationsDiff,
    pub errors: SideBySide<Vec<String>>,
    pub system_prompts: SystemPromptsDiff,
    pub request_params: RequestParamsDiff,
    pub responses: ResponsesDiff,
}

fn label_pairs(session: &Session) -> BTreeSet<(&String, &String)> {
    session.labels.iter().collect()
}

fn llm_call_stats(bundle: &SessionsResponse) -> LlmCallStats {
    LlmCallStats {
        total: bundle.events.len(),
        tokens: calc_total_tokens(&bundle.events),
        avg_latency_ms: round2(calc_avg_latency(&bundle.events)),
        errors: count_errors(&bundle.events, &bundle.function_events),
    }
}

/// Compare extracted system prompts by their content strings.
pub fn compare_system_prompts(
    prompts1: Vec<SystemPromptInfo>,
    prompts2: Vec<SystemPromptInfo>,
) -> SystemPromptsDiff {
    let set1: BTreeSet<&str> = prompts1.iter().map(|p| p.content.as_str()).collect();
    let set2: BTreeSet<&str> = prompts2.iter().map(|p| p.content.as_str()).collect();

    let unique_to_session1 = set1.difference(&set2).map(|s| s.to_string()).collect();
    let unique_to_session2 = set2.difference(&set1).map(|s| s.to_string()).collect();
    let common = set1.intersection(&set2).map(|s| s.to_string()).collect();
    let changed = set1 != set2;

    SystemPromptsDiff {
        session1: prompts1,
        session2: prompts2,
        unique_to_session1,
        unique_to_session2,
        common,
        changed,
    }
}

/// Loose truthiness for request flags like `stream`: providers send
/// booleans, 0/1 and "true" interchangeably.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

struct ParamsAggregate {
    temperatures: Vec<f64>,
    max_tokens: Vec<f64>,
    tools_used: BTreeSet<String>,
    stream_count: usize,
}

fn aggregate_params(params_list: &[RequestParamsInfo]) -> ParamsAggregate {
    let mut agg = ParamsAggregate {
        temperatures: Vec::new(),
        max_tokens: Vec::new(),
        tools_used: BTreeSet::new(),
        stream_count: 0,
    };
    for p in params_list {
        if let Some(t) = p.params.get("temperature").and_then(Value::as_f64) {
            agg.temperatures.push(t);
        }
        if let Some(m) = p.params.get("max_tokens").and_then(Value::as_f64) {
            agg.max_tokens.push(m);
        }
        if let Some(tools) = p.params.get("tools").and_then(Value::as_array) {
            agg.tools_used
                .extend(tools.iter().filter_map(Value::as_str).map(str::to_string));
        }
        if p.params.get("stream").is_some_and(is_truthy) {
            agg.stream_count += 1;
        }
    }
    agg
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Compare request parameters between sessions, with per-side aggregates and
/// tool-set differences.
pub fn compare_request_params(
    params1: Vec<RequestParamsInfo>,
    params2: Vec<RequestParamsInfo>,
) -> RequestParamsDiff {
    let agg1 = aggregate_params(&params1);
    let agg2 = aggregate_params(&params2);

    let tools_added = agg2
        .tools_used
        .difference(&agg1.tools_used)
        .cloned()
        .collect();
    let tools_removed = agg1
        .tools_used
        .difference(&agg2.tools_used)
        .cloned()
        .collect();

    let side = |params: Vec<RequestParamsInfo>, agg: ParamsAggregate| RequestParamsSide {
        requests: params,
        summary: RequestParamsSummary {
            avg_temperature: mean(&agg.temperatures),
            avg_max_tokens: mean(&agg.max_tokens),
            tools_used: agg.tools_used.into_iter().collect(),
            streaming_requests: agg.stream_count,
        },
    };

    RequestParamsDiff {
        session1: side(params1, agg1),
        session2: side(params2, agg2),
        tools_added,
        tools_removed,
    }
}

fn summarize_responses(responses: &[ResponseInfo]) -> ResponsesSummary {
    let mut total_content_length = 0;
    let mut tool_call_count = 0;
    let mut stop_reasons = BTreeMap::new();

    for r in responses {
        total_content_length += r.content_length.unwrap_or(0);
        tool_call_count += r.tool_calls.len();
        let reason = r.stop_reason.as_deref().unwrap_or("unknown");
        *stop_reasons.entry(reason.to_string()).or_insert(0) += 1;
    }

    let avg_content_length = if responses.is_empty() {
        0.0
    } else {
        total_content_length as f64 / responses.len() as f64
    };

    ResponsesSummary {
        total_content_length,
        avg_content_length,
        tool_call_count,
        stop_reasons,
    }
}

/// Compare extracted response content between sessions.
pub fn compare_responses(
    responses1: Vec<ResponseInfo>,
    responses2: Vec<ResponseInfo>,
) -> ResponsesDiff {
    let summary1 = summarize_responses(&responses1);
    let summary2 = summarize_responses(&responses2);

    let delta = ResponsesDelta {
        avg_content_length: summary2.avg_content_length - summary1.avg_content_length,
        tool_call_count: summary2.tool_call_count as i64 - summary1.tool_call_count as i64,
    };

    ResponsesDiff {
        session1: ResponsesSide {
            responses: responses1,
            summary: summary1,
        },
        session2: ResponsesSide {
            responses: responses2,
            summary: summary2,
        },
        delta,
    }
}

/// Compute the structured diff of two single-session bundles.
///
/// Each bundle is expected to hold exactly one session as `sessions[0]`;
/// an empty bundle yields a "session not found" error rather than a panic.
pub fn diff_sessions(
    bundle1: &SessionsResponse,
    bundle2: &SessionsResponse,
) -> Result<SessionDiff> {
    let (Some(s1), Some(s2)) = (bundle1.sessions.first(), bundle2.sessions.first()) else {
        return Err(Error::SessionNotFound(
            "one or both sessions missing from the provider response".to_string(),
        ));
    };

    let meta1 = SessionMeta::new(s1);
    let meta2 = SessionMeta::new(s2);
    let duration_delta_ms = meta2.duration_ms - meta1.duration_ms;

    let labels1 = label_pairs(s1);
    let labels2 = label_pairs(s2);
    let labels_added = labels2
        .difference(&labels1)
        .map(|(k, v)| ((*k).clone(), (*v).clone()))
        .collect();
    let labels_removed = labels1
        .difference(&labels2)
        .map(|(k, v)| ((*k).clone(), (*v).clone()))
        .collect();

    let calls1 = llm_call_stats(bundle1);
    let calls2 = llm_call_stats(bundle2);
    let call_delta = LlmCallDelta {
        total: calls2.total as i64 - calls1.total as i64,
        tokens: TokenDelta {
            input: calls2.tokens.input as i64 - calls1.tokens.input as i64,
            output: calls2.tokens.output as i64 - calls1.tokens.output as i64,
            total: calls2.tokens.total as i64 - calls1.tokens.total as i64,
        },
        // Delta of the unrounded means, rounded once.
        avg_latency_ms: round2(
            calc_avg_latency(&bundle2.events) - calc_avg_latency(&bundle1.events),
        ),
        errors: calls2.errors as i64 - calls1.errors as i64,
    };

    let fn_counts1 = function_counts(&bundle1.function_events);
    let fn_counts2 = function_counts(&bundle2.function_events);
    let fns1: BTreeSet<&String> = fn_counts1.keys().collect();
    let fns2: BTreeSet<&String> = fn_counts2.keys().collect();

    let evals1 = count_evaluations(&bundle1.events, &bundle1.function_events);
    let evals2 = count_evaluations(&bundle2.events, &bundle2.function_events);

    Ok(SessionDiff {
        metadata: MetadataDiff {
            session1: meta1,
            session2: meta2,
            duration_delta_ms,
            labels_added,
            labels_removed,
        },
        llm_calls: LlmCallsDiff {
            session1: calls1,
            session2: calls2,
            delta: call_delta,
        },
        providers: SideBySide {
            session1: provider_distribution(&bundle1.events),
            session2: provider_distribution(&bundle2.events),
        },
        models: SideBySide {
            session1: model_distribution(&bundle1.events),
            session2: model_distribution(&bundle2.events),
        },
        functions: FunctionsDiff {
            only_in_session1: fns1.difference(&fns2).map(|s| (*s).clone()).collect(),
            only_in_session2: fns2.difference(&fns1).map(|s| (*s).clone()).collect(),
            in_both: fns1.intersection(&fns2).map(|s| (*s).clone()).collect(),
            session1: FunctionStats {
                total: bundle1.function_events.len(),
                unique: fns1.len(),
                counts: fn_counts1,
            },
            session2: FunctionStats {
                total: bundle2.function_events.len(),
                unique: fns2.len(),
                counts: fn_counts2,
            },
        },
        trace: SideBySide {
            session1: TraceStats {
                depth: trace_depth(&bundle1.trace_tree),
                root_nodes: bundle1.trace_tree.len(),
            },
            session2: TraceStats {
                depth: trace_depth(&bundle2.trace_tree),
                root_nodes: bundle2.trace_tree.len(),
            },
        },
        evaluations: EvaluationsDiff {
            session1: evals1,
            session2: evals2,
            delta: EvalDelta {
                total: evals2.total as i64 - evals1.total as i64,
                passed: evals2.passed as i64 - evals1.passed as i64,
                failed: evals2.failed as i64 - evals1.failed as i64,
            },
            pass_rate1: evals1.pass_rate(),
            pass_rate2: evals2.pass_rate(),
        },
        errors: SideBySide {
            session1: errors_list(&bundle1.events, &bundle1.function_events),
            session2: errors_list(&bundle2.events, &bundle2.function_events),
        },
        system_prompts: compare_system_prompts(
            extract_system_prompts(&bundle1.events),
            extract_system_prompts(&bundle2.events),
        ),
        request_params: compare_request_params(
            extract_request_params(&bundle1.events),
            extract_request_params(&bundle2.events),
        ),
        responses: compare_responses(
            extract_responses(&bundle1.events),
            extract_responses(&bundle2.events),
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use traceherd_types::Event;

    fn bundle(session: Session, events: Vec<Event>) -> SessionsResponse {
        SessionsResponse {
            sessions: vec![session],
            events,
            ..Default::default()
        }
    }

    fn labeled_session(id: &str, labels: &[(&str, &str)]) -> Session {
        Session {
            id: id.to_string(),
            name: id.to_string(),
            started_at: 1000.0,
            ended_at: Some(1010.0),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_label_changes_appear_on_both_sides() {
        let b1 = bundle(labeled_session("s1", &[("env", "staging")]), vec![]);
        let b2 = bundle(
            labeled_session("s2", &[("env", "prod"), ("team", "x")]),
            vec![],
        );

        let diff = diff_sessions(&b1, &b2).unwrap();
        assert_eq!(
            diff.metadata.labels_added.get("env").map(String::as_str),
            Some("prod")
        );
        assert_eq!(
            diff.metadata.labels_added.get("team").map(String::as_str),
            Some("x")
        );
        assert_eq!(
            diff.metadata.labels_removed.get("env").map(String::as_str),
            Some("staging")
        );
        assert_eq!(diff.metadata.labels_removed.len(), 1);
    }

    #[test]
    fn test_missing_session_is_an_error_not_a_panic() {
        let b1 = SessionsResponse::default();
        let b2 = bundle(labeled_session("s2", &[]), vec![]);

        let err = diff_sessions(&b1, &b2).unwrap_err();
        assert!(err.to_string().contains("Session not found"));
    }

    #[test]
    fn test_duration_delta_is_antisymmetric() {
        let mut short = labeled_session("s1", &[]);
        short.ended_at = Some(1002.0);
        let mut long = labeled_session("s2", &[]);
        long.ended_at = Some(1007.0);

        let b1 = bundle(short, vec![]);
        let b2 = bundle(long, vec![]);

        let forward = diff_sessions(&b1, &b2).unwrap();
        let backward = diff_sessions(&b2, &b1).unwrap();
        assert_eq!(forward.metadata.duration_delta_ms, 5000.0);
        assert_eq!(
            forward.metadata.duration_delta_ms,
            -backward.metadata.duration_delta_ms
        );
    }

    #[test]
    fn test_token_and_latency_deltas() {
        let e = |duration: f64, total: u64| Event {
            session_id: "s".to_string(),
            duration_ms: duration,
            response: Some(json!({"usage": {"prompt_tokens": total / 2, "completion_tokens": total / 2, "total_tokens": total}})),
            ..Default::default()
        };
        let b1 = bundle(labeled_session("s1", &[]), vec![e(100.0, 10)]);
        let b2 = bundle(labeled_session("s2", &[]), vec![e(300.0, 30), e(100.0, 10)]);

        let diff = diff_sessions(&b1, &b2).unwrap();
        assert_eq!(diff.llm_calls.delta.total, 1);
        assert_eq!(diff.llm_calls.delta.tokens.total, 30);
        assert_eq!(diff.llm_calls.session2.avg_latency_ms, 200.0);
        assert_eq!(diff.llm_calls.delta.avg_latency_ms, 100.0);
    }

    #[test]
    fn test_function_set_comparison() {
        let fn_event = |name: &str| traceherd_types::FunctionEvent {
            session_id: "s".to_string(),
            name: name.to_string(),
            ..Default::default()
        };
        let mut b1 = bundle(labeled_session("s1", &[]), vec![]);
        b1.function_events = vec![fn_event("shared"), fn_event("old_only")];
        let mut b2 = bundle(labeled_session("s2", &[]), vec![]);
        b2.function_events = vec![fn_event("shared"), fn_event("shared"), fn_event("new_only")];

        let diff = diff_sessions(&b1, &b2).unwrap();
        assert_eq!(diff.functions.only_in_session1, vec!["old_only"]);
        assert_eq!(diff.functions.only_in_session2, vec!["new_only"]);
        assert_eq!(diff.functions.in_both, vec!["shared"]);
        assert_eq!(diff.functions.session2.counts.get("shared"), Some(&2));
        assert_eq!(diff.functions.session2.total, 3);
        assert_eq!(diff.functions.session2.unique, 2);
    }

    #[test]
    fn test_request_params_aggregation_and_tool_sets() {
        let req = |temperature: f64, tools: Value, stream: bool| Event {
            session_id: "s".to_string(),
            request: Some(json!({
                "model": "m",
                "temperature": temperature,
                "max_tokens": 100,
                "tools": tools,
                "stream": stream,
            })),
            ..Default::default()
        };

        let b1 = bundle(
            labeled_session("s1", &[]),
            vec![req(0.0, json!([{"function": {"name": "search"}}]), false)],
        );
        let b2 = bundle(
            labeled_session("s2", &[]),
            vec![
                req(0.5, json!([{"function": {"name": "search"}}]), true),
                req(1.0, json!([{"function": {"name": "calculator"}}]), true),
            ],
        );

        let diff = diff_sessions(&b1, &b2).unwrap();
        let summary2 = &diff.request_params.session2.summary;
        assert_eq!(summary2.avg_temperature, Some(0.75));
        assert_eq!(summary2.avg_max_tokens, Some(100.0));
        assert_eq!(summary2.streaming_requests, 2);
        assert_eq!(diff.request_params.tools_added, vec!["calculator"]);
        assert!(diff.request_params.tools_removed.is_empty());
        assert_eq!(
            diff.request_params.session1.summary.avg_temperature,
            Some(0.0)
        );
    }

    #[test]
    fn test_responses_summary_counts_unknown_stop_reasons() {
        let resp = |content: &str| Event {
            session_id: "s".to_string(),
            response: Some(json!({"text": content})),
            ..Default::default()
        };
        let b1 = bundle(labeled_session("s1", &[]), vec![resp("abc")]);
        let b2 = bundle(labeled_session("s2", &[]), vec![resp("abcdef"), resp("xyz")]);

        let diff = diff_sessions(&b1, &b2).unwrap();
        assert_eq!(diff.responses.session1.summary.total_content_length, 3);
        assert_eq!(diff.responses.session2.summary.avg_content_length, 4.5);
        assert_eq!(diff.responses.delta.avg_content_length, 1.5);
        assert_eq!(
            diff.responses.session2.summary.stop_reasons.get("unknown"),
            Some(&2)
        );
    }
}
