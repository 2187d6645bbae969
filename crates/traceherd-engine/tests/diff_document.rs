use serde_json::json;
use traceherd_engine::diff_sessions;
use traceherd_types::{Event, FunctionEvent, Session, SessionsResponse, TraceNode};

/// Build a single-session bundle resembling one fetched run: a system
/// prompt, one tool-calling exchange, one failure, a two-level trace.
fn run_bundle(id: &str, model: &str, extra_label: Option<(&str, &str)>) -> SessionsResponse {
    let mut session = Session {
        id: id.to_string(),
        name: format!("agent-run-{}", id),
        started_at: 1_700_000_000.0,
        ended_at: Some(1_700_000_060.0),
        ..Default::default()
    };
    session
        .labels
        .insert("env".to_string(), "staging".to_string());
    if let Some((k, v)) = extra_label {
        session.labels.insert(k.to_string(), v.to_string());
    }

    SessionsResponse {
        sessions: vec![session],
        events: vec![
            Event {
                session_id: id.to_string(),
                provider: "openai".to_string(),
                api: "chat".to_string(),
                request: Some(json!({
                    "model": model,
                    "temperature": 0.7,
                    "messages": [
                        {"role": "system", "content": "You orchestrate tools."},
                        {"role": "user", "content": "Find flights"}
                    ],
                    "tools": [{"function": {"name": "flight_search"}}]
                })),
                response: Some(json!({
                    "choices": [{
                        "message": {"content": "Searching now."},
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}
                })),
                duration_ms: 400.0,
                evaluations: vec![json!({"passed": true}), json!({"passed": false})],
                ..Default::default()
            },
            Event {
                session_id: id.to_string(),
                provider: "openai".to_string(),
                api: "chat".to_string(),
                duration_ms: 200.0,
                error: Some("context overflow".to_string()),
                ..Default::default()
            },
        ],
        function_events: vec![FunctionEvent {
            session_id: id.to_string(),
            provider: "python".to_string(),
            name: "flight_search".to_string(),
            module: "tools.travel".to_string(),
            duration_ms: 90.0,
            ..Default::default()
        }],
        trace_tree: vec![TraceNode {
            event_type: Some("function".to_string()),
            name: Some("flight_search".to_string()),
            duration_ms: 90.0,
            children: vec![TraceNode {
                event_type: Some("provider_call".to_string()),
                provider: Some("openai".to_string()),
                duration_ms: 400.0,
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[test]
fn diff_covers_every_facet() {
    let b1 = run_bundle("aaa", "gpt-4o-mini", None);
    let b2 = run_bundle("bbb", "gpt-4o", Some(("team", "growth")));

    let diff = diff_sessions(&b1, &b2).expect("both bundles carry a session");

    assert_eq!(diff.metadata.session1.id, "aaa");
    assert_eq!(diff.metadata.session2.id, "bbb");
    assert_eq!(diff.metadata.duration_delta_ms, 0.0);
    assert_eq!(
        diff.metadata.labels_added.get("team").map(String::as_str),
        Some("growth")
    );

    assert_eq!(diff.llm_calls.session1.total, 2);
    assert_eq!(diff.llm_calls.session1.tokens.total, 120);
    assert_eq!(diff.llm_calls.session1.avg_latency_ms, 300.0);
    assert_eq!(diff.llm_calls.session1.errors, 1);
    assert_eq!(diff.llm_calls.delta.total, 0);

    assert_eq!(diff.providers.session1.get("openai"), Some(&2));
    assert_eq!(diff.models.session1.get("gpt-4o-mini"), Some(&1));
    assert_eq!(diff.models.session2.get("gpt-4o"), Some(&1));

    assert_eq!(diff.functions.in_both, vec!["flight_search"]);
    assert!(diff.functions.only_in_session1.is_empty());

    assert_eq!(diff.trace.session1.depth, 2);
    assert_eq!(diff.trace.session1.root_nodes, 1);

    assert_eq!(diff.evaluations.session1.total, 2);
    assert_eq!(diff.evaluations.pass_rate1, 0.5);
    assert_eq!(diff.evaluations.delta.total, 0);

    assert_eq!(
        diff.errors.session1,
        vec!["[openai/chat] context overflow"]
    );

    // Same prompt on both sides: common, not unique.
    assert_eq!(diff.system_prompts.common, vec!["You orchestrate tools."]);
    assert!(!diff.system_prompts.changed);

    assert_eq!(
        diff.request_params.session1.summary.avg_temperature,
        Some(0.7)
    );
    assert_eq!(
        diff.request_params.session1.summary.tools_used,
        vec!["flight_search"]
    );
    assert!(diff.request_params.tools_added.is_empty());

    assert_eq!(diff.responses.session1.responses.len(), 1);
    assert_eq!(
        diff.responses.session1.summary.stop_reasons.get("stop"),
        Some(&1)
    );
}

#[test]
fn diff_serializes_to_the_documented_shape() {
    let b1 = run_bundle("aaa", "gpt-4o-mini", None);
    let b2 = run_bundle("bbb", "gpt-4o", None);

    let value = serde_json::to_value(diff_sessions(&b1, &b2).unwrap()).unwrap();

    for facet in [
        "metadata",
        "llm_calls",
        "providers",
        "models",
        "functions",
        "trace",
        "evaluations",
        "errors",
        "system_prompts",
        "request_params",
        "responses",
    ] {
        assert!(value.get(facet).is_some(), "missing facet {}", facet);
    }

    assert!(value["metadata"]["duration_delta_ms"].is_number());
    assert!(value["evaluations"]["pass_rate1"].is_number());
    assert!(value["request_params"]["session1"]["summary"]["avg_temperature"].is_number());
}

#[test]
fn duration_delta_negates_when_sides_swap() {
    let mut b1 = run_bundle("aaa", "gpt-4o-mini", None);
    b1.sessions[0].ended_at = Some(1_700_000_030.0);
    let b2 = run_bundle("bbb", "gpt-4o", None);

    let forward = diff_sessions(&b1, &b2).unwrap();
    let backward = diff_sessions(&b2, &b1).unwrap();

    assert_eq!(forward.metadata.duration_delta_ms, 30_000.0);
    assert_eq!(
        forward.metadata.duration_delta_ms,
        -backward.metadata.duration_delta_ms
    );
}

#[test]
fn open_ended_sessions_diff_with_zero_duration() {
    let mut b1 = run_bundle("aaa", "gpt-4o-mini", None);
    b1.sessions[0].ended_at = None;
    let b2 = run_bundle("bbb", "gpt-4o", None);

    let diff = diff_sessions(&b1, &b2).unwrap();
    assert_eq!(diff.metadata.session1.duration_ms, 0.0);
    assert_eq!(diff.metadata.duration_delta_ms, 60_000.0);
}
