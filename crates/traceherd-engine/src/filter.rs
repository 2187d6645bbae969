//! Session predicates and the AND-composed filter engine.
//!
//! Every predicate is evaluated per session against the *original* bundle;
//! event restriction happens only after membership is decided. String
//! criteria match case-insensitively as substrings, except label criteria
//! which require exact, case-sensitive equality.

use std::collections::{BTreeMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use traceherd_types::{Event, FunctionEvent, Session, SessionsResponse};

use crate::error::{Error, Result};
use crate::summary::{eval_is_failed, text_form};

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a date string to Unix seconds (UTC). Accepts `YYYY-MM-DD`,
/// `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and `YYYY-MM-DD HH:MM`,
/// tried in that order.
pub fn parse_date(date_str: &str) -> Result<f64> {
    if let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc().timestamp() as f64);
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(date_str, format) {
            return Ok(dt.and_utc().timestamp() as f64);
        }
    }
    Err(Error::InvalidDate(date_str.to_string()))
}

/// Lowercased substring match over session id, name, label values and
/// metadata values.
pub fn session_matches_query(session: &Session, query: &str) -> bool {
    let needle = query.to_lowercase();
    if session.id.to_lowercase().contains(&needle) {
        return true;
    }
    if session.name.to_lowercase().contains(&needle) {
        return true;
    }
    if session
        .labels
        .values()
        .any(|v| v.to_lowercase().contains(&needle))
    {
        return true;
    }
    session
        .meta
        .values()
        .any(|v| text_form(v).to_lowercase().contains(&needle))
}

/// Every criterion key must be present with an exactly equal value.
/// Equality here is case-sensitive, unlike query matching.
pub fn session_matches_labels(session: &Session, labels: &BTreeMap<String, String>) -> bool {
    labels
        .iter()
        .all(|(key, value)| session.labels.get(key) == Some(value))
}

/// Any event or function event of this session from the given provider
/// (case-insensitive equality).
pub fn session_has_provider(
    session: &Session,
    events: &[Event],
    function_events: &[FunctionEvent],
    provider: &str,
) -> bool {
    let needle = provider.to_lowercase();
    if events
        .iter()
        .any(|e| e.session_id == session.id && e.provider.to_lowercase() == needle)
    {
        return true;
    }
    function_events
        .iter()
        .any(|e| e.session_id == session.id && e.provider.to_lowercase() == needle)
}

/// Any event of this session whose `request.model` contains the criterion
/// (case-insensitive substring). Function events carry no model.
pub fn session_has_model(session: &Session, events: &[Event], model: &str) -> bool {
    let needle = model.to_lowercase();
    events.iter().any(|event| {
        if event.session_id != session.id {
            return false;
        }
        let Some(request) = &event.request else {
            return false;
        };
        let event_model = request.get("model").map(text_form).unwrap_or_default();
        event_model.to_lowercase().contains(&needle)
    })
}

/// Any event or function event of this session with a non-empty error.
pub fn session_has_errors(
    session: &Session,
    events: &[Event],
    function_events: &[FunctionEvent],
) -> bool {
    if events
        .iter()
        .any(|e| e.session_id == session.id && e.has_error())
    {
        return true;
    }
    function_events
        .iter()
        .any(|e| e.session_id == session.id && e.has_error())
}

/// Any function event of this session whose name or module contains the
/// criterion (case-insensitive substring).
pub fn session_has_function(
    session: &Session,
    function_events: &[FunctionEvent],
    function_name: &str,
) -> bool {
    let needle = function_name.to_lowercase();
    function_events.iter().any(|event| {
        event.session_id == session.id
            && (event.name.to_lowercase().contains(&needle)
                || event.module.to_lowercase().contains(&needle))
    })
}

/// Any evaluation on this session's events or function events judged failed
/// by [`eval_is_failed`].
pub fn session_has_failed_evals(
    session: &Session,
    events: &[Event],
    function_events: &[FunctionEvent],
) -> bool {
    let event_evals = events
        .iter()
        .filter(|e| e.session_id == session.id)
        .flat_map(|e| e.evaluations.iter());
    let fn_evals = function_events
        .iter()
        .filter(|e| e.session_id == session.id)
        .flat_map(|e| e.evaluations.iter());
    event_evals.chain(fn_evals).any(eval_is_failed)
}

/// Search criteria combined with AND semantics. Absent fields impose no
/// constraint; empty strings and empty label maps are treated as absent.
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    pub query: Option<String>,
    pub labels: Option<BTreeMap<String, String>>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub function: Option<String>,
    /// Inclusive lower bound on `started_at` (Unix seconds).
    pub after: Option<f64>,
    /// Inclusive upper bound on `started_at` (Unix seconds).
    pub before: Option<f64>,
    pub has_errors: bool,
    pub evals_failed: bool,
}

fn active(criterion: &Option<String>) -> Option<&str> {
    criterion.as_deref().filter(|s| !s.is_empty())
}

/// Produce a new bundle restricted to sessions satisfying every supplied
/// criterion.
///
/// Predicates run against the original event lists; the output's events and
/// function events are then restricted to the retained-session id set.
/// The trace forest and bundle metadata pass through untouched.
pub fn filter_sessions(response: &SessionsResponse, criteria: &FilterCriteria) -> SessionsResponse {
    let labels = criteria.labels.as_ref().filter(|l| !l.is_empty());

    let retained: Vec<Session> = response
        .sessions
        .iter()
        .filter(|session| {
            if let Some(query) = active(&criteria.query)
                && !session_matches_query(session, query)
            {
                return false;
            }
            if let Some(labels) = labels
                && !session_matches_labels(session, labels)
            {
                return false;
            }
            if let Some(provider) = active(&criteria.provider)
                && !session_has_provider(
                    session,
                    &response.events,
                    &response.function_events,
                    provider,
                )
            {
                return false;
            }
            if let Some(model) = active(&criteria.model)
                && !session_has_model(session, &response.events, model)
            {
                return false;
            }
            if let Some(function) = active(&criteria.function)
                && !session_has_function(session, &response.function_events, function)
            {
                return false;
            }
            if let Some(after) = criteria.after
                && session.started_at < after
            {
                return false;
            }
            if let Some(before) = criteria.before
                && session.started_at > before
            {
                return false;
            }
            if criteria.has_errors
                && !session_has_errors(session, &response.events, &response.function_events)
            {
                return false;
            }
            if criteria.evals_failed
                && !session_has_failed_evals(
                    session,
                    &response.events,
                    &response.function_events,
                )
            {
                return false;
            }
            true
        })
        .cloned()
        .collect();

    let session_ids: HashSet<&str> = retained.iter().map(|s| s.id.as_str()).collect();
    let events = response
        .events
        .iter()
        .filter(|e| session_ids.contains(e.session_id.as_str()))
        .cloned()
        .collect();
    let function_events = response
        .function_events
        .iter()
        .filter(|e| session_ids.contains(e.session_id.as_str()))
        .cloned()
        .collect();

    SessionsResponse {
        sessions: retained,
        events,
        function_events,
        trace_tree: response.trace_tree.clone(),
        enh_prompt_traces: response.enh_prompt_traces.clone(),
        generated_at: response.generated_at,
        version: response.version.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session(id: &str) -> Session {
        Session {
            id: id.to_string(),
            name: format!("run-{}", id),
            started_at: 1000.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_date_accepted_formats() {
        assert_eq!(parse_date("1970-01-01").unwrap(), 0.0);
        assert_eq!(parse_date("1970-01-01 00:01:30").unwrap(), 90.0);
        assert_eq!(parse_date("1970-01-01T00:01:30").unwrap(), 90.0);
        assert_eq!(parse_date("1970-01-01 00:02").unwrap(), 120.0);
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        let err = parse_date("last tuesday").unwrap_err();
        assert!(err.to_string().contains("last tuesday"));
        assert!(parse_date("01/02/2024").is_err());
    }

    #[test]
    fn test_query_matches_meta_case_insensitively() {
        let mut s = session("abc");
        s.meta.insert("branch".to_string(), json!("Feature/LOGIN"));

        assert!(session_matches_query(&s, "login"));
        assert!(session_matches_query(&s, "ABC"));
        assert!(!session_matches_query(&s, "payments"));
    }

    #[test]
    fn test_query_stringifies_non_string_meta() {
        let mut s = session("abc");
        s.meta.insert("attempt".to_string(), json!(42));
        assert!(session_matches_query(&s, "42"));
    }

    #[test]
    fn test_labels_require_exact_case_sensitive_equality() {
        let mut s = session("abc");
        s.labels.insert("env".to_string(), "Staging".to_string());

        let mut exact = BTreeMap::new();
        exact.insert("env".to_string(), "Staging".to_string());
        assert!(session_matches_labels(&s, &exact));

        let mut wrong_case = BTreeMap::new();
        wrong_case.insert("env".to_string(), "staging".to_string());
        assert!(!session_matches_labels(&s, &wrong_case));

        let mut missing_key = BTreeMap::new();
        missing_key.insert("team".to_string(), "x".to_string());
        assert!(!session_matches_labels(&s, &missing_key));
    }

    #[test]
    fn test_provider_predicate_covers_function_events() {
        let s = session("s1");
        let fn_events = vec![FunctionEvent {
            session_id: "s1".to_string(),
            provider: "OpenAI".to_string(),
            name: "lookup".to_string(),
            ..Default::default()
        }];

        assert!(session_has_provider(&s, &[], &fn_events, "openai"));
        assert!(!session_has_provider(&s, &[], &fn_events, "anthropic"));
    }

    #[test]
    fn test_model_predicate_is_substring_and_ignores_other_sessions() {
        let s = session("s1");
        let events = vec![
            Event {
                session_id: "s1".to_string(),
                request: Some(json!({"model": "claude-3-5-sonnet"})),
                ..Default::default()
            },
            Event {
                session_id: "other".to_string(),
                request: Some(json!({"model": "gpt-4o"})),
                ..Default::default()
            },
        ];

        assert!(session_has_model(&s, &events, "CLAUDE-3"));
        assert!(!session_has_model(&s, &events, "gpt-4o"));
    }

    #[test]
    fn test_function_predicate_matches_name_or_module() {
        let s = session("s1");
        let fn_events = vec![FunctionEvent {
            session_id: "s1".to_string(),
            name: "fetch_weather".to_string(),
            module: "tools.http".to_string(),
            ..Default::default()
        }];

        assert!(session_has_function(&s, &fn_events, "weather"));
        assert!(session_has_function(&s, &fn_events, "tools.HTTP"));
        assert!(!session_has_function(&s, &fn_events, "database"));
    }

    #[test]
    fn test_date_bounds_are_inclusive() {
        let mut bundle = SessionsResponse::default();
        bundle.sessions.push(session("s1"));

        let kept = filter_sessions(
            &bundle,
            &FilterCriteria {
                after: Some(1000.0),
                before: Some(1000.0),
                ..Default::default()
            },
        );
        assert_eq!(kept.sessions.len(), 1);

        let dropped = filter_sessions(
            &bundle,
            &FilterCriteria {
                after: Some(1000.5),
                ..Default::default()
            },
        );
        assert!(dropped.sessions.is_empty());
    }

    #[test]
    fn test_filter_restricts_events_to_retained_sessions() {
        let mut bundle = SessionsResponse::default();
        bundle.sessions.push(session("keep"));
        bundle.sessions.push(session("drop"));
        bundle.events.push(Event {
            session_id: "keep".to_string(),
            ..Default::default()
        });
        bundle.events.push(Event {
            session_id: "drop".to_string(),
            ..Default::default()
        });
        // Orphan: references no session at all, must simply be excluded.
        bundle.events.push(Event {
            session_id: "ghost".to_string(),
            ..Default::default()
        });
        bundle.trace_tree.push(TraceNodeFixture::leaf());

        let filtered = filter_sessions(
            &bundle,
            &FilterCriteria {
                query: Some("keep".to_string()),
                ..Default::default()
            },
        );

        assert_eq!(filtered.sessions.len(), 1);
        assert_eq!(filtered.events.len(), 1);
        assert_eq!(filtered.events[0].session_id, "keep");
        // The trace forest passes through unfiltered.
        assert_eq!(filtered.trace_tree.len(), 1);
    }

    #[test]
    fn test_empty_criteria_keep_everything() {
        let mut bundle = SessionsResponse::default();
        bundle.sessions.push(session("a"));
        bundle.sessions.push(session("b"));

        let filtered = filter_sessions(&bundle, &FilterCriteria::default());
        assert_eq!(filtered.sessions.len(), 2);

        // Empty strings count as absent, not as match-nothing criteria.
        let filtered = filter_sessions(
            &bundle,
            &FilterCriteria {
                query: Some(String::new()),
                provider: Some(String::new()),
                ..Default::default()
            },
        );
        assert_eq!(filtered.sessions.len(), 2);
    }

    struct TraceNodeFixture;

    impl TraceNodeFixture {
        fn leaf() -> traceherd_types::TraceNode {
            traceherd_types::TraceNode {
                event_type: Some("provider_call".to_string()),
                duration_ms: 5.0,
                ..Default::default()
            }
        }
    }
}
