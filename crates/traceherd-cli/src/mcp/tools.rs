//! Tool handlers.
//!
//! Result building is pure: every `build_*` function is a deterministic
//! function of an in-memory bundle and the tool arguments. The async
//! handlers only fetch bundles through the client and delegate.

use serde::Serialize;
use serde_json::Value;

use traceherd_client::{API_KEY_VAR, Client};
use traceherd_engine::{
    FilterCriteria, calc_avg_latency, calc_total_tokens, count_errors, count_evaluations,
    diff_sessions, filter_sessions, model_distribution, parse_date, provider_distribution, round2,
};
use traceherd_types::SessionsResponse;

use super::query::{DiffSessionsArgs, GetSessionArgs, ListSessionsArgs, SearchSessionsArgs};
use super::views::{
    FunctionCallView, ListSessionsView, LlmCallView, SearchSessionsView, SessionDetailView,
    SessionSummaryView, SessionView, TraceNodeView,
};

/// Session detail previews at most this many calls of each kind.
pub const CALL_PREVIEW_LIMIT: usize = 50;

/// Everything a tool call can fail with. The server converts each variant to
/// a readable text result - tool failures are never protocol faults.
#[derive(Debug)]
pub enum ToolError {
    /// Provider boundary failure (auth, not-found, HTTP, other API errors)
    Client(traceherd_client::Error),
    /// Bad tool arguments (unparseable date, missing required field)
    Invalid(String),
    /// A session id that resolved to an empty bundle
    NotFound(String),
}

impl From<traceherd_client::Error> for ToolError {
    fn from(err: traceherd_client::Error) -> Self {
        ToolError::Client(err)
    }
}

impl From<traceherd_engine::Error> for ToolError {
    fn from(err: traceherd_engine::Error) -> Self {
        match err {
            traceherd_engine::Error::InvalidDate(_) => ToolError::Invalid(err.to_string()),
            traceherd_engine::Error::SessionNotFound(msg) => ToolError::NotFound(msg),
        }
    }
}

/// User-facing text for a failed tool call.
pub fn error_text(err: &ToolError) -> String {
    use traceherd_client::Error as ClientError;
    match err {
        ToolError::Client(ClientError::Authentication(msg)) => format!(
            "Authentication error: {}\n\nMake sure the {} environment variable is set.",
            msg, API_KEY_VAR
        ),
        ToolError::Client(ClientError::SessionNotFound(msg)) => {
            format!("Session not found: {}", msg)
        }
        ToolError::Client(ClientError::Api { status, detail }) => {
            format!("API error: {} (HTTP {})", detail, status)
        }
        ToolError::Client(err) => format!("Error: {}", err),
        ToolError::Invalid(msg) => format!("Error: {}", msg),
        ToolError::NotFound(id) => format!("Session not found: {}", id),
    }
}

fn to_value<T: Serialize>(view: &T) -> Result<Value, ToolError> {
    serde_json::to_value(view).map_err(|e| ToolError::Invalid(format!("Serialization error: {}", e)))
}

/// A limit of 0 means "no limit".
fn apply_limit(limit: Option<usize>, len: usize) -> usize {
    match limit {
        Some(n) if n > 0 => n.min(len),
        _ => len,
    }
}

pub fn build_list_sessions(
    response: &SessionsResponse,
    args: &ListSessionsArgs,
) -> ListSessionsView {
    let returned = apply_limit(args.limit, response.sessions.len());
    let sessions = response.sessions[..returned]
        .iter()
        .map(|s| SessionView::new(s, &response.events, &response.function_events))
        .collect();

    ListSessionsView {
        sessions,
        total: response.sessions.len(),
        returned,
    }
}

pub fn build_session_detail(
    response: &SessionsResponse,
    session_id: &str,
) -> Result<SessionDetailView, ToolError> {
    let Some(session) = response.sessions.first() else {
        return Err(ToolError::NotFound(session_id.to_string()));
    };

    let providers = provider_distribution(&response.events);
    let models = model_distribution(&response.events);

    let summary = SessionSummaryView {
        total_llm_calls: response.events.len(),
        total_function_calls: response.function_events.len(),
        total_tokens: calc_total_tokens(&response.events),
        avg_latency_ms: round2(calc_avg_latency(&response.events)),
        providers_used: providers.keys().cloned().collect(),
        models_used: models.keys().cloned().collect(),
        provider_distribution: providers,
        model_distribution: models,
        evaluations: count_evaluations(&response.events, &response.function_events),
        errors: count_errors(&response.events, &response.function_events),
    };

    let mut note = String::new();
    if response.events.len() > CALL_PREVIEW_LIMIT {
        note = format!(
            "Showing first {} of {} LLM calls",
            CALL_PREVIEW_LIMIT,
            response.events.len()
        );
    }
    if response.function_events.len() > CALL_PREVIEW_LIMIT {
        note = format!(
            "{}, first {} of {} function calls",
            note,
            CALL_PREVIEW_LIMIT,
            response.function_events.len()
        );
    }

    Ok(SessionDetailView {
        session: SessionView::new(session, &response.events, &response.function_events),
        summary,
        trace_tree: response.trace_tree.iter().map(TraceNodeView::new).collect(),
        llm_calls: response
            .events
            .iter()
            .take(CALL_PREVIEW_LIMIT)
            .map(LlmCallView::new)
            .collect(),
        function_calls: response
            .function_events
            .iter()
            .take(CALL_PREVIEW_LIMIT)
            .map(FunctionCallView::new)
            .collect(),
        note: (!note.is_empty()).then_some(note),
    })
}

/// Translate tool arguments into engine criteria; date strings are parsed
/// here so a bad date fails before anything is fetched.
pub fn criteria_from_args(args: &SearchSessionsArgs) -> Result<FilterCriteria, ToolError> {
    let after = args.after.as_deref().map(parse_date).transpose()?;
    let before = args.before.as_deref().map(parse_date).transpose()?;

    Ok(FilterCriteria {
        query: args.query.clone(),
        labels: args.labels.clone(),
        provider: args.provider.clone(),
        model: args.model.clone(),
        function: args.function.clone(),
        after,
        before,
        has_errors: args.has_errors,
        evals_failed: args.evals_failed,
    })
}

fn supplied(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|s| !s.is_empty())
}

/// Echo of the criteria that actually constrained the search.
fn filters_applied(args: &SearchSessionsArgs) -> serde_json::Map<String, Value> {
    let mut applied = serde_json::Map::new();
    if let Some(query) = supplied(&args.query) {
        applied.insert("query".to_string(), Value::from(query.clone()));
    }
    if let Some(labels) = args.labels.as_ref().filter(|l| !l.is_empty()) {
        applied.insert(
            "labels".to_string(),
            serde_json::to_value(labels).unwrap_or(Value::Null),
        );
    }
    for (key, value) in [
        ("provider", &args.provider),
        ("model", &args.model),
        ("function", &args.function),
        ("after", &args.after),
        ("before", &args.before),
    ] {
        if let Some(value) = supplied(value) {
            applied.insert(key.to_string(), Value::from(value.clone()));
        }
    }
    if args.has_errors {
        applied.insert("has_errors".to_string(), Value::Bool(true));
    }
    if args.evals_failed {
        applied.insert("evals_failed".to_string(), Value::Bool(true));
    }
    applied
}

pub fn build_search_results(
    response: &SessionsResponse,
    args: &SearchSessionsArgs,
) -> Result<SearchSessionsView, ToolError> {
    let criteria = criteria_from_args(args)?;
    let filtered = filter_sessions(response, &criteria);

    let returned = apply_limit(args.limit, filtered.sessions.len());
    let sessions = filtered.sessions[..returned]
        .iter()
        .map(|s| SessionView::new(s, &filtered.events, &filtered.function_events))
        .collect();

    Ok(SearchSessionsView {
        sessions,
        total_matches: filtered.sessions.len(),
        returned,
        filters_applied: filters_applied(args),
    })
}

pub async fn handle_list_sessions(
    client: &Client,
    args: ListSessionsArgs,
) -> Result<Value, ToolError> {
    let response = client.list_sessions().await?;
    to_value(&build_list_sessions(&response, &args))
}

pub async fn handle_get_session(client: &Client, args: GetSessionArgs) -> Result<Value, ToolError> {
    let response = client.get_session(&args.session_id).await?;
    to_value(&build_session_detail(&response, &args.session_id)?)
}

pub async fn handle_search_sessions(
    client: &Client,
    args: SearchSessionsArgs,
) -> Result<Value, ToolError> {
    // Validate dates before spending a provider round-trip.
    criteria_from_args(&args)?;
    let response = client.list_sessions().await?;
    to_value(&build_search_results(&response, &args)?)
}

pub async fn handle_diff_sessions(
    client: &Client,
    args: DiffSessionsArgs,
) -> Result<Value, ToolError> {
    let bundle1 = client.get_session(&args.session_id_1).await?;
    let bundle2 = client.get_session(&args.session_id_2).await?;

    if bundle1.sessions.is_empty() {
        return Err(ToolError::NotFound(args.session_id_1));
    }
    if bundle2.sessions.is_empty() {
        return Err(ToolError::NotFound(args.session_id_2));
    }

    to_value(&diff_sessions(&bundle1, &bundle2)?)
}
