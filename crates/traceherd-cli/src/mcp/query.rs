//! Tool argument types. The JSON Schemas served by `tools/list` are
//! generated from these structs - single source of truth.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// List all recorded agent sessions with computed per-session summaries.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ListSessionsArgs {
    /// Maximum number of sessions to return. Omit (or pass 0) for all.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Fetch one session's full detail: summary statistics, trace tree and the
/// first 50 LLM / function calls.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetSessionArgs {
    /// The id of the session to retrieve
    pub session_id: String,
}

/// Search and filter sessions; all supplied criteria must hold (AND).
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SearchSessionsArgs {
    /// Text query matched against session id, name, labels and metadata
    #[serde(default)]
    pub query: Option<String>,
    /// Labels that must all be present with exactly these values
    /// (e.g. {"environment": "production"})
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
    /// LLM provider name (e.g. 'openai', 'anthropic')
    #[serde(default)]
    pub provider: Option<String>,
    /// Model name substring (e.g. 'gpt-4o-mini', 'claude-3')
    #[serde(default)]
    pub model: Option<String>,
    /// Function name or module substring
    #[serde(default)]
    pub function: Option<String>,
    /// Only sessions started at or after this date (YYYY-MM-DD or ISO form)
    #[serde(default)]
    pub after: Option<String>,
    /// Only sessions started at or before this date (YYYY-MM-DD or ISO form)
    #[serde(default)]
    pub before: Option<String>,
    /// Only sessions with at least one errored event or function call
    #[serde(default)]
    pub has_errors: bool,
    /// Only sessions with at least one failed evaluation
    #[serde(default)]
    pub evals_failed: bool,
    /// Maximum number of sessions to return. Omit (or pass 0) for all.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Compare two sessions: metadata, calls, tokens, latency, providers,
/// models, functions, trace shape, evaluations, errors, system prompts,
/// request parameters and response content.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DiffSessionsArgs {
    /// First session id to compare
    pub session_id_1: String,
    /// Second session id to compare
    pub session_id_2: String,
}
