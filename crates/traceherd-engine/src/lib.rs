// Engine module - pure session analytics over provider bundles
// This layer sits between the provider client (traceherd-client) and the
// MCP/CLI presentation. Everything here is a deterministic function of its
// inputs: no I/O, no shared state, no caching.

pub mod diff;
pub mod error;
pub mod extract;
pub mod filter;
pub mod summary;

pub use diff::{SessionDiff, diff_sessions};
pub use error::{Error, Result};
pub use extract::{
    RequestParamsInfo, ResponseInfo, SystemPromptInfo, extract_request_params, extract_responses,
    extract_system_prompts,
};
pub use filter::{FilterCriteria, filter_sessions, parse_date};
pub use summary::{
    EvalCounts, TokenTotals, calc_avg_latency, calc_total_tokens, count_errors, count_evaluations,
    errors_list, eval_is_failed, format_duration, format_timestamp, function_counts,
    model_distribution, provider_distribution, round2, trace_depth,
};
