use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://api.traceherd.dev";

pub const API_KEY_VAR: &str = "TRACEHERD_API_KEY";
pub const ENDPOINT_VAR: &str = "TRACEHERD_ENDPOINT";

/// Provider credentials and endpoint, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub endpoint: String,
}

impl Config {
    pub fn new(api_key: impl Into<String>, endpoint: Option<&str>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: endpoint
                .unwrap_or(DEFAULT_ENDPOINT)
                .trim_end_matches('/')
                .to_string(),
        }
    }

    /// Resolve configuration from the process environment:
    /// `TRACEHERD_API_KEY` (required) and `TRACEHERD_ENDPOINT` (optional,
    /// defaults to the hosted provider).
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::Authentication(format!(
                    "No API key provided. Set the {} environment variable.",
                    API_KEY_VAR
                ))
            })?;
        let endpoint = std::env::var(ENDPOINT_VAR).ok();
        Ok(Self::new(api_key, endpoint.as_deref()))
    }
}

fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_string();
    Some((key.to_string(), value))
}

/// Read `KEY=VALUE` pairs from an env file. Comments and malformed lines are
/// skipped; surrounding quotes are stripped.
pub fn read_env_file(path: &Path) -> std::io::Result<Vec<(String, String)>> {
    let content = fs::read_to_string(path)?;
    Ok(content.lines().filter_map(parse_env_line).collect())
}

/// Locate the nearest `.env` file, walking from the current directory upward.
pub fn find_env_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .map(|dir| dir.join(".env"))
        .find(|candidate| candidate.is_file())
}

/// Explicit startup step: seed process environment from the nearest `.env`
/// file. Variables already set are never overridden.
///
/// Must run before any worker threads are spawned; mutating the environment
/// is process-global.
pub fn load_env_file() {
    let Some(path) = find_env_file() else {
        return;
    };
    let Ok(pairs) = read_env_file(&path) else {
        return;
    };
    debug!(path = %path.display(), "loading environment file");
    for (key, value) in pairs {
        if std::env::var_os(&key).is_none() {
            // SAFETY: called once during single-threaded startup.
            unsafe { std::env::set_var(&key, &value) };
        }
    }
}
