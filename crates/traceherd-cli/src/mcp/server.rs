//! MCP JSON-RPC server over stdio.
//!
//! Protocol faults (unparseable frames, unknown methods) surface as JSON-RPC
//! errors; tool-level failures surface as readable text results. This layer
//! is the only place provider/engine errors become user-facing messages.

use schemars::schema_for;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};

use traceherd_client::{API_KEY_VAR, Client};

use super::query::{DiffSessionsArgs, GetSessionArgs, ListSessionsArgs, SearchSessionsArgs};
use super::tools::{
    ToolError, error_text, handle_diff_sessions, handle_get_session, handle_list_sessions,
    handle_search_sessions,
};

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message }),
        }
    }
}

pub struct TraceherdServer {
    /// Absent when no credentials were found at startup; tool calls then
    /// report the authentication problem as text.
    client: Option<Client>,
}

impl TraceherdServer {
    pub fn new(client: Option<Client>) -> Self {
        Self { client }
    }

    fn client(&self) -> Result<&Client, ToolError> {
        self.client.as_ref().ok_or_else(|| {
            ToolError::Client(traceherd_client::Error::Authentication(format!(
                "No API key provided. Set the {} environment variable.",
                API_KEY_VAR
            )))
        })
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        // MCP requires all requests to have an id, use a default if missing
        let id = request
            .id
            .clone()
            .unwrap_or_else(|| Value::Number(serde_json::Number::from(0)));

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_call_tool(id, request.params).await,
            _ => JsonRpcResponse::error(
                id,
                -32601,
                format!("Method not found: {}", request.method),
            ),
        }
    }

    fn handle_initialize(&self, id: Value) -> JsonRpcResponse {
        JsonRpcResponse::result(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": "traceherd",
                    "version": env!("CARGO_PKG_VERSION")
                },
                "instructions": "traceherd MCP server - query recorded AI-agent execution traces. List and search sessions, inspect one session's trace tree and calls, or diff two sessions to see what changed between runs."
            }),
        )
    }

    fn handle_list_tools(&self, id: Value) -> JsonRpcResponse {
        // Tool input schemas are generated from the arg structs.
        let list_sessions_schema = schema_for!(ListSessionsArgs);
        let get_session_schema = schema_for!(GetSessionArgs);
        let search_sessions_schema = schema_for!(SearchSessionsArgs);
        let diff_sessions_schema = schema_for!(DiffSessionsArgs);

        JsonRpcResponse::result(
            id,
            json!({
                "tools": [
                    {
                        "name": "list_sessions",
                        "description": "List all recorded agent sessions with metadata, labels and per-session event counts.",
                        "inputSchema": serde_json::to_value(&list_sessions_schema).unwrap_or_default(),
                    },
                    {
                        "name": "get_session",
                        "description": "Get one session's full detail: summary statistics, the nested trace tree, LLM calls, function calls and evaluations.",
                        "inputSchema": serde_json::to_value(&get_session_schema).unwrap_or_default(),
                    },
                    {
                        "name": "search_sessions",
                        "description": "Search and filter sessions by text query, labels, provider, model, function name, date range, errors and failed evaluations. All criteria combine with AND.",
                        "inputSchema": serde_json::to_value(&search_sessions_schema).unwrap_or_default(),
                    },
                    {
                        "name": "diff_sessions",
                        "description": "Compare two sessions: metadata, LLM calls, tokens, latency, providers, models, functions, trace shape, evaluations, errors, system prompts, request parameters and response content.",
                        "inputSchema": serde_json::to_value(&diff_sessions_schema).unwrap_or_default(),
                    }
                ]
            }),
        )
    }

    async fn handle_call_tool(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::error(id, -32602, "Missing params".to_string());
        };
        let Some(tool_name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::error(id, -32602, "Missing tool name".to_string());
        };
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let text = match self.dispatch(tool_name, arguments).await {
            Ok(result) => {
                serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string())
            }
            Err(err) => error_text(&err),
        };

        JsonRpcResponse::result(
            id,
            json!({
                "content": [
                    {
                        "type": "text",
                        "text": text
                    }
                ]
            }),
        )
    }

    async fn dispatch(&self, tool_name: &str, arguments: Value) -> Result<Value, ToolError> {
        let client = self.client()?;
        match tool_name {
            "list_sessions" => {
                let args = parse_args::<ListSessionsArgs>(tool_name, arguments)?;
                handle_list_sessions(client, args).await
            }
            "get_session" => {
                let args = parse_args::<GetSessionArgs>(tool_name, arguments)?;
                handle_get_session(client, args).await
            }
            "search_sessions" => {
                let args = parse_args::<SearchSessionsArgs>(tool_name, arguments)?;
                handle_search_sessions(client, args).await
            }
            "diff_sessions" => {
                let args = parse_args::<DiffSessionsArgs>(tool_name, arguments)?;
                handle_diff_sessions(client, args).await
            }
            _ => Err(ToolError::Invalid(format!("Unknown tool: {}", tool_name))),
        }
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Value,
) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| {
        let message = e.to_string();
        // Surface "missing field `x`" as a plain required-argument message.
        if message.contains("missing field")
            && let Some(start) = message.find('`')
            && let Some(end) = message[start + 1..].find('`')
        {
            let field = &message[start + 1..start + 1 + end];
            return ToolError::Invalid(format!("{} is required for {}", field, tool_name));
        }
        ToolError::Invalid(format!("invalid arguments for {}: {}", tool_name, message))
    })
}

/// Run the MCP server over stdio until stdin closes.
pub async fn run_server(client: Option<Client>) -> anyhow::Result<()> {
    let server = TraceherdServer::new(client);
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let reader = BufReader::new(stdin);

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(req) => req,
            Err(e) => {
                // Parse errors carry no usable id; answer with a sentinel.
                let error_response = JsonRpcResponse::error(
                    Value::Number(serde_json::Number::from(-1)),
                    -32700,
                    format!("Parse error: {}", e),
                );
                writeln!(stdout, "{}", serde_json::to_string(&error_response)?)?;
                stdout.flush()?;
                continue;
            }
        };

        let response = server.handle_request(request).await;
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }

    Ok(())
}
