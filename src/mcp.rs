//! MCP (Model Context Protocol) Server
//!
//! Manual JSON-RPC 2.0 over stdio - no MCP-specific crates, just
//! `serde_json` and a line-based loop. Each tool call is handled on its own
//! task so one slow query never serializes the others; responses funnel
//! through a channel to keep stdout writes whole.
//!
//! # Tools
//!
//! Nine actions over one resolved connection profile:
//! `list_tables`, `get_table_schema`, `execute_sql`, `list_content_types`,
//! `get_node_by_id`, `list_vocabularies`, `get_taxonomy_term_by_id`,
//! `get_user_by_id`, `list_paragraphs_by_node_id`.
//!
//! Every action returns `{"success": bool, "data": ..., "error": ...}`
//! inside MCP text content. Errors render through the gateway taxonomy;
//! driver internals stay in the logs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::engine::SqlParam;
use crate::entity::EntityComposer;
use crate::error::{GatewayError, ValidationReason};
use crate::gateway::DatabaseGateway;

/// Everything a tool handler needs, passed by reference - no globals
pub struct ServerContext {
    /// The one gateway for the resolved profile
    pub gateway: Arc<DatabaseGateway>,
    /// Default per-call timeout applied to every database operation
    pub timeout: Option<Duration>,
}

// ============================================================================
// JSON-RPC 2.0 Structures
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl JsonRpcResponse {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id, result: Some(result), error: None }
    }

    fn err(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError { code, message, data: None }),
        }
    }
}

// ============================================================================
// Tool Result Structures
// ============================================================================

/// Text content block for MCP tool results
#[derive(Debug, Serialize)]
struct TextContent {
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

/// MCP tool call result
#[derive(Debug, Serialize)]
struct CallToolResult {
    content: Vec<TextContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

/// The action-level envelope every tool returns
#[derive(Debug, Serialize)]
struct ActionResponse {
    success: bool,
    data: Value,
    error: Option<String>,
}

impl ActionResponse {
    fn from_result(result: std::result::Result<Value, GatewayError>) -> Self {
        match result {
            Ok(data) => Self { success: true, data, error: None },
            Err(e) => Self {
                success: false,
                data: Value::Null,
                error: Some(format!("{}: {}", e.error_code(), e.message())),
            },
        }
    }

    fn into_tool_result(self) -> Result<Value> {
        let is_error = !self.success;
        let text = serde_json::to_string_pretty(&self)?;
        let result = CallToolResult {
            content: vec![TextContent { content_type: "text".to_string(), text }],
            is_error,
        };
        Ok(serde_json::to_value(result)?)
    }
}

// ============================================================================
// Server Loop
// ============================================================================

/// Run the MCP server over stdio until stdin closes
///
/// Each request is one line of JSON in, one line of JSON out. Tool calls
/// run concurrently; a writer task owns stdout so responses never
/// interleave.
pub async fn serve(ctx: ServerContext) -> Result<()> {
    let ctx = Arc::new(ctx);
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if stdout.write_all(b"\n").await.is_err() {
                break;
            }
            let _ = stdout.flush().await;
        }
    });

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let response =
                    JsonRpcResponse::err(None, -32700, format!("Parse error: {e}"));
                tx.send(serde_json::to_string(&response)?)?;
                continue;
            }
        };

        // Notifications get no response.
        if request.id.is_none() || request.method.starts_with("notifications/") {
            continue;
        }

        let ctx = Arc::clone(&ctx);
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = handle_request(&ctx, request).await;
            if let Ok(json) = serde_json::to_string(&response) {
                let _ = tx.send(json);
            }
        });
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// Route a request to the matching protocol handler
async fn handle_request(ctx: &ServerContext, request: JsonRpcRequest) -> JsonRpcResponse {
    let result = match request.method.as_str() {
        "initialize" => handle_initialize(),
        "tools/list" => handle_list_tools(),
        "tools/call" => handle_call_tool(ctx, request.params).await,
        _ => Err(anyhow!("Unknown method: {}", request.method)),
    };

    match result {
        Ok(value) => JsonRpcResponse::ok(request.id, value),
        Err(e) => JsonRpcResponse::err(request.id, -32603, e.to_string()),
    }
}

// ============================================================================
// Protocol Handlers
// ============================================================================

fn handle_initialize() -> Result<Value> {
    Ok(serde_json::json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": "drupalgate",
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

fn handle_list_tools() -> Result<Value> {
    let no_args = serde_json::json!({ "type": "object", "properties": {} });

    Ok(serde_json::json!({
        "tools": [
            {
                "name": "list_tables",
                "description": "List all tables in the connected Drupal database (physical names, including any configured prefix).",
                "inputSchema": no_args.clone()
            },
            {
                "name": "get_table_schema",
                "description": "Get column names and types for one table. Pass the base table name without prefix (e.g. 'node_field_data'); the configured prefix is applied automatically.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "table_name": {
                            "type": "string",
                            "description": "Base table name, without prefix"
                        }
                    },
                    "required": ["table_name"]
                }
            },
            {
                "name": "execute_sql",
                "description": "Execute a read-only SELECT query. Write and DDL statements are rejected. Table names are NOT auto-prefixed here - reference the physical table names (see list_tables). Bind values through query_params, never by string formatting.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "sql_query": {
                            "type": "string",
                            "description": "SELECT statement with ? placeholders for parameters"
                        },
                        "query_params": {
                            "type": "array",
                            "description": "Positional parameter values (strings, integers, booleans)",
                            "items": {}
                        }
                    },
                    "required": ["sql_query"]
                }
            },
            {
                "name": "list_content_types",
                "description": "List all Drupal content types (node types) with machine name, label, and description.",
                "inputSchema": no_args.clone()
            },
            {
                "name": "get_node_by_id",
                "description": "Fetch one node by ID: core fields, author name, and body (falling back to the revision body when needed).",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "nid": { "type": "integer", "description": "The Node ID (nid)" }
                    },
                    "required": ["nid"]
                }
            },
            {
                "name": "list_vocabularies",
                "description": "List all taxonomy vocabularies with id, name, and description.",
                "inputSchema": no_args.clone()
            },
            {
                "name": "get_taxonomy_term_by_id",
                "description": "Fetch one taxonomy term by ID, including its vocabulary name.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "tid": { "type": "integer", "description": "The Taxonomy Term ID (tid)" }
                    },
                    "required": ["tid"]
                }
            },
            {
                "name": "get_user_by_id",
                "description": "Fetch one user by ID with an aggregated list of role IDs.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "uid": { "type": "integer", "description": "The User ID (uid)" }
                    },
                    "required": ["uid"]
                }
            },
            {
                "name": "list_paragraphs_by_node_id",
                "description": "List paragraph items referenced by a node through a paragraph field. Uses the node__<field> naming convention; if the site's schema deviates, the error names the missing table.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "nid": { "type": "integer", "description": "The Node ID (nid) holding the paragraphs" },
                        "paragraph_field_name": {
                            "type": "string",
                            "description": "Machine name of the paragraph reference field (e.g. 'field_content_paragraphs')"
                        }
                    },
                    "required": ["nid", "paragraph_field_name"]
                }
            }
        ]
    }))
}

/// Route tools/call to the action handler, wrapping the outcome in the
/// `{success, data, error}` envelope
async fn handle_call_tool(ctx: &ServerContext, params: Option<Value>) -> Result<Value> {
    let params = params.ok_or_else(|| anyhow!("Missing params"))?;
    let name = params["name"].as_str().ok_or_else(|| anyhow!("Missing tool name"))?;
    let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

    tracing::info!(tool = name, "tool call");

    let outcome = dispatch_action(ctx, name, &arguments).await;
    if let Err(e) = &outcome {
        tracing::warn!(tool = name, code = e.error_code(), error = %e, "tool call failed");
    }

    ActionResponse::from_result(outcome).into_tool_result()
}

/// The dispatch table: one arm per action, arguments validated before the
/// handler body runs
async fn dispatch_action(
    ctx: &ServerContext,
    name: &str,
    args: &Value,
) -> std::result::Result<Value, GatewayError> {
    let gateway = &ctx.gateway;
    let composer = EntityComposer::new(gateway, ctx.timeout);

    match name {
        "list_tables" => {
            let tables = gateway.list_tables(ctx.timeout).await?;
            Ok(serde_json::json!({ "tables": tables }))
        }
        "get_table_schema" => {
            let table = required_str(args, "table_name")?;
            let schema = gateway.get_table_schema(table, ctx.timeout).await?;
            to_json(&schema)
        }
        "execute_sql" => {
            let sql = required_str(args, "sql_query")?;
            let params = parse_query_params(args)?;
            let result = gateway.execute(sql, &params, ctx.timeout).await?;
            to_json(&result)
        }
        "list_content_types" => to_json(&composer.list_content_types().await?),
        "get_node_by_id" => {
            let nid = required_id(args, "nid")?;
            to_json(&composer.node_by_id(nid).await?)
        }
        "list_vocabularies" => to_json(&composer.list_vocabularies().await?),
        "get_taxonomy_term_by_id" => {
            let tid = required_id(args, "tid")?;
            to_json(&composer.term_by_id(tid).await?)
        }
        "get_user_by_id" => {
            let uid = required_id(args, "uid")?;
            to_json(&composer.user_by_id(uid).await?)
        }
        "list_paragraphs_by_node_id" => {
            let nid = required_id(args, "nid")?;
            let field = required_str(args, "paragraph_field_name")?;
            to_json(&composer.paragraphs_by_node(nid, field).await?)
        }
        _ => Err(GatewayError::validation(
            ValidationReason::InvalidInput,
            format!("unknown action '{name}'"),
        )),
    }
}

// ============================================================================
// Argument Helpers
// ============================================================================

fn required_str<'a>(args: &'a Value, key: &str) -> std::result::Result<&'a str, GatewayError> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty()).ok_or_else(|| {
        GatewayError::validation(
            ValidationReason::InvalidInput,
            format!("'{key}' is required and must be a non-empty string"),
        )
    })
}

fn required_id(args: &Value, key: &str) -> std::result::Result<i64, GatewayError> {
    args.get(key).and_then(Value::as_i64).ok_or_else(|| {
        GatewayError::validation(
            ValidationReason::InvalidInput,
            format!("'{key}' is required and must be an integer"),
        )
    })
}

/// Coerce the optional query_params array into bindable parameters
fn parse_query_params(args: &Value) -> std::result::Result<Vec<SqlParam>, GatewayError> {
    let Some(raw) = args.get("query_params") else { return Ok(Vec::new()) };
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let items = raw.as_array().ok_or_else(|| {
        GatewayError::validation(
            ValidationReason::InvalidInput,
            "'query_params' must be an array of scalar values",
        )
    })?;

    items
        .iter()
        .map(|v| {
            SqlParam::from_json(v).ok_or_else(|| {
                GatewayError::validation(
                    ValidationReason::InvalidInput,
                    format!("unsupported query parameter value: {v}"),
                )
            })
        })
        .collect()
}

fn to_json<T: Serialize>(value: &T) -> std::result::Result<Value, GatewayError> {
    serde_json::to_value(value).map_err(|e| {
        GatewayError::database("serde", format!("failed to serialize response: {e}"))
    })
}
