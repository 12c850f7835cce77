use std::path::PathBuf;

use clap::Subcommand;
use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufRead, AsyncWrite, BufReader};
use tracing::{debug, error, info, warn};

mod catalog;
mod dispatch;
mod error;
mod startup;
mod stdio;
mod util;

#[cfg(test)]
mod test_support;

pub use catalog::ToolCatalog;
pub use dispatch::{ApiCallResult, Dispatcher, build_url};
pub use error::{RpcError, ToolError};
pub use startup::Startup;

use stdio::{Incoming, read_message, write_message};
use util::to_pretty_json;

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "openapi-mcp";

/// Process-wide settings, built once from flags/environment.
#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    /// Spec file override (`OPENAPI_FILE`); default lookup when unset.
    pub spec_path: Option<PathBuf>,
    /// Sent as `X-Api-Key` on every outbound request (`HTTP_HEADERS_X_API_KEY`).
    pub api_key: Option<String>,
    pub debug: bool,
}

#[derive(Subcommand, Clone, Debug)]
pub enum McpCommands {
    /// Serve the document's operations as MCP tools over stdio
    Serve,
    /// Load, repair and validate the document, then print the tool catalog as JSON
    Inspect,
}

pub async fn run(config: &RuntimeConfig, command: McpCommands) -> i32 {
    let startup = match Startup::prepare(config) {
        Ok(startup) => startup,
        Err(err) => {
            error!(error = %err, "failed to load OpenAPI spec");
            let payload = json!({
                "error": err.code(),
                "message": err.to_string(),
            });
            eprintln!("{}", to_pretty_json(&payload));
            return 1;
        }
    };

    match command {
        McpCommands::Serve => {
            let server = McpServer::new(startup, config);
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    error!(error = %err, "MCP server stopped");
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": err,
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
        McpCommands::Inspect => {
            println!("{}", to_pretty_json(&startup.report()));
            if startup.is_healthy() { 0 } else { 2 }
        }
    }
}

pub struct McpServer {
    catalog: ToolCatalog,
    dispatcher: Dispatcher,
    base_url: String,
    api_title: Option<String>,
    api_version: Option<String>,
}

impl McpServer {
    pub fn new(startup: Startup, config: &RuntimeConfig) -> Self {
        Self {
            catalog: startup.catalog,
            dispatcher: Dispatcher::new(config.api_key.clone()),
            base_url: startup.base_url,
            api_title: startup.title,
            api_version: startup.version,
        }
    }

    async fn serve_stdio(&self) -> Result<(), String> {
        info!(tools = self.catalog.len(), "serving MCP over stdio");
        self.serve(BufReader::new(io::stdin()), io::stdout()).await
    }

    /// Answer messages from `reader` until it is exhausted.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let incoming = read_message(&mut reader)
                .await
                .map_err(|e| format!("Failed to read MCP message: {e}"))?;
            let Some((framing, incoming)) = incoming else {
                break;
            };

            let reply = match incoming {
                Incoming::Message(message) => self.handle_incoming_message(message).await,
                Incoming::Malformed(reason) => {
                    warn!(reason = %reason, "discarding malformed MCP message");
                    Some(error_response(Value::Null, RpcError::parse_error(reason)))
                }
            };
            if let Some(reply) = reply {
                write_message(&mut writer, framing, &reply)
                    .await
                    .map_err(|e| format!("Failed to write MCP response: {e}"))?;
            }
        }
        debug!("MCP input closed");
        Ok(())
    }

    /// Batches are answered with an array; notifications with nothing.
    pub async fn handle_incoming_message(&self, incoming: Value) -> Option<Value> {
        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                return Some(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
            }
            let mut responses = Vec::new();
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return (!responses.is_empty()).then_some(Value::Array(responses));
        }

        self.handle_single_message(incoming).await
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // Responses from the client; this server never issues requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            debug!(method, "ignoring notification");
            None
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        let api = match (&self.api_title, &self.api_version) {
            (Some(title), Some(version)) => format!("'{title}' (version {version})"),
            (Some(title), None) => format!("'{title}'"),
            _ => "the configured OpenAPI spec".to_string(),
        };
        let instructions = format!(
            "Each tool is one operation from {api}. A call issues a single HTTP request against {} and returns its status, headers and body. Path parameters are substituted into the URL; pass request payloads in the 'body' argument.",
            self.base_url
        );
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": false
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": instructions
        })
    }

    fn tools_list_payload(&self) -> Value {
        json!({ "tools": self.catalog.tool_definitions() })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        Ok(match self.call_tool(name, &args).await {
            Ok(result) => {
                if !result.is_success() {
                    warn!(tool = name, status = result.status, "operation returned an error status");
                }
                build_tool_call_response(to_pretty_json(&result.to_value()), !result.is_success())
            }
            Err(err) => {
                warn!(tool = name, error = %err, "tool call failed");
                build_tool_call_response(to_pretty_json(&err.to_value()), true)
            }
        })
    }

    async fn call_tool(&self, name: &str, args: &Map<String, Value>) -> Result<ApiCallResult, ToolError> {
        let operation = self
            .catalog
            .get(name)
            .ok_or_else(|| ToolError::unknown_operation(name))?;
        self.dispatcher.dispatch(operation, args, &self.base_url).await
    }
}

fn build_tool_call_response(text: String, is_error: bool) -> Value {
    if is_error {
        json!({
            "isError": true,
            "content": [{ "type": "text", "text": text }]
        })
    } else {
        json!({
            "content": [{ "type": "text", "text": text }]
        })
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    let mut payload = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    });
    if let Some(data) = error.data {
        payload["error"]["data"] = data;
    }
    payload
}
