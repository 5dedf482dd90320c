//! MCP server: JSON-RPC dispatch, served over stdio here and over HTTP in
//! [`http`].
//!
//! Every message is handled independently, so a slow Azure DevOps call does
//! not hold up other requests. Logs go to stderr; stdout carries only
//! protocol messages.

mod http;
pub mod protocol;

pub use http::{serve_http, HTTP_ADDR};

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::resources::{AppContext, ResourceError};
use protocol::{
    InitializeResult, JsonRpcRequest, JsonRpcResponse, ReadResourceParams, ResourcesCapability,
    ServerCapabilities, ServerInfo, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, JSONRPC_VERSION,
    METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VERSION,
};

pub const SERVER_NAME: &str = "ado-pr-mcp";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub struct McpServer {
    ctx: AppContext,
}

impl McpServer {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    pub fn into_context(self) -> AppContext {
        self.ctx
    }

    /// Handle one raw JSON-RPC message. Returns None for notifications.
    pub async fn handle_message(&self, message: &str) -> Option<String> {
        let response = match serde_json::from_str::<JsonRpcRequest>(message) {
            Ok(request) => self.dispatch(request).await?,
            Err(e) => {
                warn!(error = %e, "unparseable message");
                JsonRpcResponse::error(None, PARSE_ERROR, format!("Parse error: {e}"))
            }
        };
        Some(encode(&response))
    }

    async fn dispatch(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        // No id means a notification, which never gets a reply.
        let Some(id) = request.id else {
            debug!(method = %request.method, "notification");
            return None;
        };
        let id = Some(id);

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Unsupported JSON-RPC version: {}", request.jsonrpc),
            ));
        }

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.initialize_result()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "resources/list" => JsonRpcResponse::success(
                id,
                json!({ "resources": self.ctx.resource_definitions() }),
            ),
            "resources/templates/list" => JsonRpcResponse::success(
                id,
                json!({ "resourceTemplates": self.ctx.resource_templates() }),
            ),
            "resources/read" => self.read_resource(id, request.params).await,
            method => JsonRpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            ),
        };
        Some(response)
    }

    fn initialize_result(&self) -> Value {
        json!(InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                resources: ResourcesCapability {
                    subscribe: false,
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        })
    }

    async fn read_resource(&self, id: Option<Value>, params: Value) -> JsonRpcResponse {
        let params: ReadResourceParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(e) => {
                return JsonRpcResponse::error(id, INVALID_PARAMS, format!("Invalid params: {e}"))
            }
        };

        info!(uri = %params.uri, "reading resource");
        match self.ctx.read_resource(&params.uri).await {
            Ok(content) => JsonRpcResponse::success(id, json!({ "contents": [content] })),
            Err(e) => {
                error!(uri = %params.uri, error = %e, "resource read failed");
                let code = match e {
                    ResourceError::UnknownResource(_) => INVALID_PARAMS,
                    _ => INTERNAL_ERROR,
                };
                JsonRpcResponse::error_with_data(
                    id,
                    code,
                    e.to_string(),
                    Some(json!({ "kind": e.kind() })),
                )
            }
        }
    }
}

fn encode(response: &JsonRpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!(error = %e, "failed to encode response");
        format!(
            r#"{{"jsonrpc":"2.0","error":{{"code":{INTERNAL_ERROR},"message":"failed to encode response"}}}}"#
        )
    })
}

/// Serve newline-delimited JSON-RPC on stdin/stdout until stdin closes.
pub async fn serve_stdio(server: Arc<McpServer>) -> Result<(), ServerError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Single writer so concurrent responses never interleave.
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    info!("MCP server ready, listening on stdio");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        debug!(request = %line, "received message");

        let server = Arc::clone(&server);
        let tx = tx.clone();
        tokio::spawn(async move {
            if let Some(response) = server.handle_message(&line).await {
                // Only fails once the writer has stopped on an IO error.
                let _ = tx.send(response);
            }
        });
    }

    drop(tx);
    writer.await??;
    info!("stdin closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::tests::context_with_remote;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn server_without_repo() -> McpServer {
        McpServer::new(context_with_remote(None))
    }

    async fn call(server: &McpServer, message: &str) -> Value {
        let response = server.handle_message(message).await.unwrap();
        serde_json::from_str(&response).unwrap()
    }

    #[tokio::test]
    async fn test_handle_initialize() {
        let server = server_without_repo();
        let response = call(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test","version":"1.0"}}}"#,
        )
        .await;
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["serverInfo"]["name"], "ado-pr-mcp");
        assert_eq!(response["result"]["protocolVersion"], "2024-11-05");
        assert!(response["result"]["capabilities"]["resources"].is_object());
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let server = server_without_repo();
        for message in [
            r#"{"jsonrpc":"2.0","method":"initialized"}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":3}}"#,
        ] {
            assert!(server.handle_message(message).await.is_none());
        }
    }

    #[tokio::test]
    async fn test_handle_ping() {
        let response = call(&server_without_repo(), r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#).await;
        assert_eq!(response["id"], "p");
        assert_eq!(response["result"], json!({}));
    }

    #[tokio::test]
    async fn test_handle_resources_list() {
        let response = call(
            &server_without_repo(),
            r#"{"jsonrpc":"2.0","id":2,"method":"resources/list","params":{}}"#,
        )
        .await;
        assert_eq!(response["result"]["resources"][0]["uri"], "ado://pull-requests/current");
        assert_eq!(response["result"]["resources"][0]["mimeType"], "application/json");
    }

    #[tokio::test]
    async fn test_handle_resource_templates_list() {
        let response = call(
            &server_without_repo(),
            r#"{"jsonrpc":"2.0","id":3,"method":"resources/templates/list"}"#,
        )
        .await;
        assert_eq!(
            response["result"]["resourceTemplates"][0]["uriTemplate"],
            "ado://pull-requests/{organization}/{project}/{repository}"
        );
    }

    #[tokio::test]
    async fn test_read_current_without_repo_returns_error_document() {
        let response = call(
            &server_without_repo(),
            r#"{"jsonrpc":"2.0","id":4,"method":"resources/read","params":{"uri":"ado://pull-requests/current"}}"#,
        )
        .await;
        assert!(response.get("error").is_none());
        let content = &response["result"]["contents"][0];
        assert_eq!(content["uri"], "ado://pull-requests/current");
        let text: Value = serde_json::from_str(content["text"].as_str().unwrap()).unwrap();
        assert_eq!(text["error"], "Not in an Azure DevOps git repository");
    }

    #[tokio::test]
    async fn test_read_maps_client_errors() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        let ctx = context_with_remote(Some("https://dev.azure.com/testorg/p/_git/r"))
            .with_api_host(&mock_server.uri());
        let server = McpServer::new(ctx);

        let response = call(
            &server,
            r#"{"jsonrpc":"2.0","id":5,"method":"resources/read","params":{"uri":"ado://pull-requests/testorg/badproj/badrepo"}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], INTERNAL_ERROR);
        assert_eq!(response["error"]["data"]["kind"], "not_found");
        let message = response["error"]["message"].as_str().unwrap();
        assert!(message.contains("badproj") && message.contains("badrepo"));
    }

    #[tokio::test]
    async fn test_read_unknown_resource() {
        let response = call(
            &server_without_repo(),
            r#"{"jsonrpc":"2.0","id":6,"method":"resources/read","params":{"uri":"ado://builds/current"}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
        assert_eq!(response["error"]["data"]["kind"], "unknown_resource");
    }

    #[tokio::test]
    async fn test_read_without_uri_is_invalid_params() {
        let response = call(
            &server_without_repo(),
            r#"{"jsonrpc":"2.0","id":7,"method":"resources/read","params":{}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = call(
            &server_without_repo(),
            r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
        assert!(response["error"]["message"].as_str().unwrap().contains("tools/call"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let response = call(&server_without_repo(), r#"{"invalid json"#).await;
        assert_eq!(response["error"]["code"], PARSE_ERROR);
        assert!(response.get("id").is_none());
    }

    #[tokio::test]
    async fn test_request_without_id_gets_no_response() {
        let server = server_without_repo();
        assert!(server
            .handle_message(r#"{"jsonrpc":"2.0","method":"ping"}"#)
            .await
            .is_none());
        assert!(server
            .handle_message(r#"{"jsonrpc":"2.0","method":"resources/list","params":{}}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_wrong_jsonrpc_version_is_invalid_request() {
        let response = call(&server_without_repo(), r#"{"jsonrpc":"1.0","id":9,"method":"ping"}"#).await;
        assert_eq!(response["id"], 9);
        assert_eq!(response["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_into_context_close() {
        server_without_repo().into_context().close();
    }
}
