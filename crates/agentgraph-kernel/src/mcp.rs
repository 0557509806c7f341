//! MCP (Model Context Protocol) client interface.
//!
//! This is the "external collaborator, interface only" seam for calling
//! tools on a remote MCP server: concrete transports (SSE,
//! streamable-HTTP) live outside this crate and are consumed only
//! through [`McpClient`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::GraphResult;

/// Wire transport used to reach an MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpTransport {
    Sse,
    StreamableHttp,
}

/// Connection details for a remote MCP server.
///
/// `headers` values may reference an environment variable with the
/// `env:VAR` form; resolving those references is the caller's job, not
/// this struct's — it is a plain configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub url: String,
    pub transport: McpTransport,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// A resolvable, callable MCP server.
///
/// Implementations wrap a concrete transport SDK. This crate never
/// implements one itself.
#[async_trait]
pub trait McpClient: Send + Sync {
    /// Call one tool on `server` with `arguments`, returning its result
    /// value.
    async fn call_tool(
        &self,
        server: &McpServerConfig,
        tool: &str,
        arguments: Value,
    ) -> GraphResult<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_round_trips_through_json() {
        let cfg = McpServerConfig {
            url: "https://tools.example.com/mcp".to_string(),
            transport: McpTransport::StreamableHttp,
            headers: HashMap::from([("Authorization".to_string(), "env:MCP_TOKEN".to_string())]),
        };
        let json = serde_json::to_value(&cfg).unwrap();
        let back: McpServerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.url, cfg.url);
        assert_eq!(back.transport, McpTransport::StreamableHttp);
        assert_eq!(
            back.headers.get("Authorization"),
            Some(&"env:MCP_TOKEN".to_string())
        );
    }

    #[test]
    fn transport_tag_is_snake_case() {
        let json = serde_json::json!({
            "url": "https://tools.example.com/mcp",
            "transport": "sse",
        });
        let cfg: McpServerConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.transport, McpTransport::Sse);
    }
}
