//! stdio transport
//!
//! Line-oriented JSON-RPC over stdin/stdout. Logging goes to stderr; stdout
//! carries exactly one JSON document per line.

use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, warn};

use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::server::McpServer;

/// Fallback emitted when even error serialization fails, so the client
/// never hangs on a swallowed frame.
const FALLBACK_ERROR: &str =
    r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#;

/// stdio transport for the tool server
pub struct StdioTransport;

impl StdioTransport {
    pub fn new() -> Self {
        Self
    }

    /// Run the server until stdin closes.
    pub async fn run(self, server: McpServer) -> Result<(), io::Error> {
        let stdin = BufReader::new(io::stdin());
        let mut stdout = io::stdout();
        let mut lines = stdin.lines();

        while let Some(line) = lines.next_line().await? {
            if line.is_empty() {
                continue;
            }
            debug!("received {} bytes", line.len());

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    warn!("failed to parse request: {}", e);
                    let response = JsonRpcResponse::error(None, JsonRpcError::parse_error());
                    write_response(&mut stdout, &response).await?;
                    continue;
                }
            };

            if let Some(response) = server.handle_request(request).await {
                write_response(&mut stdout, &response).await?;
            }
        }

        Ok(())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_response(
    stdout: &mut io::Stdout,
    response: &JsonRpcResponse,
) -> Result<(), io::Error> {
    let json = match serde_json::to_string(response) {
        Ok(json) => json,
        Err(e) => {
            error!("failed to serialize response: {}", e);
            FALLBACK_ERROR.to_string()
        }
    };
    debug!("sending {} bytes", json.len());
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
