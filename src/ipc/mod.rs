pub mod handlers;

use crate::error::EngineError;
use crate::AppContext;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

// ─── JSON-RPC 2.0 types ──────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RpcRequest {
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

#[derive(Serialize)]
struct RpcError {
    code: i32,
    message: String,
}

// ─── Error codes ─────────────────────────────────────────────────────────────
//
// Application codes live in the -32000..-32099 server-error band:
//
// notFound       = -32001  (task / entry / notification absent or not visible)
// conflict       = -32002  (an open time entry already exists for the user)
// permission     = -32003  (caller is neither creator nor assignee)
// invalidState   = -32004  (operation illegal for the record's current state)
// noOp           = -32005  (update carried no applicable fields)

const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;
const NOT_FOUND: i32 = -32001;
const CONFLICT: i32 = -32002;
const PERMISSION_DENIED: i32 = -32003;
const INVALID_STATE: i32 = -32004;
const NO_OP: i32 = -32005;

// ─── Server ──────────────────────────────────────────────────────────────────

pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "IPC server listening (WebSocket + HTTP health on same port)");

    // Graceful shutdown: resolve on SIGTERM (Unix) or Ctrl-C (all platforms).
    // Pinned so we can use it in the select! loop without moving.
    let shutdown = make_shutdown_future();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received — stopping IPC server");
                break;
            }

            conn = listener.accept() => {
                let (stream, peer) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept error");
                        continue;
                    }
                };
                debug!(peer = %peer, "new connection");
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx).await {
                        warn!(peer = %peer, err = %e, "connection error");
                    }
                });
            }
        }
    }

    info!("IPC server stopped");
    Ok(())
}

/// Respond to an HTTP `GET /health` request with a JSON status document.
///
/// The daemon shares one port for both WebSocket (JSON-RPC) and a plain
/// HTTP health endpoint so clients can check liveness without a WS library.
async fn handle_health_check(mut stream: tokio::net::TcpStream, ctx: &AppContext) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    // Consume the request (we don't inspect it — any GET /health is fine).
    let mut req_buf = vec![0u8; 2048];
    let _ = stream.read(&mut req_buf).await;

    let uptime_secs = ctx.started_at.elapsed().as_secs();
    let body = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime_secs,
        "port": ctx.config.port,
    });
    let body_str = body.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body_str.len(),
        body_str
    );
    stream.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Returns a future that resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
async fn make_shutdown_future() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

async fn handle_connection(stream: tokio::net::TcpStream, ctx: Arc<AppContext>) -> Result<()> {
    // Peek at the first bytes to distinguish HTTP health checks from WebSocket
    // upgrades.  Both share the same port and both start with "GET ", so we
    // peek for "GET /health" specifically; every other request falls through
    // to the WS handshake as normal.
    let mut peek_buf = [0u8; 12];
    let n = stream.peek(&mut peek_buf).await.unwrap_or(0);
    if n >= 11 && &peek_buf[..11] == b"GET /health" {
        return handle_health_check(stream, &ctx).await;
    }

    let ws = accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let response = dispatch_text(&text, &ctx).await;
                if let Err(e) = sink.send(Message::Text(response)).await {
                    warn!(err = %e, "send error");
                    break;
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = sink.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(err = %e, "ws error");
                break;
            }
            _ => {}
        }
    }
    Ok(())
}

pub(crate) async fn dispatch_text(text: &str, ctx: &AppContext) -> String {
    // Parse
    let req: RpcRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => {
            return error_response(Value::Null, PARSE_ERROR, "Parse error");
        }
    };

    // Validate jsonrpc field
    if req.jsonrpc != "2.0" {
        return error_response(
            req.id.unwrap_or(Value::Null),
            INVALID_REQUEST,
            "Invalid Request",
        );
    }

    let id = req.id.unwrap_or(Value::Null);
    let params = req.params.unwrap_or(Value::Null);

    debug!(method = %req.method, "rpc dispatch");

    let result = dispatch(&req.method, params, ctx).await;

    match result {
        Ok(value) => {
            let resp = RpcResponse {
                jsonrpc: "2.0",
                id,
                result: Some(value),
                error: None,
            };
            serde_json::to_string(&resp).unwrap_or_default()
        }
        Err(e) => {
            // Map specific errors to RPC codes
            let (code, msg) = classify_error(&e);
            error_response(id, code, &msg)
        }
    }
}

async fn dispatch(method: &str, params: Value, ctx: &AppContext) -> anyhow::Result<Value> {
    match method {
        "daemon.ping" => handlers::daemon::ping(params, ctx).await,
        "daemon.status" => handlers::daemon::status(params, ctx).await,
        "task.create" => handlers::tasks::create(params, ctx).await,
        "task.update" => handlers::tasks::update(params, ctx).await,
        "task.delete" => handlers::tasks::delete(params, ctx).await,
        "task.get" => handlers::tasks::get(params, ctx).await,
        "task.list" => handlers::tasks::list(params, ctx).await,
        "timer.start" => handlers::timer::start(params, ctx).await,
        "timer.pause" => handlers::timer::pause(params, ctx).await,
        "timer.stop" => handlers::timer::stop(params, ctx).await,
        "timer.active" => handlers::timer::active(params, ctx).await,
        "timer.entries" => handlers::timer::entries(params, ctx).await,
        "timer.summary" => handlers::timer::summary(params, ctx).await,
        "notify.send" => handlers::notify::send(params, ctx).await,
        "notify.list" => handlers::notify::list(params, ctx).await,
        "notify.unreadCount" => handlers::notify::unread_count(params, ctx).await,
        "notify.markRead" => handlers::notify::mark_read(params, ctx).await,
        "notify.markAllRead" => handlers::notify::mark_all_read(params, ctx).await,
        "notify.delete" => handlers::notify::delete(params, ctx).await,
        "stats.tasks" => handlers::stats::tasks(params, ctx).await,
        "deadline.scan" => handlers::notify::scan_deadlines(params, ctx).await,
        _ => Err(anyhow::anyhow!("METHOD_NOT_FOUND:{}", method)),
    }
}

fn classify_error(e: &anyhow::Error) -> (i32, String) {
    if let Some(engine) = e.downcast_ref::<EngineError>() {
        let code = match engine {
            EngineError::Validation(_) => INVALID_PARAMS,
            EngineError::NotFound(_) => NOT_FOUND,
            EngineError::Permission(_) => PERMISSION_DENIED,
            EngineError::ActiveEntryConflict { .. } => CONFLICT,
            EngineError::InvalidState(_) => INVALID_STATE,
            EngineError::NoOp => NO_OP,
            EngineError::Persistence(inner) => {
                error!(err = %inner, "persistence error");
                return (INTERNAL_ERROR, "Internal error".to_string());
            }
        };
        return (code, engine.to_string());
    }

    let msg = e.to_string();
    if msg.starts_with("METHOD_NOT_FOUND:") {
        return (METHOD_NOT_FOUND, "Method not found".to_string());
    }
    if msg.contains("missing field")
        || msg.contains("invalid type")
        || msg.contains("unknown variant")
    {
        return (INVALID_PARAMS, format!("Invalid params: {}", msg));
    }
    error!(err = %e, "internal error");
    (INTERNAL_ERROR, "Internal error".to_string())
}

fn error_response(id: Value, code: i32, message: &str) -> String {
    let resp = RpcResponse {
        jsonrpc: "2.0",
        id,
        result: None,
        error: Some(RpcError {
            code,
            message: message.to_string(),
        }),
    };
    serde_json::to_string(&resp).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::storage::Storage;
    use tempfile::TempDir;

    async fn test_ctx() -> (TempDir, Arc<AppContext>) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(dir.path()).await.unwrap());
        sqlx::query("INSERT INTO users (id, username, role) VALUES (1, 'alice', 'employer')")
            .execute(&storage.pool())
            .await
            .unwrap();
        let config = Arc::new(DaemonConfig::new(None, Some(dir.path().into()), None, None));
        (dir, Arc::new(AppContext::new(config, storage)))
    }

    #[tokio::test]
    async fn rejects_malformed_json() {
        let (_dir, ctx) = test_ctx().await;
        let resp = dispatch_text("{not json", &ctx).await;
        let v: Value = serde_json::from_str(&resp).unwrap();
        assert_eq!(v["error"]["code"], PARSE_ERROR);
    }

    #[tokio::test]
    async fn rejects_wrong_jsonrpc_version() {
        let (_dir, ctx) = test_ctx().await;
        let resp =
            dispatch_text(r#"{"jsonrpc":"1.0","id":1,"method":"daemon.ping"}"#, &ctx).await;
        let v: Value = serde_json::from_str(&resp).unwrap();
        assert_eq!(v["error"]["code"], INVALID_REQUEST);
    }

    #[tokio::test]
    async fn unknown_method_maps_to_method_not_found() {
        let (_dir, ctx) = test_ctx().await;
        let resp =
            dispatch_text(r#"{"jsonrpc":"2.0","id":1,"method":"task.explode"}"#, &ctx).await;
        let v: Value = serde_json::from_str(&resp).unwrap();
        assert_eq!(v["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn ping_round_trips() {
        let (_dir, ctx) = test_ctx().await;
        let resp = dispatch_text(r#"{"jsonrpc":"2.0","id":7,"method":"daemon.ping"}"#, &ctx).await;
        let v: Value = serde_json::from_str(&resp).unwrap();
        assert_eq!(v["id"], 7);
        assert_eq!(v["result"]["pong"], true);
    }

    #[tokio::test]
    async fn create_task_over_rpc_and_classify_validation() {
        let (_dir, ctx) = test_ctx().await;

        let resp = dispatch_text(
            r#"{"jsonrpc":"2.0","id":1,"method":"task.create","params":{"title":"Ship the report","createdBy":1}}"#,
            &ctx,
        )
        .await;
        let v: Value = serde_json::from_str(&resp).unwrap();
        assert!(v["result"]["taskId"].as_i64().unwrap() > 0);

        // Two-character title fails validation and surfaces as invalid params.
        let resp = dispatch_text(
            r#"{"jsonrpc":"2.0","id":2,"method":"task.create","params":{"title":"ab","createdBy":1}}"#,
            &ctx,
        )
        .await;
        let v: Value = serde_json::from_str(&resp).unwrap();
        assert_eq!(v["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn missing_task_maps_to_not_found_code() {
        let (_dir, ctx) = test_ctx().await;
        let resp = dispatch_text(
            r#"{"jsonrpc":"2.0","id":1,"method":"timer.start","params":{"userId":1,"taskId":999}}"#,
            &ctx,
        )
        .await;
        let v: Value = serde_json::from_str(&resp).unwrap();
        assert_eq!(v["error"]["code"], NOT_FOUND);
        assert_eq!(v["error"]["message"], "task not found or not assigned to you");
    }
}
