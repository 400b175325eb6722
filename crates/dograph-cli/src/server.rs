//! Chat server.
//!
//! One process, one conversation: turns are serialized through the session
//! lock and run on the blocking pool, since every collaborator call is a
//! blocking HTTP request. Each chat request sweeps old artifacts first.
//!
//! Routes
//! ------
//! - `GET /`                       chat page
//! - `POST /api/chat`              `{"message": ...}` → answer + graph URL
//! - `POST /api/clear`             reset the conversation
//! - `GET /api/examples`           canned questions
//! - `GET /static/graph_<hex>.html` rendered artifacts
//! - `GET /healthz`

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use dograph_assistant::prompts::EXAMPLE_QUESTIONS;
use dograph_assistant::{Assistant, AssistantConfig, ConversationHistory, Route};
use dograph_viz::render::is_artifact_file_name;

const CHAT_PAGE: &str = include_str!("../templates/chat.html");
const STATIC_PREFIX: &str = "/static/";
const MAX_CHAT_BODY_BYTES: usize = 1024 * 1024;

struct ServerState {
    assistant: Assistant,
    history: Mutex<ConversationHistory>,
    static_dir: PathBuf,
    retention: Duration,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    answer: String,
    route: Route,
    graph_url: Option<String>,
    cypher: Option<String>,
}

pub(crate) fn cmd_serve(args: crate::ServeArgs, config: AssistantConfig) -> Result<()> {
    // Blocking HTTP clients must be built outside the async runtime.
    let assistant = Assistant::from_config(&config)?;
    std::fs::create_dir_all(&config.static_dir)
        .map_err(|e| anyhow!("failed to create {}: {e}", config.static_dir.display()))?;

    let state = Arc::new(ServerState {
        assistant,
        history: Mutex::new(ConversationHistory::new(config.history_window)),
        static_dir: config.static_dir.clone(),
        retention: config.retention,
    });

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    rt.block_on(async move { serve_async(args.listen, state).await })
}

async fn serve_async(listen: SocketAddr, state: Arc<ServerState>) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| anyhow!("serve: failed to bind {listen}: {e}"))?;
    let bound = listener
        .local_addr()
        .map_err(|e| anyhow!("serve: failed to read bound addr: {e}"))?;
    tracing::info!(
        addr = %bound,
        static_dir = %state.static_dir.display(),
        "chat server listening"
    );

    loop {
        let (stream, _peer) = listener
            .accept()
            .await
            .map_err(|e| anyhow!("serve: accept failed: {e}"))?;
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| handle_request(req, state.clone()));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(error = %e, "connection error");
            }
        });
    }
}

async fn handle_request<B>(
    req: Request<B>,
    state: Arc<ServerState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let resp = match (method, path.as_str()) {
        (Method::GET, "/healthz") => text_response(StatusCode::OK, "ok\n"),
        (Method::GET, "/") | (Method::GET, "/index.html") => html_response(StatusCode::OK, CHAT_PAGE),
        (Method::GET, "/api/examples") => {
            let examples: Vec<_> = EXAMPLE_QUESTIONS
                .iter()
                .map(|(label, question)| serde_json::json!({ "label": label, "question": question }))
                .collect();
            json_response(StatusCode::OK, &examples)
        }
        (Method::POST, "/api/chat") => {
            match Limited::new(req.into_body(), MAX_CHAT_BODY_BYTES).collect().await {
                Ok(collected) => match handle_chat(&state, &collected.to_bytes()).await {
                    Ok(v) => json_response(StatusCode::OK, &v),
                    Err(e) => json_error(StatusCode::BAD_REQUEST, &e.to_string()),
                },
                Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => json_error(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    &format!("request body exceeds {MAX_CHAT_BODY_BYTES} bytes"),
                ),
                Err(e) => json_error(StatusCode::BAD_REQUEST, &format!("failed to read body: {e}")),
            }
        }
        (Method::POST, "/api/clear") => {
            state.history.lock().clear();
            tracing::info!("conversation cleared");
            json_response(StatusCode::OK, &serde_json::json!({ "ok": true }))
        }
        (Method::GET, p) if p.starts_with(STATIC_PREFIX) => {
            serve_artifact(&state, &p[STATIC_PREFIX.len()..]).await
        }
        _ => json_error(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(resp)
}

async fn handle_chat(state: &Arc<ServerState>, body: &[u8]) -> Result<ChatResponse> {
    let req: ChatRequest = serde_json::from_slice(body)
        .map_err(|e| anyhow!("failed to parse chat request JSON: {e}"))?;
    let message = req.message.trim().to_string();
    if message.is_empty() {
        return Err(anyhow!("message must not be empty"));
    }

    let state = state.clone();
    let turn = tokio::task::spawn_blocking(move || {
        let report = dograph_viz::sweep(&state.static_dir, state.retention);
        if report.removed > 0 {
            tracing::info!(removed = report.removed, "swept old graph artifacts");
        }
        let mut history = state.history.lock();
        state.assistant.handle_turn(&mut history, &message)
    })
    .await
    .map_err(|e| anyhow!("chat: failed to join turn task: {e}"))?;

    Ok(ChatResponse {
        graph_url: turn.artifact.as_ref().map(|a| a.url.clone()),
        answer: turn.answer,
        route: turn.route,
        cypher: turn.cypher,
    })
}

async fn serve_artifact(state: &Arc<ServerState>, name: &str) -> Response<Full<Bytes>> {
    if !is_artifact_file_name(name) {
        return json_error(StatusCode::NOT_FOUND, "not found");
    }
    let path = state.static_dir.join(name);
    let read = tokio::task::spawn_blocking(move || std::fs::read(path)).await;
    match read {
        Ok(Ok(bytes)) => Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "text/html; charset=utf-8")
            .header(CACHE_CONTROL, "no-store")
            .body(Full::new(Bytes::from(bytes)))
            .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error")))),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            json_error(StatusCode::NOT_FOUND, "graph expired or not found")
        }
        Ok(Err(e)) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        Err(e) => json_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

fn html_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"internal error"))))
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{\"error\":\"serialize\"}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{\"error\":\"internal\"}"))))
}

fn json_error(status: StatusCode, msg: &str) -> Response<Full<Bytes>> {
    let v = serde_json::json!({ "error": msg });
    json_response(status, &v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dograph_assistant::{GraphQueryEngine, LlmError, QueryError, QueryOutcome, ReasoningEngine};
    use dograph_viz::GraphRenderer;
    use serde_json::{json, Value};
    use tempfile::{tempdir, TempDir};

    struct Fixed(&'static str);

    impl ReasoningEngine for Fixed {
        fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok(self.0.to_string())
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    struct OneRow;

    impl GraphQueryEngine for OneRow {
        fn query(&self, _question: &str) -> Result<QueryOutcome, QueryError> {
            Ok(QueryOutcome {
                records: vec![json!({"op": "S40_00001", "res": "Jig"})],
                cypher: Some("MATCH (o)-[:needResource]->(r) RETURN o.name, r.name".to_string()),
                intermediate_steps: Vec::new(),
            })
        }
    }

    fn state() -> (TempDir, Arc<ServerState>) {
        let dir = tempdir().unwrap();
        let assistant = Assistant::new(
            Arc::new(Fixed("graph")),
            Arc::new(Fixed("S40_00001 needs the Jig.")),
            Arc::new(Fixed("unused")),
            Arc::new(OneRow),
            GraphRenderer::new(dir.path()),
        );
        let state = Arc::new(ServerState {
            assistant,
            history: Mutex::new(ConversationHistory::new(10)),
            static_dir: dir.path().to_path_buf(),
            retention: Duration::from_secs(3600),
        });
        (dir, state)
    }

    async fn send(
        state: &Arc<ServerState>,
        method: Method,
        uri: &str,
        body: impl Into<Bytes>,
    ) -> (StatusCode, Bytes) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(body.into()))
            .unwrap();
        let resp = handle_request(req, state.clone()).await.unwrap();
        let status = resp.status();
        (status, resp.into_body().collect().await.unwrap().to_bytes())
    }

    fn json_body(bytes: &Bytes) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn chat_returns_answer_route_and_graph_url() {
        let (_dir, state) = state();
        let (status, body) = send(
            &state,
            Method::POST,
            "/api/chat",
            r#"{"message": "What does S40_00001 need?"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let v = json_body(&body);
        assert_eq!(v["answer"], "S40_00001 needs the Jig.");
        assert_eq!(v["route"], "graph");
        assert!(v["cypher"].as_str().unwrap().starts_with("MATCH"));
        let url = v["graph_url"].as_str().unwrap().to_string();
        assert!(url.starts_with("/static/graph_"));
        assert_eq!(state.history.lock().len(), 1);

        let (status, page) = send(&state, Method::GET, &url, Bytes::new()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8_lossy(&page).contains("S40_00001"));
    }

    #[tokio::test]
    async fn chat_rejects_empty_and_malformed_messages() {
        let (_dir, state) = state();

        let (status, body) = send(&state, Method::POST, "/api/chat", r#"{"message": "   "}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json_body(&body)["error"].as_str().unwrap().contains("must not be empty"));

        let (status, body) = send(&state, Method::POST, "/api/chat", "not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json_body(&body)["error"].as_str().unwrap().contains("chat request JSON"));

        assert!(state.history.lock().is_empty());
    }

    #[tokio::test]
    async fn chat_rejects_oversized_bodies() {
        let (_dir, state) = state();
        let message = "x".repeat(MAX_CHAT_BODY_BYTES + 1);
        let body = serde_json::to_vec(&json!({ "message": message })).unwrap();

        let (status, _) = send(&state, Method::POST, "/api/chat", body).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(state.history.lock().is_empty());
    }

    #[tokio::test]
    async fn static_route_only_serves_artifacts() {
        let (dir, state) = state();
        std::fs::write(dir.path().join("notes.html"), "private").unwrap();

        let (status, _) = send(&state, Method::GET, "/static/notes.html", Bytes::new()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&state, Method::GET, "/static/graph_x/../notes.html", Bytes::new()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&state, Method::GET, "/static/graph_gone.html", Bytes::new()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_body(&body)["error"], "graph expired or not found");
    }

    #[tokio::test]
    async fn clear_resets_the_conversation() {
        let (_dir, state) = state();
        send(&state, Method::POST, "/api/chat", r#"{"message": "Which jig?"}"#).await;
        assert_eq!(state.history.lock().len(), 1);

        let (status, _) = send(&state, Method::POST, "/api/clear", Bytes::new()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.history.lock().is_empty());
    }

    #[tokio::test]
    async fn examples_and_unknown_routes() {
        let (_dir, state) = state();
        let (status, body) = send(&state, Method::GET, "/api/examples", Bytes::new()).await;
        assert_eq!(status, StatusCode::OK);
        let examples = json_body(&body);
        assert_eq!(examples.as_array().unwrap().len(), EXAMPLE_QUESTIONS.len());
        assert!(examples[0]["question"].is_string());

        let (status, _) = send(&state, Method::GET, "/nope", Bytes::new()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
