//! One-shot HTTP responder for provider tests

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What the provider sent
pub struct CapturedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// `METHOD /path?query`
    pub fn request_line(&self) -> String {
        format!("{} {}", self.method, self.uri)
    }
}

struct Reply {
    status: StatusCode,
    body: String,
    captured: mpsc::Sender<CapturedRequest>,
}

async fn capture(
    State(reply): State<Arc<Reply>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let _ = reply
        .captured
        .send(CapturedRequest {
            method,
            uri,
            headers,
            body,
        })
        .await;
    (
        reply.status,
        [(header::CONTENT_TYPE, "application/json")],
        reply.body.clone(),
    )
        .into_response()
}

/// Answer every request with `status` and `body`. Returns the base URL and a
/// handle that resolves to the first request received.
pub async fn serve_once(status: u16, body: &str) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let (tx, mut rx) = mpsc::channel(1);
    let reply = Reply {
        status: StatusCode::from_u16(status).unwrap(),
        body: body.to_string(),
        captured: tx,
    };
    let app = Router::new().fallback(capture).with_state(Arc::new(reply));

    // Lives until the test runtime shuts down
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let handle = tokio::spawn(async move { rx.recv().await.unwrap() });
    (base_url, handle)
}
