//! Scripted HTTP server for exercising the clients against a real socket
#![allow(dead_code)]

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// How the stub answers a request
#[derive(Debug, Clone)]
pub enum StubResponse {
    Reply { status: u16, body: String },
    /// Accept the request and never answer
    Hang,
}

impl StubResponse {
    pub fn status(status: u16) -> Self {
        StubResponse::Reply {
            status,
            body: String::new(),
        }
    }

    pub fn json(status: u16, body: impl Into<String>) -> Self {
        StubResponse::Reply {
            status,
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StubRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Clone)]
struct StubState {
    requests: Arc<Mutex<Vec<StubRequest>>>,
    script: Arc<Mutex<VecDeque<StubResponse>>>,
}

impl StubState {
    /// The next scripted response; the last one repeats
    fn next_response(&self) -> StubResponse {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or(StubResponse::status(200))
        }
    }
}

async fn record(State(state): State<StubState>, method: Method, uri: Uri, body: Bytes) -> Response {
    state.requests.lock().unwrap().push(StubRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        body: body.to_vec(),
    });

    match state.next_response() {
        StubResponse::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
        StubResponse::Reply { status, body } => {
            let status = StatusCode::from_u16(status).unwrap();
            (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
    }
}

pub struct StubServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<StubRequest>>>,
    task: JoinHandle<()>,
}

impl StubServer {
    /// Answer every request the same way
    pub async fn start(response: StubResponse) -> Self {
        Self::start_sequence(vec![response]).await
    }

    /// Answer requests with `responses` in order, repeating the last one
    pub async fn start_sequence(responses: Vec<StubResponse>) -> Self {
        let state = StubState {
            requests: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(VecDeque::from(responses))),
        };
        let requests = state.requests.clone();
        let router = Router::new().fallback(record).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            addr,
            requests,
            task,
        }
    }

    /// An address nothing is listening on
    pub async fn unused_address() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_are_served_in_order() {
        let server = StubServer::start_sequence(vec![
            StubResponse::status(503),
            StubResponse::json(200, r#"{"ok":true}"#),
        ])
        .await;
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let url = format!("http://{}/client/config/web01?arch=x86_64", server.address());

        let first = client.get(&url).send().await.unwrap();
        assert_eq!(first.status().as_u16(), 503);
        let second = client.post(&url).body("[1]").send().await.unwrap();
        assert_eq!(second.status().as_u16(), 200);
        assert_eq!(second.text().await.unwrap(), r#"{"ok":true}"#);
        let third = client.get(&url).send().await.unwrap();
        assert_eq!(third.status().as_u16(), 200);

        let requests = server.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[1].method, "POST");
        assert_eq!(requests[1].path, "/client/config/web01");
        assert_eq!(requests[1].query.as_deref(), Some("arch=x86_64"));
        assert_eq!(requests[1].body, b"[1]");
    }
}
