#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use code_analyst::analysis::{
    AnalysisFailure, AnalysisOrchestrator, AnalysisRecord, ModelClient, PromptBuilder,
    PromptPayload, RecordId, RecordStore, StoreError,
};

pub fn chat_completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            {
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }
        ]
    })
}

#[derive(Debug, Clone)]
pub enum ProviderBody {
    Json(Value),
    Raw(String),
}

/// How the fake provider answers every request.
#[derive(Debug, Clone)]
pub struct ProviderScript {
    pub status: u16,
    pub body: ProviderBody,
    pub delay: Duration,
}

impl ProviderScript {
    pub fn ok(content: &str) -> Self {
        Self {
            status: 200,
            body: ProviderBody::Json(chat_completion(content)),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: ProviderBody::Json(json!({
                "error": {"message": "provider says no", "code": status}
            })),
            delay: Duration::ZERO,
        }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: ProviderBody::Json(body),
            delay: Duration::ZERO,
        }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status,
            body: ProviderBody::Raw(body.to_string()),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct FakeProviderState {
    script: ProviderScript,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

/// OpenAI-compatible provider bound to an ephemeral local port.
pub struct FakeProvider {
    pub endpoint: String,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl FakeProvider {
    pub async fn start(script: ProviderScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("fake provider should bind");
        let addr = listener.local_addr().expect("fake provider addr");
        let captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/chat/completions", post(fake_completions))
            .with_state(FakeProviderState {
                script,
                captured: Arc::clone(&captured),
            });

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            endpoint: format!("http://{}", addr),
            captured,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.captured.lock().expect("lock").clone()
    }
}

async fn fake_completions(
    State(state): State<FakeProviderState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.captured.lock().expect("lock").push(CapturedRequest {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body,
    });

    if !state.script.delay.is_zero() {
        tokio::time::sleep(state.script.delay).await;
    }

    let status = StatusCode::from_u16(state.script.status).expect("valid status");
    match state.script.body {
        ProviderBody::Json(value) => (status, Json(value)).into_response(),
        ProviderBody::Raw(text) => (status, text).into_response(),
    }
}

/// Address nothing listens on.
pub async fn closed_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr: SocketAddr = listener.local_addr().expect("listener addr");
    drop(listener);
    format!("http://{}", addr)
}

/// Model client double that answers with a fixed reply.
pub struct ScriptedModelClient {
    reply: Result<String, AnalysisFailure>,
    delay: Duration,
    calls: AtomicUsize,
    prompts: Mutex<Vec<PromptPayload>>,
}

impl ScriptedModelClient {
    pub fn replying(content: &str) -> Self {
        Self::with_reply(Ok(content.to_string()))
    }

    pub fn failing(failure: AnalysisFailure) -> Self {
        Self::with_reply(Err(failure))
    }

    fn with_reply(reply: Result<String, AnalysisFailure>) -> Self {
        Self {
            reply,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<PromptPayload> {
        self.prompts.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn call(&self, prompt: &PromptPayload) -> Result<String, AnalysisFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().expect("lock").push(prompt.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone()
    }
}

/// Store that rejects every write.
#[derive(Default)]
pub struct FailingStore {
    attempts: AtomicUsize,
}

impl FailingStore {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for FailingStore {
    async fn save(&self, _record: AnalysisRecord) -> Result<RecordId, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

/// Store whose writes take `delay` before succeeding.
pub struct SlowStore {
    pub delay: Duration,
    pub completed: AtomicUsize,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            completed: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecordStore for SlowStore {
    async fn save(&self, record: AnalysisRecord) -> Result<RecordId, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(record.id)
    }
}

pub fn orchestrator(
    model_client: Arc<dyn ModelClient>,
    store: Arc<dyn RecordStore>,
) -> AnalysisOrchestrator {
    AnalysisOrchestrator::new(PromptBuilder::new("test-model"), model_client, store)
}
