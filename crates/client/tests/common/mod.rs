#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use adacta_client::{
    ApiClient, ApiRequest, ApiResponse, MemoryStore, RequestAuthenticator, SessionStore, Transport,
    TransportFailure,
};
use async_trait::async_trait;
use tokio::sync::oneshot;

/// Replays queued responses in order and records every request it sees.
///
/// A held request takes its reply on arrival and returns it once released.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<ApiResponse, TransportFailure>>>,
    requests: Mutex<Vec<ApiRequest>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply_json(&self, body: serde_json::Value) {
        self.push(Ok(ApiResponse {
            status: 200,
            headers: Default::default(),
            body: serde_json::to_vec(&body).unwrap(),
        }));
    }

    pub fn reply_json_with_header(&self, body: serde_json::Value, name: &str, value: &str) {
        let mut resp = ApiResponse {
            status: 200,
            headers: Default::default(),
            body: serde_json::to_vec(&body).unwrap(),
        };
        resp.headers.insert(name.to_string(), value.to_string());
        self.push(Ok(resp));
    }

    pub fn reply_status(&self, status: u16, status_text: &str, body: &str) {
        self.push(Err(TransportFailure::Status {
            status,
            status_text: status_text.to_string(),
            headers: Default::default(),
            body: body.as_bytes().to_vec(),
        }));
    }

    pub fn reply_unreachable(&self) {
        self.push(Err(TransportFailure::Connection("connection refused".into())));
    }

    pub fn push(&self, reply: Result<ApiResponse, TransportFailure>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Holds the next request in flight until the returned sender fires or drops.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> ApiRequest {
        self.requests().last().cloned().expect("no request sent")
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportFailure> {
        self.requests.lock().unwrap().push(request);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportFailure::Connection("no scripted reply".into())));
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        reply
    }
}

pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<MemoryStore>,
    pub session: Arc<SessionStore>,
    pub api: ApiClient,
}

pub fn harness() -> Harness {
    harness_with(|auth| auth)
}

pub fn harness_with(
    configure: impl FnOnce(RequestAuthenticator) -> RequestAuthenticator,
) -> Harness {
    let transport = ScriptedTransport::new();
    let store = Arc::new(MemoryStore::new());
    let session = Arc::new(SessionStore::open(store.clone(), transport.clone()).unwrap());
    let auth = configure(RequestAuthenticator::new(transport.clone(), session.clone()));
    Harness {
        transport,
        store,
        session,
        api: ApiClient::new(Arc::new(auth)),
    }
}
