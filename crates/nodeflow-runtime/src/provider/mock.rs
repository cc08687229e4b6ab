//! Scripted network executor.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::network::{NetworkError, NetworkExecutor, NetworkRequest, NetworkResponse};

type Reply = Result<NetworkResponse, NetworkError>;

#[derive(Debug, Default)]
struct MockState {
    replies: HashMap<String, VecDeque<Reply>>,
    calls: Vec<NetworkRequest>,
}

/// [`NetworkExecutor`] returning scripted replies per URL.
///
/// Replies queued for a URL are returned in order; the last one repeats
/// once the queue is drained. URLs without replies answer `404`.
#[derive(Debug, Clone, Default)]
pub struct MockNetwork {
    inner: Arc<Mutex<MockState>>,
}

impl MockNetwork {
    /// Creates an executor without replies.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(self, url: impl Into<String>, reply: Reply) -> Self {
        self.state()
            .replies
            .entry(url.into())
            .or_default()
            .push_back(reply);
        self
    }

    /// Queues a response for the URL.
    #[must_use]
    pub fn respond(self, url: impl Into<String>, status_code: u16, body: Value) -> Self {
        self.push(url, Ok(NetworkResponse::new(status_code, body)))
    }

    /// Queues a transport failure for the URL.
    #[must_use]
    pub fn fail(self, url: impl Into<String>, error: NetworkError) -> Self {
        self.push(url, Err(error))
    }

    /// Returns every request received so far.
    pub fn calls(&self) -> Vec<NetworkRequest> {
        self.state().calls.clone()
    }

    /// Returns how many requests targeted the URL.
    pub fn call_count(&self, url: &str) -> usize {
        self.state().calls.iter().filter(|r| r.url == url).count()
    }
}

#[async_trait::async_trait]
impl NetworkExecutor for MockNetwork {
    async fn call(&self, request: NetworkRequest) -> Result<NetworkResponse, NetworkError> {
        let mut state = self.state();
        let reply = match state.replies.get_mut(&request.url) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        state.calls.push(request);

        reply.unwrap_or_else(|| Ok(NetworkResponse::new(404, Value::Null)))
    }
}
