//! Scripted provider - replays queued replies and records every request.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use catalog_core::{async_trait, ChatProvider, ChatRequest, RawReply, TransportError};

type Scripted = Result<RawReply, TransportError>;

#[derive(Default)]
struct Script {
    by_model: HashMap<String, VecDeque<Scripted>>,
    queue: VecDeque<Scripted>,
    fallback: Option<RawReply>,
    requests: Vec<ChatRequest>,
}

/// A provider that answers from a script instead of the network.
///
/// Replies are taken from the model's own queue first, then from the shared
/// queue, then the standing reply set with [`ScriptedProvider::always`].
/// With nothing left it fails with a network error.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that gives the same reply to every request.
    pub fn always(reply: RawReply) -> Self {
        let provider = Self::new();
        provider.lock().fallback = Some(reply);
        provider
    }

    /// Queue a reply for the next request, whatever its model.
    pub fn push(&self, reply: RawReply) -> &Self {
        self.lock().queue.push_back(Ok(reply));
        self
    }

    /// Queue a reply for the next request to `model`.
    pub fn push_for(&self, model: &str, reply: RawReply) -> &Self {
        self.lock()
            .by_model
            .entry(model.to_string())
            .or_default()
            .push_back(Ok(reply));
        self
    }

    /// Queue a transport failure for the next request.
    pub fn push_error(&self, error: TransportError) -> &Self {
        self.lock().queue.push_back(Err(error));
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.lock().requests.clone()
    }

    /// Models of the requests received so far, in order.
    pub fn models_called(&self) -> Vec<String> {
        self.lock()
            .requests
            .iter()
            .map(|request| request.model.clone())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn send(&self, request: ChatRequest) -> Result<RawReply, TransportError> {
        let mut script = self.lock();
        let model = request.model.clone();
        script.requests.push(request);

        if let Some(reply) = script
            .by_model
            .get_mut(&model)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        if let Some(reply) = script.queue.pop_front() {
            return reply;
        }
        match &script.fallback {
            Some(reply) => Ok(reply.clone()),
            None => Err(TransportError::Network(format!(
                "no scripted reply for model {}",
                model
            ))),
        }
    }

    fn name(&self) -> &str {
        "ScriptedProvider"
    }
}
