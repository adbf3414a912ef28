#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use medassist::api::AssistantApi;
use medassist::engine::{ChatEngine, EngineSettings};
use medassist::error::EngineError;
use medassist::events::AppEvent;
use medassist::session::ConversationStore;
use medassist::storage::MemoryStore;

/// Scripted service that records every query it sees
pub struct MockApi {
    pub answer: Mutex<Result<String, EngineError>>,
    pub suggestions: Vec<String>,
    pub answer_queries: Mutex<Vec<String>>,
    pub suggestion_queries: Mutex<Vec<String>>,
}

impl MockApi {
    fn new(answer: Result<String, EngineError>, suggestions: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(answer),
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
            answer_queries: Mutex::new(Vec::new()),
            suggestion_queries: Mutex::new(Vec::new()),
        })
    }

    pub fn answering(answer: &str) -> Arc<Self> {
        Self::new(Ok(answer.to_string()), &[])
    }

    pub fn failing(error: EngineError) -> Arc<Self> {
        Self::new(Err(error), &[])
    }

    pub fn suggesting(suggestions: &[&str]) -> Arc<Self> {
        Self::new(Ok(String::new()), suggestions)
    }

    pub fn suggestion_queries(&self) -> Vec<String> {
        self.suggestion_queries.lock().unwrap().clone()
    }

    pub fn answer_queries(&self) -> Vec<String> {
        self.answer_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssistantApi for MockApi {
    async fn suggestions(&self, query: &str) -> Result<Vec<String>, EngineError> {
        self.suggestion_queries.lock().unwrap().push(query.to_string());
        Ok(self.suggestions.clone())
    }

    async fn answer(&self, query: &str) -> Result<String, EngineError> {
        self.answer_queries.lock().unwrap().push(query.to_string());
        self.answer.lock().unwrap().clone()
    }
}

pub fn engine_with(
    api: Arc<MockApi>,
    memory: &MemoryStore,
) -> (ChatEngine, mpsc::UnboundedReceiver<AppEvent>) {
    let mut store = ConversationStore::new(Box::new(memory.clone()));
    store.restore();
    ChatEngine::new(api, store, EngineSettings::default())
}

/// Wait for the answer event, skipping suggestion results, and apply it.
pub async fn receive_answer(engine: &mut ChatEngine, rx: &mut mpsc::UnboundedReceiver<AppEvent>) {
    loop {
        let event = rx.recv().await.expect("engine channel closed");
        let is_answer = matches!(
            event,
            AppEvent::AnswerReady { .. } | AppEvent::AnswerFailed { .. }
        );
        engine.handle_event(event);
        if is_answer {
            return;
        }
    }
}

/// Tick until the reveal queue is empty.
pub fn drain(engine: &mut ChatEngine) -> usize {
    let mut ticks = 0;
    while engine.should_tick() {
        engine.tick();
        ticks += 1;
    }
    ticks
}
