//! Debounced autocomplete suggestions.
//!
//! Every prompt edit restarts a quiet-period timer; only the last edit in a
//! burst reaches the suggestion service. Results are tagged with the
//! generation of the edit that scheduled them and discarded if the prompt has
//! changed since.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::AssistantApi;
use crate::events::AppEvent;

/// Default quiet period before a suggestion fetch (milliseconds)
pub const SUGGESTION_DEBOUNCE_MS: u64 = 500;

pub struct SuggestionDebouncer {
    delay: Duration,
    api: Arc<dyn AssistantApi>,
    events: mpsc::UnboundedSender<AppEvent>,
    pending: Option<JoinHandle<()>>,
    generation: u64,
    current_text: String,
    suggestions: Vec<String>,
}

impl SuggestionDebouncer {
    pub fn new(
        delay: Duration,
        api: Arc<dyn AssistantApi>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            delay,
            api,
            events,
            pending: None,
            generation: 0,
            current_text: String::new(),
            suggestions: Vec::new(),
        }
    }

    /// Called on every prompt edit. Must run inside a tokio runtime.
    pub fn on_prompt_changed(&mut self, text: &str) {
        self.cancel_pending();
        self.generation += 1;
        self.current_text = text.to_string();

        let query = text.trim().to_string();
        if query.is_empty() {
            self.suggestions.clear();
            return;
        }

        let generation = self.generation;
        let delay = self.delay;
        let api = Arc::clone(&self.api);
        let events = self.events.clone();

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            tracing::debug!(generation, query = %query, "Fetching suggestions");
            let event = match api.suggestions(&query).await {
                Ok(suggestions) => AppEvent::SuggestionsReady {
                    generation,
                    query,
                    suggestions,
                },
                Err(err) => AppEvent::SuggestionsFailed {
                    generation,
                    query,
                    error: err.to_string(),
                },
            };

            // The receiver only goes away when the engine is torn down.
            let _ = events.send(event);
        }));
    }

    /// Apply a suggestion result. Returns false when it was stale and dropped.
    pub fn apply(&mut self, event: &AppEvent) -> bool {
        let (generation, query) = match event {
            AppEvent::SuggestionsReady { generation, query, .. }
            | AppEvent::SuggestionsFailed { generation, query, .. } => (*generation, query),
            _ => return false,
        };

        if generation != self.generation || query.as_str() != self.current_text.trim() {
            tracing::debug!(
                generation,
                current = self.generation,
                "Discarding stale suggestions"
            );
            return false;
        }

        self.pending = None;
        match event {
            AppEvent::SuggestionsReady { suggestions, .. } => {
                self.suggestions = suggestions.clone();
            }
            AppEvent::SuggestionsFailed { error, .. } => {
                tracing::warn!("Suggestion fetch failed: {}", error);
                self.suggestions.clear();
            }
            _ => {}
        }
        true
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a debounce timer or fetch is outstanding.
    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Drop the list and any outstanding fetch; results in flight become stale.
    pub fn clear(&mut self) {
        self.cancel_pending();
        self.generation += 1;
        self.current_text.clear();
        self.suggestions.clear();
    }

    pub fn cancel(&mut self) {
        self.cancel_pending();
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for SuggestionDebouncer {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingApi {
        queries: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl AssistantApi for RecordingApi {
        async fn suggestions(&self, query: &str) -> Result<Vec<String>, EngineError> {
            self.queries.lock().unwrap().push(query.to_string());
            if self.fail {
                return Err(EngineError::Network("offline".into()));
            }
            Ok(vec![format!("{} treatment", query), format!("{} causes", query)])
        }

        async fn answer(&self, _query: &str) -> Result<String, EngineError> {
            Ok(String::new())
        }
    }

    fn debouncer(api: Arc<RecordingApi>) -> (SuggestionDebouncer, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            SuggestionDebouncer::new(Duration::from_millis(SUGGESTION_DEBOUNCE_MS), api, tx),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_keystrokes_yields_one_fetch() {
        let api = Arc::new(RecordingApi::default());
        let (mut debouncer, mut rx) = debouncer(api.clone());

        for text in ["d", "di", "dia", "diab", "diabetes"] {
            debouncer.on_prompt_changed(text);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let event = rx.recv().await.unwrap();
        assert!(debouncer.apply(&event));
        assert_eq!(*api.queries.lock().unwrap(), vec!["diabetes".to_string()]);
        assert_eq!(
            debouncer.suggestions(),
            &["diabetes treatment".to_string(), "diabetes causes".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_waits_for_quiet_period() {
        let api = Arc::new(RecordingApi::default());
        let (mut debouncer, _rx) = debouncer(api.clone());

        debouncer.on_prompt_changed("fever");
        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(api.queries.lock().unwrap().is_empty());
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(api.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_prompt_clears_without_fetching() {
        let api = Arc::new(RecordingApi::default());
        let (mut debouncer, mut rx) = debouncer(api.clone());

        debouncer.on_prompt_changed("cough");
        let event = rx.recv().await.unwrap();
        debouncer.apply(&event);
        assert!(!debouncer.suggestions().is_empty());

        debouncer.on_prompt_changed("   ");
        assert!(debouncer.suggestions().is_empty());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(api.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_results_are_discarded() {
        let api = Arc::new(RecordingApi::default());
        let (mut debouncer, mut rx) = debouncer(api.clone());

        debouncer.on_prompt_changed("fever");
        let event = rx.recv().await.unwrap();

        // Prompt changed after the fetch was issued but before we saw the result.
        debouncer.on_prompt_changed("fever in kids");
        assert!(!debouncer.apply(&event));
        assert!(debouncer.suggestions().is_empty());
    }

    #[test]
    fn results_for_other_text_are_discarded() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut debouncer = SuggestionDebouncer::new(
            Duration::from_millis(10),
            Arc::new(RecordingApi::default()),
            tx,
        );

        let stale = AppEvent::SuggestionsReady {
            generation: 0,
            query: "old".into(),
            suggestions: vec!["old stuff".into()],
        };
        assert!(!debouncer.apply(&stale));
        assert!(debouncer.suggestions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_produce_an_empty_list() {
        let api = Arc::new(RecordingApi {
            fail: true,
            ..Default::default()
        });
        let (mut debouncer, mut rx) = debouncer(api);

        debouncer.on_prompt_changed("rash");
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, AppEvent::SuggestionsFailed { .. }));
        assert!(debouncer.apply(&event));
        assert!(debouncer.suggestions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_invalidates_in_flight_results() {
        let api = Arc::new(RecordingApi::default());
        let (mut debouncer, mut rx) = debouncer(api);

        debouncer.on_prompt_changed("fever");
        let event = rx.recv().await.unwrap();
        debouncer.clear();
        assert!(!debouncer.apply(&event));
    }
}
