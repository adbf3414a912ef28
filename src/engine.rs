//! The conversation and reveal engine.
//!
//! [`ChatEngine`] owns the conversation store, the reveal queue and the
//! suggestion debouncer. Network fetches run on spawned tasks and report back
//! through [`AppEvent`]s; the loop that owns the engine feeds those events to
//! [`ChatEngine::handle_event`] and calls [`ChatEngine::tick`] whenever
//! [`ChatEngine::should_tick`] holds. All state changes therefore happen on
//! that one loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{AssistantApi, answer_or_fallback};
use crate::config::Config;
use crate::error::EngineError;
use crate::events::{AppEvent, Conversation, Message, Role, title_from_prompt};
use crate::markdown::format_answer;
use crate::session::ConversationStore;
use crate::streaming::{TickOutcome, TypingAnimator, TypingTask};
use crate::suggest::{SUGGESTION_DEBOUNCE_MS, SuggestionDebouncer};

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub debounce: Duration,
    pub tick: Duration,
    pub user_colors: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(SUGGESTION_DEBOUNCE_MS),
            tick: Duration::from_millis(15),
            user_colors: Vec::new(),
        }
    }
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            debounce: config.debounce_delay(),
            tick: config.tick_interval(),
            user_colors: config.ui.user_colors.clone(),
        }
    }
}

/// The assistant message waiting for its answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAnswer {
    pub conversation_id: String,
    pub message_index: usize,
    pub query: String,
}

pub struct ChatEngine {
    store: ConversationStore,
    animator: TypingAnimator,
    suggestions: SuggestionDebouncer,
    api: Arc<dyn AssistantApi>,
    events: mpsc::UnboundedSender<AppEvent>,
    in_flight: Option<PendingAnswer>,
    answer_task: Option<JoinHandle<()>>,
    notice: Option<String>,
    settings: EngineSettings,
}

impl ChatEngine {
    /// Build an engine around an already restored store. The receiver carries
    /// fetch results that must be passed back to [`ChatEngine::handle_event`].
    pub fn new(
        api: Arc<dyn AssistantApi>,
        store: ConversationStore,
        settings: EngineSettings,
    ) -> (Self, mpsc::UnboundedReceiver<AppEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let suggestions = SuggestionDebouncer::new(settings.debounce, Arc::clone(&api), events.clone());

        let engine = Self {
            store,
            animator: TypingAnimator::new(),
            suggestions,
            api,
            events,
            in_flight: None,
            answer_task: None,
            notice: None,
            settings,
        };

        (engine, rx)
    }

    /// Submit a prompt. Creates a conversation when none is selected, appends
    /// the user message and an empty assistant placeholder, then fetches the
    /// answer in the background.
    ///
    /// Only one prompt may be answered at a time: while an answer is being
    /// fetched or revealed this returns [`EngineError::Busy`].
    pub fn submit(&mut self, prompt: &str) -> Result<PendingAnswer, EngineError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EngineError::EmptyPrompt);
        }
        if self.is_busy() {
            return Err(EngineError::Busy);
        }

        let conversation_id = match self.store.current_conversation_id() {
            Some(id) => id.to_string(),
            None => {
                let id = self.store.create_conversation(&title_from_prompt(prompt));
                self.store.select_conversation(&id)?;
                id
            }
        };

        let color_tag = self.next_color_tag(&conversation_id);
        self.store
            .append_message(&conversation_id, Message::user(prompt, color_tag))?;
        let message_index = self
            .store
            .append_message(&conversation_id, Message::assistant_placeholder())?;

        let pending = PendingAnswer {
            conversation_id,
            message_index,
            query: prompt.to_string(),
        };
        self.in_flight = Some(pending.clone());
        self.notice = None;
        self.suggestions.clear();

        tracing::info!(
            conversation_id = %pending.conversation_id,
            message_index,
            "Prompt submitted"
        );

        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let request = pending.clone();
        self.answer_task = Some(tokio::spawn(async move {
            let event = match api.answer(&request.query).await {
                Ok(answer) => AppEvent::AnswerReady {
                    conversation_id: request.conversation_id,
                    message_index: request.message_index,
                    answer,
                },
                Err(err) => AppEvent::AnswerFailed {
                    conversation_id: request.conversation_id,
                    message_index: request.message_index,
                    error: err,
                },
            };
            let _ = events.send(event);
        }));

        Ok(pending)
    }

    /// Apply a fetch result.
    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::AnswerReady {
                conversation_id,
                message_index,
                answer,
            } => {
                if !self.take_in_flight(&conversation_id, message_index) {
                    return;
                }
                if self.store.conversation(&conversation_id).is_none() {
                    tracing::debug!(%conversation_id, "Answer arrived for deleted conversation");
                    return;
                }

                let full_text = format_answer(answer_or_fallback(&answer));
                self.animator
                    .enqueue(TypingTask::new(conversation_id, message_index, full_text));
            }
            AppEvent::AnswerFailed {
                conversation_id,
                message_index,
                error,
            } => {
                if !self.take_in_flight(&conversation_id, message_index) {
                    return;
                }
                tracing::error!(%conversation_id, "Answer fetch failed: {}", error);
                self.report("Could not get an answer", error);
            }
            event @ (AppEvent::SuggestionsReady { .. } | AppEvent::SuggestionsFailed { .. }) => {
                self.suggestions.apply(&event);
            }
        }
    }

    /// Prompt text changed; schedules a debounced suggestion fetch.
    pub fn on_prompt_changed(&mut self, text: &str) {
        self.suggestions.on_prompt_changed(text);
    }

    /// Advance the reveal by one character.
    pub fn tick(&mut self) -> TickOutcome {
        self.animator.tick(&mut self.store)
    }

    pub fn should_tick(&self) -> bool {
        self.animator.should_tick()
    }

    pub fn tick_interval(&self) -> Duration {
        self.settings.tick
    }

    /// Visibility signal from the UI (terminal focus).
    pub fn set_visible(&mut self, visible: bool) {
        self.animator.set_visible(visible);
    }

    /// An answer is being fetched or revealed.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some() || self.animator.is_draining()
    }

    pub fn is_awaiting_answer(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<&PendingAnswer> {
        self.in_flight.as_ref()
    }

    /// Whether the given assistant message is still waiting or revealing.
    pub fn is_message_pending(&self, conversation_id: &str, message_index: usize) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|p| p.conversation_id == conversation_id && p.message_index == message_index)
            || self.animator.is_revealing(conversation_id, message_index)
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn conversations(&self) -> &[Conversation] {
        self.store.conversations()
    }

    pub fn current_conversation(&self) -> Option<&Conversation> {
        self.store.current_conversation()
    }

    pub fn animator(&self) -> &TypingAnimator {
        &self.animator
    }

    pub fn suggestions(&self) -> &[String] {
        self.suggestions.suggestions()
    }

    /// Show `error` as the notice when the user can act on it, otherwise log it.
    fn report(&mut self, context: &str, error: EngineError) {
        if error.is_user_visible() {
            self.notice = Some(format!("{}: {}", context, error));
        } else {
            tracing::warn!("{}: {}", context, error);
        }
    }

    /// Dismissible user-facing error, if any.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn select_conversation(&mut self, conversation_id: &str) -> Result<(), EngineError> {
        self.store.select_conversation(conversation_id)
    }

    /// Start a fresh conversation on the next submit.
    pub fn new_chat(&mut self) {
        self.store.clear_selection();
    }

    /// Select the conversation `offset` positions away from the current one.
    pub fn cycle_conversation(&mut self, offset: isize) {
        let conversations = self.store.conversations();
        if conversations.is_empty() {
            return;
        }

        let len = conversations.len() as isize;
        let next = match self.store.current_conversation_id() {
            Some(id) => {
                let current = conversations.iter().position(|c| c.id == id).unwrap_or(0) as isize;
                (current + offset).rem_euclid(len)
            }
            None if offset < 0 => len - 1,
            None => 0,
        };

        let id = conversations[next as usize].id.clone();
        let _ = self.store.select_conversation(&id);
    }

    pub fn delete_conversation(&mut self, conversation_id: &str) -> bool {
        self.animator.discard_conversation(conversation_id);
        if self
            .in_flight
            .as_ref()
            .is_some_and(|p| p.conversation_id == conversation_id)
        {
            self.abort_answer();
        }
        self.store.delete_conversation(conversation_id)
    }

    pub fn delete_current_conversation(&mut self) -> bool {
        match self.store.current_conversation_id().map(str::to_string) {
            Some(id) => self.delete_conversation(&id),
            None => false,
        }
    }

    pub fn delete_all(&mut self) {
        self.animator.shutdown();
        self.abort_answer();
        if let Err(err) = self.store.delete_all() {
            self.report("Could not delete conversations", err);
        }
    }

    /// Cancel every pending timer and fetch, drop the reveal queue and write
    /// whatever was revealed so far.
    pub fn shutdown(&mut self) {
        self.suggestions.cancel();
        self.abort_answer();
        self.animator.shutdown();
        self.store.flush();
        tracing::debug!("Engine shut down");
    }

    fn abort_answer(&mut self) {
        if let Some(handle) = self.answer_task.take() {
            handle.abort();
        }
        self.in_flight = None;
    }

    fn take_in_flight(&mut self, conversation_id: &str, message_index: usize) -> bool {
        let expected = self
            .in_flight
            .as_ref()
            .is_some_and(|p| p.conversation_id == conversation_id && p.message_index == message_index);
        if !expected {
            tracing::debug!(conversation_id, message_index, "Ignoring answer for a request no longer pending");
            return false;
        }

        self.in_flight = None;
        self.answer_task = None;
        true
    }

    fn next_color_tag(&self, conversation_id: &str) -> Option<String> {
        if self.settings.user_colors.is_empty() {
            return None;
        }

        let user_messages = self
            .store
            .conversation(conversation_id)
            .map(|c| c.messages.iter().filter(|m| m.role == Role::User).count())
            .unwrap_or(0);

        Some(self.settings.user_colors[user_messages % self.settings.user_colors.len()].clone())
    }
}

impl Drop for ChatEngine {
    fn drop(&mut self) {
        if let Some(handle) = self.answer_task.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;

    struct FixedApi(&'static str);

    #[async_trait]
    impl AssistantApi for FixedApi {
        async fn suggestions(&self, _query: &str) -> Result<Vec<String>, EngineError> {
            Ok(Vec::new())
        }

        async fn answer(&self, _query: &str) -> Result<String, EngineError> {
            Ok(self.0.to_string())
        }
    }

    fn engine(answer: &'static str, colors: &[&str]) -> (ChatEngine, mpsc::UnboundedReceiver<AppEvent>) {
        let settings = EngineSettings {
            user_colors: colors.iter().map(|c| c.to_string()).collect(),
            ..EngineSettings::default()
        };
        ChatEngine::new(
            Arc::new(FixedApi(answer)),
            ConversationStore::new(Box::new(MemoryStore::new())),
            settings,
        )
    }

    async fn answer_and_drain(engine: &mut ChatEngine, rx: &mut mpsc::UnboundedReceiver<AppEvent>) {
        let event = rx.recv().await.unwrap();
        engine.handle_event(event);
        while engine.should_tick() {
            engine.tick();
        }
    }

    #[tokio::test]
    async fn empty_and_busy_prompts_are_rejected() {
        let (mut engine, mut rx) = engine("ok", &[]);

        assert_eq!(engine.submit("   "), Err(EngineError::EmptyPrompt));
        engine.submit("fever").unwrap();
        assert_eq!(engine.submit("cough"), Err(EngineError::Busy));

        answer_and_drain(&mut engine, &mut rx).await;
        assert!(!engine.is_busy());
        assert!(engine.submit("cough").is_ok());
    }

    #[tokio::test]
    async fn follow_up_prompts_extend_the_selected_conversation() {
        let (mut engine, mut rx) = engine("ok", &["red", "blue"]);

        let first = engine.submit("fever").unwrap();
        answer_and_drain(&mut engine, &mut rx).await;
        let second = engine.submit("and cough?").unwrap();
        answer_and_drain(&mut engine, &mut rx).await;

        assert_eq!(first.conversation_id, second.conversation_id);
        assert_eq!(engine.conversations().len(), 1);

        let messages = &engine.current_conversation().unwrap().messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].color_tag.as_deref(), Some("red"));
        assert_eq!(messages[2].color_tag.as_deref(), Some("blue"));
        assert_eq!(messages[1].color_tag, None);
    }

    #[tokio::test]
    async fn new_chat_starts_a_new_conversation() {
        let (mut engine, mut rx) = engine("ok", &[]);

        let first = engine.submit("fever").unwrap();
        answer_and_drain(&mut engine, &mut rx).await;
        engine.new_chat();
        let second = engine.submit("cough").unwrap();

        assert_ne!(first.conversation_id, second.conversation_id);
        assert_eq!(engine.conversations()[0].id, second.conversation_id);
        assert_eq!(engine.conversations()[0].title, "cough");
    }

    #[tokio::test]
    async fn answers_for_stale_requests_are_ignored() {
        let (mut engine, _rx) = engine("ok", &[]);

        engine.handle_event(AppEvent::AnswerReady {
            conversation_id: "nope".into(),
            message_index: 1,
            answer: "ignored".into(),
        });
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn deleting_the_conversation_mid_flight_drops_the_answer() {
        let (mut engine, _rx) = engine("ok", &[]);

        let pending = engine.submit("fever").unwrap();
        assert!(engine.delete_conversation(&pending.conversation_id));
        assert!(!engine.is_busy());

        engine.handle_event(AppEvent::AnswerReady {
            conversation_id: pending.conversation_id,
            message_index: pending.message_index,
            answer: "late".into(),
        });
        assert!(!engine.should_tick());
    }

    #[tokio::test]
    async fn cycle_conversation_wraps_around() {
        let (mut engine, mut rx) = engine("ok", &[]);
        for prompt in ["a", "b", "c"] {
            engine.new_chat();
            engine.submit(prompt).unwrap();
            answer_and_drain(&mut engine, &mut rx).await;
        }

        let ids: Vec<String> = engine.conversations().iter().map(|c| c.id.clone()).collect();
        assert_eq!(engine.store().current_conversation_id(), Some(ids[0].as_str()));

        engine.cycle_conversation(-1);
        assert_eq!(engine.store().current_conversation_id(), Some(ids[2].as_str()));
        engine.cycle_conversation(1);
        assert_eq!(engine.store().current_conversation_id(), Some(ids[0].as_str()));
    }

    #[tokio::test]
    async fn shutdown_stops_the_reveal() {
        let (mut engine, mut rx) = engine("a long answer", &[]);
        let pending = engine.submit("fever").unwrap();
        let event = rx.recv().await.unwrap();
        engine.handle_event(event);

        engine.tick();
        engine.tick();
        engine.shutdown();

        assert!(!engine.should_tick());
        let text = &engine.current_conversation().unwrap().messages[pending.message_index].text;
        assert_eq!(text, "a ");
    }

    #[tokio::test]
    async fn only_user_visible_failures_raise_a_notice() {
        let (mut engine, _rx) = engine("ok", &[]);
        let pending = engine.submit("fever").unwrap();

        engine.handle_event(AppEvent::AnswerFailed {
            conversation_id: pending.conversation_id.clone(),
            message_index: pending.message_index,
            error: EngineError::Persistence("disk full".into()),
        });
        assert!(!engine.is_busy());
        assert!(engine.notice().is_none());

        let pending = engine.submit("cough").unwrap();
        engine.handle_event(AppEvent::AnswerFailed {
            conversation_id: pending.conversation_id,
            message_index: pending.message_index,
            error: EngineError::Network("timed out".into()),
        });
        assert_eq!(
            engine.notice(),
            Some("Could not get an answer: network error: timed out")
        );
    }
}
