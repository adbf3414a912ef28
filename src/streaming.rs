//! Character-by-character reveal of assistant answers.
//!
//! Answers are revealed one at a time from a global FIFO queue. The animator
//! is a plain state machine advanced by [`TypingAnimator::tick`]; the owning
//! loop decides when to tick via [`TypingAnimator::should_tick`] and a
//! [`RevealClock`].

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

use crate::session::ConversationStore;

/// Lifecycle of a queued reveal. A finished task leaves the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Revealing,
}

/// Whether the animator has work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimatorState {
    Idle,
    Draining,
}

/// One assistant message being revealed
#[derive(Debug, Clone)]
pub struct TypingTask {
    pub conversation_id: String,
    pub message_index: usize,
    full_text: String,
    revealed_count: usize,
    revealed_bytes: usize,
    total_chars: usize,
    state: TaskState,
}

impl TypingTask {
    pub fn new(conversation_id: impl Into<String>, message_index: usize, full_text: impl Into<String>) -> Self {
        let full_text = full_text.into();
        let total_chars = full_text.chars().count();

        Self {
            conversation_id: conversation_id.into(),
            message_index,
            full_text,
            revealed_count: 0,
            revealed_bytes: 0,
            total_chars,
            state: TaskState::Pending,
        }
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Characters revealed so far
    pub fn revealed_count(&self) -> usize {
        self.revealed_count
    }

    /// Total characters in the full text
    pub fn len(&self) -> usize {
        self.total_chars
    }

    pub fn is_empty(&self) -> bool {
        self.total_chars == 0
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn revealed_text(&self) -> &str {
        &self.full_text[..self.revealed_bytes]
    }

    pub fn is_complete(&self) -> bool {
        self.revealed_count == self.total_chars
    }

    /// Reveal one more character. Returns false once everything is revealed.
    fn advance(&mut self) -> bool {
        let Some(next) = self.full_text[self.revealed_bytes..].chars().next() else {
            return false;
        };

        self.revealed_bytes += next.len_utf8();
        self.revealed_count += 1;
        true
    }
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing queued
    Idle,
    /// Hidden; nothing was revealed
    Paused,
    /// One more character of the head task is visible
    Revealed {
        conversation_id: String,
        message_index: usize,
        revealed: usize,
        total: usize,
    },
    /// The head task finished and was removed from the queue
    Finished {
        conversation_id: String,
        message_index: usize,
    },
}

/// Drains the reveal queue one character per tick
#[derive(Debug)]
pub struct TypingAnimator {
    queue: VecDeque<TypingTask>,
    state: AnimatorState,
    visible: bool,
}

impl Default for TypingAnimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TypingAnimator {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            state: AnimatorState::Idle,
            visible: true,
        }
    }

    /// Push a task onto the tail of the queue.
    pub fn enqueue(&mut self, task: TypingTask) {
        tracing::debug!(
            conversation_id = %task.conversation_id,
            message_index = task.message_index,
            chars = task.len(),
            queued = self.queue.len(),
            "Reveal queued"
        );

        self.queue.push_back(task);
        if self.state == AnimatorState::Idle {
            self.state = AnimatorState::Draining;
        }
    }

    /// Advance the head task by one character and write its prefix into the store.
    pub fn tick(&mut self, store: &mut ConversationStore) -> TickOutcome {
        if self.state == AnimatorState::Idle {
            return TickOutcome::Idle;
        }
        if !self.visible {
            return TickOutcome::Paused;
        }

        let Some(task) = self.queue.front_mut() else {
            self.state = AnimatorState::Idle;
            return TickOutcome::Idle;
        };

        if task.state == TaskState::Pending {
            task.state = TaskState::Revealing;
        }

        if task.advance() {
            store.update_message_text(&task.conversation_id, task.message_index, task.revealed_text());
        } else {
            // Zero-length text; make sure the message reflects it.
            store.update_message_text(&task.conversation_id, task.message_index, "");
        }

        if !task.is_complete() {
            return TickOutcome::Revealed {
                conversation_id: task.conversation_id.clone(),
                message_index: task.message_index,
                revealed: task.revealed_count,
                total: task.total_chars,
            };
        }

        let done = match self.queue.pop_front() {
            Some(task) => task,
            None => return TickOutcome::Idle,
        };
        store.flush();

        if self.queue.is_empty() {
            self.state = AnimatorState::Idle;
        }

        tracing::debug!(
            conversation_id = %done.conversation_id,
            message_index = done.message_index,
            remaining = self.queue.len(),
            "Reveal finished"
        );

        TickOutcome::Finished {
            conversation_id: done.conversation_id,
            message_index: done.message_index,
        }
    }

    /// Visibility signal. Hiding stops ticks without touching progress.
    pub fn set_visible(&mut self, visible: bool) {
        if self.visible != visible {
            tracing::debug!(visible, "Reveal visibility changed");
        }
        self.visible = visible;
    }

    /// Whether the owning loop should schedule another tick.
    pub fn should_tick(&self) -> bool {
        self.state == AnimatorState::Draining && self.visible
    }

    pub fn state(&self) -> AnimatorState {
        self.state
    }

    pub fn is_draining(&self) -> bool {
        self.state == AnimatorState::Draining
    }

    pub fn head(&self) -> Option<&TypingTask> {
        self.queue.front()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Whether `message_index` of `conversation_id` is queued or revealing.
    pub fn is_revealing(&self, conversation_id: &str, message_index: usize) -> bool {
        self.queue
            .iter()
            .any(|t| t.conversation_id == conversation_id && t.message_index == message_index)
    }

    /// Drop every task that targets `conversation_id`.
    pub fn discard_conversation(&mut self, conversation_id: &str) {
        self.queue.retain(|t| t.conversation_id != conversation_id);
        if self.queue.is_empty() {
            self.state = AnimatorState::Idle;
        }
    }

    /// Discard the queue. Messages keep whatever text they had revealed.
    pub fn shutdown(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        self.state = AnimatorState::Idle;
        if discarded > 0 {
            tracing::debug!(discarded, "Reveal queue discarded");
        }
        discarded
    }
}

/// Tick source for the reveal loop.
///
/// Missed ticks are delayed rather than bursted, so resuming after a long
/// pause continues at the normal pace.
pub struct RevealClock {
    interval: Interval,
}

impl RevealClock {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Message;
    use crate::storage::MemoryStore;

    fn store_with_placeholders(count: usize) -> (ConversationStore, String, Vec<usize>) {
        let mut store = ConversationStore::new(Box::new(MemoryStore::new()));
        let id = store.create_conversation("test");
        let indices = (0..count)
            .map(|_| {
                store.append_message(&id, Message::user("q", None)).unwrap();
                store.append_message(&id, Message::assistant_placeholder()).unwrap()
            })
            .collect();
        (store, id, indices)
    }

    fn text_at(store: &ConversationStore, id: &str, index: usize) -> String {
        store.conversation(id).unwrap().messages[index].text.clone()
    }

    #[test]
    fn reveals_one_character_per_tick() {
        let (mut store, id, indices) = store_with_placeholders(1);
        let mut animator = TypingAnimator::new();
        animator.enqueue(TypingTask::new(&id, indices[0], "abc"));
        assert_eq!(animator.state(), AnimatorState::Draining);

        let mut seen = Vec::new();
        loop {
            match animator.tick(&mut store) {
                TickOutcome::Revealed { revealed, .. } => seen.push(revealed),
                TickOutcome::Finished { .. } => break,
                other => panic!("unexpected {:?}", other),
            }
            assert_eq!(text_at(&store, &id, indices[0]).chars().count(), *seen.last().unwrap());
        }

        assert_eq!(seen, vec![1, 2]);
        assert_eq!(text_at(&store, &id, indices[0]), "abc");
        assert_eq!(animator.state(), AnimatorState::Idle);
        assert_eq!(animator.tick(&mut store), TickOutcome::Idle);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let (mut store, id, indices) = store_with_placeholders(1);
        let mut animator = TypingAnimator::new();
        animator.enqueue(TypingTask::new(&id, indices[0], "é°C"));

        animator.tick(&mut store);
        assert_eq!(text_at(&store, &id, indices[0]), "é");
        animator.tick(&mut store);
        assert_eq!(text_at(&store, &id, indices[0]), "é°");
        assert!(matches!(animator.tick(&mut store), TickOutcome::Finished { .. }));
        assert_eq!(text_at(&store, &id, indices[0]), "é°C");
    }

    #[test]
    fn queue_is_fifo_and_one_task_at_a_time() {
        let (mut store, id, indices) = store_with_placeholders(2);
        let mut animator = TypingAnimator::new();
        animator.enqueue(TypingTask::new(&id, indices[0], "ab"));
        animator.enqueue(TypingTask::new(&id, indices[1], "xy"));

        animator.tick(&mut store);
        assert_eq!(text_at(&store, &id, indices[0]), "a");
        assert_eq!(text_at(&store, &id, indices[1]), "");

        assert_eq!(
            animator.tick(&mut store),
            TickOutcome::Finished {
                conversation_id: id.clone(),
                message_index: indices[0]
            }
        );
        assert!(animator.is_draining());
        assert_eq!(animator.head().unwrap().message_index, indices[1]);

        animator.tick(&mut store);
        assert_eq!(text_at(&store, &id, indices[1]), "x");
        animator.tick(&mut store);
        assert_eq!(text_at(&store, &id, indices[1]), "xy");
        assert!(!animator.is_draining());
    }

    #[test]
    fn pause_and_resume_is_lossless() {
        let (mut store, id, indices) = store_with_placeholders(1);
        let mut animator = TypingAnimator::new();
        animator.enqueue(TypingTask::new(&id, indices[0], "abcdef"));

        let mut counts = Vec::new();
        for _ in 0..3 {
            if let TickOutcome::Revealed { revealed, .. } = animator.tick(&mut store) {
                counts.push(revealed);
            }
        }

        animator.set_visible(false);
        assert!(!animator.should_tick());
        for _ in 0..5 {
            assert_eq!(animator.tick(&mut store), TickOutcome::Paused);
        }
        assert_eq!(animator.head().unwrap().revealed_count(), 3);
        assert_eq!(text_at(&store, &id, indices[0]), "abc");

        animator.set_visible(true);
        animator.set_visible(true);
        loop {
            match animator.tick(&mut store) {
                TickOutcome::Revealed { revealed, .. } => counts.push(revealed),
                TickOutcome::Finished { .. } => {
                    counts.push(6);
                    break;
                }
                other => panic!("unexpected {:?}", other),
            }
        }

        assert_eq!(counts, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(text_at(&store, &id, indices[0]), "abcdef");
    }

    #[test]
    fn empty_text_finishes_on_first_tick() {
        let (mut store, id, indices) = store_with_placeholders(1);
        let mut animator = TypingAnimator::new();
        animator.enqueue(TypingTask::new(&id, indices[0], ""));

        assert!(matches!(animator.tick(&mut store), TickOutcome::Finished { .. }));
        assert_eq!(animator.state(), AnimatorState::Idle);
    }

    #[test]
    fn shutdown_leaves_partial_text() {
        let (mut store, id, indices) = store_with_placeholders(2);
        let mut animator = TypingAnimator::new();
        animator.enqueue(TypingTask::new(&id, indices[0], "hello"));
        animator.enqueue(TypingTask::new(&id, indices[1], "world"));

        animator.tick(&mut store);
        animator.tick(&mut store);
        assert_eq!(animator.shutdown(), 2);

        assert_eq!(animator.tick(&mut store), TickOutcome::Idle);
        assert_eq!(text_at(&store, &id, indices[0]), "he");
        assert_eq!(text_at(&store, &id, indices[1]), "");
    }

    #[test]
    fn ticks_for_deleted_conversation_are_harmless() {
        let (mut store, id, indices) = store_with_placeholders(1);
        let mut animator = TypingAnimator::new();
        animator.enqueue(TypingTask::new(&id, indices[0], "ab"));

        store.delete_conversation(&id);
        assert!(matches!(animator.tick(&mut store), TickOutcome::Revealed { .. }));
        assert!(matches!(animator.tick(&mut store), TickOutcome::Finished { .. }));
    }

    #[test]
    fn discard_conversation_drops_its_tasks() {
        let (mut store, id, indices) = store_with_placeholders(1);
        let mut animator = TypingAnimator::new();
        animator.enqueue(TypingTask::new(&id, indices[0], "abc"));
        animator.tick(&mut store);
        assert!(animator.is_revealing(&id, indices[0]));

        animator.discard_conversation(&id);
        assert_eq!(animator.queue_len(), 0);
        assert!(!animator.is_draining());
    }

    #[test]
    fn task_states_progress() {
        let (mut store, id, indices) = store_with_placeholders(1);
        let mut animator = TypingAnimator::new();
        animator.enqueue(TypingTask::new(&id, indices[0], "abc"));
        assert_eq!(animator.head().unwrap().state(), TaskState::Pending);

        animator.tick(&mut store);
        assert_eq!(animator.head().unwrap().state(), TaskState::Revealing);

        animator.tick(&mut store);
        assert!(matches!(animator.tick(&mut store), TickOutcome::Finished { .. }));
        assert!(animator.head().is_none());
        assert!(!animator.is_revealing(&id, indices[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn reveal_clock_ticks_at_its_period() {
        let mut clock = RevealClock::new(Duration::from_millis(15));
        let start = tokio::time::Instant::now();

        clock.tick().await; // first tick is immediate
        clock.tick().await;
        clock.tick().await;

        assert_eq!(start.elapsed(), Duration::from_millis(30));
    }
}
