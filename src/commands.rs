use anyhow::{Context, Result};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::{ApiClient, AssistantApi};
use crate::config::Config;
use crate::engine::{ChatEngine, EngineSettings};
use crate::events::{AppEvent, Role};
use crate::session::ConversationStore;
use crate::storage::{FileStore, MemoryStore};
use crate::streaming::{RevealClock, TickOutcome};

/// Open the conversation store, restored from disk unless `ephemeral`.
pub fn open_store(config: &Config, ephemeral: bool) -> Result<ConversationStore> {
    if ephemeral {
        return Ok(ConversationStore::new(Box::new(MemoryStore::new())));
    }

    let backend = FileStore::new(config.session_dir());
    backend.ensure_directory()?;

    let mut store = ConversationStore::new(Box::new(backend));
    store.restore();
    Ok(store)
}

/// Build an engine talking to the configured service.
pub fn open_engine(
    config: &Config,
    ephemeral: bool,
) -> Result<(ChatEngine, mpsc::UnboundedReceiver<AppEvent>)> {
    let api: Arc<dyn AssistantApi> = Arc::new(ApiClient::new(config)?);
    let store = open_store(config, ephemeral)?;
    Ok(ChatEngine::new(api, store, EngineSettings::from(config)))
}

/// Ask one question in a fresh conversation and type the answer to stdout.
pub async fn ask(config: &Config, ephemeral: bool, query: &str) -> Result<()> {
    let (mut engine, mut events) = open_engine(config, ephemeral)?;
    let mut clock = RevealClock::new(engine.tick_interval());

    engine.new_chat();
    let pending = engine.submit(query)?;

    let mut stdout = io::stdout();
    let mut printed = 0usize;

    while engine.is_busy() {
        tokio::select! {
            Some(event) = events.recv() => {
                engine.handle_event(event);
                if let Some(notice) = engine.notice() {
                    let notice = notice.to_string();
                    engine.shutdown();
                    anyhow::bail!(notice);
                }
            }
            _ = clock.tick(), if engine.should_tick() => {
                if let TickOutcome::Revealed { .. } | TickOutcome::Finished { .. } = engine.tick() {
                    let text = engine
                        .store()
                        .conversation(&pending.conversation_id)
                        .and_then(|c| c.messages.get(pending.message_index))
                        .map(|m| m.text.clone())
                        .unwrap_or_default();
                    let fresh: String = text.chars().skip(printed).collect();
                    printed += fresh.chars().count();
                    write!(stdout, "{}", fresh)?;
                    stdout.flush()?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                engine.shutdown();
                writeln!(stdout)?;
                return Ok(());
            }
        }
    }

    writeln!(stdout)?;
    engine.shutdown();
    Ok(())
}

/// Print suggestions for a partial query.
pub async fn suggest(config: &Config, query: &str) -> Result<()> {
    let client = ApiClient::new(config)?;
    let suggestions = client
        .suggestions(query)
        .await
        .context("Failed to fetch suggestions")?;

    if suggestions.is_empty() {
        println!("No suggestions for \"{}\".", query);
        return Ok(());
    }

    for suggestion in suggestions {
        println!("  • {}", suggestion);
    }
    Ok(())
}

/// Print stored conversations, most recent first.
pub fn list_conversations(config: &Config) -> Result<()> {
    let store = open_store(config, false)?;

    if store.conversations().is_empty() {
        println!("No conversations yet. Run 'medassist' to ask your first question!");
        return Ok(());
    }

    println!("💬 Conversations:");
    println!("{}", "=".repeat(50));

    for conversation in store.conversations() {
        let marker = if store.current_conversation_id() == Some(conversation.id.as_str()) {
            "▶"
        } else {
            " "
        };
        let questions = conversation
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .count();

        println!("{} {}", marker, conversation.title);
        println!(
            "    🕒 {}  ❓ {} question{}",
            conversation.created_at.format("%Y-%m-%d %H:%M"),
            questions,
            if questions == 1 { "" } else { "s" }
        );
    }

    Ok(())
}

/// Delete every stored conversation.
pub fn clear_conversations(config: &Config) -> Result<()> {
    let mut store = open_store(config, false)?;
    let count = store.conversations().len();
    store.delete_all()?;
    println!("🗑  Deleted {} conversation{}.", count, if count == 1 { "" } else { "s" });
    Ok(())
}
