//! Interactive chat loop.
//!
//! One task owns the [`ConversationManager`]. It waits on terminal input,
//! fetch results from the engine channel and, only while an answer is being
//! revealed, the reveal clock.

use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyEventKind};
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::engine::ChatEngine;
use crate::events::AppEvent;
use crate::streaming::RevealClock;
use crate::ui::conversation::{ConversationAction, ConversationManager};
use crate::ui::tui::{self, Tui};

/// Redraw cadence for the "thinking" indicator while no characters arrive
const WAITING_REDRAW: Duration = Duration::from_millis(300);

/// Run the chat screen until the user quits.
pub async fn run(engine: ChatEngine, events: mpsc::UnboundedReceiver<AppEvent>) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut manager = ConversationManager::new(engine);
    let result = event_loop(&mut terminal, &mut manager, events).await;

    manager.shutdown();
    tui::restore()?;
    result
}

async fn event_loop(
    terminal: &mut Tui,
    manager: &mut ConversationManager,
    mut events: mpsc::UnboundedReceiver<AppEvent>,
) -> Result<()> {
    let mut input = EventStream::new();
    let mut clock = RevealClock::new(manager.engine().tick_interval());
    let mut heartbeat = tokio::time::interval(WAITING_REDRAW);

    tracing::info!("Chat screen started");

    loop {
        terminal.draw(|f| manager.render(f.size(), f.buffer_mut()))?;

        let waiting = manager.engine().is_awaiting_answer();

        tokio::select! {
            maybe_event = input.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if manager.handle_key(key) == ConversationAction::Exit {
                            break;
                        }
                    }
                    Some(Ok(Event::FocusGained)) => manager.set_visible(true),
                    Some(Ok(Event::FocusLost)) => manager.set_visible(false),
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::error!("Terminal input error: {}", err);
                        return Err(err.into());
                    }
                    None => break,
                }
            }
            Some(event) = events.recv() => {
                manager.handle_event(event);
            }
            _ = clock.tick(), if manager.should_tick() => {
                manager.tick();
            }
            _ = heartbeat.tick(), if waiting => {}
        }
    }

    tracing::info!("Chat screen closed");
    Ok(())
}
