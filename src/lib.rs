//! Medical question assistant: conversation engine, reveal animation,
//! debounced suggestions and a terminal chat front end.

pub mod api;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod markdown;
pub mod session;
pub mod storage;
pub mod streaming;
pub mod suggest;
pub mod ui;

pub use engine::{ChatEngine, EngineSettings, PendingAnswer};
pub use error::EngineError;
