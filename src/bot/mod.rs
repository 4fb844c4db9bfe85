//! Bot module - relays Telegram mentions to a generative backend.

pub mod chunk;
pub mod dispatcher;
pub mod error;
pub mod gemini;
pub mod history;
pub mod images;
pub mod message;
pub mod openai;
pub mod periodic;
pub mod persona;
pub mod platform;
pub mod sanitize;
pub mod scratch;
pub mod strategy;
pub mod telegram;

#[cfg(test)]
mod tests;

pub use dispatcher::{Dispatcher, Outcome};
pub use error::GenerationError;
pub use history::{HistoryEntry, HistoryStore};
pub use message::{BotIdentity, InboundMessage};
pub use periodic::PeriodicTask;
pub use persona::{Persona, Personas};
pub use scratch::ScratchDir;
pub use strategy::{GenerationStrategy, ImageEdit, ImageGeneration, TextCompletion};
pub use telegram::TelegramClient;
