pub mod bot;
pub mod config;
pub mod ping;
pub mod telegram_log;
