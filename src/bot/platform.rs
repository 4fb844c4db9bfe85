//! The chat operations the dispatcher needs.

use std::path::PathBuf;

use async_trait::async_trait;

/// Image to send to a chat.
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingImage {
    Bytes { data: Vec<u8>, file_name: String },
    File(PathBuf),
}

/// Chat platform actions used by the dispatcher.
///
/// Errors are human-readable messages; implementations log them before
/// returning.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Send a text message, returning its message id.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64, String>;

    /// Send a text message as a reply to `reply_to`.
    async fn reply_text(&self, chat_id: i64, reply_to: i64, text: &str) -> Result<i64, String>;

    /// Send an image, returning its message id.
    async fn send_image(&self, chat_id: i64, image: OutgoingImage) -> Result<i64, String>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), String>;

    /// Show the typing indicator.
    async fn send_typing(&self, chat_id: i64) -> Result<(), String>;

    /// Download an attached file by id.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, String>;
}
