//! Telegram client using teloxide.

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId, InputFile, MessageId, ReplyParameters};
use tracing::{info, warn};

use crate::bot::platform::{ChatPlatform, OutgoingImage};

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<i64, String> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);

        if let Some(msg_id) = reply_to_message_id {
            let reply_params = ReplyParameters::new(MessageId(msg_id as i32));
            request = request.reply_parameters(reply_params);
        }

        request.await.map(|msg| msg.id.0 as i64).map_err(|e| {
            let msg = format!("Failed to send: {e}");
            warn!("{}", msg);
            msg
        })
    }
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64, String> {
        self.send(chat_id, text, None).await
    }

    async fn reply_text(&self, chat_id: i64, reply_to: i64, text: &str) -> Result<i64, String> {
        self.send(chat_id, text, Some(reply_to)).await
    }

    async fn send_image(&self, chat_id: i64, image: OutgoingImage) -> Result<i64, String> {
        let input_file = match image {
            OutgoingImage::Bytes { data, file_name } => {
                info!("📷 Sending image to chat {} ({} bytes)", chat_id, data.len());
                InputFile::memory(data).file_name(file_name)
            }
            OutgoingImage::File(path) => {
                info!("📷 Sending image {} to chat {}", path.display(), chat_id);
                InputFile::file(path)
            }
        };

        self.bot
            .send_photo(ChatId(chat_id), input_file)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send image: {e}");
                warn!("{}", msg);
                msg
            })
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), String> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id as i32))
            .await
            .map_err(|e| {
                let msg = format!("Failed to delete message: {e}");
                warn!("{}", msg);
                msg
            })?;

        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), String> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map_err(|e| {
                let msg = format!("Failed to send typing: {e}");
                warn!("{}", msg);
                msg
            })?;

        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, String> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(|e| {
                let msg = format!("Failed to get file info: {e}");
                warn!("{}", msg);
                msg
            })?;

        let mut data = Vec::new();
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| {
                let msg = format!("Failed to download file: {e}");
                warn!("{}", msg);
                msg
            })?;

        info!("📥 Downloaded {} ({} bytes)", file.path, data.len());
        Ok(data)
    }
}
