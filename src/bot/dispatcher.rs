//! Message dispatcher - turns a mention into a generated reply.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::bot::chunk::chunk_message;
use crate::bot::error::GenerationError;
use crate::bot::history::{HistoryEntry, HistoryStore};
use crate::bot::message::{BotIdentity, InboundMessage};
use crate::bot::persona::{Persona, Personas, system_prompt};
use crate::bot::platform::{ChatPlatform, OutgoingImage};
use crate::bot::sanitize::sanitize;
use crate::bot::strategy::{Attachment, Generated, GenerationRequest, GenerationStrategy};

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not for us: sent by a bot, or the bot was not mentioned.
    Ignored,
    /// Input was incomplete; a guidance reply was sent.
    Guided,
    Replied,
    /// Something failed; an apology was sent.
    Failed,
}

#[derive(Debug)]
enum DispatchError {
    Platform(String),
    Generation(GenerationError),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Platform(e) => write!(f, "{e}"),
            DispatchError::Generation(e) => write!(f, "{e}"),
        }
    }
}

impl From<String> for DispatchError {
    fn from(e: String) -> Self {
        DispatchError::Platform(e)
    }
}

impl From<GenerationError> for DispatchError {
    fn from(e: GenerationError) -> Self {
        DispatchError::Generation(e)
    }
}

pub struct Dispatcher {
    bot: BotIdentity,
    platform: Arc<dyn ChatPlatform>,
    strategy: Arc<dyn GenerationStrategy>,
    history: Arc<HistoryStore>,
    personas: Personas,
}

impl Dispatcher {
    pub fn new(
        bot: BotIdentity,
        platform: Arc<dyn ChatPlatform>,
        strategy: Arc<dyn GenerationStrategy>,
        history: Arc<HistoryStore>,
        personas: Personas,
    ) -> Self {
        Self {
            bot,
            platform,
            strategy,
            history,
            personas,
        }
    }

    /// Handle one inbound message.
    pub async fn handle(&self, msg: InboundMessage) -> Outcome {
        if msg.is_bot {
            debug!("Ignoring message from bot {}", msg.username);
            return Outcome::Ignored;
        }
        if !msg.mentions_bot(&self.bot) {
            return Outcome::Ignored;
        }

        let persona = self.personas.for_user(&msg.username);
        let prompt = msg.prompt(&self.bot);

        info!(
            "📨 {} ({}) in {}: \"{}\"",
            msg.username,
            msg.user_id,
            msg.chat_id,
            prompt.chars().take(50).collect::<String>()
        );

        if self.strategy.needs_image() {
            let guidance = if msg.attachment.is_none() {
                Some(&persona.need_image)
            } else if prompt.is_empty() {
                Some(&persona.need_prompt)
            } else {
                None
            };
            if let Some(text) = guidance {
                info!("Incomplete {} request from {}", self.strategy.name(), msg.username);
                if let Err(e) = self.platform.reply_text(msg.chat_id, msg.message_id, text).await {
                    error!("Failed to send guidance: {e}");
                }
                return Outcome::Guided;
            }
        }

        // A bare mention still gets an answer in text mode.
        let prompt = if prompt.is_empty() {
            msg.text.trim().to_string()
        } else {
            prompt
        };

        let mut placeholder = None;
        match self.respond(&msg, persona, &prompt, &mut placeholder).await {
            Ok(reply) => {
                self.history.append(msg.chat_id, HistoryEntry::user(&msg.username, prompt));
                self.history.append(msg.chat_id, HistoryEntry::bot(&persona.name, reply));
                Outcome::Replied
            }
            Err(e) => {
                error!("Failed to answer {} in chat {}: {e}", msg.username, msg.chat_id);
                if let Some(id) = placeholder {
                    let _ = self.platform.delete_message(msg.chat_id, id).await;
                }
                let apology = persona.apology_for(&msg.username);
                if let Err(e) = self.platform.reply_text(msg.chat_id, msg.message_id, &apology).await {
                    error!("Failed to send apology: {e}");
                }
                Outcome::Failed
            }
        }
    }

    /// Generate and deliver a reply. Returns the text recorded in history.
    ///
    /// `placeholder` holds the id of the waiting message while it is still
    /// visible, so the caller can remove it on failure.
    async fn respond(
        &self,
        msg: &InboundMessage,
        persona: &Persona,
        prompt: &str,
        placeholder: &mut Option<i64>,
    ) -> Result<String, DispatchError> {
        let chat_id = msg.chat_id;

        self.platform.send_typing(chat_id).await?;
        let waiting_id = self.platform.send_text(chat_id, &persona.waiting).await?;
        *placeholder = Some(waiting_id);

        let attachment = match &msg.attachment {
            Some(reference) if self.strategy.needs_image() => Some(Attachment {
                data: self.platform.download_file(&reference.file_id).await?,
                mime_type: reference.mime_type.clone(),
            }),
            _ => None,
        };

        let history = self.history.get(chat_id);
        let system_prompt = system_prompt(persona);
        let generated = self
            .strategy
            .generate(GenerationRequest {
                user_id: msg.user_id,
                system_prompt: &system_prompt,
                history: &history,
                prompt,
                attachment,
            })
            .await?;

        *placeholder = None;
        self.platform.delete_message(chat_id, waiting_id).await?;

        match generated {
            Generated::Text(raw) => {
                let mut reply = sanitize(&raw);
                if reply.is_empty() {
                    warn!("Model reply was empty after cleanup");
                    reply = persona.fallback.clone();
                }
                for chunk in chunk_message(&reply) {
                    self.platform.send_text(chat_id, &chunk).await?;
                }
                Ok(reply)
            }
            Generated::Image { data, extension } => {
                let image = OutgoingImage::Bytes {
                    data,
                    file_name: format!("image.{extension}"),
                };
                self.platform.send_image(chat_id, image).await?;
                Ok(format!("[image: {prompt}]"))
            }
            Generated::ImageFile(file) => {
                let image = OutgoingImage::File(file.path().to_path_buf());
                self.platform.send_image(chat_id, image).await?;
                drop(file);
                Ok(format!("[edited image: {prompt}]"))
            }
        }
    }
}
