//! Generation strategies: what the bot does with a prompt.
//!
//! The dispatcher is identical for every mode; only the strategy differs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::bot::error::GenerationError;
use crate::bot::history::{Author, HistoryEntry};
use crate::bot::scratch::{ScratchDir, ScratchFile};
use crate::bot::{gemini, images, openai};

/// Image sent along with a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Everything a strategy may use to answer one message.
pub struct GenerationRequest<'a> {
    pub user_id: i64,
    pub system_prompt: &'a str,
    /// Earlier turns in this chat, oldest first.
    pub history: &'a [HistoryEntry],
    pub prompt: &'a str,
    pub attachment: Option<Attachment>,
}

/// Result of a generation.
#[derive(Debug)]
pub enum Generated {
    /// Raw model text, not yet sanitized.
    Text(String),
    /// Image bytes with their file extension.
    Image { data: Vec<u8>, extension: String },
    /// Image in scratch storage, deleted once the value is dropped.
    ImageFile(ScratchFile),
}

#[async_trait]
pub trait GenerationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether requests must carry an image and a non-empty prompt.
    fn needs_image(&self) -> bool {
        false
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Generated, GenerationError>;
}

/// Chat completion with the persona prompt and chat history.
pub struct TextCompletion {
    client: openai::Client,
}

impl TextCompletion {
    pub fn new(client: openai::Client) -> Self {
        Self { client }
    }
}

/// Build the completion message list: system prompt, history, current prompt.
pub fn completion_messages(request: &GenerationRequest<'_>) -> Vec<openai::Message> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(openai::Message::system(request.system_prompt));
    for entry in request.history {
        messages.push(match entry.author {
            Author::User => openai::Message::user(entry.content.clone()),
            Author::Bot => openai::Message::assistant(entry.content.clone()),
        });
    }
    messages.push(openai::Message::user(request.prompt));
    messages
}

#[async_trait]
impl GenerationStrategy for TextCompletion {
    fn name(&self) -> &'static str {
        "text"
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Generated, GenerationError> {
        let messages = completion_messages(&request);
        let reply = self.client.complete(&messages).await?;
        Ok(Generated::Text(reply))
    }
}

/// Text-to-image generation.
pub struct ImageGeneration {
    client: images::Client,
}

impl ImageGeneration {
    pub fn new(client: images::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GenerationStrategy for ImageGeneration {
    fn name(&self) -> &'static str {
        "image"
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Generated, GenerationError> {
        let image = self.client.generate(request.prompt).await?;
        Ok(Generated::Image {
            data: image.data,
            extension: image.extension,
        })
    }
}

/// Edits the attached image with a multimodal model.
///
/// The original is staged in scratch storage for the upload and removed as
/// soon as the model has answered; the edited output stays in scratch until
/// the returned [`Generated::ImageFile`] is dropped.
pub struct ImageEdit {
    client: gemini::Client,
    scratch: Arc<ScratchDir>,
}

impl ImageEdit {
    pub fn new(client: gemini::Client, scratch: Arc<ScratchDir>) -> Self {
        Self { client, scratch }
    }
}

#[async_trait]
impl GenerationStrategy for ImageEdit {
    fn name(&self) -> &'static str {
        "edit"
    }

    fn needs_image(&self) -> bool {
        true
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Generated, GenerationError> {
        let attachment = request
            .attachment
            .ok_or(GenerationError::MissingInput("reference image"))?;

        let extension = gemini::extension_for(&attachment.mime_type);
        let original = self
            .scratch
            .write(request.user_id, "original", extension, &attachment.data)
            .await?;
        debug!("Staged original at {}", original.path().display());

        let display_name = original
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("original")
            .to_string();
        let uploaded = self
            .client
            .upload_file(original.read().await?, &attachment.mime_type, &display_name)
            .await?;

        let edited = self.client.edit_image(&uploaded, request.prompt).await?;
        drop(original);

        let output = self
            .scratch
            .write(
                request.user_id,
                "edited",
                gemini::extension_for(&edited.mime_type),
                &edited.data,
            )
            .await?;
        Ok(Generated::ImageFile(output))
    }
}
