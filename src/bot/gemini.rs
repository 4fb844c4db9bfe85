//! Gemini API client for image editing.
//!
//! The reference image goes through the Files API first, then a
//! `generateContent` call pairs the uploaded file with the edit instruction.

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bot::error::{GenerationError, check_status, http_error};

pub struct Client {
    api_key: String,
    base_url: String,
    model: String,
    http: reqwest::Client,
}

/// A file stored by the Files API.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    #[serde(default)]
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Serialize)]
struct UploadStart<'a> {
    file: UploadStartFile<'a>,
}

#[derive(Serialize)]
struct UploadStartFile<'a> {
    display_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    FileData(FileData<'a>),
    Text(&'a str),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineData>,
    file_data: Option<ResponseFileData>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ResponseFileData {
    #[serde(default)]
    mime_type: Option<String>,
    file_uri: String,
}

/// An edited image.
#[derive(Debug)]
pub struct EditedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl Client {
    pub fn new(http: reqwest::Client, api_key: String, base_url: String, model: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            http,
        }
    }

    /// Upload `data` to the Files API using the resumable protocol.
    pub async fn upload_file(
        &self,
        data: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<UploadedFile, GenerationError> {
        debug!("Uploading {} ({} bytes, {})", display_name, data.len(), mime_type);

        let response = self
            .http
            .post(format!("{}/upload/v1beta/files", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&UploadStart { file: UploadStartFile { display_name } })
            .send()
            .await
            .map_err(http_error)?;
        let response = check_status(response).await?;

        let upload_url = response
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| GenerationError::Parse("Missing upload URL".to_string()))?;

        let response = self
            .http
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(data)
            .send()
            .await
            .map_err(http_error)?;
        let response = check_status(response).await?;

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(format!("Failed to parse upload response: {e}")))?;

        info!("📤 Uploaded {} as {}", display_name, uploaded.file.uri);
        Ok(uploaded.file)
    }

    /// Ask the model to edit an uploaded image according to `instruction`.
    pub async fn edit_image(
        &self,
        file: &UploadedFile,
        instruction: &str,
    ) -> Result<EditedImage, GenerationError> {
        info!("🖌️ Editing image: {}", instruction.chars().take(80).collect::<String>());

        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::FileData(FileData {
                        mime_type: &file.mime_type,
                        file_uri: &file.uri,
                    }),
                    Part::Text(instruction),
                ],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
            },
        };

        let response = self
            .http
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        let body = response.text().await.map_err(http_error)?;
        debug!("Gemini response status: {status}");

        if !status.is_success() {
            return Err(GenerationError::Api(format!("{status}: {body}")));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(GenerationError::Api(error.message));
        }

        let parts: Vec<ResponsePart> = parsed
            .candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .collect();

        if let Some(file_data) = parts.iter().find_map(|p| p.file_data.as_ref()) {
            let data = self.download(&file_data.file_uri).await?;
            info!("🖌️ Edited image retrieved by reference: {} bytes", data.len());
            return Ok(EditedImage {
                data,
                mime_type: file_data.mime_type.clone().unwrap_or_else(|| "image/png".to_string()),
            });
        }

        if let Some(inline) = parts.iter().find_map(|p| p.inline_data.as_ref()) {
            let data = base64::engine::general_purpose::STANDARD
                .decode(&inline.data)
                .map_err(|e| GenerationError::Parse(format!("Failed to decode base64: {e}")))?;
            info!("🖌️ Edited image received inline: {} bytes", data.len());
            return Ok(EditedImage {
                data,
                mime_type: inline.mime_type.clone().unwrap_or_else(|| "image/png".to_string()),
            });
        }

        Err(GenerationError::NoImage)
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>, GenerationError> {
        let response = self
            .http
            .get(uri)
            .header("x-goog-api-key", &self.api_key)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(http_error)?;
        let response = check_status(response).await?;
        Ok(response.bytes().await.map_err(http_error)?.to_vec())
    }
}

/// File extension for an image MIME type.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}
