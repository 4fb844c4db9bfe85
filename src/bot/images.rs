//! Client for OpenAI-style image generation endpoints (FLUX and friends).

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bot::error::{GenerationError, check_status, http_error};

/// Size, step count and format of generated images.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageParams {
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    /// Fixed seed, or `None` for a new seed per request.
    pub seed: Option<u64>,
    pub output_format: String,
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            steps: 4,
            seed: None,
            output_format: "png".to_string(),
        }
    }
}

pub struct Client {
    api_key: String,
    base_url: String,
    model: String,
    params: ImageParams,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    width: u32,
    height: u32,
    steps: u32,
    n: u32,
    seed: u64,
    response_format: &'static str,
    output_format: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
}

/// A generated image.
#[derive(Debug)]
pub struct GeneratedImage {
    pub data: Vec<u8>,
    pub extension: String,
}

impl Client {
    pub fn new(
        http: reqwest::Client,
        api_key: String,
        base_url: String,
        model: String,
        params: ImageParams,
    ) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            params,
            http,
        }
    }

    /// Generate an image from a text prompt.
    pub async fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        info!("🎨 Generating image: {}", prompt.chars().take(80).collect::<String>());

        let seed = self.params.seed.unwrap_or_else(fresh_seed);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            width: self.params.width,
            height: self.params.height,
            steps: self.params.steps,
            n: 1,
            seed,
            response_format: "b64_json",
            output_format: &self.params.output_format,
        };

        let response = self
            .http
            .post(format!("{}/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(http_error)?;
        let response = check_status(response).await?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;

        let image = parsed.data.into_iter().next().ok_or(GenerationError::NoImage)?;

        let data = if let Some(b64) = image.b64_json {
            base64::engine::general_purpose::STANDARD
                .decode(b64.trim())
                .map_err(|e| GenerationError::Parse(format!("Failed to decode base64: {e}")))?
        } else if let Some(url) = image.url {
            debug!("Image returned by URL, downloading");
            let response = self.http.get(&url).send().await.map_err(http_error)?;
            let response = check_status(response).await?;
            response.bytes().await.map_err(http_error)?.to_vec()
        } else {
            return Err(GenerationError::NoImage);
        };

        info!("🎨 Image generated: {} bytes (seed {})", data.len(), seed);
        Ok(GeneratedImage {
            data,
            extension: self.params.output_format.clone(),
        })
    }
}

fn fresh_seed() -> u64 {
    let now = chrono::Utc::now();
    (now.timestamp_subsec_nanos() as u64) ^ (now.timestamp() as u64)
}
