/// Failure of a call to a generative API.
#[derive(Debug)]
pub enum GenerationError {
    /// Transport failure: connect, timeout, body read.
    Http(String),
    /// Non-success status or an error object in the response.
    Api(String),
    /// Response body did not have the expected shape.
    Parse(String),
    /// Response had no usable text.
    Empty,
    /// Image model answered without an image.
    NoImage,
    /// Scratch file could not be written or read.
    Io(std::io::Error),
    /// Request lacked an input the strategy needs.
    MissingInput(&'static str),
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::Http(e) => write!(f, "HTTP error: {e}"),
            GenerationError::Api(e) => write!(f, "API error: {e}"),
            GenerationError::Parse(e) => write!(f, "Parse error: {e}"),
            GenerationError::Empty => write!(f, "Empty response"),
            GenerationError::NoImage => write!(f, "No image produced"),
            GenerationError::Io(e) => write!(f, "Scratch file error: {e}"),
            GenerationError::MissingInput(what) => write!(f, "Missing input: {what}"),
        }
    }
}

impl std::error::Error for GenerationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GenerationError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GenerationError {
    fn from(e: std::io::Error) -> Self {
        GenerationError::Io(e)
    }
}

/// Map a non-success response to [`GenerationError::Api`].
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, GenerationError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(GenerationError::Api(format!("{status}: {body}")))
}

pub(crate) fn http_error(e: reqwest::Error) -> GenerationError {
    GenerationError::Http(e.to_string())
}
