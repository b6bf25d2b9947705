//! Shared Gemini `generateContent` HTTP client.
//!
//! Both adapters issue the same request shape: a user turn whose parts mix
//! inline image data and text. This module owns the wire types, the HTTP
//! error classification (transient vs fatal), and image source resolution.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, StatusCode};
use restyle_core::error::{RestyleError, Result};
use restyle_core::provider::ImageSource;
use serde::{Deserialize, Serialize};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Multimodal model used for analysis and prompt writing.
pub const TEXT_MODEL: &str = "gemini-2.5-flash";
/// Image-editing model used for synthesis.
pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";

/// Thin client over the Gemini REST surface.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
}

impl GeminiClient {
    /// Creates a new client using the provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Issues one `generateContent` call and returns the parsed response.
    pub async fn generate_content(
        &self,
        model: &str,
        parts: Vec<Part>,
    ) -> Result<GenerateContentResponse> {
        let url = format!(
            "{BASE_URL}/{model}:generateContent?key={api_key}",
            api_key = self.api_key
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|err| RestyleError::Provider {
                message: format!("Gemini request failed: {err}"),
                retryable: err.is_connect() || err.is_timeout(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read Gemini error body".to_string());
            return Err(map_http_error(status, &body));
        }

        response.json().await.map_err(|err| {
            RestyleError::provider_fatal(format!("failed to parse Gemini response: {err}"))
        })
    }

    /// Resolves an image reference to base64 bytes plus a MIME type.
    ///
    /// Local files are read from disk, remote URLs fetched, and data URIs
    /// split apart. Encoding happens once per call; batch synthesis reuses
    /// the result across all of its prompts.
    pub async fn encode_image(&self, source: &ImageSource) -> Result<EncodedImage> {
        match source {
            ImageSource::Path(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|err| {
                    RestyleError::io(format!("failed to read image {}: {err}", path.display()))
                })?;
                Ok(EncodedImage {
                    mime_type: mime_for_path(path),
                    data: STANDARD.encode(&bytes),
                })
            }
            ImageSource::Url(url) => {
                let response = self.client.get(url).send().await.map_err(|err| {
                    RestyleError::Provider {
                        message: format!("failed to fetch image {url}: {err}"),
                        retryable: err.is_connect() || err.is_timeout(),
                    }
                })?;
                let mime_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(|value| value.split(';').next().unwrap_or(value).to_string())
                    .unwrap_or_else(|| "image/jpeg".to_string());
                let bytes = response.bytes().await.map_err(|err| {
                    RestyleError::io(format!("failed to read image body: {err}"))
                })?;
                Ok(EncodedImage {
                    mime_type,
                    data: STANDARD.encode(&bytes),
                })
            }
            ImageSource::DataUri(uri) => parse_data_uri(uri),
        }
    }
}

/// Base64-encoded image payload ready for an `inline_data` part.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

fn mime_for_path(path: &std::path::Path) -> String {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        // Portrait uploads are JPEG in practice; treat unknowns as such.
        _ => "image/jpeg",
    }
    .to_string()
}

fn parse_data_uri(uri: &str) -> Result<EncodedImage> {
    let stripped = uri
        .strip_prefix("data:")
        .ok_or_else(|| RestyleError::InvalidInput("not a data URI".to_string()))?;
    let (header, data) = stripped
        .split_once(',')
        .ok_or_else(|| RestyleError::InvalidInput("malformed data URI".to_string()))?;
    let mime_type = header
        .split(';')
        .next()
        .filter(|mime| !mime.is_empty())
        .unwrap_or("image/jpeg")
        .to_string();
    Ok(EncodedImage {
        mime_type,
        data: data.to_string(),
    })
}

fn map_http_error(status: StatusCode, body: &str) -> RestyleError {
    let lower = body.to_ascii_lowercase();
    let retryable = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::INTERNAL_SERVER_ERROR
    ) || status.is_server_error()
        || lower.contains("overloaded")
        || lower.contains("quota");
    RestyleError::Provider {
        message: format!("Gemini returned {status}: {body}"),
        retryable,
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One content part: text or inline binary data, never both.
#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline_image(encoded: &EncodedImage) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: encoded.mime_type.clone(),
                data: encoded.data.clone(),
            }),
        }
    }
}

#[derive(Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    /// Concatenated text of every text part in the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }

    /// The first inline part carrying image data, ignoring text parts and
    /// any subsequent image parts.
    pub fn first_inline_image(&self) -> Option<&InlineData> {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .and_then(|content| {
                content.parts.iter().find_map(|part| {
                    part.inline_data
                        .as_ref()
                        .filter(|data| data.mime_type.starts_with("image/"))
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_inline_image_skips_text_and_non_image_parts() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [
                            {"text": "Here is your edit:"},
                            {"inlineData": {"mimeType": "application/json", "data": "e30="}},
                            {"inlineData": {"mimeType": "image/png", "data": "Zmlyc3Q="}},
                            {"inlineData": {"mimeType": "image/jpeg", "data": "c2Vjb25k"}}
                        ]
                    }
                }]
            }"#,
        )
        .unwrap();

        let image = response.first_inline_image().unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, "Zmlyc3Q=");
        assert_eq!(response.text(), "Here is your edit:");
    }

    #[test]
    fn text_only_response_has_no_image() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "cannot comply"}]}}]}"#,
        )
        .unwrap();
        assert!(response.first_inline_image().is_none());
    }

    #[test]
    fn http_status_classification() {
        assert!(map_http_error(StatusCode::TOO_MANY_REQUESTS, "slow down").is_retryable());
        assert!(map_http_error(StatusCode::SERVICE_UNAVAILABLE, "overloaded").is_retryable());
        assert!(map_http_error(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(
            !map_http_error(StatusCode::UNAUTHORIZED, "API key not valid").is_retryable()
        );
        assert!(!map_http_error(StatusCode::BAD_REQUEST, "bad schema").is_retryable());
    }

    #[test]
    fn data_uri_parsing() {
        let encoded = parse_data_uri("data:image/png;base64,AAAA").unwrap();
        assert_eq!(encoded.mime_type, "image/png");
        assert_eq!(encoded.data, "AAAA");
        assert!(parse_data_uri("data:nonsense").is_err());
    }

    #[test]
    fn mime_guessing_by_extension() {
        use std::path::Path;
        assert_eq!(mime_for_path(Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("a.jpg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("a")), "image/jpeg");
    }
}
