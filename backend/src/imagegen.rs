use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const OUTPUT_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum ImageServiceError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,
    #[error("image service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image service returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("No image was generated. The prompt may have been blocked.")]
    NoImage,
    #[error("image service returned invalid image data: {0}")]
    InvalidImage(String),
}

/// An opaque text-to-image call returning a renderable URL.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ImageServiceError>;
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: [PredictInstance<'a>; 1],
    parameters: PredictParameters<'a>,
}

#[derive(Debug, Serialize)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters<'a> {
    sample_count: u32,
    output_mime_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Imagen through the Generative Language API `:predict` endpoint.
pub struct GeminiImageClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiImageClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Result<Self, ImageServiceError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_key,
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn predict_url(&self) -> String {
        format!("{}/models/{}:predict", self.base_url.trim_end_matches('/'), self.model)
    }
}

#[async_trait]
impl ImageGenerator for GeminiImageClient {
    async fn generate(&self, prompt: &str) -> Result<String, ImageServiceError> {
        let api_key = self.api_key.as_deref().ok_or(ImageServiceError::MissingApiKey)?;

        let request = PredictRequest {
            instances: [PredictInstance { prompt }],
            parameters: PredictParameters {
                sample_count: 1,
                output_mime_type: OUTPUT_MIME_TYPE,
            },
        };

        tracing::info!(model = %self.model, "Requesting image generation");
        let response = self
            .http
            .post(self.predict_url())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ImageServiceError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let parsed: PredictResponse = serde_json::from_str(&body)
            .map_err(|e| ImageServiceError::InvalidImage(e.to_string()))?;
        image_url_from_predictions(parsed)
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

fn image_url_from_predictions(response: PredictResponse) -> Result<String, ImageServiceError> {
    let prediction = response
        .predictions
        .into_iter()
        .find(|p| p.bytes_base64_encoded.is_some())
        .ok_or(ImageServiceError::NoImage)?;

    let data = prediction.bytes_base64_encoded.unwrap_or_default();
    base64::engine::general_purpose::STANDARD
        .decode(&data)
        .map_err(|e| ImageServiceError::InvalidImage(e.to_string()))?;

    let mime_type = prediction
        .mime_type
        .unwrap_or_else(|| OUTPUT_MIME_TYPE.to_string());
    Ok(format!("data:{mime_type};base64,{data}"))
}

/// Split a base64 `data:` URL into its mime type and decoded bytes.
pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime_type = meta.strip_suffix(";base64")?;
    let bytes = base64::engine::general_purpose::STANDARD.decode(data).ok()?;
    Some((mime_type.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predictions_become_data_url() {
        let response: PredictResponse = serde_json::from_str(
            r#"{"predictions":[{"bytesBase64Encoded":"aGVsbG8=","mimeType":"image/png"}]}"#,
        )
        .unwrap();
        let url = image_url_from_predictions(response).unwrap();
        assert_eq!(url, "data:image/png;base64,aGVsbG8=");

        let (mime, bytes) = decode_data_url(&url).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn empty_predictions_mean_no_image() {
        let response: PredictResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            image_url_from_predictions(response),
            Err(ImageServiceError::NoImage)
        ));
    }

    #[test]
    fn corrupt_image_data_is_rejected() {
        let response: PredictResponse =
            serde_json::from_str(r#"{"predictions":[{"bytesBase64Encoded":"%%%"}]}"#).unwrap();
        assert!(matches!(
            image_url_from_predictions(response),
            Err(ImageServiceError::InvalidImage(_))
        ));
    }

    #[test]
    fn api_error_body_is_unwrapped() {
        let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body), "API key not valid.");
        assert_eq!(api_error_message(" upstream timeout "), "upstream timeout");
    }

    #[test]
    fn predict_url_uses_model() {
        let client = GeminiImageClient::new(None, "imagen-3.0-generate-002")
            .unwrap()
            .with_base_url("http://localhost:9000/v1beta/");
        assert_eq!(
            client.predict_url(),
            "http://localhost:9000/v1beta/models/imagen-3.0-generate-002:predict"
        );
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_request() {
        let client = GeminiImageClient::new(None, "imagen-3.0-generate-002").unwrap();
        assert!(matches!(
            client.generate("a cat").await,
            Err(ImageServiceError::MissingApiKey)
        ));
    }

    #[test]
    fn non_data_urls_are_not_decoded() {
        assert!(decode_data_url("https://example.com/a.png").is_none());
    }
}
