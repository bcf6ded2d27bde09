use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{EmbeddingError, EmbeddingProvider};

pub(super) const API_KEY_ENV: &str = "GOOGLE_API_KEY";

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

/// Remote embeddings from the Gemini `embedContent` endpoint.
pub struct GeminiEmbedProvider {
    client: reqwest::blocking::Client,
    model: String,
    api_key: String,
    api_base: String,
    timeout: Duration,
}

impl GeminiEmbedProvider {
    pub fn new(model: &str, api_key: &str, timeout: Duration) -> Result<Self, EmbeddingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        Ok(Self {
            client,
            model: model.trim_start_matches("models/").to_string(),
            api_key: api_key.to_string(),
            api_base: API_BASE.to_string(),
            timeout,
        })
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn parse_response(body: &str) -> Result<Vec<f32>, EmbeddingError> {
        let resp: EmbedContentResponse = serde_json::from_str(body).map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("unexpected embedContent response: {e}"))
        })?;

        if resp.embedding.values.is_empty() {
            return Err(EmbeddingError::EmbeddingFailed(
                "embedContent returned an empty vector".to_string(),
            ));
        }

        Ok(resp.embedding.values)
    }
}

impl EmbeddingProvider for GeminiEmbedProvider {
    fn name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> Option<usize> {
        None
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/{}:embedContent", self.api_base, self.model);
        let body = json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
        });

        let resp = self
            .client
            .post(url)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout(self.timeout.as_secs())
                } else {
                    EmbeddingError::EmbeddingFailed(e.without_url().to_string())
                }
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "embedContent failed: {status} - {body}"
            )));
        }

        Self::parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let body = r#"{"embedding": {"values": [0.25, -0.5, 1.0]}}"#;
        let values = GeminiEmbedProvider::parse_response(body).unwrap();
        assert_eq!(values, vec![0.25, -0.5, 1.0]);
    }

    #[test]
    fn test_parse_response_rejects_unexpected_shape() {
        let err = GeminiEmbedProvider::parse_response(r#"{"error": {"code": 429}}"#).unwrap_err();
        assert!(matches!(err, EmbeddingError::EmbeddingFailed(_)));

        let err =
            GeminiEmbedProvider::parse_response(r#"{"embedding": {"values": []}}"#).unwrap_err();
        assert!(matches!(err, EmbeddingError::EmbeddingFailed(_)));
    }

    #[test]
    fn test_model_prefix_is_stripped() {
        let provider =
            GeminiEmbedProvider::new("models/embedding-001", "key", Duration::from_secs(5))
                .unwrap();
        assert_eq!(provider.name(), "embedding-001");
        assert_eq!(provider.dimensions(), None);
    }

    #[test]
    fn test_slow_endpoint_times_out() {
        // accepts connections into the backlog but never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let provider = GeminiEmbedProvider::new("embedding-001", "key", Duration::from_secs(1))
            .unwrap()
            .with_api_base(&format!("http://{addr}/v1beta/models"));

        let err = provider.embed("rain").unwrap_err();
        assert!(matches!(err, EmbeddingError::Timeout(1)), "{err:?}");
        drop(listener);
    }
}
