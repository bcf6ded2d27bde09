use serde_json::Value;
use std::time::Duration;

use super::{AnalysisError, SongAnalyzer};
use crate::config::AnalysisConfig;

pub(crate) const API_KEY_ENV: &str = "RAPID_API_KEY";

const SERVICE: &str = "sonoteller";

/// Lyrics + DDEX mood/theme analysis through the Sonoteller RapidAPI endpoint.
pub struct SonotellerAnalyzer {
    client: reqwest::blocking::Client,
    url: String,
    host: String,
    api_key: String,
    timeout_secs: u64,
}

impl SonotellerAnalyzer {
    pub fn new(config: &AnalysisConfig, api_key: &str) -> Result<Self, AnalysisError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnalysisError::from_reqwest(SERVICE, config.timeout_secs, e))?;

        Ok(Self {
            client,
            url: config.sonoteller_url.clone(),
            host: config.sonoteller_host.clone(),
            api_key: api_key.to_string(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Build from configuration, reading the api key from the environment.
    pub fn from_env(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(AnalysisError::MissingCredentials(API_KEY_ENV))?;

        Self::new(config, &api_key)
    }

    fn parse_body(body: &str) -> Result<Value, AnalysisError> {
        let payload: Value =
            serde_json::from_str(body).map_err(|_| AnalysisError::InvalidResponse {
                service: SERVICE,
                message: format!("invalid JSON response: {body}"),
            })?;

        if !payload.is_object() {
            return Err(AnalysisError::InvalidResponse {
                service: SERVICE,
                message: format!("expected a JSON object, got: {body}"),
            });
        }

        Ok(payload)
    }
}

impl SongAnalyzer for SonotellerAnalyzer {
    fn analyze(&self, source_url: &str) -> Result<Value, AnalysisError> {
        log::info!("requesting lyrics analysis for {source_url}");

        let resp = self
            .client
            .post(&self.url)
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", &self.host)
            .form(&[("file", source_url)])
            .send()
            .map_err(|e| AnalysisError::from_reqwest(SERVICE, self.timeout_secs, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| AnalysisError::from_reqwest(SERVICE, self.timeout_secs, e))?;

        if !status.is_success() {
            return Err(AnalysisError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        Self::parse_body(&body)
    }
}
