use reqwest::blocking::multipart;
use std::time::Duration;

use super::{AnalysisError, FileHost};
use crate::config::AnalysisConfig;

const SERVICE: &str = "catbox";

/// Anonymous file hosting on catbox.moe; returns the direct file url.
pub struct CatboxHost {
    client: reqwest::blocking::Client,
    url: String,
    timeout_secs: u64,
}

impl CatboxHost {
    pub fn new(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AnalysisError::from_reqwest(SERVICE, config.timeout_secs, e))?;

        Ok(Self {
            client,
            url: config.file_host_url.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// The response body is the bare url of the uploaded file.
    fn parse_body(body: &str) -> Result<String, AnalysisError> {
        let body = body.trim();
        let url = url::Url::parse(body).map_err(|_| AnalysisError::InvalidResponse {
            service: SERVICE,
            message: format!("expected a file url, got: {body}"),
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url.to_string()),
            scheme => Err(AnalysisError::InvalidResponse {
                service: SERVICE,
                message: format!("unexpected url scheme {scheme:?}"),
            }),
        }
    }
}

impl FileHost for CatboxHost {
    fn publish(&self, filename: &str, data: &[u8]) -> Result<String, AnalysisError> {
        log::info!("publishing {filename} ({} bytes)", data.len());

        let part = multipart::Part::bytes(data.to_vec()).file_name(filename.to_string());
        let form = multipart::Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", part);

        let resp = self
            .client
            .post(&self.url)
            .multipart(form)
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

        let url = Self::parse_body(&body)?;
        log::info!("file published at {url}");
        Ok(url)
    }
}
