//! Upload-side collaborators.
//!
//! An uploaded file is published at a public url ([`FileHost`]), analysed for
//! lyrics, moods and themes ([`SongAnalyzer`]), and the loosely shaped payload
//! is normalized into a fixed [`SongAnalysis`] before anything is stored.

mod catbox;
mod normalize;
mod sonoteller;

pub use catbox::CatboxHost;
pub use normalize::{embedding_text, normalize_analysis};
pub use sonoteller::SonotellerAnalyzer;

use crate::songs::Flags;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("request to {service} failed: {message}")]
    Request {
        service: &'static str,
        message: String,
    },

    #[error("{service} timed out after {secs} seconds")]
    Timeout { service: &'static str, secs: u64 },

    #[error("{service} responded with {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },

    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(&'static str),
}

impl AnalysisError {
    pub(crate) fn from_reqwest(service: &'static str, secs: u64, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AnalysisError::Timeout { service, secs }
        } else {
            AnalysisError::Request {
                service,
                message: err.without_url().to_string(),
            }
        }
    }
}

/// Normalized analysis of a song. List fields are always sequences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongAnalysis {
    pub language: String,
    pub language_code: String,
    pub summary: String,
    pub explicit: bool,
    pub keywords: Vec<String>,
    pub moods: Vec<String>,
    pub themes: Vec<String>,
    pub flags: Flags,
}

/// Publishes a file and returns a url the analyzer can fetch.
pub trait FileHost: Send + Sync {
    fn publish(&self, filename: &str, data: &[u8]) -> Result<String, AnalysisError>;
}

/// Analyses the song behind a public url and returns the raw payload.
pub trait SongAnalyzer: Send + Sync {
    fn analyze(&self, source_url: &str) -> Result<serde_json::Value, AnalysisError>;
}
