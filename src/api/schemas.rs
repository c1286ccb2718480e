//! Request and response bodies of the HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Word budget used when a summary request does not name one.
pub const DEFAULT_SUMMARY_LENGTH: usize = 500;
const DEFAULT_SUMMARY_STYLE: &str = "concise";

/// Body of `POST /scrape_and_index`.
#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    /// Absolute `http` or `https` URL of the page to index.
    pub url: String,
}

/// Body of `POST /query` and `POST /stream_query`.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    /// Question to answer from the indexed documents.
    pub question: String,
}

/// Body of `POST /summarize`; every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct SummarizeRequest {
    /// Approximate length of the summary in words.
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Requested tone. Accepted for compatibility; it does not change the prompt.
    #[serde(default)]
    pub style: Option<String>,
}

impl SummarizeRequest {
    /// Requested word budget, defaulting to [`DEFAULT_SUMMARY_LENGTH`].
    pub fn max_length(&self) -> usize {
        self.max_length.unwrap_or(DEFAULT_SUMMARY_LENGTH)
    }

    /// Requested style, defaulting to `concise`.
    pub fn style(&self) -> &str {
        self.style.as_deref().unwrap_or(DEFAULT_SUMMARY_STYLE)
    }
}

/// Response of `POST /summarize`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    /// Generated summary, verbatim.
    pub summary: String,
    /// Number of whitespace-separated words in the summary.
    pub word_count: usize,
    /// Names of every indexed document.
    pub source_documents: Vec<String>,
}

/// Generic status envelope used by upload, scrape, reset and status.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Short status keyword (`success`, `online`).
    pub status: String,
    /// Human-readable outcome.
    pub message: String,
    /// Route-specific details; serialized as `null` when absent.
    pub details: Option<Value>,
}

impl StatusResponse {
    /// A `success` envelope.
    pub fn success(message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summarize_request_defaults() {
        let request: SummarizeRequest = serde_json::from_value(json!({})).expect("parse");
        assert_eq!(request.max_length(), 500);
        assert_eq!(request.style(), "concise");

        let request: SummarizeRequest =
            serde_json::from_value(json!({"max_length": null, "style": "bullet"})).expect("parse");
        assert_eq!(request.max_length(), 500);
        assert_eq!(request.style(), "bullet");
    }

    #[test]
    fn status_response_keeps_null_details() {
        let value = serde_json::to_value(StatusResponse::success("done", None)).expect("json");
        assert_eq!(
            value,
            json!({"status": "success", "message": "done", "details": null})
        );
    }
}
