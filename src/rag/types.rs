use serde::{Deserialize, Serialize};

/// Label reported for passages whose document has no recorded name.
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Maximum number of characters of passage text reported in a [`SourceInfo`].
pub const EXCERPT_CHARS: usize = 300;

/// Text to be indexed together with the name it is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Cleaned document text.
    pub text: String,
    /// Display name; `None` is reported as [`UNKNOWN_SOURCE`].
    pub source: Option<String>,
}

impl Document {
    /// Document reported under `source`.
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: Some(source.into()),
        }
    }

    /// Document without a recorded name.
    pub fn anonymous(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
        }
    }
}

/// Attribution for one retrieved passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Name of the originating document.
    pub file_name: String,
    /// First characters of the passage.
    pub text: String,
    /// Similarity score, when the retriever produced one.
    pub score: Option<f32>,
}

impl SourceInfo {
    /// Build an attribution, truncating `text` to [`EXCERPT_CHARS`] characters.
    pub fn excerpt(source: Option<&str>, text: &str, score: Option<f32>) -> Self {
        Self {
            file_name: source.unwrap_or(UNKNOWN_SOURCE).to_string(),
            text: text.chars().take(EXCERPT_CHARS).collect(),
            score,
        }
    }
}

/// Answer plus attributions; also the final event of a streamed answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    /// Complete answer text.
    pub final_answer: String,
    /// Passages the answer was grounded on.
    pub sources: Vec<SourceInfo>,
}
