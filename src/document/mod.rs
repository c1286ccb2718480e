//! Turning raw inputs (PDF files, web pages) into normalized plain text.
//!
//! Nothing here knows about indexing; the processor only extracts and cleans text.

mod html;

pub use html::{FALLBACK_TITLE, ScrapedPage, parse_page};

use reqwest::Client;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors raised while extracting text from documents or pages.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// File could not be read from disk.
    #[error("Failed to read '{path}': {source}")]
    Io {
        /// Path that failed to load.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// PDF parser rejected the file.
    #[error("Failed to parse PDF '{path}': {message}")]
    Pdf {
        /// Path of the rejected file.
        path: String,
        /// Parser diagnostic.
        message: String,
    },
    /// Page could not be fetched.
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        /// URL that was requested.
        url: String,
        /// Transport or status failure.
        #[source]
        source: reqwest::Error,
    },
    /// Extraction worker stopped before producing a result.
    #[error("Text extraction task failed: {0}")]
    Task(String),
}

/// Stateless helper that extracts and normalizes document text.
#[derive(Clone)]
pub struct DocumentProcessor {
    http: Client,
    allowed_extensions: HashSet<String>,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProcessor {
    /// Build a processor accepting PDF uploads only.
    pub fn new() -> Self {
        Self::with_extensions([".pdf"])
    }

    /// Build a processor accepting the given extensions (with leading dot, any case).
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let http = Client::builder()
            .user_agent(concat!("docsense/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to construct reqwest::Client for scraping");
        Self {
            http,
            allowed_extensions: extensions
                .into_iter()
                .map(|extension| extension.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Extract the text of every page of a PDF, in page order, separated by a blank line.
    pub async fn extract_pdf_text(&self, path: &Path) -> Result<String, DocumentError> {
        let label = path.display().to_string();
        let bytes = tokio::fs::read(path).await.map_err(|source| DocumentError::Io {
            path: label.clone(),
            source,
        })?;

        let pages = tokio::task::spawn_blocking({
            let label = label.clone();
            move || {
                pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|error| {
                    DocumentError::Pdf {
                        path: label,
                        message: error.to_string(),
                    }
                })
            }
        })
        .await
        .map_err(|error| DocumentError::Task(error.to_string()))??;

        tracing::debug!(path = %label, pages = pages.len(), "Extracted PDF text");
        Ok(pages.join("\n\n"))
    }

    /// Fetch a web page and return its title and visible text.
    ///
    /// `script`, `style`, `nav`, `footer` and `header` subtrees are skipped; each remaining
    /// text line is trimmed and blank lines are dropped.
    pub async fn scrape_url(&self, url: &str) -> Result<(String, String), DocumentError> {
        let fetch_error = |source| DocumentError::Fetch {
            url: url.to_string(),
            source,
        };
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(fetch_error)?;
        let html = response.text().await.map_err(fetch_error)?;

        let ScrapedPage { title, text } = parse_page(&html);
        tracing::debug!(url, title = %title, chars = text.len(), "Scraped page");
        Ok((title, text))
    }

    /// Whether the file name carries an accepted extension (case-insensitive).
    pub fn validate_file_type(&self, filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|extension| extension.to_str())
            .map(|extension| format!(".{}", extension.to_lowercase()))
            .is_some_and(|extension| self.allowed_extensions.contains(&extension))
    }

    /// Trim every line and drop the empty ones.
    pub fn clean_text(text: &str) -> String {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};

    #[test]
    fn validate_file_type_is_case_insensitive() {
        let processor = DocumentProcessor::new();
        assert!(processor.validate_file_type("a.PDF"));
        assert!(processor.validate_file_type("report.final.pdf"));
        assert!(!processor.validate_file_type("a.docx"));
        assert!(!processor.validate_file_type("pdf"));
        assert!(!processor.validate_file_type(".pdf"));
    }

    #[test]
    fn custom_extension_sets_are_honoured() {
        let processor = DocumentProcessor::with_extensions([".PDF", ".txt"]);
        assert!(processor.validate_file_type("notes.TXT"));
        assert!(processor.validate_file_type("paper.pdf"));
        assert!(!processor.validate_file_type("paper.md"));
    }

    #[test]
    fn clean_text_trims_and_drops_blank_lines() {
        let cleaned = DocumentProcessor::clean_text("  first line  \n\n\t\nsecond\r\n   third   ");
        assert_eq!(cleaned, "first line\nsecond\nthird");
    }

    #[test]
    fn clean_text_is_idempotent() {
        let samples = [
            "",
            "   ",
            "a\n\n b \n",
            "  The sky is blue.\n\n\n  It is.  \r\n",
            "\u{a0}non-breaking\u{a0}\n\tindent",
        ];
        for sample in samples {
            let once = DocumentProcessor::clean_text(sample);
            let twice = DocumentProcessor::clean_text(&once);
            assert_eq!(once, twice);
            for line in once.lines() {
                assert!(!line.is_empty());
                assert_eq!(line, line.trim());
            }
        }
    }

    #[tokio::test]
    async fn extract_pdf_text_reports_invalid_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").expect("write");

        let error = DocumentProcessor::new()
            .extract_pdf_text(&path)
            .await
            .expect_err("invalid pdf");
        assert!(matches!(error, DocumentError::Pdf { .. }));
    }

    #[tokio::test]
    async fn extract_pdf_text_reports_missing_files() {
        let error = DocumentProcessor::new()
            .extract_pdf_text(Path::new("/definitely/not/here.pdf"))
            .await
            .expect_err("missing file");
        assert!(matches!(error, DocumentError::Io { .. }));
    }

    #[tokio::test]
    async fn scrape_url_returns_title_and_visible_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/article");
                then.status(200)
                    .header("content-type", "text/html")
                    .body(
                        "<html><head><title> Sky Facts </title><style>p{}</style></head>\
                         <body><nav>Home</nav><h1>Colors</h1><p>The sky is blue.</p>\
                         <script>var x = 1;</script><footer>(c)</footer></body></html>",
                    );
            })
            .await;

        let (title, text) = DocumentProcessor::new()
            .scrape_url(&format!("{}/article", server.base_url()))
            .await
            .expect("scrape");

        assert_eq!(title, "Sky Facts");
        assert_eq!(text, "Sky Facts\nColors\nThe sky is blue.");
    }

    #[tokio::test]
    async fn scrape_url_fails_on_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing");
                then.status(404);
            })
            .await;

        let error = DocumentProcessor::new()
            .scrape_url(&format!("{}/missing", server.base_url()))
            .await
            .expect_err("404");
        assert!(matches!(error, DocumentError::Fetch { .. }));
    }
}
