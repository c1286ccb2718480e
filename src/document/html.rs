//! HTML to text conversion for scraped pages.

use scraper::{ElementRef, Html, Selector};

/// Title used when a page has no usable `<title>`.
pub const FALLBACK_TITLE: &str = "Web Document";

const SKIPPED_ELEMENTS: [&str; 5] = ["script", "style", "nav", "footer", "header"];

/// Title and visible text of a parsed page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedPage {
    /// Trimmed `<title>` text, or [`FALLBACK_TITLE`].
    pub title: String,
    /// Visible text, one trimmed line per line of each text run, blank lines removed.
    pub text: String,
}

/// Parse an HTML document into its title and visible text.
pub fn parse_page(html: &str) -> ScrapedPage {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|element| element.text().collect::<String>().trim().to_string())
        })
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| FALLBACK_TITLE.to_string());

    let mut lines = Vec::new();
    collect_visible_text(document.root_element(), &mut lines);

    ScrapedPage {
        title,
        text: lines.join("\n"),
    }
}

fn collect_visible_text(element: ElementRef<'_>, lines: &mut Vec<String>) {
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            if !SKIPPED_ELEMENTS.contains(&child_element.value().name()) {
                collect_visible_text(child_element, lines);
            }
        } else if let Some(text) = child.value().as_text() {
            lines.extend(
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }
    }
}
