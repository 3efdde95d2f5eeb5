use std::sync::Arc;

use argus_core::error::MonitorError;
use argus_core::traits::Cleaner;
use htmd::HtmlToMarkdown;

/// HTML-to-text cleaner using htmd.
///
/// Strips non-content elements (script, style, nav, footer, and friends)
/// and collapses blank-line runs, producing the plain text body that gets
/// fingerprinted and diffed. Markdown converters emit varying numbers of
/// blank lines between blocks, so the collapse keeps layout churn out of
/// the diffs.
pub struct PageCleaner {
    converter: Arc<HtmlToMarkdown>,
}

impl Clone for PageCleaner {
    fn clone(&self) -> Self {
        Self {
            converter: Arc::clone(&self.converter),
        }
    }
}

impl PageCleaner {
    pub fn new() -> Self {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec![
                "script", "style", "nav", "footer", "header", "aside", "noscript", "iframe", "svg",
            ])
            .build();

        Self {
            converter: Arc::new(converter),
        }
    }
}

impl Default for PageCleaner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cleaner for PageCleaner {
    fn clean(&self, html: &str) -> Result<String, MonitorError> {
        let markdown = self
            .converter
            .convert(html)
            .map_err(|e| MonitorError::Cleaner(e.to_string()))?;
        Ok(collapse_blank_lines(&markdown))
    }
}

/// Reduce runs of blank lines to a single one.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_blank = false;
    for line in text.lines() {
        let blank = line.trim().is_empty();
        if blank && last_blank {
            continue;
        }
        out.push_str(line);
        out.push('\n');
        last_blank = blank;
    }
    out.trim().to_string()
}
