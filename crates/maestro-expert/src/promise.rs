//! Completion promise parsing for retry-loop completion signals
//!
//! This module parses `<promise>{marker}</promise>` tags from expert
//! output. The marker text is caller-configurable per loop invocation
//! (default "DONE"), so an orchestrated task decides its own stop word.
//!
//! ## Format
//!
//! Basic completion:
//! ```xml
//! <promise>DONE</promise>
//! ```
//!
//! With reasoning:
//! ```xml
//! <promise>DONE</promise>
//! <completion_reasoning>
//! Feature implemented and all edge cases covered.
//! Confidence: 90%
//! </completion_reasoning>
//! ```

use serde::{Deserialize, Serialize};

/// Completion promise parsed from expert output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionPromise {
    /// Whether the expert signaled completion
    pub is_complete: bool,
    /// Optional reasoning for completion
    pub reasoning: Option<String>,
    /// Optional confidence score (0.0-1.0)
    pub confidence: Option<f32>,
    /// The raw promise block if found
    pub raw_block: Option<String>,
}

impl CompletionPromise {
    /// Parse a completion promise from expert output
    ///
    /// Looks for `<promise>{marker}</promise>` (marker compared
    /// case-insensitively) and an optional
    /// `<completion_reasoning>...</completion_reasoning>` block.
    ///
    /// # Examples
    ///
    /// ```
    /// use maestro_expert::CompletionPromise;
    ///
    /// let output = "<promise>DONE</promise>";
    /// let promise = CompletionPromise::parse(output, "DONE");
    /// assert!(promise.is_complete);
    /// ```
    pub fn parse(output: &str, marker: &str) -> Self {
        let promise_start = output.find("<promise>");
        let promise_end = output.find("</promise>");

        let is_complete = if let (Some(start), Some(end)) = (promise_start, promise_end) {
            let content_start = start + "<promise>".len();
            if content_start < end {
                let content = output[content_start..end].trim();
                content.eq_ignore_ascii_case(marker)
            } else {
                false
            }
        } else {
            false
        };

        if !is_complete {
            return Self::default();
        }

        let raw_block = promise_start
            .zip(promise_end)
            .map(|(start, end)| output[start..end + "</promise>".len()].to_string());

        let reasoning = extract_tag_content(output, "completion_reasoning");
        let confidence = reasoning.as_ref().and_then(|r| extract_confidence(r));

        Self {
            is_complete: true,
            reasoning,
            confidence,
            raw_block,
        }
    }

    /// Check if the promise indicates completion
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    /// Get confidence score if available
    pub fn confidence(&self) -> Option<f32> {
        self.confidence
    }
}

/// Extract content from an XML-style tag
fn extract_tag_content(text: &str, tag: &str) -> Option<String> {
    let start_tag = format!("<{}>", tag);
    let end_tag = format!("</{}>", tag);

    let start = text.find(&start_tag)?;
    let end = text.find(&end_tag)?;

    let content_start = start + start_tag.len();
    if content_start >= end {
        return None;
    }

    Some(text[content_start..end].trim().to_string())
}

/// Extract confidence percentage from reasoning text
///
/// Looks for patterns like "Confidence: 95%" or "95% confident"
fn extract_confidence(reasoning: &str) -> Option<f32> {
    if let Some(start) = reasoning.find("Confidence:") {
        let after = &reasoning[start + "Confidence:".len()..];
        return parse_percentage(after);
    }

    if let Some(pos) = reasoning.find("% confident") {
        let before = &reasoning[..pos];
        if let Some(num_start) = before.rfind(char::is_whitespace) {
            return parse_percentage(&before[num_start..]);
        }
    }

    None
}

/// Parse a percentage string to a 0.0-1.0 float
fn parse_percentage(text: &str) -> Option<f32> {
    let trimmed = text.trim();
    let num_str = trimmed
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect::<String>();

    let value: f32 = num_str.parse().ok()?;

    if value > 1.0 {
        Some(value / 100.0)
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_complete() {
        let output = "<promise>DONE</promise>";
        let promise = CompletionPromise::parse(output, "DONE");
        assert!(promise.is_complete);
        assert!(promise.reasoning.is_none());
        assert!(promise.confidence.is_none());
    }

    #[test]
    fn test_complete_case_insensitive() {
        let output = "<promise>done</promise>";
        let promise = CompletionPromise::parse(output, "DONE");
        assert!(promise.is_complete);
    }

    #[test]
    fn test_custom_marker() {
        let output = "<promise>SHIPPED</promise>";
        assert!(CompletionPromise::parse(output, "SHIPPED").is_complete);
        assert!(!CompletionPromise::parse(output, "DONE").is_complete);
    }

    #[test]
    fn test_marker_mismatch() {
        let output = "<promise>ALMOST</promise>";
        let promise = CompletionPromise::parse(output, "DONE");
        assert!(!promise.is_complete);
    }

    #[test]
    fn test_complete_with_reasoning() {
        let output = r#"
<promise>DONE</promise>
<completion_reasoning>
Feature implemented and all edge cases covered.
Confidence: 95%
</completion_reasoning>
"#;
        let promise = CompletionPromise::parse(output, "DONE");
        assert!(promise.is_complete);
        let reasoning = promise.reasoning.unwrap();
        assert!(reasoning.contains("edge cases"));
        assert_eq!(promise.confidence, Some(0.95));
    }

    #[test]
    fn test_confidence_alternative_format() {
        let reasoning = "I am 80% confident in this solution.";
        assert_eq!(extract_confidence(reasoning), Some(0.80));
    }

    #[test]
    fn test_no_promise() {
        let output = "Just some regular output without a promise.";
        let promise = CompletionPromise::parse(output, "DONE");
        assert!(!promise.is_complete);
    }

    #[test]
    fn test_promise_in_context() {
        let output = r#"
All requested changes are in place:
- Added the retry helper
- Updated the docs

<promise>DONE</promise>

Ready for review.
"#;
        let promise = CompletionPromise::parse(output, "DONE");
        assert!(promise.is_complete);
    }

    #[test]
    fn test_raw_block_capture() {
        let output = "<promise>DONE</promise>";
        let promise = CompletionPromise::parse(output, "DONE");
        assert_eq!(promise.raw_block, Some("<promise>DONE</promise>".to_string()));
    }

    #[test]
    fn test_empty_promise_tag() {
        let output = "<promise></promise>";
        let promise = CompletionPromise::parse(output, "DONE");
        assert!(!promise.is_complete);
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_percentage("95%"), Some(0.95));
        assert_eq!(parse_percentage("  80  "), Some(0.80));
        assert_eq!(parse_percentage("0.95"), Some(0.95));
        assert_eq!(parse_percentage("100"), Some(1.00));
    }
}
