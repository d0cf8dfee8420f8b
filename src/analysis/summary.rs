//! Short per-report summaries.
//!
//! Like sentiment, a summary is extra context for the reader: a failed
//! summary is logged and left out of the report.

use crate::analysis::evaluator::{ask_with_retry, RetryPolicy};
use crate::analysis::normalizer::normalize;
use crate::llm::ReasoningService;
use crate::models::Document;
use tracing::warn;

/// Bounds on the requested summary length, in words.
const MIN_SUMMARY_WORDS: usize = 50;
const MAX_SUMMARY_WORDS: usize = 150;

pub fn build_summary_prompt(text: &str) -> String {
    format!(
        "Summarize the following cybersecurity audit report in {} to {} words. \
         Focus on the main findings, risks and controls. Reply with the summary only.\n\n\
         Report:\n{}",
        MIN_SUMMARY_WORDS, MAX_SUMMARY_WORDS, text
    )
}

/// Trimmed summary text, or `None` when the answer is blank.
pub fn clean_summary(answer: &str) -> Option<String> {
    let summary = answer.trim();
    if summary.is_empty() {
        None
    } else {
        Some(summary.to_string())
    }
}

/// Summarizes one document from its first `max_tokens` words.
pub async fn summarize<S: ReasoningService>(
    service: &S,
    retry: &RetryPolicy,
    document: &Document,
    max_tokens: usize,
) -> Option<String> {
    let text = normalize(&document.raw_text, max_tokens);
    let prompt = build_summary_prompt(&text);

    match ask_with_retry(service, retry, &prompt).await {
        Ok(answer) => {
            let summary = clean_summary(&answer);
            if summary.is_none() {
                warn!("Empty summary returned for {}", document.id);
            }
            summary
        }
        Err(e) => {
            warn!("Summary failed for {}: {}", document.id, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReasoningError;
    use crate::models::DocumentId;
    use std::time::Duration;

    struct Fixed(Result<String, ReasoningError>);

    impl ReasoningService for Fixed {
        async fn ask(&self, _prompt: &str) -> Result<String, ReasoningError> {
            self.0.clone()
        }
    }

    fn retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_prompt_embeds_text() {
        let prompt = build_summary_prompt("Backups are untested.");
        assert!(prompt.contains("50 to 150 words"));
        assert!(prompt.ends_with("Report:\nBackups are untested."));
    }

    #[test]
    fn test_clean_summary() {
        assert_eq!(clean_summary("  A short summary.\n"), Some("A short summary.".to_string()));
        assert_eq!(clean_summary(" \n "), None);
    }

    #[tokio::test]
    async fn test_summary_failure_is_dropped() {
        let document = Document::new(DocumentId::new("a"), "a", "text", 10);

        let failing = Fixed(Err(ReasoningError::InvalidRequest("too long".to_string())));
        assert_eq!(summarize(&failing, &retry(), &document, 1000).await, None);

        let blank = Fixed(Ok("   ".to_string()));
        assert_eq!(summarize(&blank, &retry(), &document, 1000).await, None);

        let ok = Fixed(Ok(" Firewalls in place. ".to_string()));
        assert_eq!(
            summarize(&ok, &retry(), &document, 1000).await,
            Some("Firewalls in place.".to_string())
        );
    }
}
