//! Report tone classification.
//!
//! Uses the shorter sentiment budget and a few-shot prompt. Failures never
//! fail a run: the document is marked `Unknown` instead.

use crate::analysis::evaluator::{ask_with_retry, RetryPolicy};
use crate::analysis::normalizer::normalize;
use crate::llm::ReasoningService;
use crate::models::{Document, Sentiment};
use tracing::warn;

const SENTIMENT_EXAMPLES: &str = r#"Examples:
1. Text: "This audit report is great and very detailed." Sentiment: positive
2. Text: "The report highlights significant improvements." Sentiment: positive
3. Text: "The report is okay but could use some improvements." Sentiment: neutral
4. Text: "The audit report covers the necessary points." Sentiment: neutral
5. Text: "The audit report is lacking key information and is poorly done." Sentiment: negative
6. Text: "This report misses the essential details and is confusing." Sentiment: negative"#;

pub fn build_sentiment_prompt(text: &str) -> String {
    format!(
        "Classify the sentiment of the following text as 'positive', 'neutral', or 'negative'.\n\n\
         {}\n\nNow classify this text:\nText: \"{}\"\nSentiment:",
        SENTIMENT_EXAMPLES, text
    )
}

/// Parse a free-text answer into a `Sentiment`.
pub fn parse_sentiment(answer: &str) -> Sentiment {
    let answer = answer.trim().to_lowercase();
    if answer.contains("negative") {
        Sentiment::Negative
    } else if answer.contains("positive") {
        Sentiment::Positive
    } else if answer.contains("neutral") {
        Sentiment::Neutral
    } else {
        Sentiment::Unknown
    }
}

/// Classifies the tone of one document from its first `max_tokens` words.
pub async fn classify_sentiment<S: ReasoningService>(
    service: &S,
    retry: &RetryPolicy,
    document: &Document,
    max_tokens: usize,
) -> Sentiment {
    let text = normalize(&document.raw_text, max_tokens);
    let prompt = build_sentiment_prompt(&text);

    match ask_with_retry(service, retry, &prompt).await {
        Ok(answer) => parse_sentiment(&answer),
        Err(e) => {
            warn!("Sentiment analysis failed for {}: {}", document.id, e);
            Sentiment::Unknown
        }
    }
}
