//! Keyword-based risk classification.
//!
//! The classifier is an offline heuristic: it lower-cases the document once
//! and checks the High, Medium and Low keyword tiers in that order, returning
//! on the first tier with a substring match.

use crate::models::{Document, RiskAssessment, RiskLabel};
use serde::{Deserialize, Serialize};

/// The three ordered keyword tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskKeywords {
    #[serde(default = "default_high")]
    pub high: Vec<String>,
    #[serde(default = "default_medium")]
    pub medium: Vec<String>,
    #[serde(default = "default_low")]
    pub low: Vec<String>,
}

impl Default for RiskKeywords {
    fn default() -> Self {
        Self {
            high: default_high(),
            medium: default_medium(),
            low: default_low(),
        }
    }
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn default_high() -> Vec<String> {
    to_strings(&[
        "critical",
        "severe",
        "high risk",
        "breach",
        "compromise",
        "unauthorized access",
        "exploitation",
        "major vulnerability",
        "data exfiltration",
        "incident",
        "unpatched",
        "unmitigated",
    ])
}

fn default_medium() -> Vec<String> {
    to_strings(&[
        "moderate",
        "medium risk",
        "potential vulnerability",
        "exposure",
        "configuration issues",
        "insecure protocols",
        "firewall misconfiguration",
        "audit finding",
        "password weaknesses",
    ])
}

fn default_low() -> Vec<String> {
    to_strings(&[
        "low risk",
        "minor",
        "non-critical",
        "low priority",
        "compliance gap",
        "misconfigured settings",
        "isolated incident",
        "best practices not followed",
        "limited vulnerability",
    ])
}

/// Assigns exactly one `RiskLabel` per document.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    tiers: [(RiskLabel, Vec<String>); 3],
}

impl RiskClassifier {
    /// Creates a classifier from keyword tiers. Keywords are lower-cased here
    /// so matching stays case-insensitive whatever the configuration holds.
    pub fn new(keywords: RiskKeywords) -> Self {
        let lower = |words: Vec<String>| -> Vec<String> {
            words
                .into_iter()
                .map(|w| w.to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };

        Self {
            tiers: [
                (RiskLabel::High, lower(keywords.high)),
                (RiskLabel::Medium, lower(keywords.medium)),
                (RiskLabel::Low, lower(keywords.low)),
            ],
        }
    }

    /// Classifies a document's full text.
    pub fn classify(&self, text: &str) -> RiskLabel {
        let content = text.to_lowercase();

        self.tiers
            .iter()
            .find(|(_, words)| words.iter().any(|w| content.contains(w.as_str())))
            .map(|(label, _)| *label)
            .unwrap_or(RiskLabel::NoRiskDetected)
    }

    /// Classifies a document and wraps the result for reporting.
    pub fn assess(&self, document: &Document) -> RiskAssessment {
        RiskAssessment {
            document: document.id.clone(),
            display_name: document.display_name.clone(),
            label: self.classify(&document.raw_text),
        }
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new(RiskKeywords::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_wins_over_low() {
        let classifier = RiskClassifier::default();
        let text = "A minor issue was noted alongside a breach of the perimeter.";
        assert_eq!(classifier.classify(text), RiskLabel::High);
    }

    #[test]
    fn test_tiers() {
        let classifier = RiskClassifier::default();
        assert_eq!(
            classifier.classify("A data breach was identified in Q3."),
            RiskLabel::High
        );
        assert_eq!(
            classifier.classify("Several Password Weaknesses were found."),
            RiskLabel::Medium
        );
        assert_eq!(
            classifier.classify("One compliance gap remains open."),
            RiskLabel::Low
        );
        assert_eq!(
            classifier.classify("All controls operated effectively."),
            RiskLabel::NoRiskDetected
        );
    }

    #[test]
    fn test_medium_wins_over_low() {
        let classifier = RiskClassifier::default();
        let text = "minor exposure of the admin interface";
        assert_eq!(classifier.classify(text), RiskLabel::Medium);
    }

    #[test]
    fn test_substring_semantics() {
        // "isolated incident" is Low, but "incident" alone is High and is checked first.
        let classifier = RiskClassifier::default();
        assert_eq!(
            classifier.classify("an isolated incident occurred"),
            RiskLabel::High
        );
    }

    #[test]
    fn test_deterministic() {
        let classifier = RiskClassifier::default();
        let text = "Moderate findings across the estate.";
        let first = classifier.classify(text);
        for _ in 0..10 {
            assert_eq!(classifier.classify(text), first);
        }
    }

    #[test]
    fn test_custom_keywords() {
        let classifier = RiskClassifier::new(RiskKeywords {
            high: vec!["RANSOMWARE".to_string()],
            medium: vec![],
            low: vec!["typo".to_string(), String::new()],
        });
        assert_eq!(
            classifier.classify("ransomware note found"),
            RiskLabel::High
        );
        assert_eq!(classifier.classify("a breach"), RiskLabel::NoRiskDetected);
        assert_eq!(classifier.classify("a typo"), RiskLabel::Low);
        // Empty keywords never match everything.
        assert_eq!(classifier.classify("clean"), RiskLabel::NoRiskDetected);
    }
}
