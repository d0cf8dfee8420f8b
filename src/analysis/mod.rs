//! Analysis engine.
//!
//! Normalization, risk classification, question evaluation, the optional
//! sentiment and summary passes, and the aggregator that runs them over a
//! batch of documents.

pub mod aggregator;
pub mod evaluator;
pub mod normalizer;
pub mod risk;
pub mod sentiment;
pub mod summary;

pub use aggregator::{Aggregator, AggregatorOptions};
pub use evaluator::{QuestionEvaluator, RetryPolicy};
pub use risk::{RiskClassifier, RiskKeywords};
