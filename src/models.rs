//! Data models for the compliance analyzer.
//!
//! This module contains the core data structures shared by the analysis
//! engine, the report generator and the CLI: documents, questions, risk
//! labels and the two aggregate structures produced by a run.

use crate::analysis::normalizer::normalize;
use crate::error::AnalysisError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Stable identifier of a document, derived from its file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One extracted report taking part in a run.
#[derive(Debug, Clone)]
pub struct Document {
    /// Stable identifier.
    pub id: DocumentId,
    /// Name shown to the user (usually the file name).
    pub display_name: String,
    /// Full extracted text, used by the risk classifier.
    pub raw_text: String,
    /// Text bounded to the question budget; computed once at construction.
    normalized_text: String,
}

impl Document {
    /// Creates a document, normalizing its text to `max_tokens` words.
    pub fn new(
        id: DocumentId,
        display_name: impl Into<String>,
        raw_text: impl Into<String>,
        max_tokens: usize,
    ) -> Self {
        let raw_text = raw_text.into();
        let normalized_text = normalize(&raw_text, max_tokens).into_owned();
        Self {
            id,
            display_name: display_name.into(),
            raw_text,
            normalized_text,
        }
    }

    /// Returns the budget-bounded text sent to the reasoning service.
    pub fn normalized_text(&self) -> &str {
        &self.normalized_text
    }
}

/// Where a question came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionOrigin {
    /// Part of the fixed, built-in question list.
    Canonical,
    /// Supplied by the user for this run only.
    Custom,
}

/// A compliance question. Compared by exact text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    pub origin: QuestionOrigin,
}

impl Question {
    pub fn canonical(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: QuestionOrigin::Canonical,
        }
    }

    pub fn custom(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: QuestionOrigin::Custom,
        }
    }
}

/// The ordered questions evaluated in one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSet {
    questions: Vec<Question>,
}

impl QuestionSet {
    /// Builds the canonical set plus at most one custom question.
    ///
    /// A blank custom question is ignored. Texts are kept exactly as given
    /// and compared without normalization; duplicates are rejected, since
    /// they would alias the same entry in the question index.
    pub fn new(canonical: &[String], custom: Option<&str>) -> Result<Self, AnalysisError> {
        let mut questions: Vec<Question> = canonical.iter().map(Question::canonical).collect();

        if let Some(text) = custom.filter(|t| !t.trim().is_empty()) {
            questions.push(Question::custom(text));
        }

        let mut seen = HashSet::new();
        for question in &questions {
            if !seen.insert(question.text.as_str()) {
                return Err(AnalysisError::MalformedInput(format!(
                    "duplicate question: '{}'",
                    question.text
                )));
            }
        }

        Ok(Self { questions })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Question> {
        self.questions.iter()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn as_slice(&self) -> &[Question] {
        &self.questions
    }
}

/// Overall risk classification of a document.
///
/// Variants are declared in ascending severity so that `Ord` matches the
/// tie-break order High > Medium > Low > NoRiskDetected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLabel {
    NoRiskDetected,
    Low,
    Medium,
    High,
}

impl RiskLabel {
    /// Display order used by risk distribution views.
    pub const DISPLAY_ORDER: [RiskLabel; 4] = [
        RiskLabel::Low,
        RiskLabel::Medium,
        RiskLabel::High,
        RiskLabel::NoRiskDetected,
    ];

    /// Whether any risk keyword was found.
    pub fn is_risk_detected(&self) -> bool {
        !matches!(self, RiskLabel::NoRiskDetected)
    }

    /// Returns an emoji representation of the label.
    pub fn emoji(&self) -> &'static str {
        match self {
            RiskLabel::NoRiskDetected => "⚪",
            RiskLabel::Low => "🟢",
            RiskLabel::Medium => "🟡",
            RiskLabel::High => "🔴",
        }
    }
}

impl fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLabel::NoRiskDetected => write!(f, "No Risk Detected"),
            RiskLabel::Low => write!(f, "Low"),
            RiskLabel::Medium => write!(f, "Medium"),
            RiskLabel::High => write!(f, "High"),
        }
    }
}

/// Whether a document addresses a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Adherence {
    Yes,
    No,
}

impl fmt::Display for Adherence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adherence::Yes => write!(f, "Yes"),
            Adherence::No => write!(f, "No"),
        }
    }
}

/// Result of evaluating one question against one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub document: DocumentId,
    pub question: String,
    pub adherence: Adherence,
    /// Present exactly when `adherence` is `Yes`.
    pub evidence: Option<String>,
}

impl QuestionOutcome {
    pub fn yes(document: DocumentId, question: impl Into<String>, evidence: String) -> Self {
        Self {
            document,
            question: question.into(),
            adherence: Adherence::Yes,
            evidence: Some(evidence),
        }
    }

    pub fn no(document: DocumentId, question: impl Into<String>) -> Self {
        Self {
            document,
            question: question.into(),
            adherence: Adherence::No,
            evidence: None,
        }
    }
}

/// Count of documents per risk label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub no_risk_detected: usize,
}

impl RiskSummary {
    /// Creates a summary from per-document assessments.
    pub fn from_assessments(assessments: &[RiskAssessment]) -> Self {
        let mut summary = Self::default();
        for assessment in assessments {
            summary.record(assessment.label);
        }
        summary
    }

    pub fn record(&mut self, label: RiskLabel) {
        match label {
            RiskLabel::Low => self.low += 1,
            RiskLabel::Medium => self.medium += 1,
            RiskLabel::High => self.high += 1,
            RiskLabel::NoRiskDetected => self.no_risk_detected += 1,
        }
    }

    pub fn count(&self, label: RiskLabel) -> usize {
        match label {
            RiskLabel::Low => self.low,
            RiskLabel::Medium => self.medium,
            RiskLabel::High => self.high,
            RiskLabel::NoRiskDetected => self.no_risk_detected,
        }
    }

    /// Number of documents classified.
    pub fn total(&self) -> usize {
        self.low + self.medium + self.high + self.no_risk_detected
    }

    /// Documents flagged with a compliance issue (any risk detected).
    pub fn with_compliance_issue(&self) -> usize {
        self.low + self.medium + self.high
    }

    /// Documents with no compliance issue.
    pub fn without_compliance_issue(&self) -> usize {
        self.no_risk_detected
    }
}

/// Risk label assigned to one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub document: DocumentId,
    pub display_name: String,
    pub label: RiskLabel,
}

impl RiskAssessment {
    pub fn risk_detected(&self) -> Adherence {
        if self.label.is_risk_detected() {
            Adherence::Yes
        } else {
            Adherence::No
        }
    }
}

/// Per-question results across all documents of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub question: Question,
    /// Documents that address the question, in run order.
    pub yes_documents: Vec<DocumentId>,
    /// Documents that do not, in run order.
    pub no_documents: Vec<DocumentId>,
    pub evidence_by_document: BTreeMap<DocumentId, Vec<String>>,
}

impl QuestionRecord {
    pub fn new(question: Question) -> Self {
        Self {
            question,
            yes_documents: Vec::new(),
            no_documents: Vec::new(),
            evidence_by_document: BTreeMap::new(),
        }
    }

    /// Appends an outcome for a document not yet recorded.
    pub fn push(&mut self, outcome: QuestionOutcome) {
        match outcome.adherence {
            Adherence::Yes => {
                let evidence = self
                    .evidence_by_document
                    .entry(outcome.document.clone())
                    .or_default();
                evidence.extend(outcome.evidence);
                self.yes_documents.push(outcome.document);
            }
            Adherence::No => self.no_documents.push(outcome.document),
        }
    }

    pub fn adherence(&self, document: &DocumentId) -> Option<Adherence> {
        if self.yes_documents.contains(document) {
            Some(Adherence::Yes)
        } else if self.no_documents.contains(document) {
            Some(Adherence::No)
        } else {
            None
        }
    }

    /// Evidence recorded for a document; empty when it answered no.
    pub fn evidence_for(&self, document: &DocumentId) -> &[String] {
        self.evidence_by_document
            .get(document)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Per-question adherence index, in question order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionIndex {
    records: Vec<QuestionRecord>,
}

impl QuestionIndex {
    pub fn from_records(records: Vec<QuestionRecord>) -> Self {
        Self { records }
    }

    /// Looks up a question by exact text. Unknown text yields `None`.
    pub fn get(&self, question: &str) -> Option<&QuestionRecord> {
        self.records.iter().find(|r| r.question.text == question)
    }

    pub fn records(&self) -> &[QuestionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Tone of a report, as judged by the reasoning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Unknown,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "Positive"),
            Sentiment::Neutral => write!(f, "Neutral"),
            Sentiment::Negative => write!(f, "Negative"),
            Sentiment::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Positional label ("Report N") shared by every view of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLabel {
    pub label: String,
    pub document: DocumentId,
    pub display_name: String,
}

/// Assigns "Report 1", "Report 2", ... in caller order.
pub fn document_labels(documents: &[Document]) -> Vec<DocumentLabel> {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| DocumentLabel {
            label: format!("Report {}", i + 1),
            document: doc.id.clone(),
            display_name: doc.display_name.clone(),
        })
        .collect()
}

/// A document dropped from the run because its text could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedDocument {
    pub source: String,
    pub reason: String,
}

/// How a completed run went. Failed runs never produce an `Analysis`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    /// At least one document was excluded during extraction.
    Degraded,
}

/// Everything a run hands to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub documents: Vec<DocumentLabel>,
    pub risk_assessments: Vec<RiskAssessment>,
    pub risk_summary: RiskSummary,
    pub question_index: QuestionIndex,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sentiments: Vec<(DocumentId, Sentiment)>,
    /// Only documents whose summary succeeded appear here.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub summaries: Vec<(DocumentId, String)>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub excluded: Vec<ExcludedDocument>,
}

impl Analysis {
    pub fn status(&self) -> RunStatus {
        if self.excluded.is_empty() {
            RunStatus::Succeeded
        } else {
            RunStatus::Degraded
        }
    }

    /// Highest risk label among the analyzed documents.
    pub fn max_risk(&self) -> Option<RiskLabel> {
        self.risk_assessments.iter().map(|a| a.label).max()
    }

    pub fn sentiment_for(&self, document: &DocumentId) -> Option<Sentiment> {
        self.sentiments
            .iter()
            .find(|(id, _)| id == document)
            .map(|(_, s)| *s)
    }

    pub fn summary_for(&self, document: &DocumentId) -> Option<&str> {
        self.summaries
            .iter()
            .find(|(id, _)| id == document)
            .map(|(_, s)| s.as_str())
    }
}

/// Metadata about the compliance report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Date and time of the analysis.
    pub analysis_date: DateTime<Utc>,
    /// Name of the LLM model used.
    pub model_used: String,
    /// Number of documents analyzed.
    pub documents_analyzed: usize,
    /// Number of documents excluded during extraction.
    pub documents_excluded: usize,
    /// Number of questions evaluated per document.
    pub questions_evaluated: usize,
    /// Duration of the analysis in seconds.
    pub duration_seconds: f64,
    pub status: RunStatus,
}

/// The complete compliance report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub analysis: Analysis,
}
