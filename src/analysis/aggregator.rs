//! Run orchestration and aggregation.
//!
//! The aggregator drives a run: it extracts and normalizes documents,
//! classifies risk for each one, evaluates every (document, question) pair
//! on a bounded worker pool and folds the outcomes into the risk summary
//! and question index. Workers only return values; the fold is the single
//! writer, and slots are keyed by position so the result does not depend on
//! completion order.

use crate::analysis::evaluator::QuestionEvaluator;
use crate::analysis::normalizer::token_count;
use crate::analysis::risk::RiskClassifier;
use crate::analysis::sentiment::classify_sentiment;
use crate::analysis::summary::summarize;
use crate::documents::{DocumentSource, TextProvider};
use crate::error::AnalysisError;
use crate::llm::ReasoningService;
use crate::models::{
    document_labels, Analysis, Document, ExcludedDocument, Question, QuestionIndex,
    QuestionOutcome, QuestionRecord, QuestionSet, RiskAssessment, RiskSummary, Sentiment,
};
use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use tracing::{debug, info, warn};

/// Tuning knobs for a run.
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// Maximum number of reasoning calls in flight.
    pub concurrency: usize,
    /// Word budget for the text sent with each question.
    pub question_token_budget: usize,
    /// Word budget for sentiment classification; `None` disables it.
    pub sentiment_token_budget: Option<usize>,
    /// Word budget for report summaries; `None` disables them.
    pub summary_token_budget: Option<usize>,
    pub show_progress: bool,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            question_token_budget: 3000,
            sentiment_token_budget: None,
            summary_token_budget: None,
            show_progress: false,
        }
    }
}

/// Documents that survived extraction, plus the ones that did not.
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub documents: Vec<Document>,
    pub excluded: Vec<ExcludedDocument>,
}

impl PreparedBatch {
    /// Fails when extraction excluded every document.
    pub fn require_documents(&self) -> Result<(), AnalysisError> {
        if self.documents.is_empty() {
            return Err(AnalysisError::MalformedInput(format!(
                "all {} documents failed extraction",
                self.excluded.len()
            )));
        }
        Ok(())
    }
}

/// Drives one analysis run over a batch of documents and a question set.
pub struct Aggregator<S> {
    classifier: RiskClassifier,
    evaluator: QuestionEvaluator<S>,
    options: AggregatorOptions,
}

impl<S: ReasoningService> Aggregator<S> {
    pub fn new(
        classifier: RiskClassifier,
        evaluator: QuestionEvaluator<S>,
        options: AggregatorOptions,
    ) -> Self {
        Self {
            classifier,
            evaluator,
            options,
        }
    }

    /// Extract and normalize every source, excluding the ones that fail.
    pub fn prepare<P: TextProvider>(
        &self,
        provider: &P,
        sources: &[DocumentSource],
    ) -> PreparedBatch {
        let mut batch = PreparedBatch::default();

        for source in sources {
            match provider.extract(source) {
                Ok(text) => {
                    let document = Document::new(
                        source.id.clone(),
                        source.display_name.clone(),
                        text,
                        self.options.question_token_budget,
                    );
                    debug!(
                        "{}: {} words, {} sent per question",
                        document.id,
                        token_count(&document.raw_text),
                        token_count(document.normalized_text())
                    );
                    batch.documents.push(document);
                }
                Err(e) => {
                    warn!("Excluding {}: {}", source.display_name, e);
                    batch.excluded.push(ExcludedDocument {
                        source: source.display_name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Prepared {} documents ({} excluded)",
            batch.documents.len(),
            batch.excluded.len()
        );
        batch
    }

    /// Classify every document's full text and count labels.
    pub fn risk_pass(&self, documents: &[Document]) -> (Vec<RiskAssessment>, RiskSummary) {
        let assessments: Vec<RiskAssessment> = documents
            .iter()
            .map(|doc| self.classifier.assess(doc))
            .collect();
        let summary = RiskSummary::from_assessments(&assessments);
        (assessments, summary)
    }

    /// Evaluate every question against every document.
    ///
    /// Stops at the first fatal evaluation error; no partial index escapes.
    pub async fn compliance_pass(
        &self,
        documents: &[Document],
        questions: &[Question],
    ) -> Result<QuestionIndex, AnalysisError> {
        let total = documents.len() * questions.len();
        let concurrency = self.options.concurrency.max(1);
        info!(
            "Evaluating {} questions x {} documents ({} calls, {} in flight)",
            questions.len(),
            documents.len(),
            total,
            concurrency
        );

        let progress = self.progress_bar(total as u64);
        let mut slots: Vec<Vec<Option<QuestionOutcome>>> =
            vec![vec![None; documents.len()]; questions.len()];

        let work = documents.iter().enumerate().flat_map(move |(d, document)| {
            questions
                .iter()
                .enumerate()
                .map(move |(q, question)| (d, document, q, question))
        });

        let mut outcomes = stream::iter(work)
            .map(|(d, document, q, question)| async move {
                self.evaluator
                    .evaluate(document, question)
                    .await
                    .map(|outcome| (q, d, outcome))
                    .map_err(|source| AnalysisError::Reasoning {
                        document: document.id.to_string(),
                        question: question.text.clone(),
                        source,
                    })
            })
            .buffer_unordered(concurrency);

        while let Some((q, d, outcome)) = outcomes.try_next().await.inspect_err(|_| {
            progress.abandon();
        })? {
            slots[q][d] = Some(outcome);
            progress.inc(1);
        }
        progress.finish_and_clear();

        let records = questions
            .iter()
            .zip(slots)
            .map(|(question, row)| {
                let mut record = QuestionRecord::new(question.clone());
                for (d, outcome) in row.into_iter().enumerate() {
                    let outcome = outcome.ok_or_else(|| {
                        AnalysisError::Incomplete(format!(
                            "no outcome for '{}' on {}",
                            question.text, documents[d].id
                        ))
                    })?;
                    record.push(outcome);
                }
                Ok(record)
            })
            .collect::<Result<Vec<_>, AnalysisError>>()?;

        Ok(QuestionIndex::from_records(records))
    }

    /// Classify tone per document, in document order. Never fails.
    pub async fn sentiment_pass(
        &self,
        documents: &[Document],
        max_tokens: usize,
    ) -> Vec<Sentiment> {
        let service = self.evaluator.service();
        let retry = self.evaluator.retry_policy();

        stream::iter(documents)
            .map(|document| classify_sentiment(service, retry, document, max_tokens))
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await
    }

    /// Summarize each document, in document order. Failed summaries are `None`.
    pub async fn summary_pass(
        &self,
        documents: &[Document],
        max_tokens: usize,
    ) -> Vec<Option<String>> {
        let service = self.evaluator.service();
        let retry = self.evaluator.retry_policy();

        stream::iter(documents)
            .map(|document| summarize(service, retry, document, max_tokens))
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await
    }

    /// Analyze already-extracted documents.
    pub async fn analyze(
        &self,
        documents: &[Document],
        questions: &QuestionSet,
    ) -> Result<Analysis, AnalysisError> {
        if documents.is_empty() {
            return Err(AnalysisError::MalformedInput(
                "no documents to analyze".to_string(),
            ));
        }
        if questions.is_empty() {
            return Err(AnalysisError::MalformedInput(
                "no questions to evaluate".to_string(),
            ));
        }

        let (risk_assessments, risk_summary) = self.risk_pass(documents);
        debug!("Risk summary: {:?}", risk_summary);

        let question_index = self.compliance_pass(documents, questions.as_slice()).await?;

        let sentiments = match self.options.sentiment_token_budget {
            Some(budget) => {
                let labels = self.sentiment_pass(documents, budget).await;
                documents.iter().map(|d| d.id.clone()).zip(labels).collect()
            }
            None => Vec::new(),
        };

        let summaries = match self.options.summary_token_budget {
            Some(budget) => {
                let texts = self.summary_pass(documents, budget).await;
                documents
                    .iter()
                    .zip(texts)
                    .filter_map(|(d, text)| text.map(|t| (d.id.clone(), t)))
                    .collect()
            }
            None => Vec::new(),
        };

        Ok(Analysis {
            documents: document_labels(documents),
            risk_assessments,
            risk_summary,
            question_index,
            sentiments,
            summaries,
            excluded: Vec::new(),
        })
    }

    /// Like `analyze`, but abandons the run when `cancel` completes first.
    ///
    /// In-flight calls are dropped and nothing partial is returned.
    pub async fn analyze_until<F>(
        &self,
        documents: &[Document],
        questions: &QuestionSet,
        cancel: F,
    ) -> Result<Analysis, AnalysisError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.analyze(documents, questions) => result,
            _ = cancel => {
                warn!("Analysis cancelled, discarding partial results");
                Err(AnalysisError::Cancelled)
            }
        }
    }

    /// Full run: extract, exclude failures, analyze the rest.
    pub async fn run<P, F>(
        &self,
        provider: &P,
        sources: &[DocumentSource],
        questions: &QuestionSet,
        cancel: F,
    ) -> Result<Analysis, AnalysisError>
    where
        P: TextProvider,
        F: Future<Output = ()>,
    {
        if sources.is_empty() {
            return Err(AnalysisError::MalformedInput(
                "no documents supplied".to_string(),
            ));
        }
        if questions.is_empty() {
            return Err(AnalysisError::MalformedInput(
                "no questions to evaluate".to_string(),
            ));
        }

        let batch = self.prepare(provider, sources);
        batch.require_documents()?;

        let mut analysis = self
            .analyze_until(&batch.documents, questions, cancel)
            .await?;
        analysis.excluded = batch.excluded;
        Ok(analysis)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::evaluator::RetryPolicy;
    use crate::error::{ExtractionError, ReasoningError};
    use crate::models::{Adherence, DocumentId, RiskLabel};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers by looking for a marker in the prompt text.
    struct MarkerService {
        answers: Vec<(&'static str, Result<String, ReasoningError>)>,
        default: Result<String, ReasoningError>,
        calls: AtomicUsize,
        delay_for: Option<&'static str>,
    }

    impl MarkerService {
        fn new(default: &str) -> Self {
            Self {
                answers: Vec::new(),
                default: Ok(default.to_string()),
                calls: AtomicUsize::new(0),
                delay_for: None,
            }
        }

        fn answer(mut self, marker: &'static str, answer: Result<String, ReasoningError>) -> Self {
            self.answers.push((marker, answer));
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ReasoningService for MarkerService {
        async fn ask(&self, prompt: &str) -> Result<String, ReasoningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(marker) = self.delay_for {
                if prompt.contains(marker) {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                }
            }
            self.answers
                .iter()
                .find(|(marker, _)| prompt.contains(marker))
                .map(|(_, answer)| answer.clone())
                .unwrap_or_else(|| self.default.clone())
        }
    }

    /// Serves text from memory; missing ids fail extraction.
    struct MemoryProvider(HashMap<&'static str, &'static str>);

    impl TextProvider for MemoryProvider {
        fn extract(&self, source: &DocumentSource) -> Result<String, ExtractionError> {
            self.0
                .get(source.id.as_str())
                .map(|t| t.to_string())
                .ok_or_else(|| ExtractionError::ExtractionFailed {
                    document: source.display_name.clone(),
                    reason: "corrupt".to_string(),
                })
        }
    }

    fn aggregator(service: MarkerService, concurrency: usize) -> Aggregator<MarkerService> {
        let retry = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        };
        Aggregator::new(
            RiskClassifier::default(),
            QuestionEvaluator::new(service, retry),
            AggregatorOptions {
                concurrency,
                ..AggregatorOptions::default()
            },
        )
    }

    fn doc(id: &str, text: &str) -> Document {
        Document::new(DocumentId::new(id), id, text, 3000)
    }

    fn questions(texts: &[&str]) -> QuestionSet {
        let canonical: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        QuestionSet::new(&canonical, None).unwrap()
    }

    fn source(id: &str) -> DocumentSource {
        DocumentSource {
            id: DocumentId::new(id),
            display_name: id.to_string(),
            path: PathBuf::from(id),
        }
    }

    #[tokio::test]
    async fn test_single_high_risk_document() {
        let agg = aggregator(MarkerService::new("no"), 4);
        let docs = vec![doc("doc1", "A data breach was identified")];

        let analysis = agg.analyze(&docs, &questions(&["Q1"])).await.unwrap();

        assert_eq!(
            analysis.risk_summary,
            RiskSummary {
                low: 0,
                medium: 0,
                high: 1,
                no_risk_detected: 0
            }
        );
        assert_eq!(analysis.risk_assessments[0].label, RiskLabel::High);
    }

    #[tokio::test]
    async fn test_yes_and_no_documents() {
        let service =
            MarkerService::new("no").answer("MFA in place", Ok("Yes, mentions MFA".to_string()));
        let agg = aggregator(service, 2);
        let docs = vec![
            doc("doc1", "MFA in place for admins"),
            doc("doc2", "Nothing relevant here"),
        ];
        let q = "Does the organization implement MFA?";

        let analysis = agg.analyze(&docs, &questions(&[q])).await.unwrap();
        let record = analysis.question_index.get(q).unwrap();

        assert_eq!(record.yes_documents, vec![DocumentId::new("doc1")]);
        assert_eq!(record.no_documents, vec![DocumentId::new("doc2")]);
        assert_eq!(
            record.evidence_for(&DocumentId::new("doc1")),
            ["yes, mentions mfa".to_string()]
        );
        assert!(record.evidence_for(&DocumentId::new("doc2")).is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_without_partial_index() {
        let service = MarkerService {
            default: Err(ReasoningError::Authentication("invalid api key".to_string())),
            ..MarkerService::new("no")
        };
        let agg = aggregator(service, 1);
        let docs = vec![doc("doc1", "text"), doc("doc2", "text")];

        let result = agg.analyze(&docs, &questions(&["Q1", "Q2"])).await;

        match result {
            Err(AnalysisError::Reasoning { source, .. }) => {
                assert!(matches!(source, ReasoningError::Authentication(_)));
            }
            other => panic!("expected reasoning failure, got {:?}", other.map(|_| ())),
        }
        // Not retried, and the pool stopped pulling work after the failure.
        assert_eq!(agg.evaluator.service().calls(), 1);
    }

    #[tokio::test]
    async fn test_index_coverage_and_evidence_invariants() {
        let service = MarkerService::new("no")
            .answer("'Q2'", Ok("yes: section 3".to_string()))
            .answer("backups", Ok("yes, backups tested".to_string()));
        let agg = aggregator(service, 3);
        let docs = vec![
            doc("a", "backups are tested monthly"),
            doc("b", "plain"),
            doc("c", "minor findings"),
        ];
        let set = questions(&["Q1", "Q2", "Q3"]);

        let analysis = agg.analyze(&docs, &set).await.unwrap();
        assert_eq!(agg.evaluator.service().calls(), 9);

        for question in set.iter() {
            let record = analysis.question_index.get(&question.text).unwrap();
            for document in &docs {
                let in_yes = record.yes_documents.contains(&document.id);
                let in_no = record.no_documents.contains(&document.id);
                assert!(in_yes ^ in_no);
                assert_eq!(in_yes, !record.evidence_for(&document.id).is_empty());
            }
        }
        assert_eq!(analysis.risk_summary.total(), docs.len());
    }

    #[tokio::test]
    async fn test_concurrent_results_keep_document_order() {
        let mut service = MarkerService::new("yes");
        service.delay_for = Some("slow-first");
        let agg = aggregator(service, 8);
        let docs = vec![
            doc("first", "slow-first"),
            doc("second", "fast"),
            doc("third", "fast"),
        ];

        let analysis = agg.analyze(&docs, &questions(&["Q1"])).await.unwrap();
        let record = analysis.question_index.get("Q1").unwrap();

        let ids: Vec<_> = record.yes_documents.iter().map(|d| d.as_str()).collect();
        assert_eq!(ids, ["first", "second", "third"]);
        let labels: Vec<_> = analysis.documents.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, ["Report 1", "Report 2", "Report 3"]);
        assert_eq!(analysis.risk_assessments[0].document.as_str(), "first");
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_via_retry() {
        struct FlakyOnce(AtomicUsize);
        impl ReasoningService for FlakyOnce {
            async fn ask(&self, _prompt: &str) -> Result<String, ReasoningError> {
                if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ReasoningError::RateLimited("slow down".to_string()))
                } else {
                    Ok("yes".to_string())
                }
            }
        }

        let agg = Aggregator::new(
            RiskClassifier::default(),
            QuestionEvaluator::new(
                FlakyOnce(AtomicUsize::new(0)),
                RetryPolicy {
                    max_attempts: 3,
                    initial_backoff: Duration::from_millis(1),
                    max_backoff: Duration::from_millis(1),
                },
            ),
            AggregatorOptions::default(),
        );

        let analysis = agg
            .analyze(&[doc("a", "text")], &questions(&["Q1"]))
            .await
            .unwrap();
        let record = analysis.question_index.get("Q1").unwrap();
        assert_eq!(record.adherence(&DocumentId::new("a")), Some(Adherence::Yes));
    }

    #[tokio::test]
    async fn test_malformed_input_rejected_before_calls() {
        let agg = aggregator(MarkerService::new("yes"), 2);

        let result = agg.analyze(&[], &questions(&["Q1"])).await;
        assert!(matches!(result, Err(AnalysisError::MalformedInput(_))));

        let result = agg.analyze(&[doc("a", "text")], &questions(&[])).await;
        assert!(matches!(result, Err(AnalysisError::MalformedInput(_))));

        assert_eq!(agg.evaluator.service().calls(), 0);
    }

    #[tokio::test]
    async fn test_run_excludes_failed_extraction() {
        let agg = aggregator(MarkerService::new("no"), 2);
        let provider = MemoryProvider(HashMap::from([
            ("good.txt", "minor issue noted"),
            ("other.txt", "all clear"),
        ]));
        let sources = vec![source("good.txt"), source("corrupt.pdf"), source("other.txt")];

        let analysis = agg
            .run(&provider, &sources, &questions(&["Q1"]), futures::future::pending())
            .await
            .unwrap();

        assert_eq!(analysis.status(), crate::models::RunStatus::Degraded);
        assert_eq!(analysis.excluded.len(), 1);
        assert_eq!(analysis.excluded[0].source, "corrupt.pdf");
        assert_eq!(analysis.risk_summary.total(), 2);
        assert_eq!(analysis.documents[1].label, "Report 2");
        assert_eq!(analysis.documents[1].document.as_str(), "other.txt");
    }

    #[tokio::test]
    async fn test_run_with_every_document_failing() {
        let agg = aggregator(MarkerService::new("no"), 2);
        let provider = MemoryProvider(HashMap::new());

        let result = agg
            .run(&provider, &[source("x.txt")], &questions(&["Q1"]), futures::future::pending())
            .await;
        assert!(matches!(result, Err(AnalysisError::MalformedInput(_))));
        assert_eq!(agg.evaluator.service().calls(), 0);
    }

    #[test]
    fn test_prepared_batch_requires_documents() {
        let agg = aggregator(MarkerService::new("no"), 1);
        let empty = MemoryProvider(HashMap::new());

        let batch = agg.prepare(&empty, &[source("a.txt"), source("b.txt")]);
        assert_eq!(batch.excluded.len(), 2);
        assert!(matches!(
            batch.require_documents(),
            Err(AnalysisError::MalformedInput(_))
        ));

        let provider = MemoryProvider(HashMap::from([("a.txt", "minor issue")]));
        let batch = agg.prepare(&provider, &[source("a.txt"), source("b.txt")]);
        assert!(batch.require_documents().is_ok());
        assert_eq!(agg.evaluator.service().calls(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_discards_results() {
        let mut service = MarkerService::new("yes");
        service.delay_for = Some("slow");
        let agg = aggregator(service, 1);
        let docs = vec![doc("a", "slow"), doc("b", "slow")];

        let result = agg
            .analyze_until(&docs, &questions(&["Q1"]), async {
                tokio::time::sleep(Duration::from_millis(5)).await;
            })
            .await;

        assert!(matches!(result, Err(AnalysisError::Cancelled)));
    }

    #[tokio::test]
    async fn test_sentiment_pass_is_optional() {
        let service = MarkerService::new("no")
            .answer("Classify the sentiment", Ok("Negative".to_string()));
        let mut agg = aggregator(service, 2);

        let docs = vec![doc("a", "text"), doc("b", "text")];
        let analysis = agg.analyze(&docs, &questions(&["Q1"])).await.unwrap();
        assert!(analysis.sentiments.is_empty());

        agg.options.sentiment_token_budget = Some(1500);
        let analysis = agg.analyze(&docs, &questions(&["Q1"])).await.unwrap();
        assert_eq!(
            analysis.sentiment_for(&DocumentId::new("b")),
            Some(Sentiment::Negative)
        );
    }

    #[tokio::test]
    async fn test_fixture_reports_end_to_end() {
        use crate::documents::{DocumentScanner, FileTextProvider};

        let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/reports");
        let sources = DocumentScanner::new(vec!["txt".to_string(), "md".to_string()])
            .discover(&[dir])
            .unwrap();
        assert_eq!(sources.len(), 3);

        let service = MarkerService::new("No.").answer(
            "disaster recovery plan, tested",
            Ok("Yes, tested in November.".to_string()),
        );
        let agg = aggregator(service, 3);
        let q = "Is there a disaster recovery plan?";

        let analysis = agg
            .run(
                &FileTextProvider::default(),
                &sources,
                &questions(&[q]),
                futures::future::pending(),
            )
            .await
            .unwrap();

        let labels: Vec<_> = analysis.risk_assessments.iter().map(|a| a.label).collect();
        assert_eq!(
            labels,
            [RiskLabel::High, RiskLabel::Medium, RiskLabel::NoRiskDetected]
        );
        assert_eq!(analysis.risk_summary.with_compliance_issue(), 2);

        let record = analysis.question_index.get(q).unwrap();
        assert_eq!(
            record.yes_documents,
            vec![DocumentId::new("globex_annual_review.md")]
        );
        assert_eq!(record.no_documents.len(), 2);
        assert_eq!(analysis.documents[1].label, "Report 2");
        assert_eq!(analysis.status(), crate::models::RunStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_concurrency() {
        struct PeakService {
            now: AtomicUsize,
            peak: AtomicUsize,
        }
        impl ReasoningService for PeakService {
            async fn ask(&self, _prompt: &str) -> Result<String, ReasoningError> {
                let current = self.now.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                self.now.fetch_sub(1, Ordering::SeqCst);
                Ok("no".to_string())
            }
        }

        let agg = Aggregator::new(
            RiskClassifier::default(),
            QuestionEvaluator::new(
                PeakService {
                    now: AtomicUsize::new(0),
                    peak: AtomicUsize::new(0),
                },
                RetryPolicy::default(),
            ),
            AggregatorOptions {
                concurrency: 3,
                ..AggregatorOptions::default()
            },
        );
        let docs: Vec<Document> = (0..6).map(|i| doc(&format!("d{}", i), "text")).collect();

        let analysis = agg.analyze(&docs, &questions(&["Q1", "Q2"])).await.unwrap();

        let peak = agg.evaluator.service().peak.load(Ordering::SeqCst);
        assert!((1..=3).contains(&peak), "peak in flight was {}", peak);
        assert_eq!(analysis.question_index.get("Q2").unwrap().no_documents.len(), 6);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_run() {
        let service = MarkerService::new("no")
            .answer("flaky", Err(ReasoningError::Transient("503".to_string())));
        let agg = aggregator(service, 1);
        let docs = vec![doc("a", "fine"), doc("b", "flaky")];

        let result = agg.analyze(&docs, &questions(&["Q1"])).await;

        match result {
            Err(AnalysisError::Reasoning {
                document, source, ..
            }) => {
                assert_eq!(document, "b");
                assert!(matches!(source, ReasoningError::Transient(_)));
            }
            other => panic!("expected reasoning failure, got {:?}", other.map(|_| ())),
        }
        // One call for "a", then both attempts for "b".
        assert_eq!(agg.evaluator.service().calls(), 3);

        let service = MarkerService {
            default: Err(ReasoningError::RateLimited("429".to_string())),
            ..MarkerService::new("no")
        };
        let agg = aggregator(service, 1);
        let result = agg.analyze(&[doc("a", "text")], &questions(&["Q1"])).await;
        assert!(matches!(
            result,
            Err(AnalysisError::Reasoning {
                source: ReasoningError::RateLimited(_),
                ..
            })
        ));
        assert_eq!(agg.evaluator.service().calls(), 2);
    }

    #[tokio::test]
    async fn test_summary_pass_skips_failed_documents() {
        // Markers are checked in order, so the failing document comes first.
        let service = MarkerService::new("no")
            .answer("Report:\nbroken", Err(ReasoningError::InvalidRequest("400".to_string())))
            .answer("Summarize", Ok(" Backups are untested. ".to_string()));
        let mut agg = aggregator(service, 2);
        let docs = vec![doc("a", "text"), doc("b", "broken")];

        let analysis = agg.analyze(&docs, &questions(&["Q1"])).await.unwrap();
        assert!(analysis.summaries.is_empty());

        agg.options.summary_token_budget = Some(1000);
        let analysis = agg.analyze(&docs, &questions(&["Q1"])).await.unwrap();
        assert_eq!(
            analysis.summary_for(&DocumentId::new("a")),
            Some("Backups are untested.")
        );
        assert_eq!(analysis.summary_for(&DocumentId::new("b")), None);
        assert_eq!(analysis.status(), crate::models::RunStatus::Succeeded);
    }
}
