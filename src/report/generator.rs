//! Markdown and JSON report generation.
//!
//! Renders the plain aggregates of a run. Every view uses the same
//! positional "Report N" labels.

use crate::models::{
    Adherence, Analysis, DocumentId, DocumentLabel, QuestionOrigin, QuestionRecord, Report,
    ReportMetadata, RiskLabel, RiskSummary, RunStatus,
};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let analysis = &report.analysis;
    let mut output = String::new();

    output.push_str("# Compliance Analysis Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_documents_section(&analysis.documents));
    output.push_str(&generate_summaries_section(analysis));
    output.push_str(&generate_risk_section(analysis));
    output.push_str(&generate_compliance_section(analysis));
    output.push_str(&generate_questions_section(analysis));
    output.push_str(&generate_excluded_section(analysis));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!(
        "- **Reports Analyzed:** {}\n",
        metadata.documents_analyzed
    ));
    if metadata.documents_excluded > 0 {
        section.push_str(&format!(
            "- **Reports Excluded:** {}\n",
            metadata.documents_excluded
        ));
    }
    section.push_str(&format!(
        "- **Questions Evaluated:** {}\n",
        metadata.questions_evaluated
    ));
    section.push_str(&format!(
        "- **Status:** {}\n",
        match metadata.status {
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Degraded => "Degraded (some reports excluded)",
        }
    ));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

fn generate_documents_section(documents: &[DocumentLabel]) -> String {
    let mut section = String::new();

    section.push_str("## Reports\n\n");
    section.push_str("| Report | Document |\n");
    section.push_str("|:---|:---|\n");
    for doc in documents {
        section.push_str(&format!("| {} | `{}` |\n", doc.label, doc.display_name));
    }
    section.push('\n');

    section
}

fn generate_summaries_section(analysis: &Analysis) -> String {
    if analysis.summaries.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Report Summaries\n\n");
    for label in &analysis.documents {
        let Some(summary) = analysis.summary_for(&label.document) else {
            continue;
        };
        section.push_str(&format!("**{}** (`{}`)\n\n", label.label, label.display_name));
        section.push_str(summary);
        section.push_str("\n\n");
    }

    section
}

/// Generate the risk distribution section.
fn generate_risk_section(analysis: &Analysis) -> String {
    let mut section = String::new();
    let summary = &analysis.risk_summary;

    section.push_str("## Risk Distribution\n\n");
    section.push_str(&risk_distribution_table(summary));

    let has_sentiment = !analysis.sentiments.is_empty();
    section.push_str("### Risk by Report\n\n");
    if has_sentiment {
        section.push_str("| Report | Document | Risk Detected | Risk Level | Sentiment |\n");
        section.push_str("|:---|:---|:---:|:---|:---|\n");
    } else {
        section.push_str("| Report | Document | Risk Detected | Risk Level |\n");
        section.push_str("|:---|:---|:---:|:---|\n");
    }

    for (label, assessment) in analysis.documents.iter().zip(&analysis.risk_assessments) {
        section.push_str(&format!(
            "| {} | `{}` | {} | {} {} |",
            label.label,
            assessment.display_name,
            assessment.risk_detected(),
            assessment.label.emoji(),
            assessment.label
        ));
        if has_sentiment {
            let sentiment = analysis
                .sentiment_for(&assessment.document)
                .map(|s| s.to_string())
                .unwrap_or_default();
            section.push_str(&format!(" {} |", sentiment));
        }
        section.push('\n');
    }
    section.push('\n');

    section
}

fn risk_distribution_table(summary: &RiskSummary) -> String {
    let mut table = String::new();

    let headers: Vec<String> = RiskLabel::DISPLAY_ORDER
        .iter()
        .map(|l| format!("{} {}", l.emoji(), l))
        .collect();
    let counts: Vec<String> = RiskLabel::DISPLAY_ORDER
        .iter()
        .map(|l| summary.count(*l).to_string())
        .collect();

    table.push_str(&format!("| {} | **Total** |\n", headers.join(" | ")));
    table.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    table.push_str(&format!(
        "| {} | **{}** |\n\n",
        counts.join(" | "),
        summary.total()
    ));

    table
}

/// Generate the risk-derived compliance section.
fn generate_compliance_section(analysis: &Analysis) -> String {
    let mut section = String::new();
    let summary = &analysis.risk_summary;

    section.push_str("## Compliance Check\n\n");
    section.push_str("| Compliance Issue | Reports |\n");
    section.push_str("|:---|:---:|\n");
    section.push_str(&format!("| Yes | {} |\n", summary.with_compliance_issue()));
    section.push_str(&format!("| No | {} |\n\n", summary.without_compliance_issue()));

    section
}

/// Generate the per-question matrix and evidence.
fn generate_questions_section(analysis: &Analysis) -> String {
    let mut section = String::new();
    let labels = &analysis.documents;

    section.push_str("## Question-Based Analysis\n\n");
    if analysis.question_index.is_empty() {
        section.push_str("No questions were evaluated.\n\n");
        return section;
    }

    let header: Vec<&str> = labels.iter().map(|l| l.label.as_str()).collect();
    section.push_str(&format!("| Question | {} | Yes |\n", header.join(" | ")));
    section.push_str(&format!("|:---|{}:---:|\n", ":---:|".repeat(labels.len())));

    for record in analysis.question_index.records() {
        let cells: Vec<String> = labels
            .iter()
            .map(|l| match record.adherence(&l.document) {
                Some(Adherence::Yes) => "✅".to_string(),
                Some(Adherence::No) => "❌".to_string(),
                None => "-".to_string(),
            })
            .collect();
        section.push_str(&format!(
            "| {} | {} | {}/{} |\n",
            question_title(record),
            cells.join(" | "),
            record.yes_documents.len(),
            labels.len()
        ));
    }
    section.push('\n');

    for record in analysis.question_index.records() {
        section.push_str(&generate_evidence_block(record, labels));
    }

    section
}

fn question_title(record: &QuestionRecord) -> String {
    match record.question.origin {
        QuestionOrigin::Canonical => record.question.text.clone(),
        QuestionOrigin::Custom => format!("{} *(custom)*", record.question.text),
    }
}

/// Generate the relevant-content block for one question.
fn generate_evidence_block(record: &QuestionRecord, labels: &[DocumentLabel]) -> String {
    let mut block = String::new();

    block.push_str(&format!("### {}\n\n", question_title(record)));

    if record.yes_documents.is_empty() {
        block.push_str("No report addresses this question.\n\n");
        return block;
    }

    for label in labels {
        let evidence = record.evidence_for(&label.document);
        if evidence.is_empty() {
            continue;
        }
        block.push_str(&format!("**{}** (`{}`)\n\n", label.label, label.display_name));
        for excerpt in evidence {
            for line in excerpt.lines() {
                block.push_str(&format!("> {}\n", line));
            }
            block.push('\n');
        }
    }

    block
}

fn generate_excluded_section(analysis: &Analysis) -> String {
    if analysis.excluded.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Excluded Reports\n\n");
    for excluded in &analysis.excluded {
        section.push_str(&format!("- `{}`: {}\n", excluded.source, excluded.reason));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str("*Report generated by AuditLens*\n");

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Label for a document id, falling back to the id itself.
pub fn label_for<'a>(labels: &'a [DocumentLabel], document: &'a DocumentId) -> &'a str {
    labels
        .iter()
        .find(|l| &l.document == document)
        .map(|l| l.label.as_str())
        .unwrap_or_else(|| document.as_str())
}
