//! AuditLens - multi-report cybersecurity compliance analyzer
//!
//! A CLI tool that classifies the risk level of audit reports and asks a
//! language model whether each report addresses a set of compliance
//! questions, then writes a side-by-side comparison.
//!
//! Exit codes:
//!   0 - Success (no report at or above the --fail-on level, or no --fail-on set)
//!   1 - Runtime error (configuration, extraction of every report, service failure, etc.)
//!   2 - A report reached the --fail-on risk level

mod analysis;
mod cli;
mod config;
mod documents;
mod error;
mod llm;
mod models;
mod report;

use analysis::{Aggregator, QuestionEvaluator, RiskClassifier};
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use documents::{DocumentScanner, FileTextProvider};
use llm::ChatClient;
use models::{Analysis, QuestionSet, Report, ReportMetadata, RiskLabel};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("AuditLens v{}", env!("CARGO_PKG_VERSION"));
    debug!("Reports: {:?}", args.reports);

    match run_analysis(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .auditlens.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize the model, questions, and risk keywords.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete analysis workflow. Returns exit code (0 or 2).
async fn run_analysis(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    // Step 1: Discover reports
    let scanner = DocumentScanner::new(config.analysis.extensions.clone());
    let sources = scanner.discover(&args.reports)?;
    if sources.is_empty() {
        anyhow::bail!("No report files found in the given paths");
    }
    println!("📄 Found {} reports", sources.len());

    let questions = QuestionSet::new(&config.questions.canonical, args.question.as_deref())?;
    for question in questions.iter() {
        debug!("Question ({:?}): {}", question.origin, question.text);
    }

    // Step 2: Build the engine
    let client = ChatClient::new(config.client_config(args.api_key.clone()))?;
    let model_name = client.model_name().to_string();
    let aggregator = Aggregator::new(
        RiskClassifier::new(config.risk.clone()),
        QuestionEvaluator::new(client, config.retry_policy()),
        config.aggregator_options(!args.quiet),
    );
    let provider = FileTextProvider {
        max_file_size: config.analysis.max_file_size,
    };

    // Handle --dry-run: classify risk only, no reasoning calls
    if args.dry_run {
        return handle_dry_run(&aggregator, &provider, &sources, &args);
    }

    println!("🤖 Evaluating compliance questions...");
    println!("   Model: {}", model_name);
    println!("   Service: {}", config.model.base_url);
    println!("   Questions: {}", questions.len());
    println!("   Concurrency: {}", config.general.concurrency);

    // Step 3: Run the analysis; Ctrl-C discards everything
    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Cannot listen for Ctrl-C; cancellation disabled");
            futures::future::pending::<()>().await;
        }
    };
    let analysis = aggregator
        .run(&provider, &sources, &questions, cancel)
        .await?;

    for excluded in &analysis.excluded {
        println!("   ⚠️  Excluded {}: {}", excluded.source, excluded.reason);
    }

    // Step 4: Build and save the report
    println!("\n📝 Generating report...");

    let report = Report {
        metadata: ReportMetadata {
            analysis_date: Utc::now(),
            model_used: model_name,
            documents_analyzed: analysis.documents.len(),
            documents_excluded: analysis.excluded.len(),
            questions_evaluated: analysis.question_index.len(),
            duration_seconds: start_time.elapsed().as_secs_f64(),
            status: analysis.status(),
        },
        analysis,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    std::fs::write(&args.output, &output)
        .with_context(|| format!("Failed to write report to {}", args.output.display()))?;

    print_summary(&report.analysis, args.question.as_deref());
    println!("   Duration: {:.1}s", report.metadata.duration_seconds);
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        args.output.display()
    );

    Ok(fail_on_exit_code(&report.analysis, &args))
}

/// Handle --dry-run: extract and classify, print, exit.
fn handle_dry_run(
    aggregator: &Aggregator<ChatClient>,
    provider: &FileTextProvider,
    sources: &[documents::DocumentSource],
    args: &Args,
) -> Result<i32> {
    println!("\n🔍 Dry run: classifying risk only (no LLM calls)...\n");

    let batch = aggregator.prepare(provider, sources);
    if let Err(e) = batch.require_documents() {
        for excluded in &batch.excluded {
            println!("     ⚠️  Excluded {}: {}", excluded.source, excluded.reason);
        }
        return Err(e.into());
    }
    let (assessments, summary) = aggregator.risk_pass(&batch.documents);

    for (i, assessment) in assessments.iter().enumerate() {
        println!(
            "     Report {}: {} {} ({})",
            i + 1,
            assessment.label.emoji(),
            assessment.label,
            assessment.display_name
        );
    }
    for excluded in &batch.excluded {
        println!("     ⚠️  Excluded {}: {}", excluded.source, excluded.reason);
    }
    println!(
        "\n   Total: {} reports, {} with a compliance issue",
        summary.total(),
        summary.with_compliance_issue()
    );

    println!("\n✅ Dry run complete. No LLM calls were made.");

    let worst = assessments.iter().map(|a| a.label).max();
    Ok(exit_code_for(worst, args))
}

fn print_summary(analysis: &Analysis, custom_question: Option<&str>) {
    let summary = &analysis.risk_summary;

    println!("\n📊 Analysis Summary:");
    println!("   Reports analyzed: {}", summary.total());
    println!(
        "   - {} High: {} | {} Medium: {} | {} Low: {} | {} None: {}",
        RiskLabel::High.emoji(),
        summary.high,
        RiskLabel::Medium.emoji(),
        summary.medium,
        RiskLabel::Low.emoji(),
        summary.low,
        RiskLabel::NoRiskDetected.emoji(),
        summary.no_risk_detected
    );

    for record in analysis.question_index.records() {
        let yes: Vec<&str> = record
            .yes_documents
            .iter()
            .map(|d| report::label_for(&analysis.documents, d))
            .collect();
        debug!("'{}': yes for [{}]", record.question.text, yes.join(", "));
    }

    if let Some(record) = custom_question.and_then(|q| analysis.question_index.get(q)) {
        println!(
            "   Custom question: {}/{} reports address it",
            record.yes_documents.len(),
            summary.total()
        );
    }
}

fn fail_on_exit_code(analysis: &Analysis, args: &Args) -> i32 {
    exit_code_for(analysis.max_risk(), args)
}

/// Exit code 2 when the worst report reaches the --fail-on level.
fn exit_code_for(worst: Option<RiskLabel>, args: &Args) -> i32 {
    let (Some(level), Some(worst)) = (args.fail_on, worst) else {
        return 0;
    };

    let threshold = RiskLabel::from(level);
    if worst >= threshold {
        eprintln!(
            "\n⛔ Reports found at or above {} risk. Failing (exit code 2).",
            threshold
        );
        2
    } else {
        0
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
