//! Command-line arguments.
//!
//! Flags given here override `.auditlens.toml`; `validate` rejects
//! combinations clap cannot express on its own.

use crate::llm::Provider;
use crate::models::RiskLabel;
use clap::Parser;
use std::path::PathBuf;

/// AuditLens - compare cybersecurity audit reports side by side
///
/// Classifies each report's risk level from its wording and asks a
/// language model whether each report addresses a fixed set of
/// compliance questions (plus one of your own).
///
/// Examples:
///   auditlens reports/
///   auditlens q1.txt q2.txt --question "Is there a SOC 2 report?"
///   auditlens reports/ --provider ollama --api-url http://localhost:11434 --model llama3.2
///   auditlens reports/ --dry-run
///   auditlens --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Report files or directories to analyze
    ///
    /// Directories are searched recursively for report files.
    /// Reports are labeled "Report 1", "Report 2", ... in the order given.
    #[arg(value_name = "PATH", required_unless_present = "init_config")]
    pub reports: Vec<PathBuf>,

    /// Extra compliance question to evaluate alongside the built-in ones
    #[arg(short = 'Q', long, value_name = "TEXT")]
    pub question: Option<String>,

    /// Model to use for question evaluation
    #[arg(short, long, env = "AUDITLENS_MODEL")]
    pub model: Option<String>,

    /// Reasoning service base URL
    #[arg(long, value_name = "URL", env = "AUDITLENS_API_URL")]
    pub api_url: Option<String>,

    /// API key for the reasoning service
    #[arg(long, env = "AUDITLENS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Reasoning service wire format
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<Provider>,

    /// Output file path for the report
    #[arg(
        short,
        long,
        default_value = "compliance_report.md",
        value_name = "FILE"
    )]
    pub output: PathBuf,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .auditlens.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Maximum number of reasoning calls in flight
    #[arg(long, value_name = "NUM")]
    pub concurrency: Option<usize>,

    /// Words of report text sent with each question
    #[arg(long, value_name = "WORDS")]
    pub max_tokens: Option<usize>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Attempts per reasoning call for rate-limited or transient failures
    #[arg(long, value_name = "COUNT")]
    pub retries: Option<u32>,

    /// Report file extensions to pick up from directories (comma-separated)
    ///
    /// Example: --extensions txt,md
    #[arg(long, value_name = "EXTS", value_delimiter = ',')]
    pub extensions: Option<Vec<String>>,

    /// Also classify each report's tone (positive, neutral, negative)
    #[arg(long)]
    pub sentiment: bool,

    /// Also write a short summary of each report
    #[arg(long)]
    pub summary: bool,

    /// Fail if any report is at or above this risk level
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is reached.
    /// Values: low, medium, high
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,

    /// Dry run: extract reports and classify risk without calling the LLM
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .auditlens.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Risk level for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Low,
    Medium,
    High,
}

impl From<FailOnLevel> for RiskLabel {
    fn from(level: FailOnLevel) -> Self {
        match level {
            FailOnLevel::Low => RiskLabel::Low,
            FailOnLevel::Medium => RiskLabel::Medium,
            FailOnLevel::High => RiskLabel::High,
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.reports.is_empty() {
            return Err("At least one report path is required".to_string());
        }

        // Validate API URL format (not needed for dry-run)
        if !self.dry_run {
            if let Some(ref url) = self.api_url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err("API URL must start with 'http://' or 'https://'".to_string());
                }
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.max_tokens == Some(0) {
            return Err("Max tokens must be at least 1".to_string());
        }

        if self.retries == Some(0) {
            return Err("Retries must be at least 1 attempt".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        for path in &self.reports {
            if !path.exists() {
                return Err(format!("Report path does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
