//! `.auditlens.toml` loading and CLI overrides.
//!
//! Every section is optional; missing keys fall back to the defaults below,
//! which include the built-in question list and risk keyword tiers.

use crate::analysis::{AggregatorOptions, RetryPolicy, RiskKeywords};
use crate::llm::{ClientConfig, Provider};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".auditlens.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Reasoning service settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Analysis settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Risk keyword tiers.
    #[serde(default)]
    pub risk: RiskKeywords,

    /// Canonical compliance questions.
    #[serde(default)]
    pub questions: QuestionsConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Maximum reasoning calls in flight.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Reasoning service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Wire format of the service.
    #[serde(default)]
    pub provider: Provider,

    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Service base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Temperature for generation.
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens in each response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Attempts per call, including the first.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Backoff before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on the backoff, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            name: default_model(),
            base_url: default_base_url(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout(),
            retries: default_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_timeout() -> u64 {
    120
}

fn default_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

/// Analysis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Word budget for the report text sent with each question.
    #[serde(default = "default_question_budget")]
    pub question_token_budget: usize,

    /// Word budget for sentiment classification.
    #[serde(default = "default_sentiment_budget")]
    pub sentiment_token_budget: usize,

    /// Classify each report's tone as well.
    #[serde(default)]
    pub sentiment: bool,

    /// Word budget for report summaries.
    #[serde(default = "default_summary_budget")]
    pub summary_token_budget: usize,

    /// Summarize each report as well.
    #[serde(default)]
    pub summary: bool,

    /// Report file extensions picked up when walking directories.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Maximum report size in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            question_token_budget: default_question_budget(),
            sentiment_token_budget: default_sentiment_budget(),
            sentiment: false,
            summary_token_budget: default_summary_budget(),
            summary: false,
            extensions: default_extensions(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_question_budget() -> usize {
    3000
}

fn default_sentiment_budget() -> usize {
    1500
}

fn default_summary_budget() -> usize {
    1000
}

fn default_extensions() -> Vec<String> {
    vec!["txt", "md", "text", "pdf"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

/// The fixed question list evaluated on every run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionsConfig {
    #[serde(default = "default_canonical_questions")]
    pub canonical: Vec<String>,
}

impl Default for QuestionsConfig {
    fn default() -> Self {
        Self {
            canonical: default_canonical_questions(),
        }
    }
}

fn default_canonical_questions() -> Vec<String> {
    vec![
        "Is there an incident response plan?",
        "Is data encrypted at rest and in transit?",
        "Are there regular cybersecurity training programs?",
        "Are firewalls and intrusion detection systems in place?",
        "Is there a disaster recovery plan?",
        "Does the organization conduct regular vulnerability assessments and penetration testing?",
        "Is there a patch management policy in place to ensure timely software updates?",
        "Does the organization implement multi-factor authentication (MFA) for access to sensitive systems?",
        "Are backups regularly tested for restoration, and are they stored securely?",
        "Are third-party vendors and partners evaluated for cybersecurity risks?",
        "Has a recent audit been conducted?",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.api_url {
            self.model.base_url = url.clone();
        }
        if let Some(provider) = args.provider {
            self.model.provider = provider;
        }
        if let Some(temperature) = args.temperature {
            self.model.temperature = temperature;
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if let Some(retries) = args.retries {
            self.model.retries = retries;
        }

        if let Some(budget) = args.max_tokens {
            self.analysis.question_token_budget = budget;
        }
        if args.sentiment {
            self.analysis.sentiment = true;
        }
        if args.summary {
            self.analysis.summary = true;
        }
        if let Some(ref extensions) = args.extensions {
            self.analysis.extensions = extensions.clone();
        }

        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
    }

    /// Settings for the HTTP reasoning client.
    pub fn client_config(&self, api_key: Option<String>) -> ClientConfig {
        ClientConfig {
            provider: self.model.provider,
            base_url: self.model.base_url.clone(),
            model_name: self.model.name.clone(),
            api_key,
            temperature: self.model.temperature,
            max_tokens: self.model.max_tokens,
            timeout_seconds: self.model.timeout_seconds,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.model.retries.max(1),
            initial_backoff: Duration::from_millis(self.model.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.model.max_backoff_ms),
        }
    }

    pub fn aggregator_options(&self, show_progress: bool) -> AggregatorOptions {
        AggregatorOptions {
            concurrency: self.general.concurrency.max(1),
            question_token_budget: self.analysis.question_token_budget,
            sentiment_token_budget: self
                .analysis
                .sentiment
                .then_some(self.analysis.sentiment_token_budget),
            summary_token_budget: self
                .analysis
                .summary
                .then_some(self.analysis.summary_token_budget),
            show_progress,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
