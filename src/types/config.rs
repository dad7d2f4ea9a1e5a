//! Configuration for feedloop.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::FeedloopResult;

/// Main configuration for feedloop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Pattern store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Text pattern miner settings.
    #[serde(default)]
    pub miner: MinerConfig,

    /// Confidence refresher settings.
    #[serde(default)]
    pub refresher: RefresherConfig,

    /// Prompt enhancer settings.
    #[serde(default)]
    pub enhancer: EnhancerConfig,

    /// Training data export settings.
    #[serde(default)]
    pub export: ExportConfig,

    /// Generative AI collaborator settings.
    #[serde(default)]
    pub ai: AiConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Pattern store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// How many times an upsert is retried when SQLite reports contention.
    #[serde(default = "default_busy_retries")]
    pub busy_retries: u32,

    /// SQLite busy timeout (in milliseconds).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_retries: default_busy_retries(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".feedloop/feedloop.db")
}

fn default_busy_retries() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    2000
}

/// How a re-mined pattern's frequency combines with the stored one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyPolicy {
    /// Latest batch statistic overwrites the stored frequency.
    #[default]
    Replace,
    /// Batch count is added to the stored frequency.
    Accumulate,
}

/// Text pattern miner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Trailing window analysed on each run (in days).
    #[serde(default = "default_window_days")]
    pub window_days: i64,

    /// Minimum occurrences for a candidate to become a pattern.
    #[serde(default = "default_min_support")]
    pub min_support: usize,

    /// Tokens shorter than this (in characters) are discarded.
    #[serde(default = "default_min_token_chars")]
    pub min_token_chars: usize,

    /// Top-N keywords kept from modification reasons.
    #[serde(default = "default_top_modifications")]
    pub top_modifications: usize,

    /// Top-N keywords kept from rejection comments.
    #[serde(default = "default_top_three")]
    pub top_rejections: usize,

    /// Top-N keywords kept from well-rated diagnoses.
    #[serde(default = "default_top_three")]
    pub top_good_practices: usize,

    /// Top-N dosages kept from modification texts.
    #[serde(default = "default_top_modifications")]
    pub top_dosages: usize,

    /// Relevance score (both axes) a validated event needs to count as good practice.
    #[serde(default = "default_good_practice_min_score")]
    pub good_practice_min_score: u8,

    /// Stop words ignored by the tokenizer.
    #[serde(default = "default_stop_words")]
    pub stop_words: Vec<String>,

    /// Units recognised by the dosage extractor.
    #[serde(default = "default_dosage_units")]
    pub dosage_units: Vec<String>,

    /// Replace or accumulate frequency on re-observation.
    #[serde(default)]
    pub frequency_policy: FrequencyPolicy,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            min_support: default_min_support(),
            min_token_chars: default_min_token_chars(),
            top_modifications: default_top_modifications(),
            top_rejections: default_top_three(),
            top_good_practices: default_top_three(),
            top_dosages: default_top_modifications(),
            good_practice_min_score: default_good_practice_min_score(),
            stop_words: default_stop_words(),
            dosage_units: default_dosage_units(),
            frequency_policy: FrequencyPolicy::default(),
        }
    }
}

fn default_window_days() -> i64 {
    7
}

fn default_min_support() -> usize {
    2
}

fn default_min_token_chars() -> usize {
    4
}

fn default_top_modifications() -> usize {
    5
}

fn default_top_three() -> usize {
    3
}

fn default_good_practice_min_score() -> u8 {
    8
}

fn default_stop_words() -> Vec<String> {
    [
        // articles, prepositions, conjunctions
        "le", "la", "les", "un", "une", "des", "du", "de", "et", "ou", "mais", "pour", "par",
        "avec", "sans", "sur", "dans", "à", "au", "aux", "the", "and", "with", "without",
        "from", "for", "into", "that", "this", "était", "être", "avoir", "sont",
        // intensity adverbs
        "trop", "très", "plus", "moins", "peu", "assez", "too", "very", "more", "less",
        // domain-generic nouns
        "prescription", "médicament", "traitement", "patient", "médecin", "dosage", "dose",
        "posologie", "treatment", "doctor", "medication",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_dosage_units() -> Vec<String> {
    ["mg", "ml", "g", "comprimé", "gélule", "tablet", "capsule"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Confidence refresher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefresherConfig {
    /// Active patterns unseen for longer than this are deactivated (in days).
    #[serde(default = "default_thirty")]
    pub staleness_days: i64,

    /// Days after which the recency factor reaches zero.
    #[serde(default = "default_thirty")]
    pub decay_days: i64,

    /// Frequency at which a fresh pattern reaches full confidence.
    #[serde(default = "default_frequency_saturation")]
    pub frequency_saturation: f64,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            staleness_days: default_thirty(),
            decay_days: default_thirty(),
            frequency_saturation: default_frequency_saturation(),
        }
    }
}

fn default_thirty() -> i64 {
    30
}

fn default_frequency_saturation() -> f64 {
    10.0
}

/// Prompt enhancer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancerConfig {
    /// Minimum frequency of an actionable pattern.
    #[serde(default = "default_min_support_i64")]
    pub min_frequency: i64,

    /// Minimum confidence of an actionable pattern.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Maximum entries in the errors-to-avoid section.
    #[serde(default = "default_top_modifications")]
    pub max_errors: usize,

    /// Maximum entries in the good-practices section.
    #[serde(default = "default_top_three")]
    pub max_good_practices: usize,

    /// Maximum entries in the preferred-dosages section.
    #[serde(default = "default_top_three")]
    pub max_dosages: usize,

    /// Trailing window for the recent performance block (in days).
    #[serde(default = "default_window_days")]
    pub stats_window_days: i64,

    /// Patients younger than this use pediatric patterns.
    #[serde(default = "default_pediatric_age")]
    pub pediatric_below_age: u32,

    /// Patients older than this use geriatric patterns.
    #[serde(default = "default_geriatric_age")]
    pub geriatric_above_age: u32,

    /// Description markers of pediatric patterns.
    #[serde(default = "default_pediatric_markers")]
    pub pediatric_markers: Vec<String>,

    /// Description markers of geriatric patterns.
    #[serde(default = "default_geriatric_markers")]
    pub geriatric_markers: Vec<String>,

    /// Maximum age-bracket patterns.
    #[serde(default = "default_top_three")]
    pub max_age_patterns: usize,

    /// Only the first N symptom words are considered.
    #[serde(default = "default_top_three")]
    pub max_symptom_keywords: usize,

    /// Maximum patterns per symptom keyword.
    #[serde(default = "default_patterns_per_keyword")]
    pub patterns_per_keyword: usize,

    /// Base system instruction given to the generative model.
    #[serde(default = "default_base_instruction")]
    pub base_instruction: String,
}

impl Default for EnhancerConfig {
    fn default() -> Self {
        Self {
            min_frequency: default_min_support_i64(),
            min_confidence: default_min_confidence(),
            max_errors: default_top_modifications(),
            max_good_practices: default_top_three(),
            max_dosages: default_top_three(),
            stats_window_days: default_window_days(),
            pediatric_below_age: default_pediatric_age(),
            geriatric_above_age: default_geriatric_age(),
            pediatric_markers: default_pediatric_markers(),
            geriatric_markers: default_geriatric_markers(),
            max_age_patterns: default_top_three(),
            max_symptom_keywords: default_top_three(),
            patterns_per_keyword: default_patterns_per_keyword(),
            base_instruction: default_base_instruction(),
        }
    }
}

fn default_min_support_i64() -> i64 {
    2
}

fn default_min_confidence() -> f64 {
    0.3
}

fn default_pediatric_age() -> u32 {
    18
}

fn default_geriatric_age() -> u32 {
    65
}

fn default_pediatric_markers() -> Vec<String> {
    vec!["pédiatrique".to_string(), "pediatric".to_string()]
}

fn default_geriatric_markers() -> Vec<String> {
    vec!["gériatrique".to_string(), "geriatric".to_string()]
}

fn default_patterns_per_keyword() -> usize {
    2
}

fn default_base_instruction() -> String {
    "You are a clinical decision-support system specialised in diagnosis and drug \
     prescription. Analyse the patient's clinical data and recommend a diagnosis and \
     prescriptions following current best practice.\n\
     IMPORTANT: you do not replace a physician's clinical judgement; your output is a \
     suggestion to support the decision.\n\
     Take into account age, weight and conditions, allergies and contraindications, \
     potential drug interactions, guideline dosages and notable side effects. Justify \
     every recommendation."
        .to_string()
}

/// Serialization format of a training export.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[cfg_attr(feature = "cli", value(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// One user/assistant exchange per line.
    #[default]
    Chat,
    /// Same as chat, with a leading system message.
    ChatSystem,
    /// A single JSON array of flat records.
    Flat,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Chat => write!(f, "chat"),
            ExportFormat::ChatSystem => write!(f, "chat_system"),
            ExportFormat::Flat => write!(f, "flat"),
        }
    }
}

/// Creation-time window of exported samples.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[cfg_attr(feature = "cli", value(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum ExportPeriod {
    /// Last 7 days.
    Weekly,
    /// Last 30 days.
    #[default]
    Monthly,
    /// No lower bound.
    All,
}

impl ExportPeriod {
    /// Length of the window in days, `None` when unbounded.
    pub fn days(&self) -> Option<i64> {
        match self {
            ExportPeriod::Weekly => Some(7),
            ExportPeriod::Monthly => Some(30),
            ExportPeriod::All => None,
        }
    }
}

/// Training data export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Both relevance scores must reach this value.
    #[serde(default = "default_min_relevance_score")]
    pub min_relevance_score: u8,

    /// Default export period.
    #[serde(default)]
    pub period: ExportPeriod,

    /// Default export format.
    #[serde(default)]
    pub format: ExportFormat,

    /// Default output file.
    #[serde(default = "default_export_output")]
    pub output: PathBuf,

    /// System persona used by the chat_system format.
    #[serde(default = "default_system_persona")]
    pub system_persona: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            min_relevance_score: default_min_relevance_score(),
            period: ExportPeriod::default(),
            format: ExportFormat::default(),
            output: default_export_output(),
            system_persona: default_system_persona(),
        }
    }
}

fn default_min_relevance_score() -> u8 {
    7
}

fn default_export_output() -> PathBuf {
    PathBuf::from("training_data.jsonl")
}

fn default_system_persona() -> String {
    "You are an expert physician. Analyse the patient data and provide optimal medical \
     recommendations."
        .to_string()
}

/// Generative AI collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Command to execute.
    #[serde(default = "default_ai_command")]
    pub command: String,

    /// Default arguments.
    #[serde(default = "default_ai_args")]
    pub args: Vec<String>,

    /// Call timeout (in seconds).
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_ai_command(),
            args: default_ai_args(),
            timeout_secs: default_ai_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ai_command() -> String {
    "gemini".to_string()
}

fn default_ai_args() -> Vec<String> {
    vec!["-o".to_string(), "json".to_string()]
}

fn default_ai_timeout() -> u64 {
    60
}

impl Config {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> FeedloopResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> FeedloopResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Creates default configuration.
    pub fn default_config() -> Self {
        Self {
            general: GeneralConfig::default(),
            store: StoreConfig::default(),
            miner: MinerConfig::default(),
            refresher: RefresherConfig::default(),
            enhancer: EnhancerConfig::default(),
            export: ExportConfig::default(),
            ai: AiConfig::default(),
        }
    }

    /// Tries to load configuration from current directory or uses default.
    pub fn load_or_default() -> Self {
        Self::load("feedloop.toml").unwrap_or_else(|_| Self::default_config())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
