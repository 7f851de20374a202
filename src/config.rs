//! Configuration management for Flarelog
//!
//! This module holds the read-only settings the persistence engine consumes:
//! history folder and naming, provider table, title generation, and export
//! settings. The hosting application is expected to validate and hand these
//! over; `load` and `validate` are provided for hosts that keep the
//! configuration in a YAML file.

use crate::error::{FlarelogError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main settings structure for Flarelog
///
/// Holds everything the transcript store, title generator, and export
/// renderer read. All fields are plain values; nothing here performs IO
/// after loading.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// History folder, file naming, and save behavior
    #[serde(default)]
    pub history: HistoryConfig,

    /// Provider table and default provider selection
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Title generation settings
    #[serde(default)]
    pub title: TitleConfig,

    /// Export settings (folder, templates, include flags)
    #[serde(default)]
    pub export: ExportConfig,
}

/// Date format selector for generated file names
///
/// A closed set of six fixed patterns. Formats that include minutes make
/// same-minute transcript creation rely on the collision-avoidance probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DateFormat {
    /// `2024-01-31`
    #[default]
    #[serde(rename = "YYYY-MM-DD")]
    YearMonthDay,
    /// `2024-01-31 14-05`
    #[serde(rename = "YYYY-MM-DD HH-mm")]
    YearMonthDayHourMinute,
    /// `20240131`
    #[serde(rename = "YYYYMMDD")]
    CompactDate,
    /// `202401311405`
    #[serde(rename = "YYYYMMDDHHmm")]
    CompactDateTime,
    /// `31-01-2024`
    #[serde(rename = "DD-MM-YYYY")]
    DayMonthYear,
    /// `01-31-2024`
    #[serde(rename = "MM-DD-YYYY")]
    MonthDayYear,
}

impl DateFormat {
    /// The chrono strftime pattern for this format
    pub fn pattern(&self) -> &'static str {
        match self {
            Self::YearMonthDay => "%Y-%m-%d",
            Self::YearMonthDayHourMinute => "%Y-%m-%d %H-%M",
            Self::CompactDate => "%Y%m%d",
            Self::CompactDateTime => "%Y%m%d%H%M",
            Self::DayMonthYear => "%d-%m-%Y",
            Self::MonthDayYear => "%m-%d-%Y",
        }
    }

    /// Format a UTC timestamp with this pattern
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::TimeZone;
    /// use flarelog::config::DateFormat;
    ///
    /// let at = chrono::Utc.with_ymd_and_hms(2024, 1, 31, 14, 5, 0).unwrap();
    /// assert_eq!(DateFormat::YearMonthDay.format(at), "2024-01-31");
    /// assert_eq!(DateFormat::CompactDateTime.format(at), "202401311405");
    /// ```
    pub fn format(&self, at: DateTime<Utc>) -> String {
        at.format(self.pattern()).to_string()
    }
}

/// Deduplication policy for the save path
///
/// The dedup key is always `(role, timestamp, content part)`; this selects
/// what the content part compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Compare content lengths. Matches the legacy heuristic; two distinct
    /// messages of equal length in the same millisecond collide.
    #[default]
    ContentLength,
    /// Compare full content. Slower, collision-free.
    ExactContent,
}

/// History folder and save behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Folder transcripts are persisted into
    #[serde(default = "default_history_folder")]
    pub folder: String,

    /// Date format used in generated file names
    #[serde(default)]
    pub date_format: DateFormat,

    /// Whether every mutation triggers an immediate save
    #[serde(default = "default_auto_save")]
    pub auto_save: bool,

    /// Which dedup key the save path uses
    #[serde(default)]
    pub dedup_policy: DedupPolicy,
}

fn default_history_folder() -> String {
    "history".to_string()
}

fn default_auto_save() -> bool {
    true
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            folder: default_history_folder(),
            date_format: DateFormat::default(),
            auto_save: default_auto_save(),
            dedup_policy: DedupPolicy::default(),
        }
    }
}

/// A named provider profile
///
/// The provider table maps opaque provider ids to these profiles. The
/// transcript store uses them to resolve provider identity on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Human-readable provider name
    pub name: String,

    /// Provider type tag (e.g. "openai", "ollama")
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Model used when a transcript does not name one
    #[serde(default = "default_model")]
    pub default_model: String,
}

fn default_model() -> String {
    "default".to_string()
}

/// Provider table and default selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Id of the provider used for new transcripts
    #[serde(default = "default_provider_id")]
    pub default: String,

    /// Provider id to profile table
    #[serde(default)]
    pub table: HashMap<String, ProviderProfile>,

    /// Default sampling temperature for new transcripts
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,
}

fn default_provider_id() -> String {
    "default".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default: default_provider_id(),
            table: HashMap::new(),
            default_temperature: default_temperature(),
        }
    }
}

impl ProvidersConfig {
    /// Look up a provider profile by id
    pub fn profile(&self, id: &str) -> Option<&ProviderProfile> {
        self.table.get(id)
    }
}

/// Title generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleConfig {
    /// Provider used for the title suggestion; falls back to the default
    /// provider when absent
    #[serde(default)]
    pub provider_id: Option<String>,

    /// Model used for the title suggestion
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for the title call
    #[serde(default = "default_title_temperature")]
    pub temperature: f64,

    /// Token cap for the title call
    #[serde(default = "default_title_max_tokens")]
    pub max_tokens: u32,

    /// Instruction prefix placed before the truncated conversation
    #[serde(default = "default_title_prompt")]
    pub prompt: String,
}

fn default_title_temperature() -> f64 {
    0.3
}

fn default_title_max_tokens() -> u32 {
    64
}

fn default_title_prompt() -> String {
    "Suggest a short, descriptive title for the following conversation. \
     Reply with the title only."
        .to_string()
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            provider_id: None,
            model: default_model(),
            temperature: default_title_temperature(),
            max_tokens: default_title_max_tokens(),
            prompt: default_title_prompt(),
        }
    }
}

/// Export settings
///
/// Both templates use `{{key}}` placeholder substitution against a fixed
/// key set; see `export::render` for the recognized keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Folder exported documents are written into
    #[serde(default = "default_export_folder")]
    pub folder: String,

    /// Template rendered once at the top of the export
    #[serde(default = "default_frontmatter_template")]
    pub frontmatter_template: String,

    /// Template rendered under each message header
    #[serde(default = "default_message_template")]
    pub message_template: String,

    /// Include system-role messages in the export
    #[serde(default)]
    pub include_system: bool,

    /// Keep reasoning sub-sections (visually transformed) instead of
    /// stripping them
    #[serde(default)]
    pub include_reasoning: bool,
}

fn default_export_folder() -> String {
    "exports".to_string()
}

fn default_frontmatter_template() -> String {
    "# {{title}}\n\nDate: {{date}}\nModel: {{model}}\n".to_string()
}

fn default_message_template() -> String {
    "*{{model}} @ {{time}}*\n".to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            folder: default_export_folder(),
            frontmatter_template: default_frontmatter_template(),
            message_template: default_message_template(),
            include_system: false,
            include_reasoning: false,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML settings file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use flarelog::Settings;
    ///
    /// # fn main() -> flarelog::Result<()> {
    /// let settings = Settings::load("flarelog.yaml")?;
    /// settings.validate()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// Validate the settings
    ///
    /// # Errors
    ///
    /// Returns `FlarelogError::Config` if any value is out of range or any
    /// cross-reference (default provider id, title provider id) does not
    /// resolve against the provider table.
    pub fn validate(&self) -> Result<()> {
        if self.history.folder.trim().is_empty() {
            return Err(FlarelogError::Config("history folder must not be empty".to_string()).into());
        }
        if self.export.folder.trim().is_empty() {
            return Err(FlarelogError::Config("export folder must not be empty".to_string()).into());
        }
        if !(0.0..=2.0).contains(&self.providers.default_temperature) {
            return Err(FlarelogError::Config(format!(
                "default temperature {} out of range 0.0..=2.0",
                self.providers.default_temperature
            ))
            .into());
        }
        if !(0.0..=2.0).contains(&self.title.temperature) {
            return Err(FlarelogError::Config(format!(
                "title temperature {} out of range 0.0..=2.0",
                self.title.temperature
            ))
            .into());
        }
        if self.title.max_tokens == 0 {
            return Err(FlarelogError::Config("title max_tokens must be positive".to_string()).into());
        }
        // The provider table may legitimately be empty (the hardcoded
        // fallback identity is used), but a named id must resolve.
        if !self.providers.table.is_empty() && !self.providers.table.contains_key(&self.providers.default)
        {
            return Err(FlarelogError::Config(format!(
                "default provider '{}' not present in provider table",
                self.providers.default
            ))
            .into());
        }
        if let Some(id) = &self.title.provider_id {
            if !self.providers.table.is_empty() && !self.providers.table.contains_key(id) {
                return Err(FlarelogError::Config(format!(
                    "title provider '{}' not present in provider table",
                    id
                ))
                .into());
            }
        }
        Ok(())
    }
}
