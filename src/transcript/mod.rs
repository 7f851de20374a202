//! Transcript data model and markdown persistence
//!
//! This module contains the in-memory representation of a chat transcript
//! (ordered messages with per-message generation settings) and the codecs
//! that serialize it to and from a single human-editable markdown document:
//!
//! - `frontmatter`: the delimited key-value header block
//! - `blocks`: role-tagged message blocks with an embedded settings comment
//! - `store`: the aggregate that owns the transcript and mediates all IO

pub mod blocks;
pub mod frontmatter;
pub mod store;

pub use frontmatter::Frontmatter;
pub use store::TranscriptStore;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Role of a message sender
///
/// A closed set; unknown role headers encountered in a document are skipped
/// by the block codec, not represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// Human participant
    User,
    /// Model response
    Assistant,
}

impl Role {
    /// Parse a role name case-insensitively
    ///
    /// # Examples
    ///
    /// ```
    /// use flarelog::transcript::Role;
    ///
    /// assert_eq!(Role::parse("ASSISTANT"), Some(Role::Assistant));
    /// assert_eq!(Role::parse("user"), Some(Role::User));
    /// assert_eq!(Role::parse("narrator"), None);
    /// ```
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    /// Capitalized role name, as written in `## Role` block headers
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "System"),
            Self::User => write!(f, "User"),
            Self::Assistant => write!(f, "Assistant"),
        }
    }
}

fn default_model_name() -> String {
    "default".to_string()
}

/// Per-message generation settings
///
/// Attached to every message so a transcript may span multiple provider or
/// flare configurations (e.g. after a mid-conversation flare switch). Once
/// a message carries its own settings they are never re-inherited from
/// transcript-level defaults; the codecs preserve them exactly.
///
/// Serialized as the compact JSON payload of the trailing settings comment,
/// so the serde names below are wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Opaque provider id
    #[serde(rename = "provider", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,

    /// Human-readable provider name
    #[serde(rename = "providerName", default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,

    /// Provider type tag
    #[serde(rename = "providerType", default, skip_serializing_if = "Option::is_none")]
    pub provider_type: Option<String>,

    /// Model identifier
    #[serde(default = "default_model_name")]
    pub model: String,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: f64,

    /// Flare id (opaque generation profile reference)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flare: Option<String>,

    /// Whether the model emits tagged reasoning sub-sections
    #[serde(rename = "isReasoningModel", default, skip_serializing_if = "Option::is_none")]
    pub is_reasoning_model: Option<bool>,

    /// Opening tag of the reasoning span (e.g. `<think>`)
    #[serde(rename = "reasoningHeader", default, skip_serializing_if = "Option::is_none")]
    pub reasoning_header: Option<String>,

    /// Completion token cap
    #[serde(rename = "maxTokens", default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Context window size
    #[serde(rename = "contextWindow", default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,

    /// Tokens carried over on context handoff
    #[serde(rename = "handoffContext", default, skip_serializing_if = "Option::is_none")]
    pub handoff_context: Option<u32>,
}

impl GenerationSettings {
    /// Best-effort settings used when a settings comment fails to parse
    ///
    /// Content and role are the load-bearing fields of a message; settings
    /// are advisory, so an unparseable comment degrades to this instead of
    /// discarding the message.
    pub fn fallback() -> Self {
        Self {
            provider_id: Some("default".to_string()),
            provider_name: None,
            provider_type: None,
            model: "default".to_string(),
            temperature: 0.0,
            flare: None,
            is_reasoning_model: None,
            reasoning_header: None,
            max_tokens: None,
            context_window: None,
            handoff_context: None,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::fallback()
    }
}

/// One message of a transcript
///
/// Ordering within a transcript is insertion order and is semantically
/// meaningful; `timestamp` is informational, not authoritative for ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Sender role
    pub role: Role,
    /// Message content (free-form markdown)
    pub content: String,
    /// Creation time in UTC milliseconds
    pub timestamp: i64,
    /// Generation settings in effect for this message
    pub settings: GenerationSettings,
}

/// Field-wise overrides applied on top of transcript-level defaults
///
/// `TranscriptStore::add_message` inherits the transcript's provider, model,
/// and temperature only for fields the caller omitted here.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverride {
    /// Override the provider id
    pub provider_id: Option<String>,
    /// Override the provider name
    pub provider_name: Option<String>,
    /// Override the provider type
    pub provider_type: Option<String>,
    /// Override the model
    pub model: Option<String>,
    /// Override the temperature
    pub temperature: Option<f64>,
    /// Override the flare id
    pub flare: Option<String>,
    /// Override the reasoning-model flag
    pub is_reasoning_model: Option<bool>,
    /// Override the reasoning opening tag
    pub reasoning_header: Option<String>,
    /// Override the completion token cap
    pub max_tokens: Option<u32>,
    /// Override the context window
    pub context_window: Option<u32>,
    /// Override the handoff context size
    pub handoff_context: Option<u32>,
}

/// A message before transcript-level defaults are applied
///
/// Construct with the role helpers and refine with the builder methods:
///
/// ```
/// use flarelog::transcript::MessageDraft;
///
/// let draft = MessageDraft::user("Hello!").with_timestamp(1_700_000_000_000);
/// assert_eq!(draft.timestamp, Some(1_700_000_000_000));
/// ```
#[derive(Debug, Clone)]
pub struct MessageDraft {
    /// Sender role
    pub role: Role,
    /// Message content
    pub content: String,
    /// Creation time in UTC milliseconds; now() when absent
    pub timestamp: Option<i64>,
    /// Settings overrides; omitted fields inherit transcript defaults
    pub settings: SettingsOverride,
}

impl MessageDraft {
    /// Draft a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Draft an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Draft a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
            settings: SettingsOverride::default(),
        }
    }

    /// Pin the message timestamp instead of using now()
    pub fn with_timestamp(mut self, millis: i64) -> Self {
        self.timestamp = Some(millis);
        self
    }

    /// Apply settings overrides
    pub fn with_settings(mut self, settings: SettingsOverride) -> Self {
        self.settings = settings;
        self
    }
}

/// An in-memory chat transcript
///
/// The title doubles as the basis for the backing file name once persisted;
/// `TranscriptStore::rename_with_title` is the only place the two change,
/// and it keeps them in agreement.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// Creation time in UTC milliseconds
    pub date: i64,
    /// Last mutation time in UTC milliseconds; never before `date`
    pub last_modified: i64,
    /// Transcript title (file name stem once persisted)
    pub title: String,
    /// Flare id
    pub flare: Option<String>,
    /// Default provider id for new messages
    pub provider_id: Option<String>,
    /// Default provider name for new messages
    pub provider_name: Option<String>,
    /// Default provider type for new messages
    pub provider_type: Option<String>,
    /// Default model for new messages
    pub model: String,
    /// Default temperature for new messages
    pub temperature: f64,
    /// Messages in conversation order
    pub messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript stamped with the current time
    pub fn new(title: impl Into<String>, model: impl Into<String>, temperature: f64) -> Self {
        let now = now_millis();
        Self {
            date: now,
            last_modified: now,
            title: title.into(),
            flare: None,
            provider_id: None,
            provider_name: None,
            provider_type: None,
            model: model.into(),
            temperature,
            messages: Vec::new(),
        }
    }

    /// Materialize a draft against this transcript's defaults
    ///
    /// Fills the timestamp with now() when absent and inherits the
    /// transcript-level provider, model, and temperature only for fields
    /// the draft omitted.
    pub fn resolve_draft(&self, draft: MessageDraft) -> Message {
        let o = draft.settings;
        Message {
            role: draft.role,
            content: draft.content,
            timestamp: draft.timestamp.unwrap_or_else(now_millis),
            settings: GenerationSettings {
                provider_id: o.provider_id.or_else(|| self.provider_id.clone()),
                provider_name: o.provider_name.or_else(|| self.provider_name.clone()),
                provider_type: o.provider_type.or_else(|| self.provider_type.clone()),
                model: o.model.unwrap_or_else(|| self.model.clone()),
                temperature: o.temperature.unwrap_or(self.temperature),
                flare: o.flare.or_else(|| self.flare.clone()),
                is_reasoning_model: o.is_reasoning_model,
                reasoning_header: o.reasoning_header,
                max_tokens: o.max_tokens,
                context_window: o.context_window,
                handoff_context: o.handoff_context,
            },
        }
    }
}

/// Current UTC time in milliseconds
///
/// Used consistently for all transcript timestamps.
///
/// # Examples
///
/// ```
/// use flarelog::transcript::now_millis;
///
/// assert!(now_millis() > 1_600_000_000_000);
/// ```
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display_capitalized() {
        assert_eq!(Role::System.to_string(), "System");
        assert_eq!(Role::User.to_string(), "User");
        assert_eq!(Role::Assistant.to_string(), "Assistant");
    }

    #[test]
    fn test_role_parse_case_insensitive() {
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("USER"), Some(Role::User));
        assert_eq!(Role::parse("Assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse(" system "), Some(Role::System));
        assert_eq!(Role::parse("tool"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn test_generation_settings_fallback() {
        let settings = GenerationSettings::fallback();
        assert_eq!(settings.provider_id.as_deref(), Some("default"));
        assert_eq!(settings.model, "default");
        assert_eq!(settings.temperature, 0.0);
        assert!(settings.flare.is_none());
    }

    #[test]
    fn test_generation_settings_wire_names() {
        let settings = GenerationSettings {
            provider_id: Some("ollama".to_string()),
            provider_name: Some("Ollama".to_string()),
            provider_type: Some("ollama".to_string()),
            model: "llama3.2:latest".to_string(),
            temperature: 0.7,
            flare: Some("default-flare".to_string()),
            is_reasoning_model: Some(true),
            reasoning_header: Some("<think>".to_string()),
            max_tokens: Some(2048),
            context_window: Some(8192),
            handoff_context: Some(1024),
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"provider\":\"ollama\""));
        assert!(json.contains("\"providerName\":\"Ollama\""));
        assert!(json.contains("\"isReasoningModel\":true"));
        assert!(json.contains("\"reasoningHeader\":\"<think>\""));
        assert!(json.contains("\"maxTokens\":2048"));
        assert!(json.contains("\"contextWindow\":8192"));
        assert!(json.contains("\"handoffContext\":1024"));

        let back: GenerationSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_generation_settings_optional_fields_omitted() {
        let settings = GenerationSettings {
            provider_id: Some("p".to_string()),
            model: "m".to_string(),
            temperature: 0.2,
            ..GenerationSettings::fallback()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("flare"));
        assert!(!json.contains("reasoningHeader"));
        assert!(!json.contains("maxTokens"));
    }

    #[test]
    fn test_generation_settings_legacy_payload_defaults() {
        // Legacy payloads may omit model and temperature entirely.
        let settings: GenerationSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.model, "default");
        assert_eq!(settings.temperature, 0.0);
        assert!(settings.provider_id.is_none());
    }

    #[test]
    fn test_transcript_new_stamps_times() {
        let transcript = Transcript::new("chat-today", "gpt-4", 0.7);
        assert_eq!(transcript.date, transcript.last_modified);
        assert!(transcript.date > 0);
        assert!(transcript.messages.is_empty());
    }

    #[test]
    fn test_resolve_draft_inherits_omitted_fields() {
        let mut transcript = Transcript::new("t", "transcript-model", 0.4);
        transcript.provider_id = Some("ollama".to_string());
        transcript.provider_name = Some("Ollama".to_string());
        transcript.flare = Some("default-flare".to_string());

        let message = transcript.resolve_draft(MessageDraft::user("hello"));
        assert_eq!(message.settings.provider_id.as_deref(), Some("ollama"));
        assert_eq!(message.settings.model, "transcript-model");
        assert_eq!(message.settings.temperature, 0.4);
        assert_eq!(message.settings.flare.as_deref(), Some("default-flare"));
        assert!(message.timestamp > 0);
    }

    #[test]
    fn test_resolve_draft_keeps_caller_fields() {
        let transcript = Transcript::new("t", "transcript-model", 0.4);
        let draft = MessageDraft::assistant("answer")
            .with_timestamp(42)
            .with_settings(SettingsOverride {
                model: Some("other-model".to_string()),
                temperature: Some(1.1),
                ..SettingsOverride::default()
            });

        let message = transcript.resolve_draft(draft);
        assert_eq!(message.timestamp, 42);
        assert_eq!(message.settings.model, "other-model");
        assert_eq!(message.settings.temperature, 1.1);
    }
}
