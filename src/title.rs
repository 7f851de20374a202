//! Title generation workflow
//!
//! Asks a completion backend to suggest a transcript title, sanitizes the
//! suggestion into a legal file name stem, and applies it through the
//! store's rename transaction. The call is retried with a fixed backoff;
//! after the final attempt the failure is terminal and the transcript
//! keeps its current title.

use crate::config::TitleConfig;
use crate::error::{FlarelogError, Result};
use crate::providers::{Provider, TitleRequest};
use crate::transcript::store::{sanitize_filename_chars, TranscriptStore, FILE_STEM_PREFIX};
use crate::transcript::Role;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempts before the failure becomes terminal
const MAX_ATTEMPTS: u32 = 3;

/// Fixed delay between attempts
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Per-message excerpt length in the prompt, in characters
const EXCERPT_CHARS: usize = 150;

/// Maximum sanitized title length, in characters
const MAX_TITLE_CHARS: usize = 50;

/// Observable phase of a title generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TitleState {
    /// No run started yet
    #[default]
    Idle,
    /// A provider call is in flight or being retried
    Requesting,
    /// The title was applied and the file renamed
    Succeeded,
    /// All attempts failed, or the rename transaction failed
    Failed,
}

/// Drives a single transcript's title suggestion
pub struct TitleGenerator<'a> {
    provider: &'a dyn Provider,
    config: &'a TitleConfig,
    state: TitleState,
}

impl<'a> TitleGenerator<'a> {
    pub fn new(provider: &'a dyn Provider, config: &'a TitleConfig) -> Self {
        Self {
            provider,
            config,
            state: TitleState::Idle,
        }
    }

    /// Current phase, for UI surfaces that show progress
    pub fn state(&self) -> TitleState {
        self.state
    }

    /// Generate a title and apply it to the store
    ///
    /// Builds the prompt from the transcript's non-system messages, asks
    /// the provider up to three times with a one second pause between
    /// attempts, sanitizes the reply into a file name stem, and commits it
    /// via [`TranscriptStore::rename_with_title`]. Returns the applied
    /// title.
    ///
    /// # Errors
    ///
    /// `TitleGenerationFailed` when every provider attempt errors, and
    /// `RenameFailed` (from the store) when the file rename does not go
    /// through; in the latter case the transcript keeps its old title.
    pub async fn generate(&mut self, store: &mut TranscriptStore) -> Result<String> {
        self.state = TitleState::Requesting;
        let prompt = build_prompt(&self.config.prompt, store);
        let request = TitleRequest {
            model: Some(self.config.model.clone()),
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
        };

        let mut last_error = String::new();
        let mut reply = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.provider.send_message(&prompt, &request).await {
                Ok(text) => {
                    reply = Some(text);
                    break;
                }
                Err(error) => {
                    warn!(attempt, %error, "title suggestion attempt failed");
                    last_error = error.to_string();
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        let Some(reply) = reply else {
            self.state = TitleState::Failed;
            return Err(FlarelogError::TitleGenerationFailed {
                attempts: MAX_ATTEMPTS,
                message: last_error,
            }
            .into());
        };

        let title = sanitize_title(&reply);
        debug!(raw = %reply, %title, "applying suggested title");
        match store.rename_with_title(&title).await {
            Ok(()) => {
                self.state = TitleState::Succeeded;
                Ok(title)
            }
            Err(error) => {
                self.state = TitleState::Failed;
                Err(error)
            }
        }
    }
}

/// Build the provider prompt: instruction prefix, then one line per
/// non-system message with its content truncated to a character-boundary
/// safe excerpt
fn build_prompt(prefix: &str, store: &TranscriptStore) -> String {
    let mut prompt = String::from(prefix);
    prompt.push_str("\n\n");
    for message in &store.transcript().messages {
        if message.role == Role::System {
            continue;
        }
        let excerpt: String = message.content.chars().take(EXCERPT_CHARS).collect();
        prompt.push_str(&format!("{}: {}\n", message.role, excerpt));
    }
    prompt
}

/// Turn a raw provider reply into a legal file name stem
///
/// Trims whitespace, strips one pair of wrapping quotes, replaces
/// characters illegal in file names with `-`, truncates to fifty
/// characters, and guarantees the `chat-` prefix.
pub fn sanitize_title(raw: &str) -> String {
    let mut text = raw.trim();
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            text = &text[1..text.len() - 1];
            break;
        }
    }
    let cleaned = sanitize_filename_chars(text.trim());
    let truncated: String = cleaned.chars().take(MAX_TITLE_CHARS).collect();
    if truncated.starts_with(FILE_STEM_PREFIX) {
        truncated
    } else {
        format!("{FILE_STEM_PREFIX}{truncated}")
    }
}
