//! Export rendering
//!
//! Pure rendering of a transcript into a shareable markdown document,
//! driven by `{{key}}` templates from the export settings, plus a helper
//! that writes the result into the export folder with a collision-avoiding
//! name. Rendering never mutates the live transcript.

use crate::config::{DateFormat, ExportConfig};
use crate::error::Result;
use crate::transcript::store::sanitize_filename_chars;
use crate::transcript::{Message, Role, Transcript};
use crate::vault::Vault;
use chrono::DateTime;
use std::path::PathBuf;
use tracing::debug;

/// Time-of-day format for the per-message `{{time}}` key
const TIME_PATTERN: &str = "%H:%M:%S";

/// Render a transcript as an export document
///
/// The frontmatter template is rendered once at the top with the keys
/// `title`, `date`, `flare`, `model`, `provider`, and `temperature`; each
/// message gets a `## Role` header, the message template (keys `flare`,
/// `provider`, `model`, `temperature`, `maxTokens`, `date`, `time`), and
/// its content. Placeholders that do not resolve are left literal so
/// template typos stay visible in the output. System messages and tagged
/// reasoning sub-sections are included or dropped per the export settings,
/// and runs of blank lines collapse to one.
pub fn render(transcript: &Transcript, config: &ExportConfig, date_format: DateFormat) -> String {
    let mut out = substitute(&config.frontmatter_template, |key| {
        frontmatter_key(transcript, key, date_format)
    });
    out.push('\n');

    for message in &transcript.messages {
        if message.role == Role::System && !config.include_system {
            continue;
        }
        out.push_str(&format!("## {}\n\n", message.role));
        out.push_str(&substitute(&config.message_template, |key| {
            message_key(message, key, date_format)
        }));
        out.push('\n');
        let content = transform_reasoning(
            &message.content,
            message.settings.reasoning_header.as_deref(),
            config.include_reasoning,
        );
        out.push_str(content.trim());
        out.push_str("\n\n");
    }

    collapse_blank_lines(&out)
}

/// Render a transcript and write it into the export folder
///
/// The file name is derived from the transcript title (sanitized for file
/// names), probing `-1`, `-2`, ... suffixes until a free path is found.
/// Returns the path written.
pub async fn export_to_file(
    vault: &dyn Vault,
    transcript: &Transcript,
    config: &ExportConfig,
    date_format: DateFormat,
) -> Result<PathBuf> {
    let folder = PathBuf::from(&config.folder);
    vault.create_folder(&folder).await?;

    let stem = match sanitize_filename_chars(transcript.title.trim()) {
        s if s.is_empty() => "export".to_string(),
        s => s,
    };
    let mut candidate = folder.join(format!("{stem}.md"));
    let mut suffix = 1u32;
    while vault.exists(&candidate).await {
        candidate = folder.join(format!("{stem}-{suffix}.md"));
        suffix += 1;
    }

    vault
        .create(&candidate, &render(transcript, config, date_format))
        .await?;
    debug!(path = %candidate.display(), "exported transcript");
    Ok(candidate)
}

fn frontmatter_key(transcript: &Transcript, key: &str, date_format: DateFormat) -> Option<String> {
    match key {
        "title" => Some(transcript.title.clone()),
        "date" => Some(format_date(transcript.date, date_format)),
        "flare" => Some(transcript.flare.clone().unwrap_or_default()),
        "model" => Some(transcript.model.clone()),
        "provider" => Some(
            transcript
                .provider_name
                .clone()
                .or_else(|| transcript.provider_id.clone())
                .unwrap_or_default(),
        ),
        "temperature" => Some(transcript.temperature.to_string()),
        _ => None,
    }
}

fn message_key(message: &Message, key: &str, date_format: DateFormat) -> Option<String> {
    let settings = &message.settings;
    match key {
        "flare" => Some(settings.flare.clone().unwrap_or_default()),
        "provider" => Some(
            settings
                .provider_name
                .clone()
                .or_else(|| settings.provider_id.clone())
                .unwrap_or_default(),
        ),
        "model" => Some(settings.model.clone()),
        "temperature" => Some(settings.temperature.to_string()),
        "maxTokens" => Some(
            settings
                .max_tokens
                .map(|t| t.to_string())
                .unwrap_or_default(),
        ),
        "date" => Some(format_date(message.timestamp, date_format)),
        "time" => Some(
            DateTime::from_timestamp_millis(message.timestamp)
                .unwrap_or_default()
                .format(TIME_PATTERN)
                .to_string(),
        ),
        _ => None,
    }
}

fn format_date(millis: i64, date_format: DateFormat) -> String {
    date_format.format(DateTime::from_timestamp_millis(millis).unwrap_or_default())
}

/// Replace every `{{key}}` the resolver recognizes; unresolved
/// placeholders stay literal
fn substitute(template: &str, resolve: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find("}}") {
            Some(close) => {
                let key = &after[..close];
                match resolve(key.trim()) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[close + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Drop or transform tagged reasoning spans
///
/// The closing tag is derived from the opening one by turning `<` into
/// `</`, so `<think>` closes with `</think>`. When excluded, each span is
/// removed outright (an unterminated span is removed to the end). When
/// included, the opening tag becomes `(` and the closing tag becomes `)`
/// followed by a newline.
fn transform_reasoning(content: &str, open_tag: Option<&str>, include: bool) -> String {
    let Some(open) = open_tag.filter(|t| !t.is_empty()) else {
        return content.to_string();
    };
    let close = open.replacen('<', "</", 1);

    if include {
        return content.replace(open, "(").replace(&close, ")\n");
    }

    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(start) = rest.find(open) {
        out.push_str(&rest[..start]);
        match rest[start + open.len()..].find(&close) {
            Some(end) => rest = &rest[start + open.len() + end + close.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Collapse runs of blank lines to a single blank line
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_blank = false;
    for line in text.lines() {
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        out.push_str(line);
        out.push('\n');
        previous_blank = blank;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::{GenerationSettings, Message};

    fn reasoning_message(content: &str) -> Message {
        Message {
            role: Role::Assistant,
            content: content.to_string(),
            timestamp: 1_706_700_000_000,
            settings: GenerationSettings {
                is_reasoning_model: Some(true),
                reasoning_header: Some("<think>".to_string()),
                ..GenerationSettings::fallback()
            },
        }
    }

    fn sample_transcript() -> Transcript {
        let mut transcript = Transcript::new("chat-sample", "test-model", 0.7);
        transcript.messages.push(Message {
            role: Role::System,
            content: "Be terse.".to_string(),
            timestamp: 1_706_700_000_000,
            settings: GenerationSettings::fallback(),
        });
        transcript.messages.push(Message {
            role: Role::User,
            content: "Question?".to_string(),
            timestamp: 1_706_700_000_000,
            settings: GenerationSettings::fallback(),
        });
        transcript
            .messages
            .push(reasoning_message("(hidden)<think>reasoning</think>visible"));
        transcript
    }

    #[test]
    fn test_reasoning_excluded_by_default() {
        let rendered = render(
            &sample_transcript(),
            &ExportConfig::default(),
            DateFormat::default(),
        );
        assert!(rendered.contains("(hidden)visible"));
        assert!(!rendered.contains("reasoning"));
        assert!(!rendered.contains("<think>"));
    }

    #[test]
    fn test_reasoning_included_as_parenthetical() {
        let config = ExportConfig {
            include_reasoning: true,
            ..ExportConfig::default()
        };
        let rendered = render(&sample_transcript(), &config, DateFormat::default());
        assert!(rendered.contains("(hidden)(reasoning)\nvisible"));
    }

    #[test]
    fn test_unterminated_reasoning_span_dropped_to_end() {
        let out = transform_reasoning("before<think>never closed", Some("<think>"), false);
        assert_eq!(out, "before");
    }

    #[test]
    fn test_system_messages_excluded_by_default() {
        let rendered = render(
            &sample_transcript(),
            &ExportConfig::default(),
            DateFormat::default(),
        );
        assert!(!rendered.contains("Be terse."));
        assert!(!rendered.contains("## System"));

        let config = ExportConfig {
            include_system: true,
            ..ExportConfig::default()
        };
        let rendered = render(&sample_transcript(), &config, DateFormat::default());
        assert!(rendered.contains("## System"));
        assert!(rendered.contains("Be terse."));
    }

    #[test]
    fn test_frontmatter_template_keys() {
        let config = ExportConfig {
            frontmatter_template: "# {{title}} ({{model}}, t={{temperature}})".to_string(),
            ..ExportConfig::default()
        };
        let rendered = render(&sample_transcript(), &config, DateFormat::default());
        assert!(rendered.starts_with("# chat-sample (test-model, t=0.7)"));
    }

    #[test]
    fn test_unknown_placeholder_left_literal() {
        let out = substitute("a {{nope}} b", |_| None);
        assert_eq!(out, "a {{nope}} b");
    }

    #[test]
    fn test_unclosed_placeholder_left_literal() {
        let out = substitute("a {{title", |_| Some("x".to_string()));
        assert_eq!(out, "a {{title");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\nb\n"), "a\n\nb\n");
        assert_eq!(collapse_blank_lines("a\nb"), "a\nb\n");
    }

    #[test]
    fn test_message_time_key() {
        let message = reasoning_message("x");
        let time = message_key(&message, "time", DateFormat::default()).unwrap();
        assert_eq!(time.len(), 8);
        assert_eq!(time.matches(':').count(), 2);
    }

    #[tokio::test]
    async fn test_export_to_file_probes_collisions() {
        use crate::vault::MemoryVault;
        let vault = MemoryVault::new();
        let transcript = sample_transcript();
        let config = ExportConfig::default();

        let first = export_to_file(&vault, &transcript, &config, DateFormat::default())
            .await
            .unwrap();
        let second = export_to_file(&vault, &transcript, &config, DateFormat::default())
            .await
            .unwrap();
        assert_eq!(first, PathBuf::from("exports/chat-sample.md"));
        assert_eq!(second, PathBuf::from("exports/chat-sample-1.md"));
    }
}
