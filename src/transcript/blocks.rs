//! Message block codec
//!
//! Encodes and decodes role-tagged message blocks. Message content is
//! free-form markdown and may itself contain blank lines, headings, or
//! horizontal rules, so decoding uses a two-pass scanner anchored on the
//! reserved `## Role` header pattern rather than delimiter splitting:
//! pass 1 locates the header lines, pass 2 slices the content between them.

use crate::transcript::{GenerationSettings, Message, Role};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Opening marker of the trailing settings comment
const SETTINGS_OPEN: &str = "<!-- settings:";

/// Closing marker of the trailing settings comment
const SETTINGS_CLOSE: &str = "-->";

/// Machine-readable payload embedded in the settings comment
///
/// Carries the message timestamp alongside the generation settings so both
/// round-trip exactly; legacy blocks may omit either.
#[derive(Debug, Serialize, Deserialize)]
struct BlockPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    #[serde(flatten)]
    settings: GenerationSettings,
}

/// Encode one message as a block
///
/// Layout: `## {Role}` header, a blank line, the raw content, the settings
/// comment, and a trailing blank line separator.
pub fn encode_message(message: &Message) -> String {
    let payload = BlockPayload {
        timestamp: Some(message.timestamp),
        settings: message.settings.clone(),
    };
    // Serialization of a closed struct cannot fail; fall back to an empty
    // payload rather than poisoning the whole document if it ever does.
    let json = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
    format!(
        "## {}\n\n{}\n{} {} {}\n\n",
        message.role, message.content, SETTINGS_OPEN, json, SETTINGS_CLOSE
    )
}

/// Decode all message blocks from a document body
///
/// # Arguments
///
/// * `body` - Document text after the frontmatter's closing delimiter
/// * `default_timestamp` - Timestamp for legacy blocks whose settings
///   comment is missing or does not carry one
///
/// Blocks whose header does not name a known role are left as content of
/// the preceding block (logged, not fatal); an unparseable settings comment
/// degrades to best-effort defaults instead of discarding the message.
pub fn decode_messages(body: &str, default_timestamp: i64) -> Vec<Message> {
    // Pass 1: locate role header lines.
    let mut headers: Vec<(usize, usize, Role)> = Vec::new();
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if let Some(name) = line.trim_end().strip_prefix("## ") {
            match Role::parse(name) {
                Some(role) => headers.push((offset, line.len(), role)),
                None => debug!("ignoring non-role heading in transcript body: '## {}'", name),
            }
        }
        offset += line.len();
    }

    // Pass 2: slice the content between consecutive headers.
    let mut messages = Vec::with_capacity(headers.len());
    for (index, (start, header_len, role)) in headers.iter().enumerate() {
        let block_start = start + header_len;
        let block_end = headers
            .get(index + 1)
            .map(|(next_start, _, _)| *next_start)
            .unwrap_or(body.len());
        let block = &body[block_start..block_end];
        messages.push(decode_block(*role, block, default_timestamp));
    }
    messages
}

/// Decode one block's content and settings comment
fn decode_block(role: Role, block: &str, default_timestamp: i64) -> Message {
    // The settings comment is located from the end so markup earlier in the
    // content cannot shadow it.
    let mut content = block;
    let mut payload: Option<BlockPayload> = None;
    if let Some(open) = block.rfind(SETTINGS_OPEN) {
        if let Some(close) = block[open..].find(SETTINGS_CLOSE) {
            let json = block[open + SETTINGS_OPEN.len()..open + close].trim();
            match serde_json::from_str::<BlockPayload>(json) {
                Ok(parsed) => payload = Some(parsed),
                Err(error) => {
                    warn!(role = %role, %error, "unparseable settings comment, using defaults");
                }
            }
            content = &block[..open];
        }
    }

    let (timestamp, settings) = match payload {
        Some(payload) => (
            payload.timestamp.unwrap_or(default_timestamp),
            payload.settings,
        ),
        None => (default_timestamp, GenerationSettings::fallback()),
    };

    Message {
        role,
        content: trim_blank_lines(content).to_string(),
        timestamp,
        settings,
    }
}

/// Strip leading and trailing blank lines, preserving inner text verbatim
///
/// Only whole blank lines are removed; trailing spaces inside the last
/// content line survive.
fn trim_blank_lines(text: &str) -> &str {
    let mut start = 0;
    while start < text.len() {
        let rest = &text[start..];
        let line_end = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
        if rest[..line_end].trim().is_empty() {
            start += line_end;
        } else {
            break;
        }
    }
    let mut end = text.len();
    while end > start {
        let rest = &text[start..end];
        let line_start = rest.rfind('\n').map(|i| i + 1).unwrap_or(0);
        if rest[line_start..].trim().is_empty() {
            end = start + line_start.saturating_sub(1);
        } else {
            break;
        }
    }
    &text[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message(role: Role, content: &str) -> Message {
        Message {
            role,
            content: content.to_string(),
            timestamp: 1_706_700_000_123,
            settings: GenerationSettings {
                provider_id: Some("ollama".to_string()),
                model: "llama3.2:latest".to_string(),
                temperature: 0.7,
                ..GenerationSettings::fallback()
            },
        }
    }

    #[test]
    fn test_encode_layout() {
        let block = encode_message(&sample_message(Role::User, "Hello there"));
        assert!(block.starts_with("## User\n\nHello there\n<!-- settings: {"));
        assert!(block.ends_with("-->\n\n"));
        assert!(block.contains("\"timestamp\":1706700000123"));
        assert!(block.contains("\"provider\":\"ollama\""));
    }

    #[test]
    fn test_round_trip_preserves_everything() {
        let original = vec![
            sample_message(Role::User, "What is a monad?"),
            sample_message(Role::Assistant, "A monoid in the category of endofunctors."),
        ];
        let body: String = original.iter().map(encode_message).collect();
        let decoded = decode_messages(&body, 0);
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_round_trip_message_timestamp_full_precision() {
        let message = sample_message(Role::Assistant, "precise");
        let decoded = decode_messages(&encode_message(&message), 0);
        // Millisecond precision survives; only frontmatter dates are lossy.
        assert_eq!(decoded[0].timestamp, 1_706_700_000_123);
    }

    #[test]
    fn test_content_containing_delimiter_line() {
        let message = sample_message(Role::User, "before\n---\nafter");
        let decoded = decode_messages(&encode_message(&message), 0);
        assert_eq!(decoded[0].content, "before\n---\nafter");
    }

    #[test]
    fn test_content_with_inner_blank_lines_and_headings() {
        let content = "Intro paragraph.\n\n### Not a role heading\n\nClosing paragraph.";
        let message = sample_message(Role::Assistant, content);
        let decoded = decode_messages(&encode_message(&message), 0);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].content, content);
    }

    #[test]
    fn test_stray_level_two_heading_is_content() {
        let content = "See the section below.\n\n## Roadmap\n\n- item one";
        let message = sample_message(Role::User, content);
        let decoded = decode_messages(&encode_message(&message), 0);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].content, content);
    }

    #[test]
    fn test_role_headers_case_insensitive() {
        let body = "## user\n\nhi\n\n## ASSISTANT\n\nhello\n";
        let decoded = decode_messages(body, 7);
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].role, Role::User);
        assert_eq!(decoded[1].role, Role::Assistant);
    }

    #[test]
    fn test_legacy_block_without_settings_comment() {
        let body = "## User\n\nold message from the previous format\n";
        let decoded = decode_messages(body, 1_700_000_000_000);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].content, "old message from the previous format");
        assert_eq!(decoded[0].timestamp, 1_700_000_000_000);
        assert_eq!(decoded[0].settings, GenerationSettings::fallback());
    }

    #[test]
    fn test_unparseable_settings_comment_defaults() {
        let body = "## Assistant\n\nanswer text\n<!-- settings: {not json} -->\n";
        let decoded = decode_messages(body, 5);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].content, "answer text");
        assert_eq!(decoded[0].settings.provider_id.as_deref(), Some("default"));
        assert_eq!(decoded[0].settings.model, "default");
        assert_eq!(decoded[0].settings.temperature, 0.0);
    }

    #[test]
    fn test_last_settings_comment_wins() {
        // A pasted settings comment inside the content must not shadow the
        // real trailing one.
        let body = concat!(
            "## Assistant\n\n",
            "Here is an example comment: <!-- settings: {\"model\":\"pasted\"} -->\n",
            "and more text\n",
            "<!-- settings: {\"timestamp\":9,\"model\":\"real\",\"temperature\":0.1} -->\n",
        );
        let decoded = decode_messages(body, 0);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].settings.model, "real");
        assert_eq!(decoded[0].timestamp, 9);
        assert!(decoded[0].content.contains("example comment"));
    }

    #[test]
    fn test_empty_body_decodes_to_no_messages() {
        assert!(decode_messages("", 0).is_empty());
        assert!(decode_messages("\n\nprose without headers\n", 0).is_empty());
    }

    #[test]
    fn test_trim_blank_lines() {
        assert_eq!(trim_blank_lines("\n\nhello\n\n"), "hello");
        assert_eq!(trim_blank_lines("hello\nworld"), "hello\nworld");
        assert_eq!(trim_blank_lines("a\n\nb"), "a\n\nb");
        assert_eq!(trim_blank_lines("   \n\t\n"), "");
        assert_eq!(trim_blank_lines("trailing space \n"), "trailing space ");
    }

    #[test]
    fn test_unknown_role_header_skipped() {
        let body = "## Narrator\n\nnot a message\n\n## User\n\nreal message\n";
        let decoded = decode_messages(body, 0);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].role, Role::User);
        assert_eq!(decoded[0].content, "real message");
    }
}
