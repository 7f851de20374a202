//! Frontmatter codec
//!
//! Encodes and decodes the delimited key-value header block at the start of
//! a transcript document. The closing delimiter is always the first `---`
//! line after the opening one, counted from the start of the document, so a
//! `---` inside message content is never mistaken for a header boundary.

use crate::error::{FlarelogError, Result};
use crate::transcript::Transcript;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeMap;

/// The frontmatter delimiter line
pub const DELIMITER: &str = "---";

/// Header date serialization pattern (UTC, second precision)
///
/// Sub-second information is discarded on encode; this is an intentional,
/// lossy step that applies to the two header dates only, never to message
/// timestamps.
const DATE_PATTERN: &str = "%Y-%m-%d %H:%M:%S";

/// A loosely typed frontmatter value
///
/// Values decode as quoted-string-stripped text with numeric coercion
/// attempted on every value; unknown keys keep whatever shape coercion
/// produced so they survive a rewrite.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// Plain text (quotes already stripped)
    Text(String),
    /// Integer-coercible value
    Integer(i64),
    /// Float-coercible value
    Float(f64),
}

impl ScalarValue {
    /// Coerce a raw `key: value` right-hand side
    ///
    /// Strips one pair of surrounding double quotes, then attempts integer
    /// and float parses before falling back to text.
    pub fn coerce(raw: &str) -> Self {
        let trimmed = raw.trim();
        let unquoted = trimmed
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(trimmed);
        if let Ok(n) = unquoted.parse::<i64>() {
            return Self::Integer(n);
        }
        if let Ok(f) = unquoted.parse::<f64>() {
            return Self::Float(f);
        }
        Self::Text(unquoted.to_string())
    }

    /// The value as text, regardless of coercion
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
        }
    }

    /// The value as a float, when numeric
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Float(f) => Some(*f),
            Self::Text(_) => None,
        }
    }

    fn render(&self) -> String {
        self.as_text()
    }
}

/// Decoded frontmatter
///
/// A closed set of typed optional fields plus a side table for unrecognized
/// keys. Absent keys resolve to caller-supplied defaults, never to a crash;
/// unknown keys are preserved so forward and backward compatibility hold
/// across a rewrite.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frontmatter {
    /// Creation time in UTC milliseconds (second precision on disk)
    pub date: Option<i64>,
    /// Last modification time in UTC milliseconds (second precision on disk)
    pub last_modified: Option<i64>,
    /// Transcript title
    pub title: Option<String>,
    /// Flare id
    pub flare: Option<String>,
    /// Provider id
    pub provider_id: Option<String>,
    /// Provider name
    pub provider_name: Option<String>,
    /// Provider type
    pub provider_type: Option<String>,
    /// Default model
    pub model: Option<String>,
    /// Default temperature
    pub temperature: Option<f64>,
    /// Unrecognized keys, preserved in order
    pub extra: BTreeMap<String, ScalarValue>,
}

impl Frontmatter {
    /// Build a header from an in-memory transcript
    pub fn from_transcript(transcript: &Transcript) -> Self {
        Self {
            date: Some(transcript.date),
            last_modified: Some(transcript.last_modified),
            title: Some(transcript.title.clone()),
            flare: transcript.flare.clone(),
            provider_id: transcript.provider_id.clone(),
            provider_name: transcript.provider_name.clone(),
            provider_type: transcript.provider_type.clone(),
            model: Some(transcript.model.clone()),
            temperature: Some(transcript.temperature),
            extra: BTreeMap::new(),
        }
    }

    /// Render the complete header block, delimiters included
    ///
    /// The key order is deterministic: date, last-modified, title, flare,
    /// provider, provider-name, provider-type, model, temperature, then any
    /// preserved unknown keys. Optional keys are omitted when absent, so an
    /// unchanged transcript renders byte-identically every time.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(DELIMITER);
        out.push('\n');
        if let Some(millis) = self.date {
            out.push_str(&format!("date: {}\n", format_datetime(millis)));
        }
        if let Some(millis) = self.last_modified {
            out.push_str(&format!("last-modified: {}\n", format_datetime(millis)));
        }
        if let Some(title) = &self.title {
            out.push_str(&format!("title: \"{}\"\n", title));
        }
        if let Some(flare) = &self.flare {
            out.push_str(&format!("flare: {}\n", flare));
        }
        if let Some(id) = &self.provider_id {
            out.push_str(&format!("provider: {}\n", id));
        }
        if let Some(name) = &self.provider_name {
            out.push_str(&format!("provider-name: {}\n", name));
        }
        if let Some(kind) = &self.provider_type {
            out.push_str(&format!("provider-type: {}\n", kind));
        }
        if let Some(model) = &self.model {
            out.push_str(&format!("model: {}\n", model));
        }
        if let Some(temperature) = self.temperature {
            out.push_str(&format!("temperature: {}\n", temperature));
        }
        for (key, value) in &self.extra {
            out.push_str(&format!("{}: {}\n", key, value.render()));
        }
        out.push_str(DELIMITER);
        out.push('\n');
        out
    }

    /// Parse the text between the delimiters
    ///
    /// Splits on newlines and matches `key: value` pairs; lines without a
    /// colon are ignored. Never fails: malformed structure is the caller's
    /// concern (see [`decode`]), malformed values degrade to text.
    pub fn parse_body(body: &str) -> Self {
        let mut fm = Self::default();
        for line in body.lines() {
            let Some((key, raw)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = ScalarValue::coerce(raw);
            match key {
                "date" => fm.date = parse_datetime(&value.as_text()),
                "last-modified" => fm.last_modified = parse_datetime(&value.as_text()),
                "title" => fm.title = Some(value.as_text()),
                "flare" => fm.flare = Some(value.as_text()),
                "provider" => fm.provider_id = Some(value.as_text()),
                "provider-name" => fm.provider_name = Some(value.as_text()),
                "provider-type" => fm.provider_type = Some(value.as_text()),
                "model" => fm.model = Some(value.as_text()),
                "temperature" => fm.temperature = value.as_float(),
                _ => {
                    fm.extra.insert(key.to_string(), value);
                }
            }
        }
        fm
    }
}

/// Encode a transcript's header block
pub fn encode(transcript: &Transcript) -> String {
    Frontmatter::from_transcript(transcript).render()
}

/// Split a document into its frontmatter body and the remainder
///
/// Returns `(header_body, body_after_closing_delimiter)`. The document must
/// open with a `---` line; the closing boundary is the first subsequent
/// `---` line, so `---` sequences inside message content never shadow it.
pub fn split_document(doc: &str) -> Option<(&str, &str)> {
    let rest = doc.strip_prefix(DELIMITER)?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let body_start = offset + line.len();
            return Some((&rest[..offset], &rest[body_start..]));
        }
        offset += line.len();
    }
    None
}

/// Decode a document's frontmatter
///
/// # Arguments
///
/// * `doc` - The full document text
/// * `path` - Document path, used only for error context
///
/// # Returns
///
/// The decoded header and the document body after the closing delimiter.
///
/// # Errors
///
/// Returns `FlarelogError::MalformedDocument` if the document does not
/// open with a frontmatter block or the closing delimiter is missing.
pub fn decode<'a>(doc: &'a str, path: &str) -> Result<(Frontmatter, &'a str)> {
    if !doc.starts_with(DELIMITER) {
        return Err(FlarelogError::MalformedDocument {
            path: path.to_string(),
            reason: "document does not open with a frontmatter delimiter".to_string(),
        }
        .into());
    }
    let (header_body, body) = split_document(doc).ok_or_else(|| FlarelogError::MalformedDocument {
        path: path.to_string(),
        reason: "missing closing frontmatter delimiter".to_string(),
    })?;
    Ok((Frontmatter::parse_body(header_body), body))
}

/// Format UTC milliseconds with second precision
pub(crate) fn format_datetime(millis: i64) -> String {
    let dt: DateTime<Utc> = DateTime::from_timestamp_millis(millis).unwrap_or_default();
    dt.format(DATE_PATTERN).to_string()
}

/// Parse a second-precision header date back to UTC milliseconds
pub(crate) fn parse_datetime(text: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(text.trim(), DATE_PATTERN)
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transcript() -> Transcript {
        let mut transcript = Transcript::new("chat-2024-01-31", "llama3.2:latest", 0.7);
        transcript.date = 1_706_700_000_000;
        transcript.last_modified = 1_706_700_123_000;
        transcript.flare = Some("default-flare".to_string());
        transcript.provider_id = Some("ollama".to_string());
        transcript
    }

    #[test]
    fn test_encode_key_order_and_quoting() {
        let header = encode(&sample_transcript());
        let lines: Vec<&str> = header.lines().collect();
        assert_eq!(lines[0], "---");
        assert!(lines[1].starts_with("date: "));
        assert!(lines[2].starts_with("last-modified: "));
        assert_eq!(lines[3], "title: \"chat-2024-01-31\"");
        assert_eq!(lines[4], "flare: default-flare");
        assert_eq!(lines[5], "provider: ollama");
        assert_eq!(lines[6], "model: llama3.2:latest");
        assert_eq!(lines[7], "temperature: 0.7");
        assert_eq!(*lines.last().unwrap(), "---");
    }

    #[test]
    fn test_encode_omits_absent_flare() {
        let mut transcript = sample_transcript();
        transcript.flare = None;
        let header = encode(&transcript);
        assert!(!header.contains("flare:"));
    }

    #[test]
    fn test_date_round_trip_second_precision() {
        // 1_706_700_000_500 carries sub-second information that must be
        // dropped on encode.
        let formatted = format_datetime(1_706_700_000_500);
        let parsed = parse_datetime(&formatted).unwrap();
        assert_eq!(parsed, 1_706_700_000_000);
    }

    #[test]
    fn test_decode_round_trip() {
        let transcript = sample_transcript();
        let header = encode(&transcript);
        let (fm, body) = decode(&header, "test.md").unwrap();
        assert_eq!(fm.date, Some(1_706_700_000_000));
        assert_eq!(fm.last_modified, Some(1_706_700_123_000));
        assert_eq!(fm.title.as_deref(), Some("chat-2024-01-31"));
        assert_eq!(fm.flare.as_deref(), Some("default-flare"));
        assert_eq!(fm.provider_id.as_deref(), Some("ollama"));
        assert_eq!(fm.model.as_deref(), Some("llama3.2:latest"));
        assert_eq!(fm.temperature, Some(0.7));
        assert!(body.is_empty());
    }

    #[test]
    fn test_decode_rejects_missing_opening_delimiter() {
        let result = decode("title: no header\n", "broken.md");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("broken.md"));
    }

    #[test]
    fn test_decode_rejects_missing_closing_delimiter() {
        let result = decode("---\ntitle: \"open\"\n", "open.md");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("closing"));
    }

    #[test]
    fn test_decode_body_may_contain_delimiter() {
        let doc = "---\ntitle: \"t\"\n---\n\n## User\n\n---\nstill content\n";
        let (fm, body) = decode(doc, "test.md").unwrap();
        assert_eq!(fm.title.as_deref(), Some("t"));
        assert!(body.contains("---\nstill content"));
    }

    #[test]
    fn test_unknown_keys_preserved_through_rewrite() {
        let doc = "---\ntitle: \"t\"\ncustom-key: 42\nanother: plain text\n---\n";
        let (fm, _) = decode(doc, "test.md").unwrap();
        assert_eq!(fm.extra.get("custom-key"), Some(&ScalarValue::Integer(42)));
        assert_eq!(
            fm.extra.get("another"),
            Some(&ScalarValue::Text("plain text".to_string()))
        );

        let rendered = fm.render();
        assert!(rendered.contains("custom-key: 42"));
        assert!(rendered.contains("another: plain text"));
    }

    #[test]
    fn test_scalar_coercion() {
        assert_eq!(ScalarValue::coerce("42"), ScalarValue::Integer(42));
        assert_eq!(ScalarValue::coerce("0.7"), ScalarValue::Float(0.7));
        assert_eq!(ScalarValue::coerce("\"0.7\""), ScalarValue::Float(0.7));
        assert_eq!(
            ScalarValue::coerce("\"quoted text\""),
            ScalarValue::Text("quoted text".to_string())
        );
        assert_eq!(
            ScalarValue::coerce(" padded "),
            ScalarValue::Text("padded".to_string())
        );
    }

    #[test]
    fn test_parse_body_ignores_lines_without_colon() {
        let fm = Frontmatter::parse_body("title: \"t\"\nno colon here\n");
        assert_eq!(fm.title.as_deref(), Some("t"));
        assert!(fm.extra.is_empty());
    }

    #[test]
    fn test_title_value_with_colon() {
        let fm = Frontmatter::parse_body("title: \"notes: part one\"\n");
        assert_eq!(fm.title.as_deref(), Some("notes: part one"));
    }

    #[test]
    fn test_crlf_after_opening_delimiter() {
        let doc = "---\r\ntitle: \"t\"\r\n---\r\nbody";
        let (fm, body) = decode(doc, "test.md").unwrap();
        assert_eq!(fm.title.as_deref(), Some("t"));
        assert_eq!(body, "body");
    }
}
