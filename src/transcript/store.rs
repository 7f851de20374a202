//! Transcript store
//!
//! Owns the in-memory transcript, tracks dirty state, and mediates all
//! reads and writes through the file collaborator: create-on-first-write
//! with collision-avoiding names, deduplicating saves, the title/file
//! rename transaction, and change notification.
//!
//! Concurrency contract: all operations may suspend, but exactly one
//! in-flight mutation per store instance is assumed. Callers must serialize
//! `add_message`/`save`/`rename_with_title` invocations themselves; the
//! store provides no mutual exclusion of its own.

use crate::config::{DedupPolicy, Settings};
use crate::error::{FlarelogError, Result};
use crate::transcript::{
    blocks, frontmatter, Frontmatter, Message, MessageDraft, Role, Transcript,
};
use crate::vault::Vault;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback invoked synchronously after each successful mutation
pub type ChangeObserver = Box<dyn Fn(&Transcript) + Send + Sync>;

/// Prefix of generated transcript file names
pub const FILE_STEM_PREFIX: &str = "chat-";

/// Dedup key: `(role, timestamp, content part)`
///
/// The content part is selected by [`DedupPolicy`]; the length variant is a
/// heuristic, not a cryptographic identity (two distinct messages of equal
/// length in the same millisecond collide).
#[derive(Debug, PartialEq, Eq, Hash)]
enum ContentKey {
    Length(usize),
    Exact(String),
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct DedupKey {
    role: Role,
    timestamp: i64,
    content: ContentKey,
}

impl DedupKey {
    fn new(policy: DedupPolicy, message: &Message) -> Self {
        Self {
            role: message.role,
            timestamp: message.timestamp,
            content: match policy {
                DedupPolicy::ContentLength => ContentKey::Length(message.content.len()),
                DedupPolicy::ExactContent => ContentKey::Exact(message.content.clone()),
            },
        }
    }
}

/// Replace characters illegal in file names with `-`
pub(crate) fn sanitize_filename_chars(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect()
}

/// The aggregate that owns a transcript and its backing file
///
/// # Examples
///
/// ```
/// use flarelog::config::Settings;
/// use flarelog::transcript::{MessageDraft, TranscriptStore};
/// use flarelog::vault::MemoryVault;
/// use std::sync::Arc;
///
/// # async fn example() -> flarelog::Result<()> {
/// let vault = Arc::new(MemoryVault::new());
/// let mut store = TranscriptStore::create_new(vault, Settings::default(), None).await?;
/// store.add_message(MessageDraft::user("Hello!")).await?;
/// # Ok(())
/// # }
/// ```
pub struct TranscriptStore {
    vault: Arc<dyn Vault>,
    settings: Settings,
    transcript: Transcript,
    path: Option<PathBuf>,
    dirty: bool,
    observers: Vec<ChangeObserver>,
}

impl TranscriptStore {
    /// Create a store around a fresh transcript
    ///
    /// Transcript defaults (provider identity, model, temperature) come
    /// from the settings collaborator. With auto-persist enabled a backing
    /// file named `chat-{formatted date}.md` is materialized immediately,
    /// probing `-1`, `-2`, ... suffixes until a free path is found, and the
    /// persisted title is set to the chosen file name stem, overriding any
    /// caller-supplied title: once a file exists, the file name is the
    /// source of truth for the title.
    pub async fn create_new(
        vault: Arc<dyn Vault>,
        settings: Settings,
        title: Option<&str>,
    ) -> Result<Self> {
        let provider_id = settings.providers.default.clone();
        let profile = settings.providers.profile(&provider_id);
        let model = profile
            .map(|p| p.default_model.clone())
            .unwrap_or_else(|| "default".to_string());

        let mut transcript = Transcript::new(
            title.unwrap_or("untitled"),
            model,
            settings.providers.default_temperature,
        );
        transcript.provider_id = Some(provider_id);
        transcript.provider_name = profile.map(|p| p.name.clone());
        transcript.provider_type = profile.map(|p| p.provider_type.clone());

        let mut store = Self {
            vault,
            settings,
            transcript,
            path: None,
            dirty: true,
            observers: Vec::new(),
        };

        if store.settings.history.auto_save {
            let date = chrono::DateTime::from_timestamp_millis(store.transcript.date)
                .unwrap_or_default();
            let stem = format!(
                "{}{}",
                FILE_STEM_PREFIX,
                store.settings.history.date_format.format(date)
            );
            store.materialize(&stem).await?;
            store.dirty = false;
        }
        Ok(store)
    }

    /// Open a store from an existing document
    ///
    /// Requires the document to carry a frontmatter block; fails with
    /// `MalformedDocument` otherwise. Provider identity is resolved by
    /// falling back through the stored id, the configured settings for that
    /// id, and a hardcoded default, so a transcript referencing a
    /// since-deleted provider still loads with a usable identity.
    pub async fn open(
        vault: Arc<dyn Vault>,
        settings: Settings,
        path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let path = path.into();
        let transcript = Self::read_transcript(vault.as_ref(), &settings, &path).await?;
        Ok(Self {
            vault,
            settings,
            transcript,
            path: Some(path),
            dirty: false,
            observers: Vec::new(),
        })
    }

    /// Load a different document into this store
    ///
    /// If the current transcript has unsaved changes, a best-effort save
    /// runs first; its failure is logged, not retried (a convenience, not a
    /// guarantee). On load failure the store is reset to an empty
    /// transcript and the error is surfaced.
    pub async fn load(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        if self.dirty {
            if let Err(error) = self.save(false, false).await {
                warn!(%error, "implicit save before load failed, discarding unsaved changes");
            }
        }
        let path = path.into();
        match Self::read_transcript(self.vault.as_ref(), &self.settings, &path).await {
            Ok(transcript) => {
                self.transcript = transcript;
                self.path = Some(path);
                self.dirty = false;
                Ok(())
            }
            Err(error) => {
                self.transcript = Transcript::new(
                    "untitled",
                    "default",
                    self.settings.providers.default_temperature,
                );
                self.path = None;
                self.dirty = false;
                Err(error)
            }
        }
    }

    async fn read_transcript(
        vault: &dyn Vault,
        settings: &Settings,
        path: &Path,
    ) -> Result<Transcript> {
        let content = vault.read(path).await?;
        let display = path.display().to_string();
        let (fm, body) = frontmatter::decode(&content, &display)?;

        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string());

        let provider_id = fm.provider_id.or_else(|| Some(settings.providers.default.clone()));
        let profile = provider_id.as_deref().and_then(|id| settings.providers.profile(id));

        let date = fm.date.unwrap_or_else(crate::transcript::now_millis);
        let last_modified = fm.last_modified.unwrap_or(date).max(date);

        Ok(Transcript {
            date,
            last_modified,
            title: fm.title.unwrap_or(stem),
            flare: fm.flare,
            provider_name: fm
                .provider_name
                .or_else(|| profile.map(|p| p.name.clone())),
            provider_type: fm
                .provider_type
                .or_else(|| profile.map(|p| p.provider_type.clone())),
            model: fm
                .model
                .or_else(|| profile.map(|p| p.default_model.clone()))
                .unwrap_or_else(|| "default".to_string()),
            temperature: fm
                .temperature
                .unwrap_or(settings.providers.default_temperature),
            provider_id,
            messages: blocks::decode_messages(body, date),
        })
    }

    /// The in-memory transcript
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Path of the backing file, if one has been materialized
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether in-memory state has mutations not yet on disk
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Register a change observer
    ///
    /// Observers run synchronously after each successful mutation, in
    /// registration order.
    pub fn on_change(&mut self, observer: impl Fn(&Transcript) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn notify(&self) {
        for observer in &self.observers {
            observer(&self.transcript);
        }
    }

    /// Append a message
    ///
    /// Fills the timestamp with now() when the draft omits it and inherits
    /// transcript-level provider/model/temperature only for omitted
    /// settings fields, then updates `last_modified`, marks the store
    /// dirty, and persists immediately when auto-persist is on.
    pub async fn add_message(&mut self, draft: MessageDraft) -> Result<()> {
        let message = self.transcript.resolve_draft(draft);
        self.transcript.messages.push(message);
        self.touch();
        self.dirty = true;
        if self.settings.history.auto_save {
            self.save(false, false).await?;
        }
        self.notify();
        Ok(())
    }

    /// Empty the message history
    ///
    /// Does not touch the title or provider fields.
    pub async fn clear_history(&mut self) -> Result<()> {
        self.transcript.messages.clear();
        self.touch();
        self.dirty = true;
        if self.settings.history.auto_save {
            self.save(false, false).await?;
        }
        self.notify();
        Ok(())
    }

    fn touch(&mut self) {
        self.transcript.last_modified =
            crate::transcript::now_millis().max(self.transcript.date);
    }

    /// Persist the transcript
    ///
    /// No-op unless dirty or `force`. Deduplicates messages, materializes
    /// the backing file if absent, then performs two writes: a structured
    /// frontmatter update (preserving unknown header keys) followed by a
    /// full body rewrite after the header's closing delimiter. Either
    /// error propagates with the dirty flag left set, so a retry is
    /// possible; a crash between the two writes is self-healing because
    /// the dedup key makes the next save idempotent.
    pub async fn save(&mut self, force: bool, notify: bool) -> Result<()> {
        if !self.dirty && !force {
            return Ok(());
        }

        self.dedup_messages(force);

        if self.path.is_none() {
            let stem = if self.transcript.title.trim().is_empty() {
                let date = chrono::DateTime::from_timestamp_millis(self.transcript.date)
                    .unwrap_or_default();
                format!(
                    "{}{}",
                    FILE_STEM_PREFIX,
                    self.settings.history.date_format.format(date)
                )
            } else {
                sanitize_filename_chars(&self.transcript.title)
            };
            self.materialize(&stem).await?;
        } else {
            self.write_document().await?;
        }

        self.dirty = false;
        if notify {
            self.notify();
        }
        Ok(())
    }

    /// Flush a pending dirty transcript
    ///
    /// Intended to be invoked once, on shutdown of the owning session.
    pub async fn cleanup(&mut self) -> Result<()> {
        if self.dirty {
            self.save(false, false).await?;
        }
        Ok(())
    }

    /// Rename the transcript and its backing file in one transaction
    ///
    /// Two-phase: set the in-memory title and force-save so the on-disk
    /// frontmatter matches, then rename the backing file to a path derived
    /// by substituting the old title for the new one. If the rename fails,
    /// the title is rolled back and force-saved again before the error is
    /// surfaced as `RenameFailed`: the in-memory title and the on-disk file
    /// name never disagree after this returns, success or failure.
    pub async fn rename_with_title(&mut self, new_title: &str) -> Result<()> {
        let old_title = self.transcript.title.clone();
        if old_title == new_title {
            return Ok(());
        }

        self.transcript.title = new_title.to_string();
        self.touch();
        self.save(true, false).await?;

        let Some(old_path) = self.path.clone() else {
            // No backing file yet: the save above materialized one named
            // after the new title, nothing to rename.
            self.notify();
            return Ok(());
        };

        let new_path = PathBuf::from(
            old_path
                .to_string_lossy()
                .replace(old_title.as_str(), new_title),
        );
        if new_path == old_path {
            self.notify();
            return Ok(());
        }

        if let Err(error) = self.vault.rename(&old_path, &new_path).await {
            // Roll back so memory and disk agree on the old title again.
            self.transcript.title = old_title;
            if let Err(rollback_error) = self.save(true, false).await {
                warn!(%rollback_error, "rollback save after failed rename also failed");
            }
            return Err(FlarelogError::RenameFailed {
                from: old_path.display().to_string(),
                to: new_path.display().to_string(),
                message: error.to_string(),
            }
            .into());
        }

        self.path = Some(new_path);
        self.notify();
        Ok(())
    }

    /// Collapse duplicate messages in place
    ///
    /// First-seen wins; with `force`, later entries overwrite earlier ones
    /// so a forced save after an edit supersedes stale duplicates.
    fn dedup_messages(&mut self, force: bool) {
        let policy = self.settings.history.dedup_policy;
        let mut seen: HashMap<DedupKey, usize> = HashMap::new();
        let mut deduped: Vec<Message> = Vec::with_capacity(self.transcript.messages.len());
        for message in self.transcript.messages.drain(..) {
            match seen.entry(DedupKey::new(policy, &message)) {
                Entry::Occupied(slot) => {
                    if force {
                        debug!(
                            role = %message.role,
                            timestamp = message.timestamp,
                            "forced save: replacing earlier duplicate"
                        );
                        deduped[*slot.get()] = message;
                    } else {
                        debug!(
                            role = %message.role,
                            timestamp = message.timestamp,
                            "dropping duplicate message"
                        );
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(deduped.len());
                    deduped.push(message);
                }
            }
        }
        self.transcript.messages = deduped;
    }

    /// Create the backing file with a collision-avoiding name
    ///
    /// The probe is linear and re-checks existence each iteration; no
    /// counter is persisted anywhere. The transcript title is set to the
    /// final stem, suffix included.
    async fn materialize(&mut self, stem: &str) -> Result<()> {
        let folder = PathBuf::from(&self.settings.history.folder);
        self.vault.create_folder(&folder).await?;

        let mut final_stem = stem.to_string();
        let mut candidate = folder.join(format!("{final_stem}.md"));
        let mut suffix = 1u32;
        while self.vault.exists(&candidate).await {
            final_stem = format!("{stem}-{suffix}");
            candidate = folder.join(format!("{final_stem}.md"));
            suffix += 1;
        }

        self.transcript.title = final_stem;
        let content = format!(
            "{}{}",
            frontmatter::encode(&self.transcript),
            render_body(&self.transcript.messages)
        );
        self.vault.create(&candidate, &content).await?;
        self.path = Some(candidate);
        Ok(())
    }

    /// The two-write persistence step: structured header update, then a
    /// full body rewrite after the closing delimiter
    async fn write_document(&self) -> Result<()> {
        let path = self.path.as_deref().unwrap_or_else(|| Path::new(""));
        let fm = Frontmatter::from_transcript(&self.transcript);
        self.vault
            .update_header(path, &move |header| {
                let extra = std::mem::take(&mut header.extra);
                *header = fm.clone();
                header.extra = extra;
            })
            .await?;
        self.vault
            .replace_body(path, &render_body(&self.transcript.messages))
            .await?;
        Ok(())
    }
}

/// Render the document body: a separating blank line, then all blocks
fn render_body(messages: &[Message]) -> String {
    let mut body = String::from("\n");
    for message in messages {
        body.push_str(&blocks::encode_message(message));
    }
    body
}
