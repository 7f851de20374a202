//! Flarelog - Markdown-backed chat transcript persistence
//!
//! This library persists chat transcripts as human-editable markdown
//! documents: a YAML-ish frontmatter header carries transcript metadata,
//! and each message is a `## Role` block with its generation settings
//! embedded in a trailing HTML comment. On top of the document format it
//! provides a store with deduplicating auto-save and collision-avoiding
//! file names, a retrying title-generation workflow with a transactional
//! file rename, and a templated export renderer.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `transcript`: Document model, frontmatter and block codecs, and the
//!   store that owns dirty tracking, dedup, and the rename transaction
//! - `vault`: File collaborator trait with disk and in-memory backends
//! - `title`: Title suggestion workflow over a completion provider
//! - `export`: Templated rendering into shareable markdown
//! - `providers`: Completion-backend trait for title generation
//! - `config`: Settings loading and validation
//! - `error`: Error types and result aliases
//!
//! # Example
//!
//! ```no_run
//! use flarelog::{MessageDraft, Settings, TranscriptStore};
//! use flarelog::vault::DiskVault;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load("flarelog.yaml")?;
//!     settings.validate()?;
//!
//!     let vault = Arc::new(DiskVault::new());
//!     let mut store = TranscriptStore::create_new(vault, settings, None).await?;
//!     store.add_message(MessageDraft::user("Hello!")).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod providers;
pub mod title;
pub mod transcript;
pub mod vault;

pub use config::{DateFormat, DedupPolicy, ExportConfig, Settings};
pub use error::{FlarelogError, Result};
pub use providers::{Provider, TitleRequest};
pub use title::{TitleGenerator, TitleState};
pub use transcript::{
    GenerationSettings, Message, MessageDraft, Role, SettingsOverride, Transcript,
    TranscriptStore,
};
pub use vault::{DiskVault, MemoryVault, Vault};
