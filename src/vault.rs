//! File collaborator abstraction
//!
//! The persistence engine never touches the file system directly; it goes
//! through the [`Vault`] trait, whose individual calls are treated as
//! atomic. [`DiskVault`] is the production implementation on `tokio::fs`;
//! [`MemoryVault`] is an in-memory implementation with failure injection,
//! used by tests and embeddable by hosts that keep documents elsewhere.

use crate::error::{FlarelogError, Result};
use crate::transcript::frontmatter::{self, Frontmatter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Mutator applied to a document's decoded header by `update_header`
pub type HeaderMutator<'a> = &'a (dyn Fn(&mut Frontmatter) + Send + Sync);

fn persistence_error(operation: &str, path: &Path, message: impl ToString) -> anyhow::Error {
    FlarelogError::Persistence {
        operation: operation.to_string(),
        path: path.display().to_string(),
        message: message.to_string(),
    }
    .into()
}

/// File collaborator consumed by the transcript store
///
/// Implementations must make each call individually atomic; no locking is
/// performed across calls (see the crate-level concurrency notes).
#[async_trait]
pub trait Vault: Send + Sync {
    /// Whether a file exists at `path`
    async fn exists(&self, path: &Path) -> bool;

    /// List the files directly inside `folder`
    async fn list(&self, folder: &Path) -> Result<Vec<PathBuf>>;

    /// Create a new file; fails if `path` already exists
    async fn create(&self, path: &Path, content: &str) -> Result<()>;

    /// Read a file's full text
    async fn read(&self, path: &Path) -> Result<String>;

    /// Overwrite a file's full text
    async fn modify(&self, path: &Path, content: &str) -> Result<()>;

    /// Rename a file
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Create a folder (and any missing parents)
    async fn create_folder(&self, path: &Path) -> Result<()>;

    /// Apply a structured update to the document's frontmatter block
    ///
    /// The body after the closing delimiter is preserved byte for byte. A
    /// document without a header gets one prepended.
    async fn update_header(&self, path: &Path, apply: HeaderMutator<'_>) -> Result<()> {
        let content = self.read(path).await?;
        let (mut header, body) = match frontmatter::split_document(&content) {
            Some((header_body, body)) => (Frontmatter::parse_body(header_body), body.to_string()),
            None => (Frontmatter::default(), content.clone()),
        };
        apply(&mut header);
        let updated = format!("{}{}", header.render(), body);
        self.modify(path, &updated).await
    }

    /// Replace everything after the frontmatter's closing delimiter
    ///
    /// The header block is preserved byte for byte. A document without a
    /// header is replaced wholesale.
    async fn replace_body(&self, path: &Path, body: &str) -> Result<()> {
        let content = self.read(path).await?;
        let updated = match frontmatter::split_document(&content) {
            Some((header_body, _)) => format!(
                "{}{}\n{}\n{}",
                frontmatter::DELIMITER,
                format!("\n{}", header_body).trim_end_matches('\n'),
                frontmatter::DELIMITER,
                body
            ),
            None => body.to_string(),
        };
        self.modify(path, &updated).await
    }
}

/// Disk-backed vault on `tokio::fs`
///
/// # Examples
///
/// ```no_run
/// use flarelog::vault::{DiskVault, Vault};
/// use std::path::Path;
///
/// # async fn example() -> flarelog::Result<()> {
/// let vault = DiskVault::new();
/// vault.create_folder(Path::new("history")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Clone)]
pub struct DiskVault;

impl DiskVault {
    /// Create a disk vault
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Vault for DiskVault {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn list(&self, folder: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(folder)
            .await
            .map_err(|e| persistence_error("list", folder, e))?;
        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| persistence_error("list", folder, e))?
        {
            let path = entry.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn create(&self, path: &Path, content: &str) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| persistence_error("create", path, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| persistence_error("create", path, e))?;
        Ok(())
    }

    async fn read(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| persistence_error("read", path, e))
    }

    async fn modify(&self, path: &Path, content: &str) -> Result<()> {
        tokio::fs::write(path, content)
            .await
            .map_err(|e| persistence_error("modify", path, e))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        tokio::fs::rename(from, to)
            .await
            .map_err(|e| persistence_error("rename", from, e))
    }

    async fn create_folder(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| persistence_error("create_folder", path, e))
    }
}

/// In-memory vault with failure injection
///
/// Stores documents in a map. Tests flip the failure switches to exercise
/// rollback paths (e.g. a failing rename during the title transaction).
#[derive(Debug, Default)]
pub struct MemoryVault {
    files: Mutex<HashMap<PathBuf, String>>,
    fail_rename: AtomicBool,
    fail_modify: AtomicBool,
}

impl MemoryVault {
    /// Create an empty in-memory vault
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without going through `create`
    pub fn seed(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files
            .lock()
            .expect("vault lock poisoned")
            .insert(path.into(), content.into());
    }

    /// Current content of a document, if present
    pub fn contents(&self, path: &Path) -> Option<String> {
        self.files
            .lock()
            .expect("vault lock poisoned")
            .get(path)
            .cloned()
    }

    /// All stored paths, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .lock()
            .expect("vault lock poisoned")
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Make every subsequent `rename` call fail
    pub fn set_fail_rename(&self, fail: bool) {
        self.fail_rename.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `modify` call fail
    pub fn set_fail_modify(&self, fail: bool) {
        self.fail_modify.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Vault for MemoryVault {
    async fn exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .expect("vault lock poisoned")
            .contains_key(path)
    }

    async fn list(&self, folder: &Path) -> Result<Vec<PathBuf>> {
        let mut paths: Vec<PathBuf> = self
            .files
            .lock()
            .expect("vault lock poisoned")
            .keys()
            .filter(|p| p.parent() == Some(folder))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn create(&self, path: &Path, content: &str) -> Result<()> {
        let mut files = self.files.lock().expect("vault lock poisoned");
        if files.contains_key(path) {
            return Err(persistence_error("create", path, "file already exists"));
        }
        files.insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    async fn read(&self, path: &Path) -> Result<String> {
        self.files
            .lock()
            .expect("vault lock poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| persistence_error("read", path, "file not found"))
    }

    async fn modify(&self, path: &Path, content: &str) -> Result<()> {
        if self.fail_modify.load(Ordering::SeqCst) {
            return Err(persistence_error("modify", path, "injected failure"));
        }
        let mut files = self.files.lock().expect("vault lock poisoned");
        if !files.contains_key(path) {
            return Err(persistence_error("modify", path, "file not found"));
        }
        files.insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if self.fail_rename.load(Ordering::SeqCst) {
            return Err(persistence_error("rename", from, "injected failure"));
        }
        let mut files = self.files.lock().expect("vault lock poisoned");
        if files.contains_key(to) {
            return Err(persistence_error("rename", from, "target already exists"));
        }
        let content = files
            .remove(from)
            .ok_or_else(|| persistence_error("rename", from, "file not found"))?;
        files.insert(to.to_path_buf(), content);
        Ok(())
    }

    async fn create_folder(&self, _path: &Path) -> Result<()> {
        // Folders are implicit in the path map.
        Ok(())
    }
}
