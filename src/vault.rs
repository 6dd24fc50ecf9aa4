//! Local vault access
//!
//! The engine only talks to the vault through [`VaultStore`], which mirrors the
//! capabilities a host application offers: enumerate, read, write and create
//! folders. [`FsVault`] implements it on top of a plain directory.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use path_clean::PathClean;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::content::{is_binary_path, FileContent, LocalFile};
use crate::filter::ExclusionFilter;

/// File-store capability consumed by the sync engine.
///
/// All paths are vault-relative and use `/` as separator.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VaultStore: Send + Sync {
    /// Every file in the vault, in no particular order
    async fn list_files(&self) -> Result<Vec<String>>;

    async fn read_text(&self, path: &str) -> Result<String>;

    async fn read_binary(&self, path: &str) -> Result<Vec<u8>>;

    /// Create or overwrite a text file
    async fn write_text(&self, path: &str, text: &str) -> Result<()>;

    /// Create or overwrite a binary file
    async fn write_binary(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Create a folder and its parents if missing
    async fn create_folder(&self, path: &str) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;
}

/// Vault stored in a directory on disk
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = vault_relative_path(path)
            .ok_or_else(|| anyhow!("Path escapes the vault root: {}", path))?;
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl VaultStore for FsVault {
    async fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();

                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    match to_vault_path(&self.root, &path) {
                        Some(relative) => files.push(relative),
                        None => warn!("Skipping file with non UTF-8 path: {}", path.display()),
                    }
                }
            }
        }

        debug!("Found {} files under {}", files.len(), self.root.display());
        Ok(files)
    }

    async fn read_text(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        tokio::fs::read_to_string(&full)
            .await
            .with_context(|| format!("Failed to read text file: {}", path))
    }

    async fn read_binary(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full)
            .await
            .with_context(|| format!("Failed to read binary file: {}", path))
    }

    async fn write_text(&self, path: &str, text: &str) -> Result<()> {
        let full = self.resolve(path)?;
        tokio::fs::write(&full, text)
            .await
            .with_context(|| format!("Failed to write text file: {}", path))
    }

    async fn write_binary(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        tokio::fs::write(&full, bytes)
            .await
            .with_context(|| format!("Failed to write binary file: {}", path))
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .with_context(|| format!("Failed to create folder: {}", path))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&full).await.unwrap_or(false))
    }
}

/// Normalise a vault-relative path, rejecting anything that leaves the vault
pub fn vault_relative_path(path: &str) -> Option<PathBuf> {
    let cleaned = Path::new(path).clean();
    let inside = cleaned
        .components()
        .all(|component| matches!(component, Component::Normal(_)));

    if inside && cleaned.components().next().is_some() {
        Some(cleaned)
    } else {
        None
    }
}

fn to_vault_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect();
    parts.map(|parts| parts.join("/"))
}

/// Read one file, choosing text or binary by extension.
///
/// A file without a binary extension that is not valid UTF-8 is carried as
/// binary, the same way downloads are classified.
pub async fn read_file(store: &dyn VaultStore, path: &str) -> Result<FileContent> {
    if is_binary_path(path) {
        return store.read_binary(path).await.map(FileContent::Binary);
    }

    match store.read_text(path).await {
        Ok(text) => Ok(FileContent::Text(text)),
        Err(text_error) => match store.read_binary(path).await {
            Ok(bytes) => {
                debug!("Reading {} as binary: {:#}", path, text_error);
                Ok(FileContent::from_bytes(path, bytes))
            }
            Err(_) => Err(text_error),
        },
    }
}

/// Enumerate the vault, drop excluded paths and read what remains.
///
/// Files that cannot be read are logged and left out.
pub async fn collect_local_files(
    store: &dyn VaultStore,
    filter: &ExclusionFilter,
) -> Result<Vec<LocalFile>> {
    let paths = store
        .list_files()
        .await
        .context("Failed to list vault files")?;
    Ok(read_files(store, filter, &paths).await)
}

/// Read the non-excluded subset of `paths` in path order
pub async fn read_files(
    store: &dyn VaultStore,
    filter: &ExclusionFilter,
    paths: &[String],
) -> Vec<LocalFile> {
    let mut paths: Vec<&String> = paths.iter().collect();
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        if filter.is_excluded(path) {
            debug!("Excluded from upload: {}", path);
            continue;
        }

        match read_file(store, path).await {
            Ok(content) => files.push(LocalFile::new(path.as_str(), content)),
            Err(e) => warn!("Skipping unreadable file {}: {:#}", path, e),
        }
    }

    files
}

/// Write downloaded content into the vault, creating parent folders first
pub async fn write_file(store: &dyn VaultStore, path: &str, content: &FileContent) -> Result<()> {
    if let Some((parent, _)) = path.rsplit_once('/') {
        if !parent.is_empty() && !store.exists(parent).await? {
            store.create_folder(parent).await?;
        }
    }

    match content {
        FileContent::Text(text) => store.write_text(path, text).await,
        FileContent::Binary(bytes) => store.write_binary(path, bytes).await,
    }
}
