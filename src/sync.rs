//! Sync Engine - Orchestrates push, pull and sync of one vault
//!
//! The engine owns the Idle/Syncing state of a vault. Each public operation
//! checks the configuration, claims the Syncing state with a single atomic
//! transition, runs its body against a configuration snapshot and always ends
//! in exactly one [`SyncResult`]. Errors and panics inside the body are turned
//! into failure results; nothing escapes the operation call.

use crate::config::Config;
use crate::content::FileContent;
use crate::filter::ExclusionFilter;
use crate::github::{BranchHead, GitHubClient, GitHubError, RemoteFile};
use crate::result::{FailureKind, SyncOperation, SyncResult};
use crate::vault::{self, vault_relative_path, FsVault, VaultStore};
use anyhow::{Context, Result};
use chrono::Local;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const IDLE: u8 = 0;
const SYNCING: u8 = 1;

/// Failures that abort an operation before any file is transferred
#[derive(Debug, Error)]
enum EngineError {
    #[error("Repository {0} could not be accessed or created")]
    RepositoryUnavailable(String),
}

/// Holds the Syncing state until dropped
struct SyncPermit<'a> {
    state: &'a AtomicU8,
}

impl<'a> SyncPermit<'a> {
    fn acquire(state: &'a AtomicU8) -> Option<Self> {
        state
            .compare_exchange(IDLE, SYNCING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { state })
    }
}

impl Drop for SyncPermit<'_> {
    fn drop(&mut self) {
        self.state.store(IDLE, Ordering::Release);
    }
}

/// The engine that moves files between a vault and its GitHub repository
pub struct SyncEngine {
    config: watch::Sender<Arc<Config>>,
    /// Fixed store; without one each operation opens the configured vault path
    store: Option<Arc<dyn VaultStore>>,
    state: AtomicU8,
}

impl SyncEngine {
    /// Create an engine over an arbitrary file store
    pub fn new(config: Config, store: Arc<dyn VaultStore>) -> Self {
        Self::with_store(config, Some(store))
    }

    /// Create an engine over the vault directory named in the configuration.
    ///
    /// The directory is resolved per operation, so a replaced configuration
    /// with a new `vault.path` takes effect on the next push, pull or sync.
    pub fn from_config(config: Config) -> Self {
        Self::with_store(config, None)
    }

    fn with_store(config: Config, store: Option<Arc<dyn VaultStore>>) -> Self {
        let (config, _) = watch::channel(Arc::new(config));
        Self {
            config,
            store,
            state: AtomicU8::new(IDLE),
        }
    }

    fn store_for(&self, config: &Config) -> Arc<dyn VaultStore> {
        match &self.store {
            Some(store) => Arc::clone(store),
            None => Arc::new(FsVault::new(config.vault_root())),
        }
    }

    /// Snapshot of the configuration the next operation will use
    pub fn config(&self) -> Arc<Config> {
        self.config.borrow().clone()
    }

    /// Replace the configuration.
    ///
    /// An operation already in flight keeps the snapshot it started with.
    pub fn update_config(&self, config: Config) {
        self.config.send_replace(Arc::new(config));
        debug!("Sync configuration replaced");
    }

    /// Receiver notified on every configuration replacement
    pub fn subscribe_config(&self) -> watch::Receiver<Arc<Config>> {
        self.config.subscribe()
    }

    pub fn is_syncing(&self) -> bool {
        self.state.load(Ordering::Acquire) == SYNCING
    }

    /// Upload every eligible local file as one commit
    pub async fn push(&self) -> SyncResult {
        self.run(SyncOperation::Push, |config| self.push_files(config))
            .await
    }

    /// Download every eligible remote file, overwriting local copies
    pub async fn pull(&self) -> SyncResult {
        self.run(SyncOperation::Pull, |config| self.pull_files(config))
            .await
    }

    /// Upload all local files, then download paths that only exist remotely
    pub async fn sync(&self) -> SyncResult {
        self.run(SyncOperation::Sync, |config| self.sync_files(config))
            .await
    }

    /// Run one of the operations
    pub async fn execute(&self, operation: SyncOperation) -> SyncResult {
        match operation {
            SyncOperation::Push => self.push().await,
            SyncOperation::Pull => self.pull().await,
            SyncOperation::Sync => self.sync().await,
        }
    }

    async fn run<F, Fut>(&self, operation: SyncOperation, body: F) -> SyncResult
    where
        F: FnOnce(Arc<Config>) -> Fut,
        Fut: Future<Output = Result<SyncResult>>,
    {
        let config = self.config();
        if !config.is_configured() {
            warn!("Skipping {}: GitHub is not configured", operation);
            return SyncResult::not_configured();
        }

        let _permit = match SyncPermit::acquire(&self.state) {
            Some(permit) => permit,
            None => {
                info!("Skipping {}: another operation is in progress", operation);
                return SyncResult::busy();
            }
        };

        let start_time = Instant::now();
        info!("Starting {} with {}", operation, config.github.repository);

        let result = match AssertUnwindSafe(body(config)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("{} failed: {:#}", operation, e);
                failure_from_error(&e)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("{} panicked: {}", operation, message);
                SyncResult::failure(FailureKind::Internal, message)
            }
        };

        info!(
            "{} finished in {:.2}s: {}",
            operation,
            start_time.elapsed().as_secs_f64(),
            result
        );

        result
    }

    async fn push_files(&self, config: Arc<Config>) -> Result<SyncResult> {
        let client = connect(&config).await?;
        let filter = ExclusionFilter::from_config(&config);
        let store = self.store_for(&config);

        let files = vault::collect_local_files(store.as_ref(), &filter).await?;
        if files.is_empty() {
            return Ok(SyncResult::success("No files to push", 0, 0));
        }

        let message = config.render_commit_message(Local::now());
        client
            .batch_upload(&files, &message)
            .await
            .context("Failed to upload files")?;

        Ok(SyncResult::success(
            format!("Pushed {} files to {}", files.len(), client.full_name()),
            files.len(),
            0,
        ))
    }

    async fn pull_files(&self, config: Arc<Config>) -> Result<SyncResult> {
        let client = GitHubClient::new(&config.github)?;
        let filter = ExclusionFilter::from_config(&config);
        let store = self.store_for(&config);

        let remote = remote_files(&client).await?;
        let mut downloaded = 0;
        for file in &remote {
            if filter.is_excluded(&file.path) {
                debug!("Excluded from download: {}", file.path);
                continue;
            }
            if download(store.as_ref(), &client, &file.path).await {
                downloaded += 1;
            }
        }

        Ok(SyncResult::success(
            format!("Pulled {} files from {}", downloaded, client.full_name()),
            0,
            downloaded,
        ))
    }

    async fn sync_files(&self, config: Arc<Config>) -> Result<SyncResult> {
        let client = connect(&config).await?;
        let filter = ExclusionFilter::from_config(&config);
        let store = self.store_for(&config);

        let local_paths = store
            .list_files()
            .await
            .context("Failed to list vault files")?;
        let remote = remote_files(&client).await?;

        let files = vault::read_files(store.as_ref(), &filter, &local_paths).await;
        if !files.is_empty() {
            let message = config.render_commit_message(Local::now());
            client
                .batch_upload(&files, &message)
                .await
                .context("Failed to upload files")?;
        }

        let local: HashSet<&str> = local_paths.iter().map(String::as_str).collect();
        let mut downloaded = 0;
        for file in &remote {
            if local.contains(file.path.as_str()) || filter.is_excluded(&file.path) {
                continue;
            }
            if download(store.as_ref(), &client, &file.path).await {
                downloaded += 1;
            }
        }

        Ok(SyncResult::success(
            format!("Synced with {}", client.full_name()),
            files.len(),
            downloaded,
        ))
    }
}

/// Fetch one remote file into the vault; failures are logged and skipped
async fn download(store: &dyn VaultStore, client: &GitHubClient, path: &str) -> bool {
    if vault_relative_path(path).is_none() {
        warn!("Refusing to write remote path outside the vault: {}", path);
        return false;
    }

    let bytes = match client.file_content(path).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            warn!("Remote file disappeared before download: {}", path);
            return false;
        }
        Err(e) => {
            warn!("Failed to download {}: {}", path, e);
            return false;
        }
    };

    let content = FileContent::from_bytes(path, bytes);
    match vault::write_file(store, path, &content).await {
        Ok(()) => {
            debug!("Downloaded {} ({} bytes)", path, content.len());
            true
        }
        Err(e) => {
            warn!("Failed to write {}: {:#}", path, e);
            false
        }
    }
}

/// Build a client and make sure its repository exists
async fn connect(config: &Config) -> Result<GitHubClient> {
    let client = GitHubClient::new(&config.github)?;
    if !client.ensure_repository().await {
        return Err(EngineError::RepositoryUnavailable(client.full_name()).into());
    }
    Ok(client)
}

/// Every blob on the branch, or nothing for a branch without history
async fn remote_files(client: &GitHubClient) -> Result<Vec<RemoteFile>> {
    match client.latest_commit().await? {
        BranchHead::Unborn => {
            info!("{} has no commits yet", client.full_name());
            Ok(Vec::new())
        }
        BranchHead::Commit(commit) => {
            let tree = client.tree_sha(&commit).await?;
            Ok(client.list_tree(&tree, true).await?)
        }
    }
}

fn failure_from_error(error: &anyhow::Error) -> SyncResult {
    let kind = if error.downcast_ref::<EngineError>().is_some() {
        FailureKind::RepositoryUnavailable
    } else if error.chain().any(|cause| cause.is::<GitHubError>()) {
        FailureKind::Remote
    } else {
        FailureKind::Internal
    };
    SyncResult::failure(kind, format!("{:#}", error))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "Unknown error".to_string()
    }
}
