//! vaultsync - Keep a local document vault in a GitHub repository
//!
//! vaultsync mirrors a folder of notes and attachments to a GitHub repository
//! using only the REST and Git Data APIs. No local git installation is needed.
//!
//! ## Core Features
//!
//! - **Atomic pushes**: all changed files land in a single commit
//! - **Binary-safe transfer**: images, PDFs and media travel as base64 blobs
//! - **Exclusion rules**: folder prefixes and file patterns, applied both ways
//! - **Single-flight engine**: at most one push, pull or sync at a time
//! - **Auto-sync**: periodic sync that skips ticks while busy
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`github`]: GitHub REST/Git Data client
//! - [`content`]: Text/binary classification and transport encoding
//! - [`filter`]: Exclusion rules
//! - [`vault`]: File-store trait and on-disk vault
//! - [`sync`]: The push/pull/sync engine
//! - [`result`]: Operation results
//! - [`daemon`]: Auto-sync loop
//! - [`health`]: Preflight checks
//! - [`history`]: SQLite log of past operations

pub mod config;
pub mod content;
pub mod daemon;
pub mod filter;
pub mod github;
pub mod health;
pub mod history;
pub mod result;
pub mod sync;
pub mod vault;

pub use config::Config;
pub use content::{FileContent, LocalFile};
pub use daemon::{AutoSync, DaemonStatus};
pub use filter::ExclusionFilter;
pub use github::{BranchHead, FileLookup, GitHubClient, GitHubError};
pub use health::HealthCheck;
pub use history::SyncHistory;
pub use result::{FailureKind, SyncOperation, SyncResult};
pub use sync::SyncEngine;
pub use vault::{FsVault, VaultStore};
