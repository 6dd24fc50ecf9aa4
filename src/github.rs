//! GitHub REST and Git Data API client
//!
//! The client is cheap to build and holds no state between calls besides the
//! target repository coordinates. Writes of many files go through
//! [`GitHubClient::batch_upload`], which produces exactly one commit: blobs are
//! created first, then a tree layered on the current one, then a commit, and
//! finally the branch ref is force-moved. The ref update is the only step that
//! changes what other clients see.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::GitHubConfig;
use crate::content::{decode_transport, encode_transport, FileContent, LocalFile};

/// Text below this many bytes is embedded directly in tree entries
pub const INLINE_CONTENT_LIMIT: usize = 100_000;

const API_VERSION: &str = "2022-11-28";
const REGULAR_FILE_MODE: &str = "100644";
const REPOSITORY_DESCRIPTION: &str = "Vault synchronized by vaultsync";

/// Errors returned by the GitHub client
#[derive(Debug, Error)]
pub enum GitHubError {
    /// Non-success response, carrying the API's `message` when present
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected response from GitHub: {0}")]
    Decode(String),

    #[error("Invalid base64 content for {path}: {source}")]
    Encoding {
        path: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("Access token contains characters that are not allowed in a header")]
    InvalidToken,
}

impl GitHubError {
    /// HTTP status of an API error
    pub fn status(&self) -> Option<u16> {
        match self {
            GitHubError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

pub type Result<T> = std::result::Result<T, GitHubError>;

/// Head of the configured branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchHead {
    /// Branch points at this commit
    Commit(String),
    /// Branch (or the whole repository) has no history yet
    Unborn,
}

impl BranchHead {
    pub fn sha(&self) -> Option<&str> {
        match self {
            BranchHead::Commit(sha) => Some(sha),
            BranchHead::Unborn => None,
        }
    }
}

/// Result of looking up a path's current blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLookup {
    Existing { sha: String },
    Missing,
}

/// A blob listed in the remote tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub path: String,
    pub sha: String,
    pub size: Option<u64>,
}

/// One entry of a tree-creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl TreeEntry {
    /// Entry whose text content is sent inline
    pub fn inline(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: REGULAR_FILE_MODE,
            kind: "blob",
            content: Some(content.into()),
            sha: None,
        }
    }

    /// Entry referencing a blob created beforehand
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: REGULAR_FILE_MODE,
            kind: "blob",
            content: None,
            sha: Some(sha.into()),
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Deserialize)]
struct ShaRef {
    sha: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    tree: ShaRef,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    truncated: bool,
    tree: Vec<TreeItem>,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    size: Option<u64>,
}

#[derive(Deserialize)]
struct ContentResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    #[serde(default)]
    size: u64,
}

#[derive(Deserialize)]
struct BlobResponse {
    content: Option<String>,
    encoding: Option<String>,
}

/// GitHub client bound to one repository and branch
#[derive(Clone, Debug)]
pub struct GitHubClient {
    http: Client,
    api_url: Url,
    owner: String,
    repo: String,
    branch: String,
    private: bool,
}

impl GitHubClient {
    /// Create a client from the GitHub section of the configuration
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let api_url = Url::parse(config.api_url.trim_end_matches('/'))
            .map_err(|e| GitHubError::InvalidUrl(format!("{}: {}", config.api_url, e)))?;
        if api_url.cannot_be_a_base() {
            return Err(GitHubError::InvalidUrl(config.api_url.clone()));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token.trim()))
            .map_err(|_| GitHubError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

        let http = Client::builder()
            .user_agent(concat!("vaultsync/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            api_url,
            owner: config.owner.trim().to_string(),
            repo: config.repository.trim().to_string(),
            branch: config.branch.trim().to_string(),
            private: config.private,
        })
    }

    /// `owner/repo`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Check whether the repository is reachable with the current token
    pub async fn verify_access(&self) -> bool {
        let result = match self.repo_url(&[]) {
            Ok(url) => self.send(self.http.get(url)).await.map(|_| ()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                debug!("Repository {} is not accessible: {}", self.full_name(), e);
                false
            }
        }
    }

    /// Make sure the repository exists, creating it when it cannot be reached
    pub async fn ensure_repository(&self) -> bool {
        if self.verify_access().await {
            return true;
        }

        info!("Repository {} not found, creating it", self.full_name());

        match self.create_repository().await {
            Ok(()) => {
                info!(
                    "Created {} repository {}",
                    if self.private { "private" } else { "public" },
                    self.full_name()
                );
                true
            }
            Err(e) => {
                error!("Failed to create repository {}: {}", self.full_name(), e);
                false
            }
        }
    }

    async fn create_repository(&self) -> Result<()> {
        let url = self.api_path(&["user", "repos"])?;
        let body = json!({
            "name": self.repo,
            "private": self.private,
            "auto_init": true,
            "description": REPOSITORY_DESCRIPTION,
        });

        self.send(self.http.post(url).json(&body)).await?;
        Ok(())
    }

    /// Resolve the commit the branch currently points at
    pub async fn latest_commit(&self) -> Result<BranchHead> {
        let url = self.repo_url(&["git", "refs", "heads", &self.branch])?;

        match self.get_json::<Value>(url).await {
            Ok(value) => head_from_ref(value, &self.branch),
            // 409 is what GitHub answers for a repository without any commit
            Err(e) if matches!(e.status(), Some(404) | Some(409)) => {
                debug!("Branch {} of {} has no commits", self.branch, self.full_name());
                Ok(BranchHead::Unborn)
            }
            Err(e) => Err(e),
        }
    }

    /// Root tree of a commit
    pub async fn tree_sha(&self, commit_sha: &str) -> Result<String> {
        let url = self.repo_url(&["git", "commits", commit_sha])?;
        let commit: CommitResponse = self.get_json(url).await?;
        Ok(commit.tree.sha)
    }

    /// List every blob under a tree
    pub async fn list_tree(&self, tree_sha: &str, recursive: bool) -> Result<Vec<RemoteFile>> {
        let mut url = self.repo_url(&["git", "trees", tree_sha])?;
        if recursive {
            url.query_pairs_mut().append_pair("recursive", "1");
        }

        let tree: TreeResponse = self.get_json(url).await?;
        if tree.truncated {
            warn!(
                "Tree listing for {} was truncated by GitHub, some files will be missing",
                self.full_name()
            );
        }

        let files: Vec<RemoteFile> = tree
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .map(|item| RemoteFile {
                path: item.path,
                sha: item.sha,
                size: item.size,
            })
            .collect();

        debug!("Remote tree {} lists {} files", tree_sha, files.len());
        Ok(files)
    }

    /// Download a file from the branch, `None` when it does not exist
    pub async fn file_content(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.get_contents(path).await {
            Ok(body) => self.decode_contents(path, body).await.map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Look up the blob currently stored at a path
    pub async fn file_sha(&self, path: &str) -> Result<FileLookup> {
        match self.get_contents(path).await {
            Ok(body) => Ok(FileLookup::Existing { sha: body.sha }),
            Err(e) if e.is_not_found() => Ok(FileLookup::Missing),
            Err(e) => Err(e),
        }
    }

    /// Create or update a single file with its own commit
    pub async fn put_file(&self, path: &str, content: &FileContent, message: &str) -> bool {
        match self.try_put_file(path, content, message).await {
            Ok(()) => {
                debug!("Wrote {} to {}", path, self.full_name());
                true
            }
            Err(e) => {
                error!("Failed to write {} to {}: {}", path, self.full_name(), e);
                false
            }
        }
    }

    async fn try_put_file(&self, path: &str, content: &FileContent, message: &str) -> Result<()> {
        let mut body = json!({
            "message": message,
            "content": encode_transport(content.as_bytes()),
            "branch": self.branch,
        });
        if let FileLookup::Existing { sha } = self.file_sha(path).await? {
            body["sha"] = Value::String(sha);
        }

        let url = self.repo_url(&["contents", path])?;
        self.send(self.http.put(url).json(&body)).await?;
        Ok(())
    }

    /// Delete a single file; succeeds without a request when it is already gone
    pub async fn delete_file(&self, path: &str, message: &str) -> bool {
        let sha = match self.file_sha(path).await {
            Ok(FileLookup::Existing { sha }) => sha,
            Ok(FileLookup::Missing) => {
                debug!("{} is already absent from {}", path, self.full_name());
                return true;
            }
            Err(e) => {
                error!("Failed to look up {} in {}: {}", path, self.full_name(), e);
                return false;
            }
        };

        let body = json!({
            "message": message,
            "sha": sha,
            "branch": self.branch,
        });
        let result = match self.repo_url(&["contents", path]) {
            Ok(url) => self.send(self.http.delete(url).json(&body)).await.map(|_| ()),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to delete {} from {}: {}", path, self.full_name(), e);
                false
            }
        }
    }

    /// Upload content as a standalone blob
    pub async fn create_blob(&self, content: &FileContent) -> Result<String> {
        let body = match content {
            FileContent::Text(text) => json!({ "content": text, "encoding": "utf-8" }),
            FileContent::Binary(bytes) => {
                json!({ "content": encode_transport(bytes), "encoding": "base64" })
            }
        };

        let url = self.repo_url(&["git", "blobs"])?;
        let blob: ShaRef = self.post_json(url, &body).await?;
        debug!("Created blob {} ({} bytes)", blob.sha, content.len());
        Ok(blob.sha)
    }

    /// Create a tree, optionally layered on an existing one
    pub async fn create_tree(&self, base_tree: Option<&str>, entries: &[TreeEntry]) -> Result<String> {
        let mut body = json!({ "tree": entries });
        if let Some(base) = base_tree {
            body["base_tree"] = Value::String(base.to_string());
        }

        let url = self.repo_url(&["git", "trees"])?;
        let tree: ShaRef = self.post_json(url, &body).await?;
        debug!("Created tree {} with {} entries", tree.sha, entries.len());
        Ok(tree.sha)
    }

    /// Create a commit; the parents field is omitted for the first commit
    pub async fn create_commit(&self, message: &str, tree_sha: &str, parent: Option<&str>) -> Result<String> {
        let mut body = json!({ "message": message, "tree": tree_sha });
        if let Some(parent) = parent {
            body["parents"] = json!([parent]);
        }

        let url = self.repo_url(&["git", "commits"])?;
        let commit: ShaRef = self.post_json(url, &body).await?;
        debug!("Created commit {}", commit.sha);
        Ok(commit.sha)
    }

    /// Force-move the branch to a commit, creating the ref when missing
    pub async fn update_branch_ref(&self, commit_sha: &str) -> Result<()> {
        let url = self.repo_url(&["git", "refs", "heads", &self.branch])?;
        let body = json!({ "sha": commit_sha, "force": true });

        match self.send(self.http.patch(url).json(&body)).await {
            Ok(_) => Ok(()),
            // 422 "Reference does not exist"
            Err(e) if matches!(e.status(), Some(404) | Some(422)) => {
                debug!("Branch {} has no ref yet, creating it", self.branch);
                let url = self.repo_url(&["git", "refs"])?;
                let body = json!({
                    "ref": format!("refs/heads/{}", self.branch),
                    "sha": commit_sha,
                });
                self.send(self.http.post(url).json(&body)).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Commit a set of files in a single commit on top of the branch.
    ///
    /// Returns the new commit, or `None` when there was nothing to upload.
    /// Unrelated paths of the previous tree are preserved.
    pub async fn batch_upload(&self, files: &[LocalFile], message: &str) -> Result<Option<String>> {
        if files.is_empty() {
            debug!("Nothing to upload to {}", self.full_name());
            return Ok(None);
        }

        let head = self.latest_commit().await?;
        let base_tree = match head.sha() {
            Some(commit) => Some(self.tree_sha(commit).await?),
            None => None,
        };

        // Later entries for the same path replace earlier ones
        let mut entries: BTreeMap<&str, TreeEntry> = BTreeMap::new();
        for file in files {
            let entry = match &file.content {
                FileContent::Text(text) if text.len() < INLINE_CONTENT_LIMIT => {
                    TreeEntry::inline(file.path.as_str(), text.as_str())
                }
                content => {
                    let sha = self.create_blob(content).await?;
                    TreeEntry::blob(file.path.as_str(), sha)
                }
            };
            entries.insert(file.path.as_str(), entry);
        }
        let entries: Vec<TreeEntry> = entries.into_values().collect();

        let tree = self.create_tree(base_tree.as_deref(), &entries).await?;
        let commit = self.create_commit(message, &tree, head.sha()).await?;
        self.update_branch_ref(&commit).await?;

        info!(
            "Committed {} files to {}@{} ({})",
            entries.len(),
            self.full_name(),
            self.branch,
            commit
        );
        Ok(Some(commit))
    }

    async fn get_contents(&self, path: &str) -> Result<ContentResponse> {
        let mut url = self.repo_url(&["contents", path])?;
        url.query_pairs_mut().append_pair("ref", &self.branch);
        self.get_json(url).await
    }

    async fn decode_contents(&self, path: &str, body: ContentResponse) -> Result<Vec<u8>> {
        match (body.encoding.as_deref(), body.content) {
            (Some("base64"), Some(content)) => {
                decode_transport(&content).map_err(|source| GitHubError::Encoding {
                    path: path.to_string(),
                    source,
                })
            }
            _ if body.size == 0 => Ok(Vec::new()),
            // Files over 1 MB come back without inline content
            _ => {
                debug!("Content of {} not inlined, fetching blob {}", path, body.sha);
                self.blob_content(path, &body.sha).await
            }
        }
    }

    async fn blob_content(&self, path: &str, sha: &str) -> Result<Vec<u8>> {
        let url = self.repo_url(&["git", "blobs", sha])?;
        let blob: BlobResponse = self.get_json(url).await?;

        match (blob.encoding.as_deref(), blob.content) {
            (Some("base64"), Some(content)) => {
                decode_transport(&content).map_err(|source| GitHubError::Encoding {
                    path: path.to_string(),
                    source,
                })
            }
            (Some("utf-8"), Some(content)) => Ok(content.into_bytes()),
            (encoding, _) => Err(GitHubError::Decode(format!(
                "blob {} has unsupported encoding {:?}",
                sha, encoding
            ))),
        }
    }

    /// URL under `/repos/{owner}/{repo}`; `/` inside segments starts a new segment
    fn repo_url(&self, tail: &[&str]) -> Result<Url> {
        let mut segments = vec!["repos", self.owner.as_str(), self.repo.as_str()];
        segments.extend(
            tail.iter()
                .copied()
                .flat_map(|part| part.split('/'))
                .filter(|s| !s.is_empty()),
        );
        self.api_path(&segments)
    }

    fn api_path(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| GitHubError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.message)
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

        Err(GitHubError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", url.path());
        let response = self.send(self.http.get(url)).await?;
        decode_json(response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, url: Url, body: &Value) -> Result<T> {
        debug!("POST {}", url.path());
        let response = self.send(self.http.post(url).json(body)).await?;
        decode_json(response).await
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| GitHubError::Decode(e.to_string()))
}

/// Pick the branch head out of a ref lookup.
///
/// GitHub answers with a list of prefix matches when no ref matches exactly.
fn head_from_ref(value: Value, branch: &str) -> Result<BranchHead> {
    let wanted = format!("refs/heads/{}", branch);
    let found = match value {
        Value::Array(refs) => refs.into_iter().find(|r| r["ref"] == wanted.as_str()),
        other => Some(other),
    };

    match found {
        None => Ok(BranchHead::Unborn),
        Some(reference) => reference["object"]["sha"]
            .as_str()
            .map(|sha| BranchHead::Commit(sha.to_string()))
            .ok_or_else(|| GitHubError::Decode("ref without object.sha".to_string())),
    }
}
