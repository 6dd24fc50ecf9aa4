//! Common test utilities and helpers for vaultsync tests
#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vaultsync::Config;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const OWNER: &str = "octo";
pub const REPO: &str = "vault";
pub const TOKEN: &str = "ghp_test_token";

/// Test configuration helper
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
    pub vault_dir: PathBuf,
    pub original_env: Vec<(String, Option<String>)>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_dir = temp_dir.path().join("vaultsync");
        let vault_dir = temp_dir.path().join("vault");
        std::fs::create_dir_all(&config_dir).expect("Failed to create config dir");
        std::fs::create_dir_all(&vault_dir).expect("Failed to create vault dir");

        // Store original environment variables
        let env_vars = vec!["GITHUB_TOKEN", "XDG_CONFIG_HOME", "XDG_DATA_HOME"];
        let original_env = env_vars
            .iter()
            .map(|var| (var.to_string(), env::var(var).ok()))
            .collect();

        Self {
            temp_dir,
            config_dir,
            vault_dir,
            original_env,
        }
    }

    pub fn set_env_var(&self, key: &str, value: &str) {
        env::set_var(key, value);
    }

    pub fn remove_env_var(&self, key: &str) {
        env::remove_var(key);
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.yml")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().join("data")
    }

    pub fn create_test_config(&self, content: &str) -> PathBuf {
        let config_path = self.config_path();
        std::fs::write(&config_path, content).expect("Failed to write test config");
        config_path
    }

    /// Config file with a vault but no GitHub settings
    pub fn create_unconfigured_config(&self) -> PathBuf {
        let content = format!(
            r#"
vault:
  path: "{}"
history:
  path: "{}"
"#,
            self.vault_dir.display(),
            self.data_dir().join("history.db").display()
        );
        self.create_test_config(&content)
    }

    /// Config file pointing at a mock GitHub API
    pub fn create_mock_config(&self, api_url: &str) -> PathBuf {
        let content = format!(
            r#"
vault:
  path: "{}"
github:
  owner: "{}"
  token: "{}"
  repository: "{}"
  api_url: "{}"
history:
  path: "{}"
"#,
            self.vault_dir.display(),
            OWNER,
            TOKEN,
            REPO,
            api_url,
            self.data_dir().join("history.db").display()
        );
        self.create_test_config(&content)
    }

    pub fn write_vault_file(&self, relative: &str, content: &[u8]) {
        write_file(&self.vault_dir, relative, content);
    }
}

impl Drop for TestEnvironment {
    fn drop(&mut self) {
        // Restore original environment variables
        for (key, value) in &self.original_env {
            match value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

pub fn write_file(root: &Path, relative: &str, content: &[u8]) {
    let full = root.join(relative);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    std::fs::write(full, content).expect("Failed to write file");
}

/// Engine configuration aimed at a mock server and a vault directory
pub fn mock_config(api_url: &str, vault: &Path) -> Config {
    let mut config = Config::default();
    config.vault.path = vault.display().to_string();
    config.github.owner = OWNER.to_string();
    config.github.token = TOKEN.to_string();
    config.github.repository = REPO.to_string();
    config.github.api_url = api_url.to_string();
    config
}

pub fn repo_path(tail: &str) -> String {
    if tail.is_empty() {
        format!("/repos/{}/{}", OWNER, REPO)
    } else {
        format!("/repos/{}/{}/{}", OWNER, REPO, tail)
    }
}

/// GitHub-style base64: wrapped at 60 columns with a trailing newline
pub fn github_base64(bytes: &[u8]) -> String {
    let encoded = BASE64.encode(bytes);
    let mut wrapped = String::new();
    for chunk in encoded.as_bytes().chunks(60) {
        wrapped.push_str(std::str::from_utf8(chunk).expect("base64 is ascii"));
        wrapped.push('\n');
    }
    wrapped
}

pub async fn mount_repository_exists(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(repo_path("")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "full_name": format!("{}/{}", OWNER, REPO),
            "private": true,
        })))
        .mount(server)
        .await;
}

pub async fn mount_unborn_branch(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(repo_path("git/refs/heads/main")))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "message": "Git Repository is empty." })),
        )
        .mount(server)
        .await;
}

/// Branch `main` pointing at `commit`, whose root tree is `tree`
pub async fn mount_branch_head(server: &MockServer, commit: &str, tree: &str) {
    Mock::given(method("GET"))
        .and(path(repo_path("git/refs/heads/main")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ref": "refs/heads/main",
            "object": { "sha": commit, "type": "commit" },
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(repo_path(&format!("git/commits/{}", commit))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": commit,
            "tree": { "sha": tree },
        })))
        .mount(server)
        .await;
}

/// Recursive listing of `tree` with the given blob paths plus their folders
pub async fn mount_tree(server: &MockServer, tree: &str, files: &[&str]) {
    let mut entries: Vec<Value> = Vec::new();
    for file in files {
        if let Some((dir, _)) = file.rsplit_once('/') {
            entries.push(json!({ "path": dir, "type": "tree", "sha": format!("tree-{}", dir) }));
        }
        entries.push(json!({
            "path": file,
            "type": "blob",
            "sha": format!("blob-{}", file),
            "size": 10,
        }));
    }

    Mock::given(method("GET"))
        .and(path(repo_path(&format!("git/trees/{}", tree))))
        .and(query_param("recursive", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sha": tree,
            "tree": entries,
            "truncated": false,
        })))
        .mount(server)
        .await;
}

/// Contents endpoint for one file
pub async fn mount_file(server: &MockServer, file: &str, bytes: &[u8]) {
    Mock::given(method("GET"))
        .and(path(repo_path(&format!("contents/{}", file))))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "file",
            "path": file,
            "sha": format!("blob-{}", file),
            "size": bytes.len(),
            "encoding": "base64",
            "content": github_base64(bytes),
        })))
        .mount(server)
        .await;
}

/// Blob, tree, commit and ref-update endpoints answering with fixed ids
pub async fn mount_commit_chain(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(repo_path("git/blobs")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "new-blob" })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(repo_path("git/trees")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "new-tree" })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(repo_path("git/commits")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "sha": "new-commit" })))
        .mount(server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(repo_path("git/refs/heads/main")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ref": "refs/heads/main",
            "object": { "sha": "new-commit" },
        })))
        .mount(server)
        .await;
}

/// Requests the server received for a method and path
pub async fn requests_to(server: &MockServer, http_method: &str, request_path: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|request| request.method.to_string() == http_method && request.url.path() == request_path)
        .collect()
}

/// JSON body of the single request to a method and path
pub async fn single_body(server: &MockServer, http_method: &str, request_path: &str) -> Value {
    let requests = requests_to(server, http_method, request_path).await;
    assert_eq!(
        requests.len(),
        1,
        "expected one {} {}, got {}",
        http_method,
        request_path,
        requests.len()
    );
    requests[0].body_json().expect("JSON body")
}

/// Paths of the entries in a tree-creation body
pub fn tree_paths(body: &Value) -> Vec<String> {
    body["tree"]
        .as_array()
        .expect("tree array")
        .iter()
        .map(|entry| entry["path"].as_str().expect("path").to_string())
        .collect()
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
