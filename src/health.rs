//! Preflight checks for vaultsync
//!
//! `vaultsync doctor` runs these before the user commits to a push or an
//! auto-sync loop.

use crate::config::{Config, MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES};
use crate::github::GitHubClient;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Owner, token and repository present
    pub configuration: CheckResult,
    /// Vault directory exists
    pub vault_dir: CheckResult,
    /// Repository reachable with the token
    pub repository: CheckResult,
    /// Auto-sync interval (warning only)
    pub interval: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub async fn run(config: &Config) -> Self {
        Self {
            configuration: Self::check_configuration(config),
            vault_dir: Self::check_vault_dir(config),
            repository: Self::check_repository(config).await,
            interval: Self::check_interval(config),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.configuration.passed && self.vault_dir.passed && self.repository.passed
    }

    /// Failed checks, warnings excluded
    pub fn errors(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, check)| check)
            .filter(|r| !r.passed && !r.is_warning)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&CheckResult> {
        self.all_checks()
            .into_iter()
            .map(|(_, check)| check)
            .filter(|r| r.is_warning)
            .collect()
    }

    fn check_configuration(config: &Config) -> CheckResult {
        let github = &config.github;
        let missing: Vec<&str> = [
            ("owner", github.owner.as_str()),
            ("token", github.token.as_str()),
            ("repository", github.repository.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            CheckResult::ok_with_details(
                "GitHub settings present",
                format!("{}/{} on {}", github.owner, github.repository, github.branch),
            )
        } else {
            CheckResult::error_with_details(
                "GitHub settings incomplete",
                format!(
                    "Missing: {}\nRun: vaultsync init, or set GITHUB_TOKEN",
                    missing.join(", ")
                ),
            )
        }
    }

    fn check_vault_dir(config: &Config) -> CheckResult {
        let root = config.vault_root();
        if root.is_dir() {
            CheckResult::ok_with_details("Vault directory exists", root.display().to_string())
        } else {
            CheckResult::error_with_details(
                "Vault directory does not exist",
                format!("Run: mkdir -p {}", root.display()),
            )
        }
    }

    async fn check_repository(config: &Config) -> CheckResult {
        if !config.is_configured() {
            return CheckResult::error_with_details(
                "Repository not checked",
                "GitHub settings are incomplete",
            );
        }

        let client = match GitHubClient::new(&config.github) {
            Ok(client) => client,
            Err(e) => {
                return CheckResult::error_with_details("Invalid GitHub settings", e.to_string())
            }
        };

        if client.verify_access().await {
            CheckResult::ok_with_details("Repository reachable", client.full_name())
        } else {
            CheckResult::error_with_details(
                "Repository not reachable",
                format!(
                    "{} does not exist or the token cannot read it.\nA push or sync creates it when the token allows.",
                    client.full_name()
                ),
            )
        }
    }

    fn check_interval(config: &Config) -> CheckResult {
        if config.interval_in_recommended_range() {
            CheckResult::ok(format!(
                "Auto-sync every {} minutes",
                config.sync.interval_minutes
            ))
        } else {
            CheckResult::warning_with_details(
                format!(
                    "Auto-sync interval of {} minutes is unusual",
                    config.sync.interval_minutes
                ),
                format!(
                    "Recommended range is {}-{} minutes",
                    MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES
                ),
            )
        }
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 4] {
        [
            ("Configuration", &self.configuration),
            ("Vault Directory", &self.vault_dir),
            ("Repository Access", &self.repository),
            ("Sync Interval", &self.interval),
        ]
    }
}
