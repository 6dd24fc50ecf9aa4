//! Operation results handed back to callers
//!
//! Every push, pull or sync call ends in exactly one [`SyncResult`]. Failures
//! never carry partial counts.

use std::fmt;

/// Which engine operation produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Push,
    Pull,
    Sync,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::Push => "push",
            SyncOperation::Pull => "pull",
            SyncOperation::Sync => "sync",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "push" => Some(SyncOperation::Push),
            "pull" => Some(SyncOperation::Pull),
            "sync" => Some(SyncOperation::Sync),
            _ => None,
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Owner, token or repository missing; nothing was attempted
    NotConfigured,
    /// Another operation is in flight on this engine
    Busy,
    /// The repository could neither be reached nor created
    RepositoryUnavailable,
    /// The GitHub API rejected a request or could not be reached
    Remote,
    /// Local I/O or an unexpected error inside the operation
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotConfigured => "not_configured",
            FailureKind::Busy => "busy",
            FailureKind::RepositoryUnavailable => "repository_unavailable",
            FailureKind::Remote => "remote",
            FailureKind::Internal => "internal",
        }
    }
}

/// Outcome of one push, pull or sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub success: bool,
    pub message: String,
    pub files_uploaded: usize,
    pub files_downloaded: usize,
    /// Never populated: deletions are not propagated in either direction
    pub files_deleted: usize,
    pub failure: Option<FailureKind>,
}

impl SyncResult {
    pub fn success(message: impl Into<String>, files_uploaded: usize, files_downloaded: usize) -> Self {
        Self {
            success: true,
            message: message.into(),
            files_uploaded,
            files_downloaded,
            files_deleted: 0,
            failure: None,
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            files_uploaded: 0,
            files_downloaded: 0,
            files_deleted: 0,
            failure: Some(kind),
        }
    }

    pub fn not_configured() -> Self {
        Self::failure(
            FailureKind::NotConfigured,
            "GitHub is not configured: owner, token and repository are required",
        )
    }

    pub fn busy() -> Self {
        Self::failure(FailureKind::Busy, "A sync operation is already in progress")
    }

    pub fn is_busy(&self) -> bool {
        self.failure == Some(FailureKind::Busy)
    }

    /// Total number of files moved in either direction
    pub fn files_transferred(&self) -> usize {
        self.files_uploaded + self.files_downloaded
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success {
            write!(
                f,
                "{} ({} uploaded, {} downloaded)",
                self.message, self.files_uploaded, self.files_downloaded
            )
        } else {
            write!(f, "{}", self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reports_zero_counts() {
        let result = SyncResult::failure(FailureKind::Remote, "HTTP 500");
        assert!(!result.success);
        assert_eq!(result.files_uploaded, 0);
        assert_eq!(result.files_downloaded, 0);
        assert_eq!(result.files_deleted, 0);
        assert_eq!(result.failure, Some(FailureKind::Remote));
    }

    #[test]
    fn test_busy_and_not_configured() {
        assert!(SyncResult::busy().is_busy());
        assert!(!SyncResult::not_configured().is_busy());
        assert_eq!(
            SyncResult::not_configured().failure,
            Some(FailureKind::NotConfigured)
        );
    }

    #[test]
    fn test_success_counts() {
        let result = SyncResult::success("Synced", 3, 2);
        assert!(result.success);
        assert_eq!(result.files_transferred(), 5);
        assert_eq!(result.files_deleted, 0);
        assert!(result.failure.is_none());
        assert_eq!(result.to_string(), "Synced (3 uploaded, 2 downloaded)");
    }

    #[test]
    fn test_operation_names_round_trip() {
        for op in [SyncOperation::Push, SyncOperation::Pull, SyncOperation::Sync] {
            assert_eq!(SyncOperation::parse(op.as_str()), Some(op));
        }
        assert_eq!(SyncOperation::parse("merge"), None);
    }
}
