//! Error types for gh-pages publishing

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for publishing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for publishing operations
///
/// Messages never carry credential material: URLs are redacted and captured
/// git output is scrubbed before it lands here.
#[derive(Error, Debug)]
pub enum Error {
    /// The remote URL could not be parsed or cannot carry credentials
    #[error("Invalid remote URL: {url}")]
    InvalidRemoteUrl { url: String },

    /// Writing the SSH key or netrc record failed
    #[error("Failed to materialize credentials at {}: {source}", path.display())]
    CredentialMaterialization {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fetching the target branch failed for a reason other than the branch being absent
    #[error("Fetch from {remote} failed: {message}")]
    Fetch { remote: String, message: String },

    /// A symbolic link loop was found while walking the source tree
    #[error("Symlink cycle detected at {}", path.display())]
    SyncCycle { path: PathBuf },

    /// Generic I/O failure during tree synchronization
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An exclusion pattern is not a valid glob
    #[error("Invalid exclude pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    /// The remote refused the push (non-fast-forward or concurrent update)
    #[error("Push of branch '{branch}' rejected: {message}")]
    PushRejected { branch: String, message: String },

    /// The remote refused our credentials
    #[error("Authentication to {remote} failed: {message}")]
    Authentication { remote: String, message: String },

    /// Network or transport failure while pushing
    #[error("Transport error talking to {remote}: {message}")]
    Transport { remote: String, message: String },

    /// Local repository operation failed
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// The git executable could not be run
    #[error("Failed to run {program}: {source}")]
    Command {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of [`Error`], stable for exit code mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRemoteUrl,
    CredentialMaterialization,
    Fetch,
    SyncCycle,
    Filesystem,
    PushRejected,
    Authentication,
    Transport,
    Config,
    Git,
}

impl Error {
    /// The classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRemoteUrl { .. } => ErrorKind::InvalidRemoteUrl,
            Error::CredentialMaterialization { .. } => ErrorKind::CredentialMaterialization,
            Error::Fetch { .. } => ErrorKind::Fetch,
            Error::SyncCycle { .. } => ErrorKind::SyncCycle,
            Error::Filesystem { .. } => ErrorKind::Filesystem,
            Error::PushRejected { .. } => ErrorKind::PushRejected,
            Error::Authentication { .. } => ErrorKind::Authentication,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Pattern { .. } | Error::Config(_) => ErrorKind::Config,
            Error::Git(_) | Error::Command { .. } => ErrorKind::Git,
        }
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_error_is_config_kind() {
        let err = Error::Pattern {
            pattern: "[".to_string(),
            message: "unclosed".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("'['"));
    }

    #[test]
    fn test_filesystem_error_names_path() {
        let err = Error::fs(
            "/tmp/site/index.html",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert!(err.to_string().contains("/tmp/site/index.html"));
    }
}
