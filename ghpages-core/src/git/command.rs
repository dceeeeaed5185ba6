//! Running the git executable for network operations
//!
//! Fetch and push go through the `git` binary rather than libgit2 so that
//! `GIT_SSH_COMMAND` and `~/.netrc` apply exactly as they would in a shell.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::credentials::Transport;
use crate::{Error, Result};

/// Captured result of a git invocation, with secrets already scrubbed
#[derive(Debug, Clone)]
pub(crate) struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// Trimmed stderr, falling back to stdout when stderr is empty
    pub fn message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }

    fn combined_lowercase(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).to_lowercase()
    }
}

/// Run `git <args>` in `cwd` with the transport's environment
pub(crate) fn run_git<I, S>(
    program: &str,
    cwd: &Path,
    args: I,
    transport: &Transport,
) -> Result<GitOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        // stable, English messages for classification
        .env("LC_ALL", "C")
        .env("LANGUAGE", "C");

    for (key, value) in transport.envs() {
        cmd.env(key, value);
    }

    let output = cmd.output().map_err(|e| Error::Command {
        program: program.to_string(),
        source: e,
    })?;

    let result = GitOutput {
        success: output.status.success(),
        stdout: transport.scrub(&String::from_utf8_lossy(&output.stdout)),
        stderr: transport.scrub(&String::from_utf8_lossy(&output.stderr)),
    };

    debug!(
        success = result.success,
        status = ?output.status.code(),
        "git finished"
    );

    Ok(result)
}

/// Why a fetch of the target branch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchFailure {
    /// The branch does not exist upstream yet
    BranchMissing,
    Authentication,
    Other,
}

/// Why a push was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushFailure {
    /// Non-fast-forward or concurrent update
    Rejected,
    Authentication,
    /// Network or other transport failure
    Transport,
}

const MISSING_REF_PATTERNS: &[&str] = &["couldn't find remote ref", "could not find remote ref"];

const AUTH_PATTERNS: &[&str] = &[
    "authentication failed",
    "permission denied",
    "could not read username",
    "could not read password",
    "terminal prompts disabled",
    "invalid username or password",
    "the requested url returned error: 401",
    "the requested url returned error: 403",
    "host key verification failed",
];

const REJECTED_PATTERNS: &[&str] = &[
    "[rejected]",
    "[remote rejected]",
    "non-fast-forward",
    "fetch first",
    "stale info",
    "updates were rejected",
];

fn contains_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}

pub(crate) fn classify_fetch(output: &GitOutput) -> FetchFailure {
    let text = output.combined_lowercase();

    if contains_any(&text, MISSING_REF_PATTERNS) {
        FetchFailure::BranchMissing
    } else if contains_any(&text, AUTH_PATTERNS) {
        FetchFailure::Authentication
    } else {
        FetchFailure::Other
    }
}

pub(crate) fn classify_push(output: &GitOutput) -> PushFailure {
    let text = output.combined_lowercase();

    // rejection wins: a rejected push still authenticated successfully
    if contains_any(&text, REJECTED_PATTERNS) {
        PushFailure::Rejected
    } else if contains_any(&text, AUTH_PATTERNS) {
        PushFailure::Authentication
    } else {
        PushFailure::Transport
    }
}
