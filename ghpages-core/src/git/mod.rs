//! Git operations for publishing
//!
//! [`VersionControl`] is the capability the publish pipeline needs from
//! version control. [`GitCli`] implements it with libgit2 for local work on
//! the working copy and the `git` executable for fetch and push.

mod command;
mod repo;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::{CommitAuthor, PublishConfig};
use crate::credentials::Transport;
use crate::{Error, Result};

use command::{classify_fetch, classify_push, run_git, FetchFailure, PushFailure};

pub use repo::{GitRepo, COMMIT_MESSAGE};

/// The on-disk clone of the target branch
#[derive(Debug, Clone)]
pub struct WorkingCopy {
    root: PathBuf,
    upstream: String,
    branch: String,
    orphan: bool,
}

impl WorkingCopy {
    pub fn new(root: impl Into<PathBuf>, upstream: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            upstream: upstream.into(),
            branch: branch.into(),
            orphan: false,
        }
    }

    /// Root of the working tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name the remote is registered under
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Branch checked out in the working copy
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Whether the branch was bootstrapped without history
    pub fn is_orphan(&self) -> bool {
        self.orphan
    }
}

/// Result of fetching the target branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The branch exists upstream and its tip was fetched
    Fetched,
    /// The branch does not exist upstream yet
    Missing,
}

/// Version control operations used by the publish pipeline
pub trait VersionControl {
    /// Open or initialize the working copy and register the remote
    fn open(&self, config: &PublishConfig) -> Result<WorkingCopy>;

    /// Shallow-fetch the target branch
    fn fetch(&self, copy: &WorkingCopy, transport: &Transport) -> Result<FetchOutcome>;

    /// Check out the fetched branch, or start an orphan branch if it was missing
    fn checkout(&self, copy: &mut WorkingCopy, outcome: FetchOutcome) -> Result<()>;

    /// Stage all changes and commit them; `None` if nothing changed
    fn commit(&self, copy: &WorkingCopy, author: &CommitAuthor) -> Result<Option<String>>;

    /// Push the target branch to the remote
    fn push(&self, copy: &WorkingCopy, transport: &Transport) -> Result<()>;
}

/// [`VersionControl`] backed by libgit2 and the git executable
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl GitCli {
    /// Create a backend running the given git executable
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl VersionControl for GitCli {
    fn open(&self, config: &PublishConfig) -> Result<WorkingCopy> {
        let repo = GitRepo::open_or_init(&config.work_directory, &config.target_branch)?;
        repo.ensure_remote(&config.upstream_name, &config.remote_url)?;

        Ok(WorkingCopy::new(
            repo.root(),
            &config.upstream_name,
            &config.target_branch,
        ))
    }

    fn fetch(&self, copy: &WorkingCopy, transport: &Transport) -> Result<FetchOutcome> {
        let refspec = format!(
            "+refs/heads/{branch}:refs/remotes/{upstream}/{branch}",
            branch = copy.branch(),
            upstream = copy.upstream()
        );
        let remote = transport.remote_arg(copy.upstream());

        info!(remote = %transport.display_url(), branch = copy.branch(), "Fetching target branch");
        let output = run_git(
            &self.program,
            copy.root(),
            ["fetch", "--depth", "1", "--no-tags", remote.as_str(), refspec.as_str()],
            transport,
        )?;

        if output.success {
            return Ok(FetchOutcome::Fetched);
        }

        match classify_fetch(&output) {
            FetchFailure::BranchMissing => {
                info!(branch = copy.branch(), "Target branch does not exist upstream yet");
                Ok(FetchOutcome::Missing)
            }
            FetchFailure::Authentication => Err(Error::Fetch {
                remote: transport.display_url().to_string(),
                message: format!("authentication failed: {}", output.message()),
            }),
            FetchFailure::Other => Err(Error::Fetch {
                remote: transport.display_url().to_string(),
                message: output.message(),
            }),
        }
    }

    fn checkout(&self, copy: &mut WorkingCopy, outcome: FetchOutcome) -> Result<()> {
        let repo = GitRepo::open(copy.root())?;

        match outcome {
            FetchOutcome::Fetched => {
                repo.reset_to_remote(copy.upstream(), copy.branch())?;
                copy.orphan = false;
            }
            FetchOutcome::Missing => {
                repo.start_orphan(copy.branch())?;
                copy.orphan = true;
            }
        }

        Ok(())
    }

    fn commit(&self, copy: &WorkingCopy, author: &CommitAuthor) -> Result<Option<String>> {
        let repo = GitRepo::open(copy.root())?;

        if repo.current_branch()?.as_deref() != Some(copy.branch()) {
            return Err(Error::Config(format!(
                "Working copy at {} is not on branch '{}'",
                copy.root().display(),
                copy.branch()
            )));
        }

        Ok(repo.commit_all(author)?.map(|oid| oid.to_string()))
    }

    fn push(&self, copy: &WorkingCopy, transport: &Transport) -> Result<()> {
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", copy.branch());
        let remote = transport.remote_arg(copy.upstream());

        info!(remote = %transport.display_url(), branch = copy.branch(), "Pushing");
        let output = run_git(
            &self.program,
            copy.root(),
            ["push", "--porcelain", remote.as_str(), refspec.as_str()],
            transport,
        )?;

        if output.success {
            info!(branch = copy.branch(), "Push succeeded");
            return Ok(());
        }

        let remote = transport.display_url().to_string();
        let message = output.message();
        match classify_push(&output) {
            PushFailure::Rejected => {
                warn!(branch = copy.branch(), "Push rejected; the remote moved since the fetch");
                Err(Error::PushRejected {
                    branch: copy.branch().to_string(),
                    message,
                })
            }
            PushFailure::Authentication => Err(Error::Authentication { remote, message }),
            PushFailure::Transport => Err(Error::Transport { remote, message }),
        }
    }
}
