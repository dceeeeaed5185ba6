//! The publish pipeline
//!
//! Stages run strictly in order and the first failure aborts the rest:
//! credentials → fetch → sync → commit → push. The push only happens when
//! the commit stage produced a commit.

use std::fmt;

use tracing::info;

use crate::config::PublishConfig;
use crate::credentials::{self, Transport};
use crate::git::{GitCli, VersionControl, WorkingCopy};
use crate::sync::{ExcludeSet, MirrorSync, SyncSummary, TreeSync};
use crate::Result;

/// What a publish run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A commit was created and pushed
    Published { commit: String, files: SyncSummary },
    /// The target branch already matched the pages directory
    NoChanges,
}

impl fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishOutcome::Published { commit, files } => write!(
                f,
                "published {} ({} copied, {} updated, {} deleted)",
                commit, files.copied, files.updated, files.deleted
            ),
            PublishOutcome::NoChanges => write!(f, "nothing to publish"),
        }
    }
}

/// Publishes the pages directory of a [`PublishConfig`]
#[derive(Debug)]
pub struct Publisher<V = GitCli, S = MirrorSync> {
    config: PublishConfig,
    vcs: V,
    tree_sync: S,
}

impl Publisher {
    /// Publisher using the git executable named in the config and the in-process mirror
    pub fn new(config: PublishConfig) -> Self {
        let vcs = GitCli::new(config.git_path.clone());
        Self::with_backends(config, vcs, MirrorSync)
    }
}

impl<V: VersionControl, S: TreeSync> Publisher<V, S> {
    pub fn with_backends(config: PublishConfig, vcs: V, tree_sync: S) -> Self {
        Self {
            config,
            vcs,
            tree_sync,
        }
    }

    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    /// Write credential material and build the transport for network operations
    pub fn materialize(&self) -> Result<Transport> {
        info!(mode = self.config.credentials.mode(), "Materializing credentials");
        credentials::materialize(
            &self.config.credentials,
            &self.config.remote_url,
            &self.config.credential_paths,
        )
    }

    /// Obtain a working copy whose current branch is the target branch
    pub fn fetch(&self, transport: &Transport) -> Result<WorkingCopy> {
        let mut copy = self.vcs.open(&self.config)?;
        let outcome = self.vcs.fetch(&copy, transport)?;
        self.vcs.checkout(&mut copy, outcome)?;
        Ok(copy)
    }

    /// Mirror the pages directory onto the working copy
    pub fn sync(&self, copy: &WorkingCopy) -> Result<SyncSummary> {
        let excludes = ExcludeSet::new(self.config.excludes.as_slice())?;
        let target = self.config.sync_root();

        info!(
            source = %self.config.pages_directory.display(),
            target = %target.display(),
            branch = copy.branch(),
            "Synchronizing pages"
        );
        self.tree_sync
            .reconcile(&self.config.pages_directory, &target, &excludes)
    }

    /// Commit the synchronized tree; `None` if it matched the branch tip
    pub fn commit(&self, copy: &WorkingCopy) -> Result<Option<String>> {
        self.vcs.commit(copy, &self.config.author)
    }

    /// Push the target branch
    pub fn push(&self, copy: &WorkingCopy, transport: &Transport) -> Result<()> {
        self.vcs.push(copy, transport)
    }

    /// Run every stage
    pub fn run(&self) -> Result<PublishOutcome> {
        let transport = self.materialize()?;
        let copy = self.fetch(&transport)?;
        let files = self.sync(&copy)?;

        let Some(commit) = self.commit(&copy)? else {
            info!(branch = copy.branch(), "Target branch is up to date");
            return Ok(PublishOutcome::NoChanges);
        };

        self.push(&copy, &transport)?;
        info!(commit = %commit, branch = copy.branch(), "Published pages");

        Ok(PublishOutcome::Published { commit, files })
    }
}
