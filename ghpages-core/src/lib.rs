//! gh-pages publishing core
//!
//! Publishes a directory of generated static content to a branch of a git
//! remote: a shallow working copy of the branch is fetched, the content is
//! mirrored onto it, the net change is committed once and pushed back.

pub mod config;
pub mod credentials;
pub mod error;
pub mod git;
pub mod pipeline;
pub mod sync;

pub use config::{CommitAuthor, PublishConfig, Settings, SettingsOverrides};
pub use credentials::{CredentialInputs, Credentials, Secret, Transport};
pub use error::{Error, ErrorKind, Result};
pub use git::{FetchOutcome, GitCli, VersionControl, WorkingCopy};
pub use pipeline::{PublishOutcome, Publisher};
pub use sync::{ExcludeSet, MirrorSync, SyncSummary, TreeSync};
