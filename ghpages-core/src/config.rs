//! Publishing configuration
//!
//! Settings are layered with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (PLUGIN_*, DRONE_*, INPUT_*)
//! 3. Settings file (TOML, passed with `--config`)
//! 4. Default values
//!
//! [`Settings::resolve`] turns the layered settings into an immutable
//! [`PublishConfig`] with every path made absolute.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::credentials::{CredentialInputs, CredentialPaths, Credentials};
use crate::sync::ExcludeSet;
use crate::{Error, Result};

/// Name used for publish commits when none is configured
pub const DEFAULT_AUTHOR_NAME: &str = "gh-pages";

/// Email used for publish commits when none is configured
pub const DEFAULT_AUTHOR_EMAIL: &str = "gh-pages@localhost";

/// Identity recorded as both author and committer of the publish commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl CommitAuthor {
    /// Build an author, falling back to the built-in identity if either field is blank
    pub fn new(name: Option<&str>, email: Option<&str>) -> Self {
        let name = name.map(str::trim).unwrap_or_default();
        let email = email.map(str::trim).unwrap_or_default();

        if name.is_empty() || email.is_empty() {
            return Self::default();
        }

        Self {
            name: name.to_string(),
            email: email.to_string(),
        }
    }
}

impl Default for CommitAuthor {
    fn default() -> Self {
        Self {
            name: DEFAULT_AUTHOR_NAME.to_string(),
            email: DEFAULT_AUTHOR_EMAIL.to_string(),
        }
    }
}

/// Commit author settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorSettings {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Netrc credential settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetrcSettings {
    /// Host the netrc record is scoped to
    pub machine: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for NetrcSettings {
    fn default() -> Self {
        Self {
            machine: "github.com".to_string(),
            username: None,
            password: None,
        }
    }
}

/// Layered publishing settings, before path resolution
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Git remote URL to publish to
    pub remote: Option<String>,

    /// Name the remote is registered under in the working copy
    pub upstream_name: String,

    /// Branch to publish to
    pub target_branch: String,

    /// Workspace that relative paths are anchored at (defaults to the current directory)
    pub workspace: Option<PathBuf>,

    /// Root for the ephemeral working copy
    pub temporary_base: PathBuf,

    /// Directory whose contents are published
    pub pages_directory: PathBuf,

    /// Optional subdirectory of the working copy that receives the content
    pub target_directory: Option<PathBuf>,

    /// Glob patterns never touched by the sync
    pub exclude: Vec<String>,

    /// Private SSH key used for fetch and push
    pub ssh_key: Option<String>,

    /// Directory the netrc file is written to (defaults to the home directory)
    pub home: Option<PathBuf>,

    /// Path to the git executable
    pub git_path: String,

    /// Embed netrc credentials in the remote URL (GitHub Actions)
    pub github_actions: bool,

    pub author: AuthorSettings,

    pub netrc: NetrcSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote: None,
            upstream_name: "origin".to_string(),
            target_branch: "gh-pages".to_string(),
            workspace: None,
            temporary_base: PathBuf::from(".tmp"),
            pages_directory: PathBuf::from("docs"),
            target_directory: None,
            exclude: Vec::new(),
            ssh_key: None,
            home: None,
            git_path: "git".to_string(),
            github_actions: false,
            author: AuthorSettings::default(),
            netrc: NetrcSettings::default(),
        }
    }
}

/// Values supplied by the command line or environment, each overriding the settings file
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub remote: Option<String>,
    pub upstream_name: Option<String>,
    pub target_branch: Option<String>,
    pub workspace: Option<PathBuf>,
    pub temporary_base: Option<PathBuf>,
    pub pages_directory: Option<PathBuf>,
    pub target_directory: Option<PathBuf>,
    pub exclude: Option<Vec<String>>,
    pub ssh_key: Option<String>,
    pub home: Option<PathBuf>,
    pub git_path: Option<String>,
    pub github_actions: Option<bool>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub netrc_machine: Option<String>,
    pub netrc_username: Option<String>,
    pub netrc_password: Option<String>,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read settings {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse settings: {}", e)))
    }

    /// Load settings from an optional file, falling back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply command line and environment overrides
    pub fn with_overrides(mut self, o: SettingsOverrides) -> Self {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(v) = value {
                *slot = v;
            }
        }
        fn set_opt<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        set_opt(&mut self.remote, o.remote);
        set(&mut self.upstream_name, o.upstream_name);
        set(&mut self.target_branch, o.target_branch);
        set_opt(&mut self.workspace, o.workspace);
        set(&mut self.temporary_base, o.temporary_base);
        set(&mut self.pages_directory, o.pages_directory);
        set_opt(&mut self.target_directory, o.target_directory);
        set(&mut self.exclude, o.exclude);
        set_opt(&mut self.ssh_key, o.ssh_key);
        set_opt(&mut self.home, o.home);
        set(&mut self.git_path, o.git_path);
        set(&mut self.github_actions, o.github_actions);
        set_opt(&mut self.author.name, o.author_name);
        set_opt(&mut self.author.email, o.author_email);
        set(&mut self.netrc.machine, o.netrc_machine);
        set_opt(&mut self.netrc.username, o.netrc_username);
        set_opt(&mut self.netrc.password, o.netrc_password);

        self
    }

    /// Resolve into an immutable [`PublishConfig`]
    pub fn resolve(self) -> Result<PublishConfig> {
        let remote_url = self
            .remote
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::Config("No remote URL configured".to_string()))?;

        if self.target_branch.trim().is_empty() {
            return Err(Error::Config("Target branch must not be empty".to_string()));
        }
        if self.upstream_name.trim().is_empty() {
            return Err(Error::Config("Upstream name must not be empty".to_string()));
        }

        let workspace = match self.workspace {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => std::env::current_dir().map_err(|e| {
                Error::Config(format!("Could not determine current directory: {}", e))
            })?,
        };

        let temporary_base = anchor(&workspace, &self.temporary_base);
        let pages_directory = anchor(&workspace, &self.pages_directory);

        let pages_name = pages_directory.file_name().ok_or_else(|| {
            Error::Config(format!(
                "Pages directory {} has no base name",
                pages_directory.display()
            ))
        })?;
        let work_directory = temporary_base.join(pages_name);

        let target_directory = match self.target_directory {
            Some(dir) if dir.as_os_str().is_empty() => None,
            Some(dir) => Some(validate_target_directory(dir)?),
            None => None,
        };

        let excludes: Vec<String> = self
            .exclude
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        ExcludeSet::new(excludes.as_slice())?;

        let credentials = Credentials::resolve(CredentialInputs {
            ssh_key: self.ssh_key,
            netrc_machine: self.netrc.machine,
            login: self.netrc.username,
            password: self.netrc.password,
            github_actions: self.github_actions,
        });

        let credential_paths = CredentialPaths {
            home: self.home.or_else(dirs::home_dir),
            ssh_dir: temporary_base.join(".ssh"),
        };

        Ok(PublishConfig {
            remote_url,
            upstream_name: self.upstream_name,
            target_branch: self.target_branch,
            workspace,
            temporary_base,
            pages_directory,
            work_directory,
            target_directory,
            excludes,
            author: CommitAuthor::new(self.author.name.as_deref(), self.author.email.as_deref()),
            credentials,
            credential_paths,
            git_path: self.git_path,
        })
    }
}

/// Fully resolved, immutable configuration consumed by the publish pipeline
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Remote URL as configured, without embedded credentials
    pub remote_url: String,
    pub upstream_name: String,
    pub target_branch: String,
    pub workspace: PathBuf,
    /// Absolute root of the working copy
    pub temporary_base: PathBuf,
    /// Absolute source content directory
    pub pages_directory: PathBuf,
    /// `temporary_base` joined with the base name of `pages_directory`
    pub work_directory: PathBuf,
    /// Relative subdirectory of the working copy that receives the content
    pub target_directory: Option<PathBuf>,
    pub excludes: Vec<String>,
    pub author: CommitAuthor,
    pub credentials: Credentials,
    pub credential_paths: CredentialPaths,
    pub git_path: String,
}

impl PublishConfig {
    /// Directory inside the working copy that mirrors the pages directory
    pub fn sync_root(&self) -> PathBuf {
        match &self.target_directory {
            Some(dir) => self.work_directory.join(dir),
            None => self.work_directory.clone(),
        }
    }
}

fn anchor(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn validate_target_directory(dir: PathBuf) -> Result<PathBuf> {
    let escapes = dir.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });

    if escapes {
        return Err(Error::Config(format!(
            "Target directory {} must be a relative path inside the working copy",
            dir.display()
        )));
    }

    Ok(dir)
}
