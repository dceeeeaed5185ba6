//! gh-pages - publish a directory of static content to a git branch
//!
//! Meant to run as a CI step (Drone plugin or GitHub Action): every option
//! can be given as a flag or through the environment variables the plugin
//! conventions use.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::builder::BoolishValueParser;
use clap::Parser;
use ghpages_core::{ErrorKind, Publisher, Settings, SettingsOverrides};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variables consulted for each option, first non-empty wins
mod env {
    pub const REMOTE: &[&str] = &["PLUGIN_REMOTE_URL", "DRONE_REMOTE_URL", "INPUT_REMOTE_URL"];
    pub const UPSTREAM_NAME: &[&str] = &["PLUGIN_UPSTREAM_NAME", "INPUT_UPSTREAM_NAME"];
    pub const TARGET_BRANCH: &[&str] = &["PLUGIN_TARGET_BRANCH", "INPUT_TARGET_BRANCH"];
    pub const TEMPORARY_BASE: &[&str] = &["PLUGIN_TEMPORARY_BASE", "INPUT_TEMPORARY_BASE"];
    pub const PAGES_DIRECTORY: &[&str] = &["PLUGIN_PAGES_DIRECTORY", "INPUT_PAGES_DIRECTORY"];
    pub const TARGET_DIRECTORY: &[&str] = &["PLUGIN_TARGET_DIRECTORY", "INPUT_TARGET_DIRECTORY"];
    pub const SSH_KEY: &[&str] = &["PLUGIN_SSH_KEY", "GIT_PUSH_SSH_KEY", "SSH_KEY", "INPUT_SSH_KEY"];
    pub const AUTHOR_NAME: &[&str] = &["PLUGIN_USER_NAME", "DRONE_COMMIT_AUTHOR", "INPUT_COMMIT_AUTHOR"];
    pub const AUTHOR_EMAIL: &[&str] = &[
        "PLUGIN_USER_EMAIL",
        "DRONE_COMMIT_AUTHOR_EMAIL",
        "INPUT_COMMIT_AUTHOR_EMAIL",
    ];
    pub const WORKSPACE: &[&str] = &["PLUGIN_WORKSPACE", "DRONE_WORKSPACE", "INPUT_WORKSPACE"];
    pub const NETRC_MACHINE: &[&str] = &["PLUGIN_NETRC_MACHINE", "DRONE_NETRC_MACHINE", "INPUT_NETRC_MACHINE"];
    pub const NETRC_USERNAME: &[&str] = &[
        "PLUGIN_USERNAME",
        "DRONE_NETRC_USERNAME",
        "GH_PAGES_USERNAME",
        "GITHUB_USERNAME",
        "INPUT_USERNAME",
    ];
    pub const NETRC_PASSWORD: &[&str] = &[
        "PLUGIN_PASSWORD",
        "DRONE_NETRC_PASSWORD",
        "GH_PAGES_PASSWORD",
        "GITHUB_PASSWORD",
        "INPUT_PASSWORD",
    ];
    pub const EXCLUDE: &[&str] = &["PLUGIN_EXCLUDE", "RSYNC_EXCLUDE", "INPUT_EXCLUDE"];
}

/// Publish a directory of static content to a gh-pages branch
#[derive(Parser, Debug)]
#[command(name = "gh-pages")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// TOML settings file providing defaults for every option
    #[arg(long, env = "GH_PAGES_CONFIG")]
    config: Option<PathBuf>,

    /// Git remote URL to publish to
    #[arg(long)]
    remote: Option<String>,

    /// Name the remote is registered under
    #[arg(long)]
    upstream_name: Option<String>,

    /// Branch to publish to [default: gh-pages]
    #[arg(long)]
    target_branch: Option<String>,

    /// Temporary directory for the working copy [default: .tmp]
    #[arg(long)]
    temporary_base: Option<PathBuf>,

    /// Directory of content to publish [default: docs]
    #[arg(long)]
    pages_directory: Option<PathBuf>,

    /// Subdirectory of the branch that receives the content
    #[arg(long)]
    target_directory: Option<PathBuf>,

    /// Private SSH key
    #[arg(long, hide_env_values = true)]
    ssh_key: Option<String>,

    /// Commit author name
    #[arg(long)]
    author_name: Option<String>,

    /// Commit author email
    #[arg(long)]
    author_email: Option<String>,

    /// Workspace that relative paths are resolved against
    #[arg(long, alias = "path")]
    workspace: Option<PathBuf>,

    /// Netrc machine [default: github.com]
    #[arg(long)]
    netrc_machine: Option<String>,

    /// Netrc username
    #[arg(long)]
    netrc_username: Option<String>,

    /// Netrc password
    #[arg(long)]
    netrc_password: Option<String>,

    /// Directory the netrc file is written to [default: home directory]
    #[arg(long)]
    home: Option<PathBuf>,

    /// Exclude files matching PATTERN (repeatable, comma separated)
    #[arg(long = "exclude", value_name = "PATTERN", value_delimiter = ',')]
    exclude: Vec<String>,

    /// Embed the netrc credentials in the remote URL (GitHub Actions)
    #[arg(long, env = "GITHUB_ACTIONS", value_parser = BoolishValueParser::new())]
    github_actions: bool,

    /// Path to the git executable [default: git]
    #[arg(long)]
    git_path: Option<String>,
}

/// First non-empty value among the given environment variables
fn from_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn flag_or_env(flag: Option<String>, names: &[&str]) -> Option<String> {
    flag.filter(|v| !v.is_empty()).or_else(|| from_env(names))
}

fn path_or_env(flag: Option<PathBuf>, names: &[&str]) -> Option<PathBuf> {
    flag.or_else(|| from_env(names).map(PathBuf::from))
}

impl Cli {
    fn overrides(self) -> SettingsOverrides {
        let exclude = if self.exclude.is_empty() {
            from_env(env::EXCLUDE).map(|v| {
                v.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
        } else {
            Some(self.exclude)
        };

        // unset leaves the settings file in charge
        let github_actions = self.github_actions.then_some(true);

        SettingsOverrides {
            remote: flag_or_env(self.remote, env::REMOTE),
            upstream_name: flag_or_env(self.upstream_name, env::UPSTREAM_NAME),
            target_branch: flag_or_env(self.target_branch, env::TARGET_BRANCH),
            workspace: path_or_env(self.workspace, env::WORKSPACE),
            temporary_base: path_or_env(self.temporary_base, env::TEMPORARY_BASE),
            pages_directory: path_or_env(self.pages_directory, env::PAGES_DIRECTORY),
            target_directory: path_or_env(self.target_directory, env::TARGET_DIRECTORY),
            exclude,
            ssh_key: flag_or_env(self.ssh_key, env::SSH_KEY),
            home: self.home,
            git_path: self.git_path,
            github_actions,
            author_name: flag_or_env(self.author_name, env::AUTHOR_NAME),
            author_email: flag_or_env(self.author_email, env::AUTHOR_EMAIL),
            netrc_machine: flag_or_env(self.netrc_machine, env::NETRC_MACHINE),
            netrc_username: flag_or_env(self.netrc_username, env::NETRC_USERNAME),
            netrc_password: flag_or_env(self.netrc_password, env::NETRC_PASSWORD),
        }
    }
}

/// Process exit code for a failed run
fn exit_code(err: &anyhow::Error) -> u8 {
    let Some(err) = err.downcast_ref::<ghpages_core::Error>() else {
        return 1;
    };

    match err.kind() {
        ErrorKind::Config | ErrorKind::InvalidRemoteUrl => 1,
        ErrorKind::Fetch
        | ErrorKind::Authentication
        | ErrorKind::Transport
        | ErrorKind::CredentialMaterialization
        | ErrorKind::Git => 2,
        ErrorKind::PushRejected => 3,
        ErrorKind::Filesystem | ErrorKind::SyncCycle => 4,
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref())?.with_overrides(cli.overrides());
    let config = settings.resolve()?;

    tracing::info!(
        branch = %config.target_branch,
        pages = %config.pages_directory.display(),
        work = %config.work_directory.display(),
        credentials = config.credentials.mode(),
        "Configuration loaded"
    );

    let outcome = Publisher::new(config).run()?;
    println!("{}", outcome);

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}
