//! Local repository operations on the working copy

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    Commit, ErrorCode, IndexAddOption, Oid, Repository, RepositoryInitOptions,
    RepositoryOpenFlags, ResetType, Signature,
};
use tracing::{debug, info, warn};

use crate::config::CommitAuthor;
use crate::{Error, Result};

/// Message of every publish commit
pub const COMMIT_MESSAGE: &str = "Publish pages [skip ci]";

/// The working-copy repository
pub struct GitRepo {
    /// The underlying git2 repository
    repo: Repository,
    /// Path to the working tree root
    root: PathBuf,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl GitRepo {
    /// Open the repository rooted exactly at `path`
    ///
    /// Parent directories are not searched: the working copy usually lives
    /// inside the CI checkout, which is a different repository.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let repo = Repository::open_ext(path, RepositoryOpenFlags::NO_SEARCH, &[] as &[&OsStr])?;
        Self::from_repository(repo)
    }

    /// Reuse the repository at `path`, or initialize one whose HEAD names `branch`
    pub fn open_or_init(path: impl AsRef<Path>, branch: &str) -> Result<Self> {
        let path = path.as_ref();

        match Self::open(path) {
            Ok(repo) => {
                debug!(path = %path.display(), "Reusing existing working copy");
                repo.remove_stale_locks(branch)?;
                return Ok(repo);
            }
            Err(Error::Git(e)) if e.code() == ErrorCode::NotFound => {}
            Err(e) => return Err(e),
        }

        fs::create_dir_all(path).map_err(|e| Error::fs(path, e))?;

        let mut options = RepositoryInitOptions::new();
        options.initial_head(branch);
        let repo = Repository::init_opts(path, &options)?;
        info!(path = %path.display(), "Initialized working copy");

        Self::from_repository(repo)
    }

    /// Delete lock files left behind by an interrupted run
    ///
    /// Only one publish targets a working copy at a time, so any lock found
    /// here belongs to a process that no longer exists.
    fn remove_stale_locks(&self, branch: &str) -> Result<()> {
        let git_dir = self.repo.path();
        let locks = [
            git_dir.join("index.lock"),
            git_dir.join("HEAD.lock"),
            git_dir.join("refs").join("heads").join(format!("{}.lock", branch)),
        ];

        for lock in &locks {
            match fs::remove_file(lock) {
                Ok(()) => warn!(path = %lock.display(), "Removed stale lock file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::fs(lock, e)),
            }
        }
        Ok(())
    }

    fn from_repository(repo: Repository) -> Result<Self> {
        let root = repo
            .workdir()
            .ok_or_else(|| Error::Config("Bare repositories are not supported".to_string()))?
            .to_path_buf();

        Ok(Self { repo, root })
    }

    /// Get the working tree root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register `url` under `name`, updating the URL if the remote already exists
    pub fn ensure_remote(&self, name: &str, url: &str) -> Result<()> {
        match self.repo.find_remote(name) {
            Ok(remote) => {
                if remote.url() != Some(url) {
                    self.repo.remote_set_url(name, url)?;
                    debug!(remote = name, "Updated remote URL");
                }
            }
            Err(e) if e.code() == ErrorCode::NotFound => {
                self.repo.remote(name, url)?;
                debug!(remote = name, "Registered remote");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Get the current branch name, `None` on a detached HEAD
    ///
    /// An unborn branch (fresh repository or orphan) still has a name.
    pub fn current_branch(&self) -> Result<Option<String>> {
        match self.repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(|s| s.to_string())),
            Ok(_) => Ok(None),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = self.repo.find_reference("HEAD")?;
                Ok(head
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(|s| s.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Point `branch` at `refs/remotes/<upstream>/<branch>` and hard-reset to it
    ///
    /// Local commits left over from an earlier run are discarded, and so are
    /// untracked files.
    pub fn reset_to_remote(&self, upstream: &str, branch: &str) -> Result<Oid> {
        let tracking = format!("refs/remotes/{}/{}", upstream, branch);
        let commit = self.repo.find_reference(&tracking)?.peel_to_commit()?;

        let local = format!("refs/heads/{}", branch);
        self.repo
            .reference(&local, commit.id(), true, "gh-pages: reset to fetched tip")?;
        self.repo.set_head(&local)?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        self.repo
            .reset(commit.as_object(), ResetType::Hard, Some(&mut checkout))?;

        info!(branch, commit = %commit.id(), "Checked out fetched branch");
        Ok(commit.id())
    }

    /// Make `branch` an unborn orphan branch with an empty index and working tree
    pub fn start_orphan(&self, branch: &str) -> Result<()> {
        let local = format!("refs/heads/{}", branch);

        self.repo.set_head(&local)?;
        if let Ok(mut stale) = self.repo.find_reference(&local) {
            stale.delete()?;
        }

        let mut index = self.repo.index()?;
        index.clear()?;
        index.write()?;

        clear_worktree(&self.root)?;

        info!(branch, "Started orphan branch");
        Ok(())
    }

    fn head_commit(&self) -> Result<Option<Commit<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stage every change and commit it; `None` when the tree is unchanged
    pub fn commit_all(&self, author: &CommitAuthor) -> Result<Option<Oid>> {
        let mut index = self.repo.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;
        let tree_id = index.write_tree()?;

        let parent = self.head_commit()?;
        let unchanged = match &parent {
            Some(commit) => commit.tree_id() == tree_id,
            None => index.is_empty(),
        };
        if unchanged {
            info!("Nothing to commit");
            return Ok(None);
        }

        let signature = Signature::now(&author.name, &author.email)?;
        let tree = self.repo.find_tree(tree_id)?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();

        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            COMMIT_MESSAGE,
            &tree,
            &parents,
        )?;

        info!(commit = %oid, author = %author.name, "Created publish commit");
        Ok(Some(oid))
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Repository {
        &self.repo
    }
}

/// Remove everything under `root` except git metadata
fn clear_worktree(root: &Path) -> Result<()> {
    for entry in fs::read_dir(root).map_err(|e| Error::fs(root, e))? {
        let entry = entry.map_err(|e| Error::fs(root, e))?;
        if entry.file_name() == ".git" {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| Error::fs(&path, e))?;
        let removed = if file_type.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| Error::fs(&path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn author() -> CommitAuthor {
        CommitAuthor::new(Some("Docs Bot"), Some("docs@example.com"))
    }

    #[test]
    fn test_open_non_git_dir() {
        let dir = TempDir::new().unwrap();
        assert!(GitRepo::open(dir.path()).is_err());
    }

    #[test]
    fn test_open_does_not_search_parents() {
        let dir = TempDir::new().unwrap();
        GitRepo::open_or_init(dir.path(), "main").unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir_all(&nested).unwrap();
        assert!(GitRepo::open(&nested).is_err());
    }

    #[test]
    fn test_open_or_init_names_branch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".tmp").join("docs");
        let repo = GitRepo::open_or_init(&path, "gh-pages").unwrap();
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("gh-pages"));

        // second call reuses it
        let again = GitRepo::open_or_init(&path, "other").unwrap();
        assert_eq!(again.current_branch().unwrap().as_deref(), Some("gh-pages"));
    }

    #[test]
    fn test_ensure_remote_registers_and_updates() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepo::open_or_init(dir.path(), "gh-pages").unwrap();

        repo.ensure_remote("origin", "https://example.com/a.git").unwrap();
        repo.ensure_remote("origin", "https://example.com/b.git").unwrap();

        let remote = repo.inner().find_remote("origin").unwrap();
        assert_eq!(remote.url(), Some("https://example.com/b.git"));
    }

    #[test]
    fn test_commit_all_noop_on_empty_tree() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepo::open_or_init(dir.path(), "gh-pages").unwrap();
        assert_eq!(repo.commit_all(&author()).unwrap(), None);
    }

    #[test]
    fn test_commit_all_then_noop() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepo::open_or_init(dir.path(), "gh-pages").unwrap();
        fs::write(dir.path().join("index.html"), "hello").unwrap();

        let oid = repo.commit_all(&author()).unwrap().expect("commit created");
        let commit = repo.inner().find_commit(oid).unwrap();
        assert_eq!(commit.parent_count(), 0);
        assert_eq!(commit.author().name(), Some("Docs Bot"));
        assert_eq!(commit.committer().email(), Some("docs@example.com"));
        assert_eq!(commit.message(), Some(COMMIT_MESSAGE));

        assert_eq!(repo.commit_all(&author()).unwrap(), None);
    }

    #[test]
    fn test_commit_all_stages_deletions() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepo::open_or_init(dir.path(), "gh-pages").unwrap();
        fs::write(dir.path().join("a.html"), "a").unwrap();
        fs::write(dir.path().join("b.html"), "b").unwrap();
        let first = repo.commit_all(&author()).unwrap().unwrap();

        fs::remove_file(dir.path().join("b.html")).unwrap();
        let second = repo.commit_all(&author()).unwrap().unwrap();

        let commit = repo.inner().find_commit(second).unwrap();
        assert_eq!(commit.parent_id(0).unwrap(), first);
        let tree = commit.tree().unwrap();
        assert!(tree.get_name("a.html").is_some());
        assert!(tree.get_name("b.html").is_none());
    }

    #[test]
    fn test_reopen_removes_stale_locks() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepo::open_or_init(dir.path(), "gh-pages").unwrap();
        fs::write(dir.path().join("index.html"), "v1").unwrap();
        repo.commit_all(&author()).unwrap().unwrap();
        drop(repo);

        let git_dir = dir.path().join(".git");
        fs::write(git_dir.join("index.lock"), "").unwrap();
        fs::write(git_dir.join("refs/heads/gh-pages.lock"), "").unwrap();

        let repo = GitRepo::open_or_init(dir.path(), "gh-pages").unwrap();
        assert!(!git_dir.join("index.lock").exists());
        assert!(!git_dir.join("refs/heads/gh-pages.lock").exists());

        fs::write(dir.path().join("index.html"), "v2").unwrap();
        assert!(repo.commit_all(&author()).unwrap().is_some());
    }

    #[test]
    fn test_start_orphan_clears_history_and_tree() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepo::open_or_init(dir.path(), "gh-pages").unwrap();
        fs::write(dir.path().join("old.html"), "old").unwrap();
        fs::create_dir_all(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets/app.css"), "css").unwrap();
        repo.commit_all(&author()).unwrap().unwrap();

        repo.start_orphan("gh-pages").unwrap();

        assert!(!dir.path().join("old.html").exists());
        assert!(!dir.path().join("assets").exists());
        assert!(dir.path().join(".git").exists());
        assert_eq!(repo.current_branch().unwrap().as_deref(), Some("gh-pages"));

        fs::write(dir.path().join("index.html"), "new").unwrap();
        let oid = repo.commit_all(&author()).unwrap().unwrap();
        assert_eq!(repo.inner().find_commit(oid).unwrap().parent_count(), 0);
    }
}
