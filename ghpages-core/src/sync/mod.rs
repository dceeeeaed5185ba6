//! Mirroring the pages directory onto the working copy
//!
//! After [`TreeSync::reconcile`] the target tree matches the source tree,
//! except for entries matched by an exclusion pattern (left exactly as they
//! were) and version-control metadata (never touched).

mod exclude;

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{Error, Result};

pub use exclude::ExcludeSet;

/// Directory name of git metadata, skipped at every level
const VCS_DIR: &str = ".git";

/// Counts of what a sync changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Files created in the target
    pub copied: usize,
    /// Files overwritten because their content differed
    pub updated: usize,
    /// Files already identical in the target
    pub unchanged: usize,
    /// Target entries removed because they are absent from the source
    pub deleted: usize,
    /// Entries left alone because of an exclusion pattern
    pub excluded: usize,
}

impl SyncSummary {
    /// Whether the sync modified the target tree
    pub fn has_changes(&self) -> bool {
        self.copied + self.updated + self.deleted > 0
    }
}

/// Reconciles a target directory with a source directory
pub trait TreeSync {
    /// Make `target` mirror `source`, honoring `excludes`
    fn reconcile(&self, source: &Path, target: &Path, excludes: &ExcludeSet)
        -> Result<SyncSummary>;
}

/// In-process mirror-with-exclusions
#[derive(Debug, Clone, Copy, Default)]
pub struct MirrorSync;

impl TreeSync for MirrorSync {
    fn reconcile(
        &self,
        source: &Path,
        target: &Path,
        excludes: &ExcludeSet,
    ) -> Result<SyncSummary> {
        let meta = fs::metadata(source).map_err(|e| Error::fs(source, e))?;
        if !meta.is_dir() {
            return Err(Error::fs(
                source,
                io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }
        fs::create_dir_all(target).map_err(|e| Error::fs(target, e))?;

        let mut summary = SyncSummary::default();
        copy_pass(source, target, excludes, &mut summary)?;
        delete_pass(source, target, excludes, &mut summary)?;

        info!(
            copied = summary.copied,
            updated = summary.updated,
            unchanged = summary.unchanged,
            deleted = summary.deleted,
            excluded = summary.excluded,
            "Synchronized pages"
        );

        Ok(summary)
    }
}

fn copy_pass(
    source: &Path,
    target: &Path,
    excludes: &ExcludeSet,
    summary: &mut SyncSummary,
) -> Result<()> {
    let mut walker = WalkDir::new(source)
        .follow_links(true)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| walk_error(source, e))?;
        let is_dir = entry.file_type().is_dir();
        let rel = relative(source, entry.path())?;

        // the working copy may live inside the pages directory
        if entry.file_name() == VCS_DIR || entry.path() == target {
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        if excludes.is_excluded(&rel, is_dir) {
            debug!(path = %rel.display(), "Excluded from copy");
            summary.excluded += 1;
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        let dest = target.join(&rel);
        if is_dir {
            ensure_dir(&dest)?;
        } else {
            sync_file(entry.path(), &dest, &rel, excludes, summary)?;
        }
    }

    Ok(())
}

fn delete_pass(
    source: &Path,
    target: &Path,
    excludes: &ExcludeSet,
    summary: &mut SyncSummary,
) -> Result<()> {
    let mut stale_dirs = Vec::new();
    let mut walker = WalkDir::new(target)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| walk_error(target, e))?;
        let is_dir = entry.file_type().is_dir();
        let rel = relative(target, entry.path())?;

        if entry.file_name() == VCS_DIR {
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        if excludes.is_excluded(&rel, is_dir) {
            summary.excluded += 1;
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }

        let counterpart = source.join(&rel);
        match fs::metadata(&counterpart) {
            Ok(_) => continue,
            // a source file where the target kept a directory
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
                ) => {}
            Err(e) => return Err(Error::fs(counterpart, e)),
        }

        if is_dir {
            // contents are visited next; the directory goes once emptied
            stale_dirs.push(entry.into_path());
        } else {
            fs::remove_file(entry.path()).map_err(|e| Error::fs(entry.path(), e))?;
            debug!(path = %rel.display(), "Deleted");
            summary.deleted += 1;
        }
    }

    for dir in stale_dirs.iter().rev() {
        let mut contents = fs::read_dir(dir).map_err(|e| Error::fs(dir, e))?;
        if contents.next().is_none() {
            fs::remove_dir(dir).map_err(|e| Error::fs(dir, e))?;
            summary.deleted += 1;
        } else {
            debug!(path = %dir.display(), "Kept directory holding excluded entries");
        }
    }

    Ok(())
}

/// Make `dest` a directory, replacing a file or symlink in the way
fn ensure_dir(dest: &Path) -> Result<()> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            fs::remove_file(dest).map_err(|e| Error::fs(dest, e))?;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::fs(dest, e)),
    }
    fs::create_dir_all(dest).map_err(|e| Error::fs(dest, e))?;
    Ok(())
}

fn sync_file(
    src: &Path,
    dest: &Path,
    rel: &Path,
    excludes: &ExcludeSet,
    summary: &mut SyncSummary,
) -> Result<()> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => {
            if holds_excluded(dest, rel, excludes)? {
                warn!(path = %rel.display(), "Not replacing directory that holds excluded entries");
                summary.excluded += 1;
                return Ok(());
            }
            fs::remove_dir_all(dest).map_err(|e| Error::fs(dest, e))?;
            copy_file(src, dest)?;
            summary.updated += 1;
        }
        Ok(meta) if meta.file_type().is_symlink() => {
            fs::remove_file(dest).map_err(|e| Error::fs(dest, e))?;
            copy_file(src, dest)?;
            summary.updated += 1;
        }
        Ok(meta) => {
            if same_content(src, dest, meta.len())? {
                summary.unchanged += 1;
                return Ok(());
            }
            copy_file(src, dest)?;
            debug!(path = %rel.display(), "Updated");
            summary.updated += 1;
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::fs(parent, e))?;
            }
            copy_file(src, dest)?;
            debug!(path = %rel.display(), "Copied");
            summary.copied += 1;
        }
        Err(e) => return Err(Error::fs(dest, e)),
    }

    Ok(())
}

fn copy_file(src: &Path, dest: &Path) -> Result<()> {
    fs::copy(src, dest).map_err(|e| Error::fs(dest, e))?;
    Ok(())
}

/// Whether any entry under the target directory `dir` is excluded
fn holds_excluded(dir: &Path, rel: &Path, excludes: &ExcludeSet) -> Result<bool> {
    if excludes.is_empty() {
        return Ok(false);
    }

    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        let inner = relative(dir, entry.path())?;
        if excludes.is_excluded(&rel.join(inner), entry.file_type().is_dir()) {
            return Ok(true);
        }
    }

    Ok(false)
}

fn same_content(src: &Path, dest: &Path, dest_len: u64) -> Result<bool> {
    let src_len = fs::metadata(src).map_err(|e| Error::fs(src, e))?.len();
    if src_len != dest_len {
        return Ok(false);
    }
    Ok(file_digest(src)? == file_digest(dest)?)
}

/// SHA-256 of a file's content, hex encoded
fn file_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::fs(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| Error::fs(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

fn relative(root: &Path, path: &Path) -> Result<PathBuf> {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(|_| {
            Error::fs(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "path escapes the sync root"),
            )
        })
}

fn walk_error(root: &Path, err: walkdir::Error) -> Error {
    let path = err.path().unwrap_or(root).to_path_buf();

    if err.loop_ancestor().is_some() {
        return Error::SyncCycle { path };
    }

    let source = err
        .into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "directory walk failed"));
    Error::Filesystem { path, source }
}
