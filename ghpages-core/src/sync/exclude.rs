//! Exclusion patterns for the tree sync
//!
//! Patterns follow rsync's exclude rules:
//! - no `/`: matched against the entry name at any depth (`CNAME`, `*.map`)
//! - containing `/`: matched against the path relative to the sync root,
//!   a leading `/` only anchors it (`/assets/*.psd`, `blog/**/draft.html`)
//! - trailing `/`: matches directories only (`drafts/`)
//!
//! An excluded directory excludes everything below it.

use std::path::{Component, Path};

use glob::{MatchOptions, Pattern};

use crate::{Error, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    /// Match the whole relative path instead of the entry name
    path_match: bool,
    dir_only: bool,
}

impl Rule {
    fn parse(raw: &str) -> Result<Self> {
        let mut text = raw.trim();

        let dir_only = text.ends_with('/');
        text = text.trim_end_matches('/');

        let path_match = text.contains('/');
        text = text.trim_start_matches('/');

        if text.is_empty() {
            return Err(Error::Pattern {
                pattern: raw.to_string(),
                message: "pattern matches nothing but the sync root".to_string(),
            });
        }

        let pattern = Pattern::new(text).map_err(|e| Error::Pattern {
            pattern: raw.to_string(),
            message: e.msg.to_string(),
        })?;

        Ok(Self {
            pattern,
            path_match,
            dir_only,
        })
    }

    fn matches(&self, rel: &str, name: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        let candidate = if self.path_match { rel } else { name };
        self.pattern.matches_with(candidate, MATCH_OPTIONS)
    }
}

/// Compiled set of exclusion patterns
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    rules: Vec<Rule>,
}

impl ExcludeSet {
    /// Compile patterns, skipping blank entries
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let rules = patterns
            .iter()
            .map(AsRef::as_ref)
            .filter(|p| !p.trim().is_empty())
            .map(Rule::parse)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether `rel` (relative to the sync root) or any of its parent directories is excluded
    pub fn is_excluded(&self, rel: &Path, is_dir: bool) -> bool {
        if self.rules.is_empty() {
            return false;
        }

        let names: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        let mut prefix = String::new();
        for (i, name) in names.iter().enumerate() {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(name);

            let last = i + 1 == names.len();
            let entry_is_dir = !last || is_dir;
            if self
                .rules
                .iter()
                .any(|rule| rule.matches(&prefix, name, entry_is_dir))
            {
                return true;
            }
        }

        false
    }
}
