//! Bundle exclusion policy.
//!
//! Decides which entries of a project directory are packaged. Matching is
//! by whole path segment (directories) or whole basename pattern (files),
//! never by substring containment on the full path: a file named
//! `git-utils.ts` is not excluded even though `.git` directories are.

use std::path::Path;

/// Directory names never bundled, wherever they appear in the tree.
const EXCLUDED_DIRS: &[&str] = &[
    // dependency caches
    "node_modules",
    "bower_components",
    ".pnpm-store",
    "vendor",
    "__pycache__",
    // version control metadata
    ".git",
    ".svn",
    ".hg",
    // build output
    "dist",
    "build",
    "out",
    ".next",
    ".nuxt",
    ".output",
    "target",
    "coverage",
    // editor/IDE
    ".idea",
    ".vscode",
    ".vs",
    // platform caches
    ".cache",
    ".parcel-cache",
    ".turbo",
];

/// Basename patterns never bundled. A single `*` wildcard is supported.
const EXCLUDED_FILES: &[&str] = &[
    // environment files
    ".env",
    ".env.*",
    // secrets and keys
    "*.pem",
    "*.key",
    "*.p12",
    "credentials.json",
    // OS housekeeping
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    // editor swap/backup files
    "*.swp",
    "*.swo",
    "*~",
    // package-manager lockfiles
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "npm-shrinkwrap.json",
    "bun.lockb",
    // logs
    "*.log",
];

/// Pure predicate over relative paths; no I/O, safe to call during a walk.
#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy;

impl ExclusionPolicy {
    /// The standard policy used for every publish.
    #[must_use]
    pub fn standard() -> Self {
        Self
    }

    /// Whether `relative_path` should be left out of the bundle.
    ///
    /// `relative_path` is relative to the bundle root and may use either
    /// slash style; segments are compared whole.
    #[must_use]
    pub fn should_exclude(&self, relative_path: &Path, is_directory: bool) -> bool {
        let raw = relative_path.to_string_lossy();
        let segments: Vec<&str> = raw
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();

        if segments
            .iter()
            .any(|segment| EXCLUDED_DIRS.contains(segment))
        {
            return true;
        }

        if !is_directory {
            if let Some(basename) = segments.last() {
                return EXCLUDED_FILES
                    .iter()
                    .any(|pattern| matches_pattern(basename, pattern));
            }
        }

        false
    }
}

/// Glob-lite match: at most one `*`, anchored at both ends.
fn matches_pattern(name: &str, pattern: &str) -> bool {
    match pattern.find('*') {
        None => name == pattern,
        Some(idx) => {
            let (prefix, suffix) = (&pattern[..idx], &pattern[idx + 1..]);
            name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
        }
    }
}
