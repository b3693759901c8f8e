use crate::{
    config::Config,
    error::{Error, Result},
    text::{FileTarget, STDIN_MARKER},
};
use globset::{GlobBuilder, GlobMatcher};
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

const GLOB_CHARS: [char; 4] = ['*', '?', '[', '{'];

/// Expands file patterns into an ordered, de-duplicated list of targets.
///
/// Depth counts directory levels below the search root: depth 0 matches
/// files directly in the root, depth 1 also matches their subdirectories'
/// files, and so on.
#[derive(Debug, Clone, Default)]
pub struct PatternResolver {
    start_dir: Option<PathBuf>,
    max_depth: Option<usize>,
}

/// One glob search: where to walk, how deep, and what to match.
#[derive(Debug)]
struct Search {
    root: PathBuf,
    depth: Option<usize>,
    matcher: GlobMatcher,
    match_path: bool,
}

impl PatternResolver {
    /// Creates a resolver.
    ///
    /// With a start directory, `max_depth` of `None` walks the whole tree.
    /// Without one, each pattern is searched in its own directory part (or
    /// the current directory) at depth 0 unless `max_depth` says otherwise.
    #[must_use]
    pub const fn new(start_dir: Option<PathBuf>, max_depth: Option<usize>) -> Self {
        Self {
            start_dir,
            max_depth,
        }
    }

    /// Creates a resolver from the run configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.start_dir.clone(), config.max_depth)
    }

    /// Resolves patterns to targets.
    ///
    /// Existing file paths are taken as they are. The stdin marker yields a
    /// single [`FileTarget::Stdin`]. Everything else is matched as a glob.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the start directory is not a directory,
    /// [`Error::InvalidPattern`] for malformed globs, and [`Error::NoMatch`]
    /// if nothing matched.
    pub fn resolve(&self, patterns: &[String]) -> Result<Vec<FileTarget>> {
        if let Some(start) = &self.start_dir {
            if !start.is_dir() {
                return Err(Error::config(format!(
                    "Start directory does not exist or is not a directory: {}",
                    start.display()
                )));
            }
        }

        let mut targets = Targets::default();

        for pattern in patterns {
            if pattern == STDIN_MARKER {
                targets.push_stdin();
                continue;
            }

            let literal = Path::new(pattern);
            if self.start_dir.is_none() && literal.is_file() {
                trace!("Pattern {:?} names an existing file", pattern);
                targets.push_path(literal.to_path_buf());
                continue;
            }

            let search = self.search_for(pattern)?;
            let before = targets.len();
            for path in search.run() {
                targets.push_path(path);
            }
            debug!(
                "Pattern {:?} matched {} new file(s) under {}",
                pattern,
                targets.len() - before,
                search.root.display()
            );
        }

        if targets.is_empty() {
            return Err(Error::no_match(patterns));
        }

        Ok(targets.into_inner())
    }

    /// Turns explicit file names into targets without globbing.
    ///
    /// Missing files are kept; reading them later reports a per-file error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMatch`] if `files` is empty.
    pub fn literal(files: &[String]) -> Result<Vec<FileTarget>> {
        let mut targets = Targets::default();
        for file in files {
            if file == STDIN_MARKER {
                targets.push_stdin();
            } else {
                targets.push_path(PathBuf::from(file));
            }
        }

        if targets.is_empty() {
            return Err(Error::no_match(files));
        }
        Ok(targets.into_inner())
    }

    fn search_for(&self, pattern: &str) -> Result<Search> {
        if let Some(start) = &self.start_dir {
            return Search::new(start.clone(), self.max_depth, pattern);
        }

        let path = Path::new(pattern);
        let directory = path.parent().filter(|dir| !dir.as_os_str().is_empty());

        match (directory, path.file_name()) {
            // A literal directory part becomes the search root.
            (Some(dir), Some(name)) if !dir.to_string_lossy().contains(GLOB_CHARS) => Search::new(
                dir.to_path_buf(),
                Some(self.max_depth.unwrap_or(0)),
                &name.to_string_lossy(),
            ),
            // Globs in the directory part match against paths below the current directory.
            (Some(_), _) => Search::new(PathBuf::from("."), self.max_depth, pattern),
            _ => Search::new(PathBuf::from("."), Some(self.max_depth.unwrap_or(0)), pattern),
        }
    }
}

impl Search {
    fn new(root: PathBuf, depth: Option<usize>, pattern: &str) -> Result<Self> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| Error::invalid_pattern(pattern, e.kind().to_string()))?
            .compile_matcher();

        Ok(Self {
            root,
            depth,
            matcher,
            match_path: pattern.contains('/') || pattern.contains(std::path::MAIN_SEPARATOR),
        })
    }

    /// Walks the root in file-name order and returns matching files.
    fn run(&self) -> Vec<PathBuf> {
        if !self.root.is_dir() {
            debug!("Search root {} is not a directory", self.root.display());
            return Vec::new();
        }

        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(false)
            .max_depth(self.depth.map(|depth| depth + 1))
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        let mut found = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Walk error: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let matched = if self.match_path {
                pathdiff::diff_paths(entry.path(), &self.root)
                    .is_some_and(|relative| self.matcher.is_match(relative))
            } else {
                self.matcher.is_match(entry.file_name())
            };

            if matched {
                found.push(self.display_path(entry.path()));
            }
        }
        found
    }

    /// Drops the `./` prefix the walker adds under the current directory.
    fn display_path(&self, path: &Path) -> PathBuf {
        if self.root == Path::new(".") {
            path.strip_prefix(".").unwrap_or(path).to_path_buf()
        } else {
            path.to_path_buf()
        }
    }
}

/// Targets in first-seen order; a file reached twice is kept once.
#[derive(Debug, Default)]
struct Targets {
    items: Vec<FileTarget>,
    seen: HashSet<PathBuf>,
    stdin: bool,
}

impl Targets {
    fn push_path(&mut self, path: PathBuf) {
        let key = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if self.seen.insert(key) {
            self.items.push(FileTarget::Path(path));
        } else {
            trace!("Skipping duplicate {}", path.display());
        }
    }

    fn push_stdin(&mut self) {
        if !self.stdin {
            self.stdin = true;
            self.items.push(FileTarget::Stdin);
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn into_inner(self) -> Vec<FileTarget> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn tree() -> assert_fs::TempDir {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.txt").write_str("a\n").unwrap();
        temp.child("b.txt").write_str("b\n").unwrap();
        temp.child("c.md").write_str("c\n").unwrap();
        temp.child("sub/d.txt").write_str("d\n").unwrap();
        temp.child("sub/deeper/e.txt").write_str("e\n").unwrap();
        temp
    }

    fn names(targets: &[FileTarget]) -> Vec<String> {
        targets
            .iter()
            .map(|t| {
                t.path()
                    .and_then(Path::file_name)
                    .map_or_else(|| "-".to_string(), |n| n.to_string_lossy().into_owned())
            })
            .collect()
    }

    fn patterns(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_start_dir_unbounded_walk() {
        let temp = tree();
        let resolver = PatternResolver::new(Some(temp.path().to_path_buf()), None);
        let targets = resolver.resolve(&patterns(&["*.txt"])).unwrap();
        assert_eq!(names(&targets), vec!["a.txt", "b.txt", "d.txt", "e.txt"]);
    }

    #[test]
    fn test_depth_zero_stays_in_start_dir() {
        let temp = tree();
        let resolver = PatternResolver::new(Some(temp.path().to_path_buf()), Some(0));
        let targets = resolver.resolve(&patterns(&["*.txt"])).unwrap();
        assert_eq!(names(&targets), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_depth_one_includes_direct_subdirectories() {
        let temp = tree();
        let resolver = PatternResolver::new(Some(temp.path().to_path_buf()), Some(1));
        let targets = resolver.resolve(&patterns(&["*.txt"])).unwrap();
        assert_eq!(names(&targets), vec!["a.txt", "b.txt", "d.txt"]);
    }

    #[test]
    fn test_directory_in_pattern_becomes_start_dir() {
        let temp = tree();
        let pattern = temp.path().join("*.txt").to_string_lossy().into_owned();
        let targets = PatternResolver::default().resolve(&[pattern]).unwrap();
        assert_eq!(names(&targets), vec!["a.txt", "b.txt"]);
        assert!(targets[0].path().unwrap().starts_with(temp.path()));
    }

    #[test]
    fn test_overlapping_patterns_are_deduplicated() {
        let temp = tree();
        let resolver = PatternResolver::new(Some(temp.path().to_path_buf()), Some(0));
        let targets = resolver
            .resolve(&patterns(&["a.*", "*.txt", "a.txt"]))
            .unwrap();
        assert_eq!(names(&targets), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_pattern_with_separator_matches_relative_path() {
        let temp = tree();
        let resolver = PatternResolver::new(Some(temp.path().to_path_buf()), None);
        let targets = resolver.resolve(&patterns(&["sub/*.txt"])).unwrap();
        assert_eq!(names(&targets), vec!["d.txt"]);
    }

    #[test]
    fn test_existing_literal_path_is_accepted() {
        let temp = tree();
        let file = temp.path().join("c.md").to_string_lossy().into_owned();
        let targets = PatternResolver::default().resolve(&[file]).unwrap();
        assert_eq!(names(&targets), vec!["c.md"]);
    }

    #[test]
    fn test_stdin_marker() {
        let targets = PatternResolver::default()
            .resolve(&patterns(&["-", "-"]))
            .unwrap();
        assert_eq!(targets, vec![FileTarget::Stdin]);
    }

    #[test]
    fn test_no_match_is_an_error() {
        let temp = tree();
        let resolver = PatternResolver::new(Some(temp.path().to_path_buf()), None);
        let err = resolver.resolve(&patterns(&["*.rs"])).unwrap_err();
        assert!(matches!(err, Error::NoMatch { .. }));
    }

    #[test]
    fn test_invalid_glob() {
        let temp = tree();
        let resolver = PatternResolver::new(Some(temp.path().to_path_buf()), None);
        let err = resolver.resolve(&patterns(&["[unclosed"])).unwrap_err();
        assert!(matches!(err, Error::InvalidPattern { .. }));
        assert!(err.is_config());
    }

    #[test]
    fn test_missing_start_dir() {
        let resolver = PatternResolver::new(Some(PathBuf::from("/nonexistent/start/dir")), None);
        let err = resolver.resolve(&patterns(&["*"])).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_literal_files_keep_order_and_dedupe() {
        let targets = PatternResolver::literal(&patterns(&["b.txt", "a.txt", "b.txt"])).unwrap();
        assert_eq!(names(&targets), vec!["b.txt", "a.txt"]);
        assert!(PatternResolver::literal(&[]).is_err());
    }
}
