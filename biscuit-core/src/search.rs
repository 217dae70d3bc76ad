use ignore::{Walk, WalkBuilder};
use std::path::{Path, PathBuf};

/// A file whose name matched the search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMatch {
    pub label: String,
    pub path: PathBuf,
}

impl FileMatch {
    /// Hand the matched path to the editor's file-open callback.
    pub fn open<R>(&self, open: impl FnOnce(&Path) -> R) -> R {
        open(&self.path)
    }
}

/// Lazy walk over a directory tree yielding files whose name contains the
/// term. Directories whose path (relative to the root) contains an ignore
/// pattern are pruned and never read.
///
/// Single pass: start a new search when the term changes.
pub struct FileSearch {
    walker: Option<Walk>,
    term: String,
}

impl FileSearch {
    pub fn new(root: &Path, term: &str, ignore_patterns: &[String]) -> Self {
        let prune_root = root.to_path_buf();
        let patterns: Vec<String> = ignore_patterns
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect();

        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                if !entry.file_type().is_some_and(|ft| ft.is_dir()) {
                    return true;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&prune_root)
                    .unwrap_or(entry.path())
                    .to_string_lossy();
                !patterns.iter().any(|p| relative.contains(p.as_str()))
            })
            .build();

        Self {
            walker: Some(walker),
            term: term.to_string(),
        }
    }

    /// A search that yields nothing, used when no folder is open.
    pub fn empty() -> Self {
        Self {
            walker: None,
            term: String::new(),
        }
    }
}

impl Iterator for FileSearch {
    type Item = FileMatch;

    fn next(&mut self) -> Option<FileMatch> {
        let walker = self.walker.as_mut()?;
        for entry in walker.by_ref() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::debug!("Skipping unreadable entry during file search: {}", e);
                    continue;
                }
            };

            if entry.file_type().map_or(true, |ft| ft.is_dir()) {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            if name.contains(self.term.as_str()) {
                return Some(FileMatch {
                    label: name,
                    path: entry.into_path(),
                });
            }
        }
        self.walker = None;
        None
    }
}

/// Search `root` for files whose name contains `term`.
pub fn search_filenames(root: &Path, term: &str, ignore_patterns: &[String]) -> FileSearch {
    FileSearch::new(root, term, ignore_patterns)
}
