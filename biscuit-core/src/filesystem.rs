use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// Read directory contents, sorted: directories first, then files,
/// alphabetical within each group. Entries whose name contains one of the
/// ignore patterns are left out.
pub fn read_directory_entries(path: &Path, ignore: &[String]) -> Result<Vec<FileEntry>, String> {
    if !path.is_dir() {
        return Err(format!("Not a directory: {}", path.display()));
    }

    let mut entries = Vec::new();
    let read_dir = fs::read_dir(path).map_err(|e| format!("Failed to read directory: {}", e))?;

    for entry in read_dir {
        let entry = entry.map_err(|e| format!("Failed to read entry: {}", e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        let file_type = entry
            .file_type()
            .map_err(|e| format!("Failed to get file type: {}", e))?;

        if file_type.is_dir() && ignore.iter().any(|p| !p.is_empty() && name.contains(p.as_str())) {
            continue;
        }

        entries.push(FileEntry {
            name,
            path: entry.path(),
            is_dir: file_type.is_dir(),
            is_symlink: file_type.is_symlink(),
        });
    }

    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });

    Ok(entries)
}

/// Validates that `path` is within `root` after canonicalization.
/// Returns the canonicalized path on success, or an error if path escapes root.
pub fn validate_path_within_root(path: &Path, root: &Path) -> Result<PathBuf, String> {
    let canonical_root = fs::canonicalize(root)
        .map_err(|e| format!("Failed to canonicalize root '{}': {}", root.display(), e))?;
    let canonical_path = fs::canonicalize(path)
        .map_err(|e| format!("Failed to canonicalize path '{}': {}", path.display(), e))?;
    if !canonical_path.starts_with(&canonical_root) {
        return Err(format!(
            "Path '{}' is outside the workspace root '{}'",
            path.display(),
            root.display()
        ));
    }
    Ok(canonical_path)
}

/// A bare file name: non-empty, no separators, not `.` or `..`.
fn validate_name(name: &str) -> Result<&str, String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Name must not be empty".to_string());
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(format!("Invalid name '{}'", name));
    }
    Ok(name)
}

/// Create an empty file named `name` inside `dir`.
pub fn create_file(dir: &Path, name: &str) -> Result<PathBuf, String> {
    let name = validate_name(name)?;
    let path = dir.join(name);
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| format!("Failed to create '{}': {}", path.display(), e))?;
    Ok(path)
}

/// Create a directory named `name` inside `dir`.
pub fn create_folder(dir: &Path, name: &str) -> Result<PathBuf, String> {
    let name = validate_name(name)?;
    let path = dir.join(name);
    fs::create_dir(&path).map_err(|e| format!("Failed to create '{}': {}", path.display(), e))?;
    Ok(path)
}

/// Rename `path` in place, keeping it in the same parent directory.
pub fn rename_entry(path: &Path, new_name: &str) -> Result<PathBuf, String> {
    let new_name = validate_name(new_name)?;
    let parent = path
        .parent()
        .ok_or_else(|| format!("Cannot determine parent directory of '{}'", path.display()))?;
    let target = parent.join(new_name);
    if target.exists() {
        return Err(format!("'{}' already exists", target.display()));
    }
    fs::rename(path, &target).map_err(|e| {
        format!(
            "Failed to rename '{}' to '{}': {}",
            path.display(),
            target.display(),
            e
        )
    })?;
    Ok(target)
}
