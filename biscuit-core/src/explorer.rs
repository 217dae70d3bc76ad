use std::path::{Path, PathBuf};

use crate::config::ExplorerSettings;
use crate::filesystem::{self, FileEntry};
use crate::palette::{Action, ActionSet, Command};
use crate::search::FileSearch;

pub const FILE_SEARCH_PREFIX: &str = "file:";
pub const NEW_FILE_PREFIX: &str = "newfile:";
pub const NEW_FOLDER_PREFIX: &str = "newfolder:";
pub const RENAME_PREFIX: &str = "rename:";

/// The sidebar file explorer's model: the open folder, what it ignores and
/// which entry is selected.
#[derive(Debug, Clone, Default)]
pub struct Explorer {
    root: Option<PathBuf>,
    ignore_dirs: Vec<String>,
    selected: Option<PathBuf>,
}

impl Explorer {
    pub fn new(settings: &ExplorerSettings) -> Self {
        Self {
            root: None,
            ignore_dirs: settings.ignore_dirs.clone(),
            selected: None,
        }
    }

    pub fn set_root(&mut self, root: Option<PathBuf>) {
        self.root = root;
        self.selected = None;
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn ignore_dirs(&self) -> &[String] {
        &self.ignore_dirs
    }

    pub fn select(&mut self, path: Option<PathBuf>) {
        self.selected = path;
    }

    pub fn selected(&self) -> Option<&Path> {
        self.selected.as_deref()
    }

    /// Children of `dir` for the tree view.
    pub fn children(&self, dir: &Path) -> Result<Vec<FileEntry>, String> {
        filesystem::read_directory_entries(dir, &self.ignore_dirs)
    }

    /// Files under the open folder whose name contains `term`.
    pub fn filesearch(&self, term: &str) -> FileSearch {
        match &self.root {
            Some(root) => FileSearch::new(root, term, &self.ignore_dirs),
            None => FileSearch::empty(),
        }
    }

    /// The `file:` palette set for the current term. Rebuilt on every
    /// keystroke.
    pub fn file_search_actionset(&self, term: &str) -> ActionSet {
        let mut set = ActionSet::new("Search files", FILE_SEARCH_PREFIX);
        set.update(
            self.filesearch(term)
                .map(|m| Action::new(m.label, Command::OpenFile(m.path))),
        );
        set
    }

    /// Static sets exposing create and rename to the palette.
    pub fn actionsets(&self) -> Vec<ActionSet> {
        vec![
            ActionSet::new("Add new file to directory", NEW_FILE_PREFIX)
                .with_pinned("Create new file: {}", Command::NewFile),
            ActionSet::new("Add new folder to parent directory", NEW_FOLDER_PREFIX)
                .with_pinned("Create new folder: {}", Command::NewFolder),
            ActionSet::new("Rename a file/folder", RENAME_PREFIX)
                .with_pinned("Rename to: {}", Command::Rename),
        ]
    }

    /// Run a palette command. `open` receives files to show in an editor.
    /// Returns the path that was opened, created or renamed.
    pub fn execute(
        &mut self,
        command: &Command,
        term: &str,
        open: &mut dyn FnMut(&Path),
    ) -> Result<PathBuf, String> {
        let root = self.root.clone().ok_or("No folder is open")?;
        match command {
            Command::OpenFile(path) => {
                filesystem::validate_path_within_root(path, &root)?;
                open(path);
                Ok(path.clone())
            }
            Command::NewFile => {
                let dir = self.target_directory(&root)?;
                let path = filesystem::create_file(&dir, term)?;
                log::info!("Created file {}", path.display());
                open(&path);
                Ok(path)
            }
            Command::NewFolder => {
                let dir = self.target_directory(&root)?;
                let path = filesystem::create_folder(&dir, term)?;
                log::info!("Created folder {}", path.display());
                Ok(path)
            }
            Command::Rename => {
                let selected = self.selected.clone().ok_or("Nothing is selected")?;
                let selected = filesystem::validate_path_within_root(&selected, &root)?;
                if selected == filesystem::validate_path_within_root(&root, &root)? {
                    return Err("Cannot rename the open folder".to_string());
                }
                let renamed = filesystem::rename_entry(&selected, term)?;
                log::info!("Renamed {} to {}", selected.display(), renamed.display());
                self.selected = Some(renamed.clone());
                Ok(renamed)
            }
        }
    }

    /// New entries go into the selected directory, the selected file's
    /// directory, or the root.
    fn target_directory(&self, root: &Path) -> Result<PathBuf, String> {
        let dir = match &self.selected {
            Some(sel) if sel.is_dir() => sel.clone(),
            Some(sel) => sel.parent().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
            None => root.to_path_buf(),
        };
        filesystem::validate_path_within_root(&dir, root)
    }
}
