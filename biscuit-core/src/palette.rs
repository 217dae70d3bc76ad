use std::path::PathBuf;

/// What running a palette entry does. Hosts dispatch these, usually through
/// [`crate::explorer::Explorer::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    OpenFile(PathBuf),
    NewFile,
    NewFolder,
    Rename,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub label: String,
    pub command: Command,
}

impl Action {
    pub fn new(label: impl Into<String>, command: Command) -> Self {
        Self {
            label: label.into(),
            command,
        }
    }
}

/// A group of palette entries reachable through a prefix such as `file:`.
///
/// Pinned entries always show; their labels are templates where `{}` is
/// replaced with whatever the user typed after the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSet {
    pub description: String,
    pub prefix: String,
    items: Vec<Action>,
    pinned: Vec<Action>,
}

impl ActionSet {
    pub fn new(description: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            prefix: prefix.into(),
            items: Vec::new(),
            pinned: Vec::new(),
        }
    }

    pub fn with_pinned(mut self, template: impl Into<String>, command: Command) -> Self {
        self.pinned.push(Action::new(template, command));
        self
    }

    /// Replace the dynamic entries.
    pub fn update(&mut self, items: impl IntoIterator<Item = Action>) {
        self.items = items.into_iter().collect();
    }

    pub fn items(&self) -> &[Action] {
        &self.items
    }

    /// Pinned entries with `term` substituted into their labels.
    pub fn pinned_for(&self, term: &str) -> Vec<Action> {
        self.pinned
            .iter()
            .map(|a| Action::new(a.label.replace("{}", term), a.command.clone()))
            .collect()
    }

    /// Pinned entries first, then items whose label contains `term`
    /// (case-insensitive).
    pub fn query(&self, term: &str) -> Vec<Action> {
        let needle = term.to_lowercase();
        let mut actions = self.pinned_for(term);
        actions.extend(
            self.items
                .iter()
                .filter(|a| a.label.to_lowercase().contains(&needle))
                .cloned(),
        );
        actions
    }
}

/// Registry of prefixed action sets.
#[derive(Debug, Default)]
pub struct Palette {
    sets: Vec<ActionSet>,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a set, replacing any earlier set with the same prefix.
    pub fn register(&mut self, set: ActionSet) {
        self.sets.retain(|s| s.prefix != set.prefix);
        self.sets.push(set);
    }

    pub fn get(&self, prefix: &str) -> Option<&ActionSet> {
        self.sets.iter().find(|s| s.prefix == prefix)
    }

    pub fn get_mut(&mut self, prefix: &str) -> Option<&mut ActionSet> {
        self.sets.iter_mut().find(|s| s.prefix == prefix)
    }

    /// Split `newfile:foo.py` into its set and the term `foo.py`.
    pub fn resolve<'a>(&self, input: &'a str) -> Option<(&ActionSet, &'a str)> {
        self.sets
            .iter()
            .filter(|s| !s.prefix.is_empty())
            .find_map(|s| input.strip_prefix(s.prefix.as_str()).map(|term| (s, term.trim_start())))
    }

    pub fn query(&self, input: &str) -> Vec<Action> {
        match self.resolve(input) {
            Some((set, term)) => set.query(term),
            None => Vec::new(),
        }
    }
}
