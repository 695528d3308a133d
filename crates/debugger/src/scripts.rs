//! Scripts the agent has reported, keyed by resolved path.
//!
//! The agent names scripts however the runtime loaded them: relative to its
//! working directory, with a leading `@`, or with Windows separators. Names
//! are resolved against the configured source roots and the result is keyed
//! case-insensitively. Scripts that cannot be resolved are still remembered
//! by runtime index so stack frames can name them and the host can fetch
//! their text.

use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
};

use dap::types::SourceReference;
use wire::ScriptIndex;

/// A script whose path was resolved on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedScript {
    pub path: PathBuf,
    pub index: ScriptIndex,
    pub source: Option<String>,
}

#[derive(Debug, Clone)]
struct PendingScript {
    name: String,
    source: Option<String>,
    reference: Option<SourceReference>,
}

/// What a runtime index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptRef<'a> {
    Loaded(&'a LoadedScript),
    Pending {
        name: &'a str,
        /// Set when the agent shipped the script text.
        reference: Option<SourceReference>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Resolved {
        key: String,
        path: PathBuf,
        /// False when the path was already loaded under some index.
        first_load: bool,
        /// False when the path was already loaded under this same index.
        new_index: bool,
    },
    Unresolved {
        name: String,
    },
}

#[derive(Debug, Default)]
pub struct ScriptRegistry {
    roots: Vec<PathBuf>,
    scripts: HashMap<String, LoadedScript>,
    keys_by_index: HashMap<ScriptIndex, String>,
    pending: HashMap<ScriptIndex, PendingScript>,
    sources_by_reference: HashMap<SourceReference, ScriptIndex>,
    next_reference: SourceReference,
}

impl ScriptRegistry {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Default::default()
        }
    }

    pub fn set_roots(&mut self, roots: Vec<PathBuf>) {
        self.roots = roots;
    }

    /// Resolve a script name reported by the agent to a path on disk.
    ///
    /// An absolute path that exists resolves to itself. Otherwise the roots
    /// are tried in order and the first one containing the file wins; an
    /// absolute name is looked up relative to each root.
    pub fn resolve(&self, reported: &str) -> Option<PathBuf> {
        let cleaned = clean_reported_name(reported);
        if cleaned.is_empty() {
            return None;
        }
        let candidate = Path::new(&cleaned);

        if candidate.is_absolute() && candidate.exists() {
            return Some(normalise(candidate));
        }

        let relative: PathBuf = candidate
            .components()
            .filter(|c| !matches!(c, Component::Prefix(_) | Component::RootDir))
            .collect();
        if relative.as_os_str().is_empty() {
            return None;
        }

        self.roots
            .iter()
            .map(|root| root.join(&relative))
            .find(|path| path.exists())
            .map(|path| normalise(&path))
    }

    /// Record a load event.
    pub fn load(&mut self, script: &wire::LoadScript) -> LoadOutcome {
        let resolved = self.resolve(&script.file_name);
        let key = resolved.as_deref().map(path_key);
        if key.is_none() || self.keys_by_index.get(&script.index) != key.as_ref() {
            self.evict_index(script.index);
        }
        let source = script.source_text().map(str::to_string);

        let (Some(path), Some(key)) = (resolved, key) else {
            let name = display_name(&script.file_name, script.index);
            let reference = source.as_ref().map(|_| {
                self.next_reference += 1;
                self.sources_by_reference
                    .insert(self.next_reference, script.index);
                self.next_reference
            });
            self.pending.insert(
                script.index,
                PendingScript {
                    name: name.clone(),
                    source,
                    reference,
                },
            );
            return LoadOutcome::Unresolved { name };
        };

        let previous = self.scripts.insert(
            key.clone(),
            LoadedScript {
                path: path.clone(),
                index: script.index,
                source,
            },
        );
        let previous_index = previous.map(|previous| previous.index);
        if let Some(index) = previous_index.filter(|index| *index != script.index) {
            self.keys_by_index.remove(&index);
        }
        self.keys_by_index.insert(script.index, key.clone());

        LoadOutcome::Resolved {
            key,
            path,
            first_load: previous_index.is_none(),
            new_index: previous_index != Some(script.index),
        }
    }

    /// Forget whatever was previously loaded under `index`.
    fn evict_index(&mut self, index: ScriptIndex) {
        if let Some(key) = self.keys_by_index.remove(&index) {
            self.scripts.remove(&key);
        }
        if let Some(pending) = self.pending.remove(&index) {
            if let Some(reference) = pending.reference {
                self.sources_by_reference.remove(&reference);
            }
        }
    }

    /// Runtime index of the script loaded from `path`, if any.
    pub fn index_of(&self, path: &Path) -> Option<ScriptIndex> {
        self.scripts.get(&path_key(path)).map(|script| script.index)
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        self.scripts.contains_key(key)
    }

    pub fn by_key(&self, key: &str) -> Option<&LoadedScript> {
        self.scripts.get(key)
    }

    pub fn by_index(&self, index: ScriptIndex) -> Option<ScriptRef<'_>> {
        if let Some(script) = self
            .keys_by_index
            .get(&index)
            .and_then(|key| self.scripts.get(key))
        {
            return Some(ScriptRef::Loaded(script));
        }
        self.pending.get(&index).map(|pending| ScriptRef::Pending {
            name: &pending.name,
            reference: pending.reference,
        })
    }

    /// Raw text of an unresolved script.
    pub fn source(&self, reference: SourceReference) -> Option<&str> {
        let index = self.sources_by_reference.get(&reference)?;
        self.pending.get(index)?.source.as_deref()
    }

    /// Resolved scripts ordered by path.
    pub fn loaded(&self) -> Vec<&LoadedScript> {
        let mut scripts: Vec<_> = self.scripts.values().collect();
        scripts.sort_by(|a, b| a.path.cmp(&b.path));
        scripts
    }

    pub fn clear(&mut self) {
        self.scripts.clear();
        self.keys_by_index.clear();
        self.pending.clear();
        self.sources_by_reference.clear();
    }
}

/// Registry key for a path: lexically normalised, `/` separated, lowercase.
pub fn path_key(path: &Path) -> String {
    normalise(path)
        .to_string_lossy()
        .replace('\\', "/")
        .to_lowercase()
}

fn clean_reported_name(reported: &str) -> String {
    reported
        .trim()
        .trim_start_matches('@')
        .replace('\\', "/")
}

fn display_name(reported: &str, index: ScriptIndex) -> String {
    let cleaned = clean_reported_name(reported);
    if cleaned.is_empty() {
        format!("<script {index}>")
    } else {
        cleaned
    }
}

/// Remove `.` components and fold `..` into its parent without touching disk.
fn normalise(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
