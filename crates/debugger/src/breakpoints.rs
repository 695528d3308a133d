//! Host breakpoints, grouped by source path.
//!
//! Each `setBreakpoints` call replaces the whole set for its path. Sets are
//! kept for the life of the session so they can be (re)sent whenever the
//! owning script is loaded.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use dap::types::BreakpointId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub line: i64,
    pub source_path: PathBuf,
}

#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    last_id: BreakpointId,
    by_key: HashMap<String, Vec<Breakpoint>>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set recorded under `key`, returning the superseded one.
    ///
    /// Every line gets a fresh id, even if it was already set.
    pub fn replace(&mut self, key: &str, source_path: &Path, lines: &[i64]) -> Vec<Breakpoint> {
        let breakpoints: Vec<Breakpoint> = lines
            .iter()
            .map(|&line| {
                self.last_id += 1;
                Breakpoint {
                    id: self.last_id,
                    line,
                    source_path: source_path.to_path_buf(),
                }
            })
            .collect();

        self.by_key
            .insert(key.to_string(), breakpoints)
            .unwrap_or_default()
    }

    /// Breakpoints for `key`, in the order they were declared.
    pub fn for_key(&self, key: &str) -> &[Breakpoint] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
    }
}
