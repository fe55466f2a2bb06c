// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Known-good printer list.
//
// Printers recently confirmed idle and capability-bearing are remembered
// across sessions, so they can be listed even while a fresh capability fetch
// is failing.  The list is an optimisation only: every I/O failure is logged
// and otherwise ignored.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use printscout_core::PrinterId;
use printscout_core::error::Result;

/// File name of the persisted list inside the cache directory.
pub const KNOWN_GOOD_FILE: &str = "knowngood.json";

/// Bounded, most-recent-first list of printer ids.
#[derive(Debug, Clone)]
pub struct KnownGoodStore {
    ids: VecDeque<PrinterId>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl KnownGoodStore {
    /// An empty store that is never persisted.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            ids: VecDeque::new(),
            capacity,
            path: None,
        }
    }

    /// Load the store from `path`.  A missing or unreadable file yields an
    /// empty store.
    pub fn load(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let mut store = Self {
            ids: VecDeque::new(),
            capacity,
            path: Some(path.clone()),
        };

        if !path.exists() {
            return store;
        }
        match read_ids(&path) {
            Ok(ids) => {
                for id in ids {
                    if !store.ids.contains(&id) && store.ids.len() < capacity {
                        store.ids.push_back(id);
                    }
                }
                debug!(count = store.ids.len(), "loaded known-good printers");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read known-good list");
            }
        }
        store
    }

    pub fn contains(&self, id: &PrinterId) -> bool {
        self.ids.contains(id)
    }

    pub fn remove(&mut self, id: &PrinterId) {
        self.ids.retain(|known| known != id);
    }

    /// Put `id` at the front, dropping the oldest entries beyond capacity.
    pub fn promote(&mut self, id: PrinterId) {
        self.remove(&id);
        self.ids.push_front(id);
        self.ids.truncate(self.capacity);
    }

    /// Ids, most recently confirmed first.
    pub fn ids(&self) -> impl Iterator<Item = &PrinterId> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Write the store back to where it was loaded from.
    pub fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let ids: Vec<&PrinterId> = self.ids.iter().take(self.capacity).collect();
        match write_ids(path, &ids) {
            Ok(()) => debug!(count = ids.len(), "saved known-good printers"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to write known-good list"),
        }
    }
}

fn read_ids(path: &Path) -> Result<Vec<PrinterId>> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn write_ids(path: &Path, ids: &[&PrinterId]) -> Result<()> {
    let json = serde_json::to_string(ids)?;
    std::fs::write(path, json)?;
    Ok(())
}
