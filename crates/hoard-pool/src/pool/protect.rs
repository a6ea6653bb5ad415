//! Refcounted protection bookkeeping.
//!
//! Each tag names a set of assets. An asset's refcount is the number of tags
//! containing it, so dropping one tag never exposes an asset another tag
//! still holds.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct ProtectionTable {
    tags: HashMap<String, BTreeSet<String>>,
    refcounts: HashMap<String, u32>,
}

impl ProtectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add names to a tag; returns how many (tag, name) pairs were new
    pub fn protect<I, S>(&mut self, tag: &str, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = self.tags.entry(tag.to_string()).or_default();
        let mut added = 0;
        for name in names {
            let name = name.into();
            if set.insert(name.clone()) {
                *self.refcounts.entry(name).or_insert(0) += 1;
                added += 1;
            }
        }
        added
    }

    /// Drop a tag; returns the names whose refcount reached zero
    pub fn unprotect(&mut self, tag: &str) -> Vec<String> {
        let Some(names) = self.tags.remove(tag) else {
            return Vec::new();
        };
        let mut released = Vec::new();
        for name in names {
            if let Some(count) = self.refcounts.get_mut(&name) {
                *count -= 1;
                if *count == 0 {
                    self.refcounts.remove(&name);
                    released.push(name);
                }
            }
        }
        released
    }

    pub fn refcount(&self, name: &str) -> u32 {
        self.refcounts.get(name).copied().unwrap_or(0)
    }

    pub fn is_protected(&self, name: &str) -> bool {
        self.refcount(name) > 0
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &String> {
        self.tags.keys()
    }

    /// Drop every tag
    pub fn clear(&mut self) {
        self.tags.clear();
        self.refcounts.clear();
    }
}
