use std::collections::HashSet;

use crate::domain::{identity::normalize, BlacklistEntry, Identity};

/// Normalized usernames of the persisted blacklist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlacklistIndex {
    names: HashSet<String>,
}

impl BlacklistIndex {
    pub fn build<'a>(entries: impl IntoIterator<Item = &'a BlacklistEntry>) -> Self {
        Self {
            names: entries
                .into_iter()
                .filter_map(|entry| normalize(&entry.username))
                .collect(),
        }
    }

    /// True when any field of the identity is blacklisted.
    pub fn matches(&self, identity: &Identity) -> bool {
        !self.names.is_empty()
            && identity
                .candidates()
                .iter()
                .any(|candidate| self.names.contains(candidate))
    }

    pub fn contains(&self, username: &str) -> bool {
        normalize(username).is_some_and(|name| self.names.contains(&name))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
