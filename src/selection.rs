// Selection Set - ids chosen for a batch action
//
// Ephemeral and never persisted. Uniqueness is structural; order is not
// meaningful (iteration is sorted only so output is stable).

use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    ids: BTreeSet<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the id if absent, remove it if present. Returns the new membership.
    pub fn toggle(&mut self, id: &str) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.to_string());
            true
        }
    }

    /// Header-checkbox behaviour: if the page is already exactly selected the
    /// selection is cleared, otherwise it becomes exactly the page.
    pub fn select_all<I, S>(&mut self, page_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let page: BTreeSet<String> = page_ids.into_iter().map(Into::into).collect();
        if !page.is_empty() && page == self.ids {
            self.ids.clear();
        } else {
            self.ids = page;
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.ids.iter()
    }

    /// Snapshot of the current ids, e.g. to stage a batch action
    pub fn to_vec(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }
}
