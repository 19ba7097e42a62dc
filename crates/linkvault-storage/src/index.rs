use jiff::Timestamp;
use linkvault_core::{NewEntry, OwnerId, Result, ShortCode, ShortenEntry, StorageError};
use std::collections::{BTreeMap, HashMap, HashSet};

/// The dual index shared by the in-memory backends.
///
/// Entries live in an id-ordered primary map; `by_code` and `by_url` point
/// into it. Every mutation goes through `insert` or `mark_deleted`, which
/// update all maps together, so the two lookup paths always agree on which
/// entries exist. Callers hold the owning backend's lock around every call.
#[derive(Debug, Default)]
pub(crate) struct EntryIndex {
    entries: BTreeMap<i64, ShortenEntry>,
    by_code: HashMap<ShortCode, i64>,
    by_url: HashMap<String, Vec<i64>>,
    last_id: i64,
}

impl EntryIndex {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains_code(&self, code: &ShortCode) -> bool {
        self.by_code.contains_key(code)
    }

    /// Fails if any code is already indexed or repeated within `entries`.
    pub(crate) fn ensure_codes_free<'a>(
        &self,
        codes: impl IntoIterator<Item = &'a ShortCode>,
    ) -> Result<()> {
        let mut batch = HashSet::new();
        for code in codes {
            if self.contains_code(code) || !batch.insert(code) {
                return Err(StorageError::ShortCodeTaken(code.to_string()));
            }
        }
        Ok(())
    }

    /// Assigns the next id and a creation time without indexing the entry.
    ///
    /// Ids handed out here are never reused, even if the caller fails to
    /// make the entry durable afterwards.
    pub(crate) fn assign(&mut self, entry: NewEntry, created_at: Timestamp) -> ShortenEntry {
        self.last_id += 1;
        entry.into_entry(self.last_id, created_at)
    }

    /// Adds an entry to every map. The short code must be free.
    pub(crate) fn insert(&mut self, entry: ShortenEntry) {
        debug_assert!(!self.contains_code(&entry.short_code));

        self.by_code.insert(entry.short_code.clone(), entry.id);
        self.by_url
            .entry(entry.original_url.clone())
            .or_default()
            .push(entry.id);
        self.entries.insert(entry.id, entry);
    }

    /// Sets the deleted flag. Returns `false` if the code is unknown.
    pub(crate) fn mark_deleted(&mut self, code: &ShortCode) -> bool {
        let Some(id) = self.by_code.get(code) else {
            return false;
        };

        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.deleted = true;
                true
            }
            None => false,
        }
    }

    pub(crate) fn get_by_code(&self, code: &ShortCode) -> Option<&ShortenEntry> {
        self.by_code.get(code).and_then(|id| self.entries.get(id))
    }

    /// Newest live entry for the URL.
    pub(crate) fn live_by_url(&self, original_url: &str) -> Option<&ShortenEntry> {
        self.by_url
            .get(original_url)?
            .iter()
            .rev()
            .filter_map(|id| self.entries.get(id))
            .find(|entry| entry.is_live())
    }

    /// Every live entry for any of the URLs, oldest first.
    pub(crate) fn live_by_urls(&self, original_urls: &[String]) -> Vec<ShortenEntry> {
        let wanted: HashSet<&str> = original_urls.iter().map(String::as_str).collect();
        let mut ids: Vec<i64> = wanted
            .into_iter()
            .filter_map(|url| self.by_url.get(url))
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();

        ids.into_iter()
            .filter_map(|id| self.entries.get(&id))
            .filter(|entry| entry.is_live())
            .cloned()
            .collect()
    }

    pub(crate) fn newest_first(&self) -> Vec<ShortenEntry> {
        self.entries.values().rev().cloned().collect()
    }

    pub(crate) fn newest_first_by_owner(&self, owner_id: OwnerId) -> Vec<ShortenEntry> {
        self.entries
            .values()
            .rev()
            .filter(|entry| entry.owner_id == owner_id)
            .cloned()
            .collect()
    }

    /// Checks that both lookup paths cover exactly the stored entries.
    #[cfg(test)]
    pub(crate) fn is_coherent(&self) -> bool {
        let by_code_ok = self.by_code.len() == self.entries.len()
            && self.by_code.iter().all(|(code, id)| {
                self.entries
                    .get(id)
                    .is_some_and(|entry| &entry.short_code == code)
            });
        let url_ids: usize = self.by_url.values().map(Vec::len).sum();
        let by_url_ok = url_ids == self.entries.len()
            && self.by_url.iter().all(|(url, ids)| {
                ids.iter().all(|id| {
                    self.entries
                        .get(id)
                        .is_some_and(|entry| &entry.original_url == url)
                })
            });
        by_code_ok && by_url_ok
    }
}
