use crate::index::EntryIndex;
use async_trait::async_trait;
use jiff::Timestamp;
use linkvault_core::{NewEntry, OwnerId, Repository, Result, ShortCode, ShortenEntry};
use parking_lot::RwLock;

/// In-memory implementation of the [`Repository`] contract.
///
/// Both indexes sit behind a single reader-writer lock: lookups share the
/// read lock, saves and deletes take the write lock. Nothing is persisted,
/// so this backend is meant for ephemeral deployments and tests.
#[derive(Debug, Default)]
pub struct VolatileRepository {
    index: RwLock<EntryIndex>,
}

impl VolatileRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for VolatileRepository {
    async fn save(
        &self,
        code: &ShortCode,
        original_url: &str,
        owner_id: OwnerId,
    ) -> Result<ShortenEntry> {
        let mut index = self.index.write();
        index.ensure_codes_free([code])?;

        let entry = index.assign(
            NewEntry::new(code.clone(), original_url, owner_id),
            Timestamp::now(),
        );
        index.insert(entry.clone());
        Ok(entry)
    }

    async fn save_all(&self, entries: Vec<NewEntry>) -> Result<Vec<ShortenEntry>> {
        let mut index = self.index.write();
        // Validate the whole batch first so a conflict applies nothing.
        index.ensure_codes_free(entries.iter().map(|entry| &entry.short_code))?;

        let created_at = Timestamp::now();
        let stored: Vec<ShortenEntry> = entries
            .into_iter()
            .map(|entry| index.assign(entry, created_at))
            .collect();
        for entry in &stored {
            index.insert(entry.clone());
        }
        Ok(stored)
    }

    async fn find_by_url(&self, original_url: &str) -> Result<Option<ShortenEntry>> {
        Ok(self.index.read().live_by_url(original_url).cloned())
    }

    async fn find_by_urls(&self, original_urls: &[String]) -> Result<Vec<ShortenEntry>> {
        Ok(self.index.read().live_by_urls(original_urls))
    }

    async fn find_by_key(&self, code: &ShortCode) -> Result<Option<ShortenEntry>> {
        Ok(self.index.read().get_by_code(code).cloned())
    }

    async fn find_all(&self) -> Result<Vec<ShortenEntry>> {
        Ok(self.index.read().newest_first())
    }

    async fn find_all_by_owner(&self, owner_id: OwnerId) -> Result<Vec<ShortenEntry>> {
        Ok(self.index.read().newest_first_by_owner(owner_id))
    }

    async fn delete_by_short_code(&self, code: &ShortCode) -> bool {
        // Unknown codes are not a backend failure.
        self.index.write().mark_deleted(code);
        true
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkvault_core::StorageError;
    use std::sync::Arc;

    fn code(s: &str) -> ShortCode {
        ShortCode::new_unchecked(s)
    }

    #[tokio::test]
    async fn save_and_find_by_key() {
        let repo = VolatileRepository::new();

        let saved = repo
            .save(&code("abc1234"), "https://example.com/x", 1)
            .await
            .unwrap();

        let found = repo.find_by_key(&code("abc1234")).await.unwrap().unwrap();
        assert_eq!(found, saved);
        assert_eq!(found.original_url, "https://example.com/x");
        assert_eq!(found.owner_id, 1);
        assert!(!found.deleted);
    }

    #[tokio::test]
    async fn find_nonexistent() {
        let repo = VolatileRepository::new();

        assert!(repo.find_by_key(&code("nope")).await.unwrap().is_none());
        assert!(repo.find_by_url("https://nope.example").await.unwrap().is_none());
        assert!(repo.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_conflict_on_short_code() {
        let repo = VolatileRepository::new();

        repo.save(&code("abc1234"), "https://example.com", 1)
            .await
            .unwrap();

        let err = repo
            .save(&code("abc1234"), "https://other.com", 1)
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::ShortCodeTaken(_)));
        let stored = repo.find_by_key(&code("abc1234")).await.unwrap().unwrap();
        assert_eq!(stored.original_url, "https://example.com");
    }

    #[tokio::test]
    async fn same_url_may_have_several_codes() {
        let repo = VolatileRepository::new();

        repo.save(&code("first01"), "https://example.com", 1)
            .await
            .unwrap();
        let second = repo
            .save(&code("second2"), "https://example.com", 2)
            .await
            .unwrap();

        let by_url = repo.find_by_url("https://example.com").await.unwrap().unwrap();
        assert_eq!(by_url, second);
        assert_eq!(
            repo.find_by_urls(&["https://example.com".to_string()])
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn ids_increase_with_every_save() {
        let repo = VolatileRepository::new();

        let a = repo.save(&code("aaa1111"), "https://a.example", 1).await.unwrap();
        let b = repo.save(&code("bbb2222"), "https://b.example", 1).await.unwrap();

        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn save_all_is_all_or_nothing_on_conflict() {
        let repo = VolatileRepository::new();
        repo.save(&code("taken01"), "https://taken.example", 1)
            .await
            .unwrap();

        let err = repo
            .save_all(vec![
                NewEntry::new(code("fresh01"), "https://one.example", 1),
                NewEntry::new(code("taken01"), "https://two.example", 1),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::ShortCodeTaken(_)));
        assert!(repo.find_by_key(&code("fresh01")).await.unwrap().is_none());
        assert_eq!(repo.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_all_keeps_correlation_ids() {
        let repo = VolatileRepository::new();

        let stored = repo
            .save_all(vec![
                NewEntry::new(code("batch01"), "https://one.example", 3).with_correlation_id("c1"),
                NewEntry::new(code("batch02"), "https://two.example", 3).with_correlation_id("c2"),
            ])
            .await
            .unwrap();

        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].correlation_id.as_deref(), Some("c1"));
        assert_eq!(stored[1].correlation_id.as_deref(), Some("c2"));

        let all = repo.find_all().await.unwrap();
        assert_eq!(all.len(), 2);
        for entry in &stored {
            assert!(all.contains(entry));
        }
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let repo = VolatileRepository::new();
        repo.save(&code("abc1234"), "https://example.com/x", 1)
            .await
            .unwrap();

        assert!(repo.delete_by_short_code(&code("abc1234")).await);
        assert!(repo.delete_by_short_code(&code("abc1234")).await);

        let entry = repo.find_by_key(&code("abc1234")).await.unwrap().unwrap();
        assert!(entry.deleted);
    }

    #[tokio::test]
    async fn delete_unknown_code_is_not_an_error() {
        let repo = VolatileRepository::new();
        assert!(repo.delete_by_short_code(&code("missing")).await);
    }

    #[tokio::test]
    async fn deleted_entries_are_hidden_from_url_lookups_only() {
        let repo = VolatileRepository::new();
        repo.save(&code("abc1234"), "https://example.com/x", 1)
            .await
            .unwrap();
        repo.delete_by_short_code(&code("abc1234")).await;

        assert!(repo.find_by_url("https://example.com/x").await.unwrap().is_none());
        assert!(repo
            .find_by_urls(&["https://example.com/x".to_string()])
            .await
            .unwrap()
            .is_empty());
        assert!(repo.find_by_key(&code("abc1234")).await.unwrap().unwrap().deleted);
        assert_eq!(repo.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn enumerations_are_newest_first_and_owner_scoped() {
        let repo = VolatileRepository::new();
        repo.save(&code("own1aaa"), "https://1.example", 1).await.unwrap();
        repo.save(&code("own2aaa"), "https://2.example", 2).await.unwrap();
        repo.save(&code("own1bbb"), "https://3.example", 1).await.unwrap();

        let all: Vec<_> = repo
            .find_all()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.short_code.to_string())
            .collect();
        assert_eq!(all, ["own1bbb", "own2aaa", "own1aaa"]);

        let owned: Vec<_> = repo
            .find_all_by_owner(1)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.short_code.to_string())
            .collect();
        assert_eq!(owned, ["own1bbb", "own1aaa"]);
        assert!(repo.find_all_by_owner(9).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_never_see_indexes_disagree() {
        let repo = Arc::new(VolatileRepository::new());
        let mut handles = vec![];

        for i in 0..200u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let c = ShortCode::new_unchecked(format!("code-{:03}", i));
                repo.save(&c, &format!("https://example{}.com", i), 1)
                    .await
                    .unwrap();
            }));
        }

        for i in 0..200u64 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let c = ShortCode::new_unchecked(format!("code-{:03}", i));
                let url = format!("https://example{}.com", i);
                // Entries are never removed, so once the key is visible the
                // URL must be visible as well.
                if repo.find_by_key(&c).await.unwrap().is_some() {
                    assert!(repo.find_by_url(&url).await.unwrap().is_some());
                }
                assert!(repo.index.read().is_coherent());
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(repo.find_all().await.unwrap().len(), 200);
    }
}
