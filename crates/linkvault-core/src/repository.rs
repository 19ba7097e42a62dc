use crate::entry::{NewEntry, OwnerId, ShortenEntry};
use crate::error::Result;
use crate::shortcode::ShortCode;
use async_trait::async_trait;

/// The storage contract shared by every backend variant.
///
/// Not-found is never an error: single lookups return `Ok(None)` and
/// enumerations return an empty vector. Lookups by original URL only see
/// live entries, while [`find_by_key`](Repository::find_by_key) also returns
/// soft-deleted entries so that callers can tell "gone" from "unknown".
/// Enumerations are ordered newest first.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Stores a new entry and returns the stored copy with its assigned id.
    ///
    /// Returns `Err(ShortCodeTaken)` if the code is already in use.
    async fn save(
        &self,
        code: &ShortCode,
        original_url: &str,
        owner_id: OwnerId,
    ) -> Result<ShortenEntry>;

    /// Stores a batch of entries.
    ///
    /// On failure the durable backends leave a well-defined prefix of the
    /// batch applied; an entry is never indexed without also being durable.
    async fn save_all(&self, entries: Vec<NewEntry>) -> Result<Vec<ShortenEntry>>;

    /// Returns a live entry for the given original URL.
    async fn find_by_url(&self, original_url: &str) -> Result<Option<ShortenEntry>>;

    /// Returns the live entries for any of the given original URLs.
    async fn find_by_urls(&self, original_urls: &[String]) -> Result<Vec<ShortenEntry>>;

    /// Returns the entry for a short code, including a soft-deleted one.
    async fn find_by_key(&self, code: &ShortCode) -> Result<Option<ShortenEntry>>;

    /// Returns every entry, newest first.
    async fn find_all(&self) -> Result<Vec<ShortenEntry>>;

    /// Returns every entry created by `owner_id`, newest first.
    async fn find_all_by_owner(&self, owner_id: OwnerId) -> Result<Vec<ShortenEntry>>;

    /// Soft-deletes the entry for a short code.
    ///
    /// Returns whether the backend completed the operation without error,
    /// not whether an entry existed. Deleting twice is not an error.
    async fn delete_by_short_code(&self, code: &ShortCode) -> bool;

    /// Releases file handles or connection pools.
    ///
    /// Must be called at most once per instance.
    async fn close(&self) -> Result<()>;

    /// Liveness probe. Backends without an external dependency are always up.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
