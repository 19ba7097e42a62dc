use crate::shortcode::ShortCode;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Identifies the user or session that created an entry.
pub type OwnerId = i64;

/// Owner id used when no user is attached to the request.
pub const ANONYMOUS_OWNER: OwnerId = 0;

/// A stored mapping between a short code and an original URL.
///
/// Entries are owned by the repository that created them. Callers only ever
/// see clones, so the only way to change an entry is through the repository
/// write path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenEntry {
    /// Assigned by the store when the entry is written. Never reused.
    pub id: i64,
    /// Opaque client token correlating batch request and response items.
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub short_code: ShortCode,
    pub original_url: String,
    #[serde(default)]
    pub owner_id: OwnerId,
    /// Soft-delete flag. Once set it is never cleared.
    #[serde(default)]
    pub deleted: bool,
    #[serde(default = "Timestamp::now")]
    pub created_at: Timestamp,
}

impl ShortenEntry {
    /// Returns `true` if the entry has not been soft-deleted.
    pub fn is_live(&self) -> bool {
        !self.deleted
    }
}

/// An entry that has not been stored yet.
///
/// This is the input to [`Repository::save_all`](crate::Repository::save_all);
/// ids and creation times are always assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub short_code: ShortCode,
    pub original_url: String,
    pub owner_id: OwnerId,
    pub correlation_id: Option<String>,
}

impl NewEntry {
    pub fn new(short_code: ShortCode, original_url: impl Into<String>, owner_id: OwnerId) -> Self {
        Self {
            short_code,
            original_url: original_url.into(),
            owner_id,
            correlation_id: None,
        }
    }

    /// Attaches a batch correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Turns the pending entry into a stored one.
    pub fn into_entry(self, id: i64, created_at: Timestamp) -> ShortenEntry {
        ShortenEntry {
            id,
            correlation_id: self.correlation_id,
            short_code: self.short_code,
            original_url: self.original_url,
            owner_id: self.owner_id,
            deleted: false,
            created_at,
        }
    }
}
