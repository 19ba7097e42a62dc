use crate::error::RegistryError;
use linkvault_core::{NewEntry, OwnerId, Repository, ShortCode, ShortenEntry, StorageError};
use linkvault_storage::{BulkDeleteReport, BulkDeleter, DEFAULT_DELETE_CONCURRENCY};
use linkvault_token::TokenSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// How many tokens are drawn before giving up on a collision streak.
pub const MAX_TOKEN_ATTEMPTS: usize = 5;

type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Clone, TypedBuilder)]
pub struct RegistryConfig {
    /// Prefix of every short URL handed out.
    #[builder(default = DEFAULT_BASE_URL.to_string(), setter(into))]
    pub base_url: String,
    /// Upper bound on deletes in flight during a bulk delete.
    #[builder(default = DEFAULT_DELETE_CONCURRENCY)]
    pub delete_concurrency: usize,
}

/// The result of shortening a single URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortened {
    pub short_url: String,
    /// `false` when an existing entry was returned instead of a new one.
    pub created: bool,
}

/// One item of a batch shorten request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

/// One item of a batch shorten response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchShortened {
    pub correlation_id: String,
    pub short_url: String,
}

/// What a short code currently points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Redirect(String),
    /// The entry exists but was soft-deleted.
    Gone,
    NotFound,
}

/// A stored entry as shown to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnedUrl {
    pub short_url: String,
    pub original_url: String,
    pub deleted: bool,
}

/// The registry facade over a storage backend and a token source.
///
/// The token source only promises well-formed codes. Uniqueness is settled
/// by the backend, and the registry draws a fresh token whenever a save
/// reports that the code is already taken.
pub struct Registry<R, T> {
    repo: Arc<R>,
    tokens: T,
    base_url: String,
    deleter: BulkDeleter<R>,
}

impl<R: Repository, T: TokenSource> Registry<R, T> {
    pub fn new(repo: Arc<R>, tokens: T, config: RegistryConfig) -> Self {
        let deleter = BulkDeleter::new(Arc::clone(&repo), config.delete_concurrency);
        Self {
            repo,
            tokens,
            base_url: config.base_url,
            deleter,
        }
    }

    /// Returns the storage backend.
    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    /// Formats the public short URL for `code`.
    pub fn short_url(&self, code: &ShortCode) -> String {
        code.to_url(&self.base_url)
    }

    /// Validates that the URL has an http(s) scheme and a host.
    fn validate_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(RegistryError::InvalidUrl("URL cannot be empty".to_string()));
        }

        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(RegistryError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {}",
                url
            )));
        };

        let scheme = scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(RegistryError::InvalidUrl(format!(
                "URL scheme must be http or https: {}",
                scheme
            )));
        }

        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if host.is_empty() {
            return Err(RegistryError::InvalidUrl(format!(
                "URL must have a host: {}",
                url
            )));
        }

        Ok(())
    }

    /// Draws a token and checks that it is well formed.
    fn next_code(&self) -> Result<ShortCode> {
        let code = self.tokens.get();
        self.tokens.check(code.as_str())?;
        Ok(code)
    }

    /// Shortens `original_url` on behalf of `owner`.
    pub async fn shorten(&self, original_url: &str, owner: OwnerId) -> Result<Shortened> {
        Self::validate_url(original_url)?;

        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let code = self.next_code()?;
            match self.repo.save(&code, original_url, owner).await {
                Ok(entry) => {
                    info!(code = %entry.short_code, owner, "url shortened");
                    return Ok(Shortened {
                        short_url: self.short_url(&entry.short_code),
                        created: true,
                    });
                }
                Err(StorageError::ShortCodeTaken(_)) => {
                    debug!(code = %code, attempt, "short code taken, drawing another");
                }
                Err(StorageError::UrlExists(url)) => {
                    let entry = self
                        .live_entry_for(&url, owner)
                        .await?
                        .ok_or(StorageError::UrlExists(url))?;
                    return Ok(Shortened {
                        short_url: self.short_url(&entry.short_code),
                        created: false,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(RegistryError::TokensExhausted(MAX_TOKEN_ATTEMPTS))
    }

    /// Newest live entry for `url` created by `owner`.
    async fn live_entry_for(&self, url: &str, owner: OwnerId) -> Result<Option<ShortenEntry>> {
        let entries = self.repo.find_by_urls(&[url.to_string()]).await?;
        Ok(entries.into_iter().rev().find(|entry| entry.owner_id == owner))
    }

    /// Shortens a batch of URLs, answering in request order.
    ///
    /// URLs the owner already shortened are answered with the existing code.
    /// Items sharing a URL share one new entry, which carries the correlation
    /// id of the first such item.
    pub async fn shorten_batch(
        &self,
        items: Vec<BatchItem>,
        owner: OwnerId,
    ) -> Result<Vec<BatchShortened>> {
        for item in &items {
            Self::validate_url(&item.original_url)?;
        }

        let mut first_correlation: HashMap<&str, &str> = HashMap::new();
        let mut urls = Vec::new();
        for item in &items {
            if !first_correlation.contains_key(item.original_url.as_str()) {
                first_correlation.insert(&item.original_url, &item.correlation_id);
                urls.push(item.original_url.clone());
            }
        }

        let mut codes: HashMap<String, ShortCode> = HashMap::new();
        if !urls.is_empty() {
            // Oldest first, so the newest entry per URL wins.
            for entry in self.repo.find_by_urls(&urls).await? {
                if entry.owner_id == owner {
                    codes.insert(entry.original_url, entry.short_code);
                }
            }
        }

        let pending: Vec<(&str, &str)> = urls
            .iter()
            .filter(|url| !codes.contains_key(url.as_str()))
            .map(|url| (url.as_str(), first_correlation[url.as_str()]))
            .collect();
        let reused = urls.len() - pending.len();

        if !pending.is_empty() {
            for entry in self.save_batch(&pending, owner).await? {
                codes.insert(entry.original_url, entry.short_code);
            }
        }
        info!(
            items = items.len(),
            created = urls.len() - reused,
            reused,
            owner,
            "batch shortened"
        );

        items
            .into_iter()
            .map(|item| -> Result<BatchShortened> {
                let code = codes.get(&item.original_url).ok_or_else(|| {
                    StorageError::InvalidData(format!(
                        "batch entry missing for {}",
                        item.original_url
                    ))
                })?;
                Ok(BatchShortened {
                    short_url: self.short_url(code),
                    correlation_id: item.correlation_id,
                })
            })
            .collect()
    }

    /// Stores `(url, correlation_id)` pairs with fresh codes in one `save_all`.
    async fn save_batch(
        &self,
        pending: &[(&str, &str)],
        owner: OwnerId,
    ) -> Result<Vec<ShortenEntry>> {
        for attempt in 1..=MAX_TOKEN_ATTEMPTS {
            let batch = pending
                .iter()
                .map(|(url, correlation_id)| -> Result<NewEntry> {
                    Ok(NewEntry::new(self.next_code()?, *url, owner)
                        .with_correlation_id(*correlation_id))
                })
                .collect::<Result<Vec<_>>>()?;

            match self.repo.save_all(batch).await {
                Ok(stored) => return Ok(stored),
                Err(StorageError::ShortCodeTaken(code)) => {
                    debug!(code = %code, attempt, "batch hit a taken short code, redrawing");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(RegistryError::TokensExhausted(MAX_TOKEN_ATTEMPTS))
    }

    /// Looks up where `code` should redirect.
    pub async fn resolve(&self, code: &str) -> Result<Resolution> {
        let Ok(code) = ShortCode::new(code) else {
            return Ok(Resolution::NotFound);
        };

        let resolution = match self.repo.find_by_key(&code).await? {
            Some(entry) if entry.deleted => Resolution::Gone,
            Some(entry) => Resolution::Redirect(entry.original_url),
            None => Resolution::NotFound,
        };
        Ok(resolution)
    }

    /// Every entry created by `owner`, newest first.
    pub async fn urls_by_owner(&self, owner: OwnerId) -> Result<Vec<OwnedUrl>> {
        let entries = self.repo.find_all_by_owner(owner).await?;
        Ok(self.to_owned_urls(entries))
    }

    /// Every stored entry, newest first.
    pub async fn all_urls(&self) -> Result<Vec<OwnedUrl>> {
        let entries = self.repo.find_all().await?;
        Ok(self.to_owned_urls(entries))
    }

    fn to_owned_urls(&self, entries: Vec<ShortenEntry>) -> Vec<OwnedUrl> {
        entries
            .into_iter()
            .map(|entry| OwnedUrl {
                short_url: self.short_url(&entry.short_code),
                original_url: entry.original_url,
                deleted: entry.deleted,
            })
            .collect()
    }

    fn parse_codes(codes: Vec<String>) -> Vec<ShortCode> {
        codes
            .into_iter()
            .filter_map(|raw| match ShortCode::new(raw.as_str()) {
                Ok(code) => Some(code),
                Err(err) => {
                    debug!(code = %raw, error = %err, "skipping malformed short code");
                    None
                }
            })
            .collect()
    }

    /// Soft-deletes `codes` and waits for every attempt.
    pub async fn delete_urls(&self, codes: Vec<String>) -> BulkDeleteReport {
        let report = self.deleter.delete_all(Self::parse_codes(codes)).await;
        info!(
            attempted = report.len(),
            succeeded = report.succeeded(),
            "bulk delete finished"
        );
        report
    }

    /// Starts soft-deleting `codes` in the background.
    ///
    /// Returns the number of well-formed codes scheduled.
    pub fn schedule_delete(&self, codes: Vec<String>) -> usize {
        let codes = Self::parse_codes(codes);
        let scheduled = codes.len();
        drop(self.deleter.dispatch(codes));
        scheduled
    }

    pub async fn ping(&self) -> Result<()> {
        Ok(self.repo.ping().await?)
    }

    pub async fn close(&self) -> Result<()> {
        Ok(self.repo.close().await?)
    }
}
