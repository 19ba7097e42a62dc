use async_trait::async_trait;
use jiff::Timestamp;
use linkvault_core::{
    NewEntry, OwnerId, Repository, Result, ShortCode, ShortenEntry, StorageError,
};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgDatabaseError, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, error, info};

/// Forward migrations embedded at build time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Partial unique index over live rows. Postgres reports the index name as
/// the violated constraint.
const ORIGINAL_URL_CONSTRAINT: &str = "short_urls_live_original_url_user_id_idx";

const ENTRY_COLUMNS: &str =
    "id, correlation_id, short_url, original_url, user_id, is_deleted, created_at";

/// PostgreSQL implementation of the repository contract.
///
/// Soft delete is implemented with `is_deleted`. URL lookups only return live
/// rows, [`find_by_key`](Repository::find_by_key) returns deleted rows too.
/// Each owner may hold one live entry per `original_url`; a second attempt is
/// rejected with [`StorageError::UrlExists`]. Soft-deleted rows release the
/// URL again.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Creates a repository from an existing pool and applies pending migrations.
    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;
        debug!("short_urls schema is up to date");
        Ok(Self { pool })
    }

    /// Opens a new pool for `dsn` and applies pending migrations.
    pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(dsn)
            .await
            .map_err(map_sqlx_error)?;
        info!(max_connections, "connected to postgres");
        Self::from_pool(pool).await
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

/// Maps unique violations to the matching conflict variant.
fn map_write_error(err: sqlx::Error, code: &str, original_url: &str) -> StorageError {
    if !is_unique_violation(&err) {
        return map_sqlx_error(err);
    }

    let constraint = err.as_database_error().and_then(|db| db.constraint());
    match constraint {
        Some(ORIGINAL_URL_CONSTRAINT) => StorageError::UrlExists(original_url.to_string()),
        // `short_urls_short_url_key` is the only other unique key.
        _ => StorageError::ShortCodeTaken(code.to_string()),
    }
}

/// The server's `DETAIL` line for a failed statement, e.g.
/// `Key (short_url)=(abc1234) already exists.`
fn violation_detail(err: &sqlx::Error) -> String {
    err.as_database_error()
        .and_then(|db| db.try_downcast_ref::<PgDatabaseError>())
        .and_then(PgDatabaseError::detail)
        .unwrap_or("batch")
        .to_string()
}

fn entry_from_row(row: &PgRow) -> Result<ShortenEntry> {
    let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
    let short_code = ShortCode::new(short_url)
        .map_err(|e| StorageError::InvalidData(e.to_string()))?;
    let created_at_raw: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
    let created_at = Timestamp::from_microsecond(created_at_raw).map_err(|e| {
        StorageError::InvalidData(format!("invalid created_at '{created_at_raw}': {e}"))
    })?;

    Ok(ShortenEntry {
        id: row.try_get("id").map_err(map_sqlx_error)?,
        correlation_id: row.try_get("correlation_id").map_err(map_sqlx_error)?,
        short_code,
        original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
        owner_id: row.try_get("user_id").map_err(map_sqlx_error)?,
        deleted: row.try_get("is_deleted").map_err(map_sqlx_error)?,
        created_at,
    })
}

fn entries_from_rows(rows: &[PgRow]) -> Result<Vec<ShortenEntry>> {
    rows.iter().map(entry_from_row).collect()
}

/// Escapes a value for the `COPY ... FROM STDIN` text format.
fn push_copy_text(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

/// Renders a batch as `COPY` text rows in column order
/// `correlation_id, short_url, original_url, user_id, created_at`.
fn copy_payload(entries: &[NewEntry], created_at: Timestamp) -> String {
    let created_at = created_at.as_microsecond();
    let mut out = String::with_capacity(entries.len() * 96);

    for entry in entries {
        match &entry.correlation_id {
            Some(id) => push_copy_text(&mut out, id),
            None => out.push_str("\\N"),
        }
        out.push('\t');
        push_copy_text(&mut out, entry.short_code.as_str());
        out.push('\t');
        push_copy_text(&mut out, &entry.original_url);
        out.push('\t');
        out.push_str(&entry.owner_id.to_string());
        out.push('\t');
        out.push_str(&created_at.to_string());
        out.push('\n');
    }
    out
}

#[async_trait]
impl Repository for PgRepository {
    async fn save(
        &self,
        code: &ShortCode,
        original_url: &str,
        owner_id: OwnerId,
    ) -> Result<ShortenEntry> {
        let query = format!(
            r#"
            INSERT INTO short_urls (short_url, original_url, user_id, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING {ENTRY_COLUMNS}
            "#
        );

        let row = sqlx::query(&query)
            .bind(code.as_str())
            .bind(original_url)
            .bind(owner_id)
            .bind(Timestamp::now().as_microsecond())
            .fetch_one(&self.pool)
            .await
            .map_err(|err| map_write_error(err, code.as_str(), original_url))?;

        entry_from_row(&row)
    }

    async fn save_all(&self, entries: Vec<NewEntry>) -> Result<Vec<ShortenEntry>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let payload = copy_payload(&entries, Timestamp::now());
        let codes: Vec<String> = entries
            .iter()
            .map(|entry| entry.short_code.to_string())
            .collect();

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let mut copy = tx
            .copy_in_raw(
                "COPY short_urls (correlation_id, short_url, original_url, user_id, created_at) FROM STDIN",
            )
            .await
            .map_err(map_sqlx_error)?;
        copy.send(payload.as_bytes())
            .await
            .map_err(map_sqlx_error)?;
        let copied = copy
            .finish()
            .await
            .map_err(|err| {
                let detail = violation_detail(&err);
                map_write_error(err, &detail, &detail)
            })?;

        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM short_urls WHERE short_url = ANY($1) ORDER BY id"
        );
        let rows = sqlx::query(&query)
            .bind(&codes)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(rows = copied, "batch copied");

        entries_from_rows(&rows)
    }

    async fn find_by_url(&self, original_url: &str) -> Result<Option<ShortenEntry>> {
        let query = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM short_urls
            WHERE original_url = $1
              AND NOT is_deleted
            ORDER BY id DESC
            LIMIT 1
            "#
        );

        let row = sqlx::query(&query)
            .bind(original_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn find_by_urls(&self, original_urls: &[String]) -> Result<Vec<ShortenEntry>> {
        if original_urls.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM short_urls
            WHERE original_url = ANY($1)
              AND NOT is_deleted
            ORDER BY id
            "#
        );

        let rows = sqlx::query(&query)
            .bind(original_urls)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        entries_from_rows(&rows)
    }

    async fn find_by_key(&self, code: &ShortCode) -> Result<Option<ShortenEntry>> {
        let query = format!("SELECT {ENTRY_COLUMNS} FROM short_urls WHERE short_url = $1");

        let row = sqlx::query(&query)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn find_all(&self) -> Result<Vec<ShortenEntry>> {
        let query = format!(
            "SELECT {ENTRY_COLUMNS} FROM short_urls ORDER BY created_at DESC, id DESC"
        );

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        entries_from_rows(&rows)
    }

    async fn find_all_by_owner(&self, owner_id: OwnerId) -> Result<Vec<ShortenEntry>> {
        let query = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM short_urls
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "#
        );

        let rows = sqlx::query(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        entries_from_rows(&rows)
    }

    async fn delete_by_short_code(&self, code: &ShortCode) -> bool {
        let result = sqlx::query("UPDATE short_urls SET is_deleted = TRUE WHERE short_url = $1")
            .bind(code.as_str())
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) => {
                debug!(code = %code, rows = done.rows_affected(), "soft deleted");
                true
            }
            Err(err) => {
                error!(code = %code, error = %map_sqlx_error(err), "soft delete failed");
                false
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_text_escapes_control_characters() {
        let mut out = String::new();
        push_copy_text(&mut out, "a\tb\\c\nd\re");
        assert_eq!(out, "a\\tb\\\\c\\nd\\re");
    }

    #[test]
    fn copy_payload_renders_one_row_per_entry() {
        let created_at = Timestamp::from_microsecond(1_700_000_000_000_000).unwrap();
        let entries = vec![
            NewEntry::new(ShortCode::new_unchecked("abc1234"), "https://a.example/?q=1", 7)
                .with_correlation_id("c-1"),
            NewEntry::new(ShortCode::new_unchecked("def5678"), "https://b.example", 0),
        ];

        let payload = copy_payload(&entries, created_at);

        assert_eq!(
            payload,
            "c-1\tabc1234\thttps://a.example/?q=1\t7\t1700000000000000\n\
             \\N\tdef5678\thttps://b.example\t0\t1700000000000000\n"
        );
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StorageError::Timeout(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            StorageError::Unavailable(_)
        ));
        assert!(matches!(
            map_write_error(sqlx::Error::RowNotFound, "abc", "https://a.example"),
            StorageError::InvalidData(_)
        ));
    }

    #[test]
    fn batch_conflict_without_server_detail_is_marked_batch() {
        assert_eq!(violation_detail(&sqlx::Error::PoolTimedOut), "batch");
        assert_eq!(
            violation_detail(&sqlx::Error::Protocol("unexpected message".to_string())),
            "batch"
        );
    }
}
