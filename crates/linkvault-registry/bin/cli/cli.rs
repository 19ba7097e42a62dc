use clap::{Parser, Subcommand, ValueEnum};
use linkvault_core::{OwnerId, ANONYMOUS_OWNER};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const STORAGE_BACKEND_ENV: &str = "LINKVAULT_STORAGE_BACKEND";
pub const FILE_STORAGE_PATH_ENV: &str = "LINKVAULT_FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "LINKVAULT_DATABASE_DSN";
pub const MAX_CONNECTIONS_ENV: &str = "LINKVAULT_MAX_CONNECTIONS";
pub const BASE_URL_ENV: &str = "LINKVAULT_BASE_URL";
pub const TOKEN_LENGTH_ENV: &str = "LINKVAULT_TOKEN_LENGTH";
pub const DELETE_CONCURRENCY_ENV: &str = "LINKVAULT_DELETE_CONCURRENCY";
pub const LOG_LEVEL_ENV: &str = "LINKVAULT_LOG_LEVEL";

pub const DEFAULT_FILE_STORAGE_PATH: &str = "/tmp/short-url-db.json";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "file")]
    File,
    #[value(name = "postgres")]
    Postgres,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::File => write!(f, "file"),
            StorageBackendArg::Postgres => write!(f, "postgres"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "linkvault", about = "Shorten, resolve and retire URLs")]
pub struct CLI {
    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::File
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = FILE_STORAGE_PATH_ENV, default_value = DEFAULT_FILE_STORAGE_PATH)]
    pub file_storage_path: PathBuf,

    #[arg(long, env = DATABASE_DSN_ENV, required_if_eq("storage", "postgres"))]
    pub database_dsn: Option<String>,

    #[arg(long, env = MAX_CONNECTIONS_ENV, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,

    #[arg(long, env = BASE_URL_ENV, default_value = linkvault_registry::DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(
        long,
        env = TOKEN_LENGTH_ENV,
        default_value_t = linkvault_token::random::DEFAULT_TOKEN_LENGTH
    )]
    pub token_length: usize,

    #[arg(
        long,
        env = DELETE_CONCURRENCY_ENV,
        default_value_t = linkvault_storage::DEFAULT_DELETE_CONCURRENCY
    )]
    pub delete_concurrency: usize,

    #[arg(long, env = LOG_LEVEL_ENV, default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten one URL and print its short URL.
    Shorten {
        url: String,
        #[arg(long, default_value_t = ANONYMOUS_OWNER)]
        owner: OwnerId,
    },
    /// Shorten every `{correlation_id, original_url}` item of a JSON array file.
    Batch {
        file: PathBuf,
        #[arg(long, default_value_t = ANONYMOUS_OWNER)]
        owner: OwnerId,
    },
    /// Print where a short code redirects.
    Resolve { code: String },
    /// List stored URLs, newest first.
    List {
        #[arg(long)]
        owner: Option<OwnerId>,
    },
    /// Soft-delete short codes.
    Delete {
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Check that the storage backend is reachable.
    Ping,
}
