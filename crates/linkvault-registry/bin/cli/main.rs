mod cli;

use crate::cli::{Command, StorageBackendArg, CLI};
use anyhow::{bail, Context};
use clap::Parser;
use linkvault_registry::{BatchItem, Registry, RegistryConfig, Resolution};
use linkvault_storage::{JournaledRepository, PgRepository, Repository, VolatileRepository};
use linkvault_token::{RandomToken, TokenSource};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log level")?;
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!(
        storage_backend = %config.storage,
        base_url = %config.base_url,
        "starting linkvault"
    );

    let tokens = RandomToken::new(config.token_length)?;
    let registry_config = RegistryConfig::builder()
        .base_url(config.base_url.clone())
        .delete_concurrency(config.delete_concurrency)
        .build();

    match config.storage {
        StorageBackendArg::InMemory => {
            let repo = VolatileRepository::new();
            run(repo, tokens, registry_config, config.command).await
        }
        StorageBackendArg::File => {
            let repo = JournaledRepository::open(&config.file_storage_path).with_context(|| {
                format!("opening journal {}", config.file_storage_path.display())
            })?;
            run(repo, tokens, registry_config, config.command).await
        }
        StorageBackendArg::Postgres => {
            let dsn = config
                .database_dsn
                .context("database dsn is required when storage backend is postgres")?;
            let repo = PgRepository::connect(&dsn, config.max_connections).await?;
            run(repo, tokens, registry_config, config.command).await
        }
    }
}

async fn run<R: Repository, T: TokenSource>(
    repo: R,
    tokens: T,
    config: RegistryConfig,
    command: Command,
) -> anyhow::Result<()> {
    let registry = Registry::new(Arc::new(repo), tokens, config);
    let outcome = execute(&registry, command).await;
    registry.close().await?;
    outcome
}

async fn execute<R: Repository, T: TokenSource>(
    registry: &Registry<R, T>,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Shorten { url, owner } => {
            let shortened = registry.shorten(&url, owner).await?;
            println!("{}", serde_json::to_string(&shortened)?);
        }
        Command::Batch { file, owner } => {
            let raw = std::fs::read(&file)
                .with_context(|| format!("reading batch file {}", file.display()))?;
            let items: Vec<BatchItem> =
                serde_json::from_slice(&raw).context("parsing batch file")?;
            let results = registry.shorten_batch(items, owner).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Resolve { code } => match registry.resolve(&code).await? {
            Resolution::Redirect(url) => println!("{url}"),
            Resolution::Gone => bail!("short code {code} was deleted"),
            Resolution::NotFound => bail!("short code {code} not found"),
        },
        Command::List { owner } => {
            let urls = match owner {
                Some(owner) => registry.urls_by_owner(owner).await?,
                None => registry.all_urls().await?,
            };
            println!("{}", serde_json::to_string_pretty(&urls)?);
        }
        Command::Delete { codes } => {
            let report = registry.delete_urls(codes).await;
            let failed: Vec<_> = report.failed().map(ToString::to_string).collect();
            if !failed.is_empty() {
                bail!("failed to delete: {}", failed.join(", "));
            }
            println!("deleted {} short code(s)", report.succeeded());
        }
        Command::Ping => {
            registry.ping().await?;
            println!("ok");
        }
    }
    Ok(())
}
