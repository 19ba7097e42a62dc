//! The URL registry facade.
//!
//! [`Registry`] ties a storage backend from `linkvault_storage` to a
//! [`TokenSource`](linkvault_token::TokenSource) and a public base URL.
//! Core types are re-exported from `linkvault_core`.

pub mod error;
pub mod registry;

pub use error::RegistryError;
pub use linkvault_core::{OwnerId, ShortCode, ShortenEntry, ANONYMOUS_OWNER};
pub use registry::{
    BatchItem, BatchShortened, OwnedUrl, Registry, RegistryConfig, Resolution, Shortened,
    DEFAULT_BASE_URL, MAX_TOKEN_ATTEMPTS,
};
