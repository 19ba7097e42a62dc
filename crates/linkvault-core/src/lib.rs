//! Core types and traits for the linkvault URL registry.
//!
//! This crate provides the record model, the validated short code type and
//! the repository contract shared by every storage backend and by the
//! registry facade.

pub mod entry;
pub mod error;
pub mod repository;
pub mod shortcode;

pub use entry::{NewEntry, OwnerId, ShortenEntry, ANONYMOUS_OWNER};
pub use error::{CoreError, Result, StorageError};
pub use repository::Repository;
pub use shortcode::ShortCode;
