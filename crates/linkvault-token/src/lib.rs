pub mod error;
pub mod random;
pub mod seq;

pub use error::TokenError;
pub use random::RandomToken;
pub use seq::SeqToken;

use linkvault_core::ShortCode;

/// Trait for producing short codes.
///
/// Implementations are pure generators that don't interact with storage.
/// Uniqueness against already stored codes is the registry's concern.
pub trait TokenSource: Send + Sync + 'static {
    /// Returns a new short code.
    fn get(&self) -> ShortCode;

    /// Checks that `code` has the length and alphabet this source produces.
    fn check(&self, code: &str) -> Result<(), TokenError>;
}
