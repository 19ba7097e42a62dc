use linkvault_core::StorageError;
use linkvault_token::TokenError;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("token source produced an invalid code: {0}")]
    InvalidToken(#[from] TokenError),
    #[error("no free short code after {0} attempts")]
    TokensExhausted(usize),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
