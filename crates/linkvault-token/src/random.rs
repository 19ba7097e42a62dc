use crate::{TokenError, TokenSource};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use linkvault_core::shortcode::{MAX_LENGTH, MIN_LENGTH};
use linkvault_core::ShortCode;
use rand::RngCore;

pub const DEFAULT_TOKEN_LENGTH: usize = 7;

/// Random tokens drawn from the URL-safe base64 alphabet.
///
/// Each character carries 6 bits, so a token of `length` characters is cut
/// from the encoding of `length * 6 / 8 + 1` random bytes. The bytes come
/// from the thread-local CSPRNG.
#[derive(Debug, Clone)]
pub struct RandomToken {
    length: usize,
    buf_size: usize,
}

impl RandomToken {
    pub fn new(length: usize) -> Result<Self, TokenError> {
        if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
            return Err(TokenError::InvalidLength {
                length,
                min: MIN_LENGTH,
                max: MAX_LENGTH,
            });
        }

        Ok(Self {
            length,
            buf_size: length * 6 / 8 + 1,
        })
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomToken {
    fn default() -> Self {
        Self {
            length: DEFAULT_TOKEN_LENGTH,
            buf_size: DEFAULT_TOKEN_LENGTH * 6 / 8 + 1,
        }
    }
}

impl TokenSource for RandomToken {
    fn get(&self) -> ShortCode {
        let mut buf = vec![0u8; self.buf_size];
        rand::rng().fill_bytes(&mut buf);

        let mut encoded = URL_SAFE_NO_PAD.encode(&buf);
        encoded.truncate(self.length);
        ShortCode::new_unchecked(encoded)
    }

    fn check(&self, code: &str) -> Result<(), TokenError> {
        if code.len() != self.length {
            return Err(TokenError::WrongLength {
                expected: self.length,
                actual: code.len(),
            });
        }

        if !code.chars().all(ShortCode::is_valid_char) {
            return Err(TokenError::WrongAlphabet(code.to_string()));
        }

        Ok(())
    }
}
