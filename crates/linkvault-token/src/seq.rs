use crate::{TokenError, TokenSource};
use linkvault_core::ShortCode;
use std::sync::atomic::{AtomicU64, Ordering};

const COUNTER_WIDTH: usize = 6;

/// A short code source using sequential counters.
///
/// This source produces codes like "wh000000", "wh000001", etc. It is
/// deterministic, which makes it the source of choice for tests. Codes are
/// unique within a single instance; counters past 999999 grow wider and no
/// longer pass [`check`](TokenSource::check).
#[derive(Debug)]
pub struct SeqToken {
    counter: AtomicU64,
    prefix: String,
}

impl Clone for SeqToken {
    fn clone(&self) -> Self {
        Self {
            counter: AtomicU64::new(self.counter.load(Ordering::SeqCst)),
            prefix: self.prefix.clone(),
        }
    }
}

impl SeqToken {
    /// Creates a new sequential source with a custom prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::with_offset(prefix, 0)
    }

    /// Creates a new sequential source starting from a specific counter value.
    pub fn with_offset(prefix: impl Into<String>, offset: u64) -> Self {
        Self {
            counter: AtomicU64::new(offset),
            prefix: prefix.into(),
        }
    }
}

impl TokenSource for SeqToken {
    fn get(&self) -> ShortCode {
        let count = self.counter.fetch_add(1, Ordering::SeqCst);
        ShortCode::new_unchecked(format!("{}{:06}", self.prefix, count))
    }

    fn check(&self, code: &str) -> Result<(), TokenError> {
        let expected = self.prefix.len() + COUNTER_WIDTH;
        if code.len() != expected {
            return Err(TokenError::WrongLength {
                expected,
                actual: code.len(),
            });
        }

        let valid = code
            .strip_prefix(self.prefix.as_str())
            .is_some_and(|digits| digits.chars().all(|c| c.is_ascii_digit()));
        if !valid {
            return Err(TokenError::WrongAlphabet(code.to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_sequential_codes() {
        let source = SeqToken::with_prefix("wh");

        assert_eq!(source.get().as_str(), "wh000000");
        assert_eq!(source.get().as_str(), "wh000001");
        assert_eq!(source.get().as_str(), "wh000002");
    }

    #[test]
    fn with_offset() {
        let source = SeqToken::with_offset("wh", 1000);

        assert_eq!(source.get().as_str(), "wh001000");
        assert_eq!(source.get().as_str(), "wh001001");
    }

    #[test]
    fn check_accepts_own_codes_only() {
        let source = SeqToken::with_prefix("wh");
        let code = source.get();

        assert!(source.check(code.as_str()).is_ok());
        assert!(matches!(
            source.check("xx000000"),
            Err(TokenError::WrongAlphabet(_))
        ));
        assert!(matches!(
            source.check("wh0000"),
            Err(TokenError::WrongLength { .. })
        ));
    }

    #[test]
    fn clone_preserves_counter_state() {
        let source = SeqToken::with_prefix("wh");
        source.get();
        source.get();

        let cloned = source.clone();

        assert_eq!(source.get().as_str(), "wh000002");
        assert_eq!(cloned.get().as_str(), "wh000002");
    }
}
