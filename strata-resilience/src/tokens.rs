//! Token estimates feeding the tokens/minute budget.

use std::sync::OnceLock;

/// cl100k-based token estimator. Falls back to a 4-chars-per-token
/// approximation if the encoder cannot be loaded.
#[derive(Default)]
pub struct TokenEstimator {
    bpe: OnceLock<Option<tiktoken_rs::CoreBPE>>,
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn estimate(&self, text: &str) -> u32 {
        let bpe = self.bpe.get_or_init(|| tiktoken_rs::cl100k_base().ok());
        let count = match bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => Self::approximate(text),
        };
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    pub fn approximate(text: &str) -> usize {
        text.len().div_ceil(4)
    }
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator")
            .field("loaded", &self.bpe.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_positive_and_small_for_short_text() {
        let est = TokenEstimator::new();
        let n = est.estimate("I prefer green tea in the morning.");
        assert!(n > 0 && n < 20, "got {n}");
    }

    #[test]
    fn empty_text_is_zero() {
        assert_eq!(TokenEstimator::new().estimate(""), 0);
        assert_eq!(TokenEstimator::approximate(""), 0);
    }
}
