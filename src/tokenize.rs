use anyhow::{Context, Result};

/// Sub-word token counting capability. Chunk sizing is always expressed in
/// token units, never characters or words.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

/// BPE counter over the `o200k_base` encoding, which handles mixed
/// Chinese/English text.
pub struct BpeTokenCounter {
    bpe: tiktoken_rs::CoreBPE,
}

impl BpeTokenCounter {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::o200k_base().context("failed to load o200k_base encoding")?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for BpeTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

#[cfg(test)]
pub mod testing {
    use super::TokenCounter;

    /// One token per character keeps test arithmetic readable.
    pub struct CharCounter;

    impl TokenCounter for CharCounter {
        fn count_tokens(&self, text: &str) -> usize {
            text.chars().count()
        }
    }
}
