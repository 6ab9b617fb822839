//! Token counting and truncation against the model's BPE vocabulary.

use tiktoken_rs::CoreBPE;

use crate::CoreError;

/// A cut that lands inside a multi-byte character cannot be decoded; back off
/// this many tokens at most before giving up.
const MAX_DECODE_BACKOFF: usize = 4;

/// Counts and truncates text using the `o200k_base` encoding (GPT-4o family).
pub struct TokenBudget {
    bpe: CoreBPE,
}

impl TokenBudget {
    pub fn new() -> Result<Self, CoreError> {
        let bpe = tiktoken_rs::o200k_base().map_err(|e| CoreError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe })
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Return `text` unchanged if it fits in `max_tokens`, otherwise the
    /// decoded prefix of its first `max_tokens` tokens.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let tokens = self.bpe.encode_ordinary(text);
        if tokens.len() <= max_tokens {
            return text.to_string();
        }

        for backoff in 0..=MAX_DECODE_BACKOFF {
            let Some(end) = max_tokens.checked_sub(backoff) else {
                break;
            };
            if let Ok(decoded) = self.bpe.decode(tokens[..end].to_vec()) {
                tracing::debug!(
                    original_tokens = tokens.len(),
                    kept_tokens = end,
                    "truncated text to token budget"
                );
                return decoded;
            }
        }

        tracing::warn!(max_tokens, "could not decode truncated token prefix");
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_unchanged() {
        let budget = TokenBudget::new().unwrap();
        let text = "A short abstract about graph neural networks.";
        assert_eq!(budget.truncate(text, 1000), text);
    }

    #[test]
    fn long_text_fits_budget() {
        let budget = TokenBudget::new().unwrap();
        let text = "Transformers replace recurrence with attention. ".repeat(500);
        let truncated = budget.truncate(&text, 100);
        assert!(!truncated.is_empty());
        assert!(truncated.len() < text.len());
        assert!(text.starts_with(&truncated));
    }

    #[test]
    fn multibyte_text_truncates_cleanly() {
        let budget = TokenBudget::new().unwrap();
        let text = "深度学习模型在自然语言处理中的应用与挑战。".repeat(200);
        let truncated = budget.truncate(&text, 50);
        assert!(!truncated.is_empty());
        assert!(truncated.len() < text.len());
        assert!(text.starts_with(&truncated));
    }

    #[test]
    fn zero_budget_is_empty() {
        let budget = TokenBudget::new().unwrap();
        assert_eq!(budget.truncate("some words here", 0), "");
    }
}
