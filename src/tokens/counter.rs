//! Token counter implementation
//!
//! The upstream never reports usage, so usage blocks are computed locally with
//! the `cl100k_base` BPE from tiktoken-rs. Counts are deterministic for a
//! given text but only approximate what the upstream model actually consumed.

use std::sync::Arc;

use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::openai::{Message, Usage};

/// Fixed overhead per chat message (`<|start|>{role}\n{content}<|end|>\n`)
const TOKENS_PER_MESSAGE: usize = 3;
/// Every reply is primed with `<|start|>assistant<|message|>`
const REPLY_PRIMING_TOKENS: usize = 3;

/// Shared, cheaply cloneable token counter
#[derive(Clone)]
pub struct TokenCounter {
    encoder: Arc<CoreBPE>,
}

impl TokenCounter {
    /// Build the counter, loading the embedded `cl100k_base` ranks
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            encoder: Arc::new(cl100k_base()?),
        })
    }

    /// Count tokens in a text string
    pub fn count_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.encoder.encode_with_special_tokens(text).len()
    }

    /// Count prompt tokens for a chat request
    pub fn count_prompt_tokens(&self, messages: &[Message]) -> usize {
        let mut total = 0;

        for message in messages {
            total += TOKENS_PER_MESSAGE;
            total += self.count_tokens(message.role.as_str());
            total += self.count_tokens(&message.content.as_text());
        }

        total + REPLY_PRIMING_TOKENS
    }

    /// Usage block for a finished completion
    pub fn usage(&self, messages: &[Message], completion: &str) -> Usage {
        let prompt_tokens = self.count_prompt_tokens(messages) as u32;
        let completion_tokens = self.count_tokens(completion) as u32;

        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}
