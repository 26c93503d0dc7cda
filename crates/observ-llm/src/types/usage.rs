use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
        }
    }

    /// Fold a partial usage report into this one.
    ///
    /// Providers report usage either cumulatively on every chunk (Gemini,
    /// OpenAI) or split across events (Anthropic sends input tokens on
    /// `message_start` and output tokens on `message_delta`). Taking the
    /// field-wise maximum is correct for both.
    pub fn merge(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.max(other.input_tokens);
        self.output_tokens = self.output_tokens.max(other.output_tokens);
        self.total_tokens = self
            .total_tokens
            .max(other.total_tokens)
            .max(self.input_tokens.saturating_add(self.output_tokens));
    }
}
