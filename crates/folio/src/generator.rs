//! The text generation seam the tracker depends on.

use async_trait::async_trait;

use crate::error::GenerateError;

/// Anything that turns a prompt into generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate text for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerateError>;

    /// Short label for logs (model or backend name).
    fn name(&self) -> &str {
        "generator"
    }
}
