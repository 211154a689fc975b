use crate::error::{ContextError, IngestError, LlmError};
use crate::llm::ChatModel;
use crate::models::ChunkRecord;
use crate::prompts::{PromptLoader, CONTEXT_EXTENSION};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Neighbors taken on each side of a chunk.
    pub window_size: usize,
    /// Pause before each LLM request, to stay under rate limits.
    pub request_delay: Duration,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            window_size: 3,
            request_delay: Duration::from_secs(2),
        }
    }
}

/// Neighbor window of chunk `index`, never reaching back past the start of
/// its top-level chapter.
pub fn neighbor_window(index: usize, chapter_start: usize, window: usize, len: usize) -> Range<usize> {
    let start = chapter_start.max(index.saturating_sub(window));
    let end = (index + window + 1).min(len);
    start..end
}

pub struct ContextGenerator {
    prompts: PromptLoader,
    options: ContextOptions,
}

impl ContextGenerator {
    pub fn new(prompts: PromptLoader, options: ContextOptions) -> Self {
        Self { prompts, options }
    }

    /// Asks the LLM for a context string per chunk, keyed by chunk index.
    /// Chunks shorter than three times their title are skipped.
    pub async fn generate(
        &self,
        chunks: &[ChunkRecord],
        llm: &dyn ChatModel,
    ) -> Result<BTreeMap<usize, String>, LlmError> {
        let mut contexts = BTreeMap::new();
        let mut chapter_start = 0usize;

        for (index, chunk) in chunks.iter().enumerate() {
            if chunk.level == 1 {
                chapter_start = index;
            }
            if 3 * chunk.title.chars().count() > chunk.text.chars().count() {
                continue;
            }

            let window = neighbor_window(index, chapter_start, self.options.window_size, chunks.len());
            let neighbors = chunks[window]
                .iter()
                .map(|neighbor| neighbor.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");

            let prompt = self
                .prompts
                .render(CONTEXT_EXTENSION, &[("chunk", chunk.text.as_str()), ("neighbors", neighbors.as_str())])?;

            if !self.options.request_delay.is_zero() {
                tokio::time::sleep(self.options.request_delay).await;
            }
            let context = llm.ask(&prompt).await?;
            tracing::debug!(index, chars = context.len(), "context generated");
            contexts.insert(index, context);
        }

        Ok(contexts)
    }

    pub async fn generate_file(
        &self,
        input: &Path,
        output: &Path,
        llm: &dyn ChatModel,
    ) -> Result<BTreeMap<usize, String>, ContextError> {
        let raw = std::fs::read_to_string(input).map_err(IngestError::from)?;
        let chunks: Vec<ChunkRecord> = serde_json::from_str(&raw).map_err(IngestError::from)?;

        let contexts = self.generate(&chunks, llm).await?;

        let serialized = serde_json::to_string_pretty(&contexts).map_err(IngestError::from)?;
        std::fs::write(output, serialized).map_err(IngestError::from)?;
        tracing::info!(output = %output.display(), contexts = contexts.len(), "context file written");
        Ok(contexts)
    }
}
