use crate::error::{LlmError, RagError};
use crate::llm::ChatModel;
use crate::models::ScoredPoint;
use crate::prompts::{PromptLoader, REFINE_QUERY};
use crate::search::Searcher;
use crate::traits::{KeywordIndex, VectorIndex};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct RagOptions {
    /// Paraphrases requested from the LLM in addition to the user query.
    pub alternate_count: usize,
    pub per_query_limit: usize,
    /// LLM calls allowed while refining the query.
    pub max_refine_attempts: usize,
}

impl Default for RagOptions {
    fn default() -> Self {
        Self {
            alternate_count: 2,
            per_query_limit: 5,
            max_refine_attempts: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    pub queries: Vec<String>,
    pub results: Vec<ScoredPoint>,
    pub prompt: String,
}

/// Anything the chat front end can hand a question to.
#[async_trait]
pub trait RagBackend: Send + Sync {
    async fn answer(&self, query: &str) -> Result<RagAnswer, RagError>;
}

/// Asks the LLM for `count` paraphrases of `query`, one per line. Retries
/// until the count is right or attempts run out; the last answer is kept
/// either way.
pub async fn refine_query(
    llm: &dyn ChatModel,
    prompts: &PromptLoader,
    query: &str,
    count: usize,
    max_attempts: usize,
) -> Result<Vec<String>, LlmError> {
    let count_text = count.to_string();
    let prompt = prompts.render(REFINE_QUERY, &[("query", query), ("query_count", count_text.as_str())])?;

    let mut alternates = Vec::new();
    for attempt in 1..=max_attempts.max(1) {
        let response = llm.ask(&prompt).await?;
        alternates = response
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        if alternates.len() == count {
            break;
        }
        tracing::debug!(attempt, got = alternates.len(), want = count, "refined query count mismatch");
    }

    Ok(alternates)
}

/// Keeps the first occurrence of every point id, in order.
pub fn dedupe_results(batches: Vec<Vec<ScoredPoint>>) -> Vec<ScoredPoint> {
    let mut seen = HashSet::new();
    batches
        .into_iter()
        .flatten()
        .filter(|point| seen.insert(point.id))
        .collect()
}

pub struct RagPipeline<V, K>
where
    V: VectorIndex,
    K: KeywordIndex,
{
    searcher: Searcher<V, K>,
    llm: Arc<dyn ChatModel>,
    prompts: PromptLoader,
    options: RagOptions,
}

impl<V, K> RagPipeline<V, K>
where
    V: VectorIndex,
    K: KeywordIndex,
{
    pub fn new(searcher: Searcher<V, K>, llm: Arc<dyn ChatModel>, prompts: PromptLoader, options: RagOptions) -> Self {
        Self {
            searcher,
            llm,
            prompts,
            options,
        }
    }

    pub async fn run(&self, query: &str) -> Result<RagAnswer, RagError> {
        let mut queries = refine_query(
            self.llm.as_ref(),
            &self.prompts,
            query,
            self.options.alternate_count,
            self.options.max_refine_attempts,
        )
        .await?;
        queries.push(query.to_string());

        let mut batches = Vec::with_capacity(queries.len());
        for alternate in &queries {
            tracing::info!(query = %alternate, "searching");
            batches.push(self.searcher.rrf_search(alternate, self.options.per_query_limit).await?);
        }
        let results = dedupe_results(batches);
        tracing::info!(results = results.len(), queries = queries.len(), "retrieval finished");

        let prompt = self.prompts.build_prompt(query, &results)?;
        let answer = self.llm.ask(&prompt).await?;

        Ok(RagAnswer {
            answer,
            queries,
            results,
            prompt,
        })
    }
}

#[async_trait]
impl<V, K> RagBackend for RagPipeline<V, K>
where
    V: VectorIndex,
    K: KeywordIndex,
{
    async fn answer(&self, query: &str) -> Result<RagAnswer, RagError> {
        self.run(query).await
    }
}
