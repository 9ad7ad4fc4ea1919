//! Turning tool output into a single answer with the language model.

use std::sync::Arc;

use toolmesh_providers::{CompletionRequest, Provider};
use tracing::debug;

use crate::error::AgentResult;

const FALLBACK_MAX_TOKENS: u32 = 512;
const SYNTHESIS_MAX_TOKENS: u32 = 1024;

const FALLBACK_SYSTEM_PROMPT: &str = "You are a helpful assistant. The user's query could not be \
handled by any of the connected tool servers. Explain briefly what kinds of requests you can help \
with and suggest how the user might rephrase their query.";

const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions using \
results returned by tool servers. Produce one well-organized answer to the user's query using only \
the supplied tool results. Never invent data that is not in the results. If some information could \
not be retrieved (a tool failed or returned nothing), say so plainly.";

/// Single-call answer generation over a [`Provider`].
#[derive(Clone)]
pub struct Synthesizer {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl Synthesizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: SYNTHESIS_MAX_TOKENS,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap on the synthesized answer's length.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Answer a query no server could handle.
    pub async fn fallback_answer(&self, query: &str) -> AgentResult<String> {
        debug!(provider = self.provider.id(), "Generating fallback answer");
        self.complete(FALLBACK_SYSTEM_PROMPT, query.to_string(), FALLBACK_MAX_TOKENS)
            .await
    }

    /// Answer a query from the combined per-server results.
    pub async fn synthesize(&self, query: &str, combined: &str) -> AgentResult<String> {
        debug!(provider = self.provider.id(), "Synthesizing answer from tool results");
        let prompt = format!(
            "Original user query: {}\n\nResults from tool servers:\n{}\n\n\
             Answer the query from these results.",
            query, combined
        );
        self.complete(SYNTHESIS_SYSTEM_PROMPT, prompt, self.max_tokens)
            .await
    }

    async fn complete(&self, system: &str, user: String, max_tokens: u32) -> AgentResult<String> {
        let request = CompletionRequest::single_turn(&self.model, system, user, max_tokens)
            .with_temperature(self.temperature);
        let response = self.provider.complete(request).await?;
        Ok(response.content)
    }
}
