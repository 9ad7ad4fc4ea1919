//! Test-only mock provider.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use toolmesh_core::ProviderError;

use crate::traits::{CompletionRequest, CompletionResponse, FinishReason, ModelInfo, Provider, Usage};

/// Provider that answers from a queue and records every request.
#[derive(Debug, Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<String>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    pub default_response: String,
    pub fail: bool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            default_response: "mock response".into(),
            fail: false,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of `complete` calls received.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// The user message of the most recent request.
    pub fn last_prompt(&self) -> Option<String> {
        self.requests
            .lock()
            .ok()
            .and_then(|r| r.last().and_then(|req| req.messages.last().map(|m| m.content.clone())))
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        "Mock"
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".to_string(),
            name: "Mock Model".to_string(),
            provider: "mock".to_string(),
            context_window: 8_192,
            max_output_tokens: 1_024,
        }]
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<CompletionResponse> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if self.fail {
            return Err(ProviderError::api_error("mock", 500, "mock provider error").into());
        }

        let content = match self.responses.lock() {
            Ok(mut responses) if !responses.is_empty() => responses.remove(0),
            _ => self.default_response.clone(),
        };

        Ok(CompletionResponse {
            content,
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_responses_then_default() {
        let provider = MockProvider::with_responses(vec!["first".into()]);
        let request = CompletionRequest::single_turn("mock-model", "system", "hi", 16);

        let first = provider.complete(request.clone()).await.unwrap();
        let second = provider.complete(request).await.unwrap();

        assert_eq!(first.content, "first");
        assert_eq!(second.content, "mock response");
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.last_prompt().as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_failing_still_records() {
        let provider = MockProvider::failing();
        let request = CompletionRequest::single_turn("", "", "boom", 16);

        assert!(provider.complete(request).await.is_err());
        assert_eq!(provider.call_count(), 1);
    }
}
