//! # toolmesh-providers
//!
//! Language-model backends for Toolmesh.
//!
//! This crate provides:
//! - Provider trait for abstracting completion backends
//! - Anthropic Messages API implementation
//! - Provider registry built from configuration
//! - `MockProvider` for tests (feature `mock`)

pub mod anthropic;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod registry;
pub mod traits;

pub use anthropic::AnthropicProvider;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockProvider;
pub use registry::ProviderRegistry;
pub use traits::{CompletionRequest, CompletionResponse, FinishReason, ModelInfo, Provider, Usage};
