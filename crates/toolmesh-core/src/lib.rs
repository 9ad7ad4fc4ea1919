//! # toolmesh-core
//!
//! Core types shared by every Toolmesh crate.
//!
//! This crate provides:
//! - Configuration system (servers, timeouts, providers)
//! - Message primitives for the language-model backend
//! - Common error types

pub mod config;
pub mod error;
pub mod message;

pub use config::{
    Config, GeneralConfig, ProviderConfig, ProvidersConfig, ServerFamily, ServerSettings,
    TimeoutsConfig, TransportSettings,
};
pub use error::{Error, ProviderError, Result};
pub use message::{Message, Role};
