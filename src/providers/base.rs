//! Base provider trait for title generation
//!
//! This module defines the Provider trait that title-generation backends
//! implement, along with the request options passed to a completion call.

use crate::error::Result;
use async_trait::async_trait;

/// Options for a single completion request
///
/// Unset fields mean the backend should use its own defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TitleRequest {
    /// Model to complete with
    pub model: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Upper bound on generated tokens
    pub max_tokens: Option<u32>,
}

impl TitleRequest {
    /// Creates a request with only a model set
    ///
    /// # Examples
    ///
    /// ```
    /// use flarelog::providers::TitleRequest;
    ///
    /// let request = TitleRequest::for_model("gpt-4o-mini");
    /// assert_eq!(request.model.as_deref(), Some("gpt-4o-mini"));
    /// ```
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }
}

/// Trait that completion backends implement
///
/// A provider turns a prompt into a single text completion. The title
/// workflow treats any error as transient and retries; providers should
/// therefore surface failures as errors rather than empty strings.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Sends a prompt and returns the completion text
    ///
    /// # Arguments
    ///
    /// * `prompt` - Full prompt text
    /// * `request` - Per-call options (model, temperature, token budget)
    ///
    /// # Errors
    ///
    /// Returns an error when the backend is unreachable or rejects the
    /// request.
    async fn send_message(&self, prompt: &str, request: &TitleRequest) -> Result<String>;
}
