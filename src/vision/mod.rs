//! Client for the hosted vision-language model.
//!
//! The model is an opaque collaborator: image plus instruction in, free text
//! out. [`VisionModel`] is the seam the analyzer depends on; [`VisionClient`]
//! implements it against an OpenAI-compatible chat-completions API.

mod client;
mod types;

pub use client::*;
pub use types::*;

use async_trait::async_trait;

use crate::error::VisionResult;

/// A model that answers a textual instruction about an image.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Return the model's raw reply text. Transport, timeout and non-success
    /// status failures are errors; the content of the reply is not checked.
    async fn describe_image(&self, image: &ImagePayload, prompt: &str) -> VisionResult<String>;
}
