use async_trait::async_trait;

use crate::errors::StrataResult;
use crate::models::{GenerationRequest, GenerationResponse};

/// Text-generation capability.
///
/// The provider owns model selection and its own fallback chain. The lifecycle
/// only observes success, failure or timeout, and validates the structured
/// output before use.
#[async_trait]
pub trait IGenerationProvider: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> StrataResult<GenerationResponse>;

    fn name(&self) -> &str;
}
