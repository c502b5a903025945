use async_trait::async_trait;

use crate::errors::StrataResult;

/// Embedding capability.
#[async_trait]
pub trait IEmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> StrataResult<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> StrataResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize;

    fn name(&self) -> &str;
}
