use async_trait::async_trait;

/// Turns email payloads and chat prompts into fixed-length vectors.
///
/// Implementations must return exactly [`EmbeddingProvider::dimensions`]
/// numbers per input or fail; the account index rejects anything else.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Embed several texts. Defaults to one `embed` call per text, in order.
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;
}
