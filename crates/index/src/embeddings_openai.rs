//! OpenAI-compatible embeddings provider using the `/v1/embeddings` endpoint.
use async_trait::async_trait;
use {
    secrecy::ExposeSecret,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::{embeddings::EmbeddingProvider, schema::EMBEDDING_DIMENSIONS};

pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: secrecy::Secret<String>,
    base_url: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbeddingProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: secrecy::Secret::new(api_key),
            base_url: "https://api.openai.com".to_string(),
            model: "text-embedding-3-small".to_string(),
            dims: EMBEDDING_DIMENSIONS,
        }
    }

    pub fn with_model(mut self, model: String, dims: usize) -> Self {
        self.model = model;
        self.dims = dims;
        self
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("no embedding returned from API"))
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        // Newlines degrade embedding quality on these models.
        let req = EmbeddingRequest {
            model: &self.model,
            input: texts.iter().map(|t| t.replace('\n', " ")).collect(),
        };
        debug!(model = %self.model, inputs = texts.len(), "requesting embeddings");

        let resp = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&req)
            .send()
            .await?
            .error_for_status()?
            .json::<EmbeddingResponse>()
            .await?;

        if resp.data.len() != texts.len() {
            anyhow::bail!(
                "expected {} embeddings, API returned {}",
                texts.len(),
                resp.data.len()
            );
        }
        resp.data
            .into_iter()
            .map(|d| {
                if d.embedding.len() != self.dims {
                    anyhow::bail!(
                        "embedding has {} dimensions, expected {}",
                        d.embedding.len(),
                        self.dims
                    );
                }
                Ok(d.embedding)
            })
            .collect()
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(dims: usize, count: usize) -> String {
        let data: Vec<_> = (0..count)
            .map(|i| serde_json::json!({ "index": i, "embedding": vec![0.25f32; dims] }))
            .collect();
        serde_json::json!({ "data": data }).to_string()
    }

    #[tokio::test]
    async fn embed_posts_to_embeddings_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": ["hello world"],
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body(EMBEDDING_DIMENSIONS, 1))
            .create_async()
            .await;

        let provider =
            OpenAiEmbeddingProvider::new("sk-test".into()).with_base_url(server.url());
        let embedding = provider.embed("hello\nworld").await.unwrap();
        assert_eq!(embedding.len(), EMBEDDING_DIMENSIONS);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn embed_rejects_wrong_dimensions() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body(8, 1))
            .create_async()
            .await;

        let provider =
            OpenAiEmbeddingProvider::new("sk-test".into()).with_base_url(server.url());
        let err = provider.embed("hi").await.unwrap_err();
        assert!(err.to_string().contains("dimensions"));
    }

    #[tokio::test]
    async fn embed_propagates_http_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(503)
            .create_async()
            .await;

        let provider = OpenAiEmbeddingProvider::new("sk-test".into())
            .with_base_url(format!("{}/", server.url()));
        assert!(provider.embed("hi").await.is_err());
    }

    #[tokio::test]
    async fn embed_batch_returns_one_vector_per_input() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body(4, 2))
            .create_async()
            .await;

        let provider = OpenAiEmbeddingProvider::new("sk-test".into())
            .with_base_url(server.url())
            .with_model("tiny".into(), 4);
        let out = provider
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(provider.model_name(), "tiny");
        assert_eq!(provider.dimensions(), 4);
    }
}
