use anyhow::{Context, Result};
use async_trait::async_trait;

use nosh_core::gemini::{GenerateRequest, GenerateResponse, generate_url};
use nosh_core::intent::IntentError;
use nosh_core::service::CompletionProvider;

pub struct GeminiClient {
    client: reqwest::Client,
    url: String,
}

impl GeminiClient {
    pub fn new(endpoint: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("nosh/{} (meal logger)", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: generate_url(endpoint, model),
        })
    }
}

#[async_trait]
impl CompletionProvider for GeminiClient {
    async fn complete(&self, api_key: &str, prompt: &str) -> Result<String, IntentError> {
        tracing::debug!(url = %self.url, prompt_len = prompt.len(), "calling assistant");

        let resp = self
            .client
            .post(&self.url)
            .query(&[("key", api_key)])
            .json(&GenerateRequest::from_prompt(prompt))
            .send()
            .await
            .map_err(|e| IntentError::Service(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%status, %body, "assistant returned an error");
            return Err(IntentError::Service(format!("HTTP {status}")));
        }

        let data: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| IntentError::Service(format!("invalid response body: {e}")))?;

        data.text()
            .map(str::to_string)
            .ok_or_else(|| IntentError::Malformed("reply has no text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{Json, Router, extract::Query, http::StatusCode, routing::post};
    use serde_json::{Value, json};

    use super::*;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn fake_gemini(
        Query(params): Query<HashMap<String, String>>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if params.get("key").map(String::as_str) != Some("secret") {
            return (StatusCode::FORBIDDEN, Json(json!({"error": "bad key"})));
        }
        let prompt = body["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_uppercase();
        (
            StatusCode::OK,
            Json(json!({"candidates": [{"content": {"parts": [{"text": prompt}]}}]})),
        )
    }

    #[tokio::test]
    async fn complete_returns_first_candidate_text() {
        let base = spawn(Router::new().route("/v1beta/models/{model}", post(fake_gemini))).await;
        let client = GeminiClient::new(&base, "test-model").unwrap();

        let text = client.complete("secret", "hello").await.unwrap();
        assert_eq!(text, "HELLO");
    }

    #[tokio::test]
    async fn non_success_status_is_service_error() {
        let base = spawn(Router::new().route("/v1beta/models/{model}", post(fake_gemini))).await;
        let client = GeminiClient::new(&base, "test-model").unwrap();

        let err = client.complete("wrong", "hello").await.unwrap_err();
        assert!(matches!(err, IntentError::Service(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_service_error() {
        let client = GeminiClient::new("http://127.0.0.1:9", "test-model").unwrap();
        let err = client.complete("secret", "hello").await.unwrap_err();
        assert!(matches!(err, IntentError::Service(_)));
    }
}
