//! Text generator collaborator.
//!
//! The cycle only needs `generate(system, user) -> text`. [`AnthropicGenerator`]
//! implements it against a Messages-style endpoint; tests substitute their
//! own [`Generator`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GeneratorConfig;
use crate::{Error, Result};

/// Produces content for one cycle.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate text from a system context and a user context.
    ///
    /// Any failure aborts the cycle before the document is touched.
    async fn generate(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Client for the Anthropic Messages API.
pub struct AnthropicGenerator {
    client: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicGenerator {
    /// Build a client from configuration.
    ///
    /// Fails with [`Error::Config`] when no API key can be resolved.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        let mut builder = Client::builder()
            .user_agent(concat!("livesite/", env!("CARGO_PKG_VERSION")))
            .gzip(true);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(Error::Network)?;

        Ok(Self {
            client,
            endpoint: format!("{}/v1/messages", config.base_url.trim_end_matches('/')),
            api_key,
            api_version: config.api_version.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    /// Messages endpoint this client posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Generator for AnthropicGenerator {
    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: [Message {
                role: "user",
                content: user,
            }],
        };

        debug!(model = %self.model, endpoint = %self.endpoint, "calling generator");
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Generator(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Generator(format!(
                "generator returned {status}: {}",
                crate::state::truncate_chars(body.trim(), 200)
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| Error::Generator(format!("invalid generator response: {e}")))?;

        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text)
            .collect::<String>();

        if text.trim().is_empty() {
            return Err(Error::Generator("generator returned no text".into()));
        }

        info!(chars = text.chars().count(), "received generated content");
        Ok(text)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, header, method, path},
    };

    fn config(base_url: &str) -> GeneratorConfig {
        GeneratorConfig {
            base_url: base_url.to_string(),
            api_key: Some("sk-test".into()),
            timeout_secs: Some(5),
            ..GeneratorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_generate_concatenates_text_blocks() -> anyhow::Result<()> {
        // Given: an endpoint answering with two text blocks and a tool block
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(serde_json::json!({
                "system": "be brief",
                "messages": [{"role": "user", "content": "update the page"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [
                    {"type": "text", "text": "Hello\n\n"},
                    {"type": "tool_use", "id": "t1"},
                    {"type": "text", "text": "World"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        // When
        let generator = AnthropicGenerator::from_config(&config(&server.uri()))?;
        let text = generator.generate("be brief", "update the page").await?;

        // Then
        assert_eq!(text, "Hello\n\nWorld");
        Ok(())
    }

    #[tokio::test]
    async fn test_http_error_is_generator_error() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let generator = AnthropicGenerator::from_config(&config(&server.uri()))?;
        let err = generator.generate("s", "u").await.unwrap_err();
        assert!(matches!(&err, Error::Generator(msg) if msg.contains("529")));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_and_malformed_responses_are_rejected() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"system": "empty"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": []})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"system": "garbage"})))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let generator = AnthropicGenerator::from_config(&config(&server.uri()))?;
        assert!(matches!(
            generator.generate("empty", "u").await,
            Err(Error::Generator(_))
        ));
        assert!(matches!(
            generator.generate("garbage", "u").await,
            Err(Error::Generator(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_generator_error() -> anyhow::Result<()> {
        let generator = AnthropicGenerator::from_config(&config("http://127.0.0.1:9"))?;
        assert!(matches!(
            generator.generate("s", "u").await,
            Err(Error::Generator(_))
        ));
        Ok(())
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() -> Result<()> {
        let generator = AnthropicGenerator::from_config(&config("https://example.test/"))?;
        assert_eq!(generator.endpoint(), "https://example.test/v1/messages");
        Ok(())
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let config = GeneratorConfig {
            api_key: None,
            api_key_env: "LIVESITE_TEST_NEVER_SET".into(),
            ..GeneratorConfig::default()
        };
        assert!(matches!(
            AnthropicGenerator::from_config(&config),
            Err(Error::Config(_))
        ));
    }
}
