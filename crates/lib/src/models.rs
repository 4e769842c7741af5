//! Model selection state and the connection health probe.
//!
//! The probe is best-effort and independent of streaming: a failed or empty
//! listing leaves prior state untouched and is never surfaced to the user.

use crate::llm::OllamaClient;

/// Built-in model names shown before the server has been probed.
pub const DEFAULT_MODELS: &[&str] = &["llama3.2", "llama3", "llama2", "codellama"];

/// Selected model plus the last known server listing.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    selected: String,
    available: Vec<String>,
}

impl ModelRegistry {
    pub fn new(selected: impl Into<String>) -> Self {
        Self {
            selected: selected.into(),
            available: DEFAULT_MODELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn selected(&self) -> &str {
        &self.selected
    }

    pub fn available(&self) -> &[String] {
        &self.available
    }

    pub fn select(&mut self, model: impl Into<String>) {
        self.selected = model.into();
    }

    /// Probe the server for its model listing. On success with a non-empty
    /// listing, replaces the available set and reselects the first model if
    /// the current selection is gone. Single attempt, no retry. Returns
    /// whether the server answered with a usable listing.
    pub async fn refresh(&mut self, client: &OllamaClient) -> bool {
        match client.list_models().await {
            Ok(models) if !models.is_empty() => {
                self.available = models.into_iter().map(|m| m.name).collect();
                if !self.available.iter().any(|name| name == &self.selected) {
                    self.selected = self.available[0].clone();
                }
                true
            }
            Ok(_) => false,
            Err(e) => {
                log::debug!("connection check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn refresh_replaces_listing_and_reselects_missing_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"models":[{"name":"mistral"},{"name":"qwen3"}]}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = OllamaClient::new(Some(server.uri()));
        let mut models = ModelRegistry::new("llama3.2");
        assert!(models.refresh(&client).await);
        assert_eq!(models.available().to_vec(), vec!["mistral", "qwen3"]);
        assert_eq!(models.selected(), "mistral");
    }

    #[tokio::test]
    async fn refresh_keeps_selection_when_still_listed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"models":[{"name":"mistral"},{"name":"llama3.2"}]}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let client = OllamaClient::new(Some(server.uri()));
        let mut models = ModelRegistry::new("llama3.2");
        assert!(models.refresh(&client).await);
        assert_eq!(models.selected(), "llama3.2");
    }

    #[tokio::test]
    async fn failed_probe_leaves_state_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = OllamaClient::new(Some(server.uri()));
        let mut models = ModelRegistry::new("llama3.2");
        assert!(!models.refresh(&client).await);
        assert_eq!(models.selected(), "llama3.2");
        assert_eq!(models.available().to_vec(), DEFAULT_MODELS.to_vec());
    }

    #[tokio::test]
    async fn empty_listing_leaves_state_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(r#"{"models":[]}"#, "application/json"),
            )
            .mount(&server)
            .await;

        let client = OllamaClient::new(Some(server.uri()));
        let mut models = ModelRegistry::new("llama3.2");
        assert!(!models.refresh(&client).await);
        assert_eq!(models.selected(), "llama3.2");
    }
}
