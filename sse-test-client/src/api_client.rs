use anyhow::{Context, Result};
use serde_json::{json, Value};

/// Thin client for the catalog event-writer surface, used to drive SSE
/// scenarios against a running direct-mode server.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Publish a catalog change event; returns the log-assigned entry id.
    pub async fn publish_product_event(&self, event: &str, product: Value) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/products/events", self.base_url))
            .json(&json!({"event": event, "product": product}))
            .send()
            .await
            .context("Failed to reach the event-writer endpoint")?
            .error_for_status()
            .context("Event publication was refused")?;

        let body: Value = response.json().await?;
        body["data"]["entry_id"]
            .as_str()
            .map(str::to_string)
            .context("Response carried no entry id")
    }

    pub async fn health_check(&self) -> Result<()> {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?
            .error_for_status()
            .context("Health check failed")?;
        Ok(())
    }
}
