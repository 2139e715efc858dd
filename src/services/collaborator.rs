use anyhow::{Context, Result, anyhow};
use reqwest::multipart::Form;
use std::time::Duration;
use url::Url;

/// HTTP client bound to one external pipeline service
#[derive(Debug, Clone)]
pub struct CollaboratorClient {
    name: &'static str,
    client: reqwest::Client,
    base: Url,
}

impl CollaboratorClient {
    pub fn new(name: &'static str, base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .with_context(|| format!("invalid {} service URL '{}'", name, base_url))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(anyhow!(
                "{} service URL must be http(s), got '{}'",
                name,
                base.scheme()
            ));
        }
        // Without the trailing slash `join` would replace the last segment
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { name, client, base })
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid {} endpoint '{}'", self.name, path))
    }

    pub async fn post_multipart(&self, path: &str, form: Form) -> Result<reqwest::Response> {
        let url = self.endpoint(path)?;
        tracing::debug!(service = self.name, %url, "calling collaborator");

        let response = self
            .client
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("{} service unreachable at {}", self.name, url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "{} service returned {}: {}",
                self.name,
                status,
                body.chars().take(512).collect::<String>()
            ));
        }

        Ok(response)
    }

    pub async fn health_check(&self) -> bool {
        let Ok(url) = self.endpoint("health") else {
            return false;
        };
        match self.client.get(url).send().await {
            Ok(res) => res.status().is_success(),
            Err(_) => false,
        }
    }
}
