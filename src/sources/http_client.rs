use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::config::HttpConfig;
use crate::error::SourceError;

/// Shared client: one cookie jar, a polite pause before every request,
/// non-2xx answers are errors. Nothing is retried.
pub struct HttpClient {
    inner: reqwest::Client,
    config: HttpConfig,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // ASP.NET pages keep their session in cookies
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    pub async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        self.polite_delay().await;
        debug!("GET {}", url);
        let resp = self.inner.get(url).send().await?;
        Self::body(url, resp).await
    }

    /// URL-encoded form POST, as an ASP.NET postback expects.
    pub async fn post_form(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<String, SourceError> {
        self.polite_delay().await;
        debug!("POST {} ({} fields)", url, fields.len());
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish();
        let resp = self
            .inner
            .post(url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .header(reqwest::header::REFERER, url)
            .body(body)
            .send()
            .await?;
        Self::body(url, resp).await
    }

    async fn body(url: &str, resp: reqwest::Response) -> Result<String, SourceError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter = rand::rng().random_range(0..=self.config.jitter_ms);
        let total = Duration::from_millis(self.config.request_delay_ms + jitter);
        sleep(total).await;
    }
}
