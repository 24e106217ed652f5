use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::dispatcher::{StatusDispatch, StatusSink};

pub struct HttpStatusSink {
    client: Client,
}

impl HttpStatusSink {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusSink for HttpStatusSink {
    async fn send(&self, dispatch: &StatusDispatch) -> Result<()> {
        let resp = self
            .client
            .post(dispatch.url.clone())
            .json(&dispatch.body)
            .send()
            .await?;

        if resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(anyhow!(
            "status update rejected with {} by {}: {}",
            status,
            dispatch.url,
            body
        ))
    }
}
