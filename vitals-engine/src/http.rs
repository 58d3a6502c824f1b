//! `reqwest` adapter for the backend collaborators.

use async_trait::async_trait;
use error_common::MonitorError;
use futures::future::join_all;
use reqwest::Url;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::EngineConfig;
use crate::directory::DirectorySource;
use crate::error::{EngineError, Result};
use crate::poll::ReadingSource;
use crate::prediction::PredictionClient;
use crate::types::RiskAssessment;

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> error_common::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Config(format!("HTTP client: {e}")))?;

        let base_url = Url::parse(base_url).map_err(|e| MonitorError::Config(format!("backend URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(MonitorError::Config(format!("backend URL {base_url} cannot hold a path")));
        }

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let base_url = config
            .backend_url
            .as_deref()
            .ok_or_else(|| EngineError::InvalidConfig("backend_url is not set".into()))?;
        Ok(Self::new(base_url, config.request_timeout())?)
    }

    /// `<base>/api/<segments..>`, each segment percent-encoded
    fn url(&self, segments: &[&str]) -> error_common::Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| MonitorError::Config(format!("backend URL {} cannot hold a path", self.base_url)))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, url: Url) -> error_common::Result<Value> {
        debug!(url = %url, "GET");
        let response = self.client.get(url.clone()).send().await.map_err(|e| transport_error(url.as_str(), e))?;
        decode(url.as_str(), response).await
    }

    async fn post_json(&self, url: Url) -> error_common::Result<Value> {
        debug!(url = %url, "POST");
        let response = self.client.post(url.clone()).send().await.map_err(|e| transport_error(url.as_str(), e))?;
        decode(url.as_str(), response).await
    }
}

async fn decode(url: &str, response: reqwest::Response) -> error_common::Result<Value> {
    let status = response.status();
    if !status.is_success() {
        return Err(MonitorError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| MonitorError::Decode(format!("{url}: {e}")))
}

fn transport_error(url: &str, e: reqwest::Error) -> MonitorError {
    if e.is_timeout() {
        MonitorError::Timeout(url.to_string())
    } else {
        MonitorError::Network(format!("{url}: {e}"))
    }
}

#[async_trait]
impl DirectorySource for HttpBackend {
    async fn fetch_patients(&self) -> error_common::Result<Value> {
        self.get_json(self.url(&["patients"])?).await
    }

    async fn fetch_devices(&self) -> error_common::Result<Value> {
        self.get_json(self.url(&["devices"])?).await
    }
}

#[async_trait]
impl ReadingSource for HttpBackend {
    async fn fetch_latest(&self, device_ids: &[String]) -> HashMap<String, error_common::Result<Value>> {
        let requests = device_ids.iter().map(|id| async move {
            let result = match self.url(&["devices", id.as_str(), "latest"]) {
                Ok(url) => match self.get_json(url).await {
                    // No reading yet for this device
                    Err(MonitorError::Status { status: 404, .. }) => return None,
                    other => other,
                },
                Err(e) => Err(e),
            };
            Some((id.clone(), result))
        });

        join_all(requests).await.into_iter().flatten().collect()
    }
}

#[async_trait]
impl PredictionClient for HttpBackend {
    async fn predict(&self, patient_id: &str) -> error_common::Result<RiskAssessment> {
        let url = self.url(&["predictions", patient_id])?;
        let body = self.post_json(url.clone()).await?;
        serde_json::from_value(body).map_err(|e| MonitorError::Decode(format!("{url}: {e}")))
    }
}
