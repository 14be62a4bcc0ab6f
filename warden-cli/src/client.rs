//! Thin HTTP client for the supervisor's status API.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use warden_common::{RepairResponse, ServiceAlert, ServiceReport, StatusReport};

pub struct SupervisorClient {
    base_url: String,
    http: reqwest::Client,
}

impl SupervisorClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub async fn status(&self) -> Result<StatusReport> {
        let url = format!("{}/status", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach supervisor at {}", url))?;
        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn service(&self, name: &str) -> Result<ServiceReport> {
        let url = format!("{}/status/{}", self.base_url, name);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach supervisor at {}", url))?;
        if response.status().as_u16() == 404 {
            return Err(anyhow!("unknown service: {}", name));
        }
        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn repair(&self) -> Result<RepairResponse> {
        let url = format!("{}/repair", self.base_url);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach supervisor at {}", url))?;
        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn alerts(&self, count: usize) -> Result<Vec<ServiceAlert>> {
        let url = format!("{}/alerts?count={}", self.base_url, count);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to reach supervisor at {}", url))?;
        Ok(response.error_for_status()?.json().await?)
    }
}
