use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::api::{ClusterApi, endpoints};
use crate::error::{ApiError, Result};
use crate::task::{TaskHandle, TaskStatus};

/// Connection settings for one cluster.
///
/// Credentials are opaque here; they ride as HTTP basic auth on every
/// request. Clusters commonly present self-signed certificates, so
/// verification can be switched off explicitly.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Base URL, e.g. `https://cluster.example.com`.
    pub host: String,
    pub username: String,
    pub password: String,
    pub accept_invalid_certs: bool,
}

/// HTTP binding of [`ClusterApi`] against `/rest/v1/`.
pub struct HttpClient {
    http: reqwest::Client,
    config: ClusterConfig,
}

impl HttpClient {
    pub fn new(config: ClusterConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.config.host.trim_end_matches('/'), path)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<reqwest::Response> {
        let url = self.url(path);
        debug!(method = %method, url = %url, "Cluster API request");

        let mut req = self
            .http
            .request(method, &url)
            .basic_auth(&self.config.username, Some(&self.config.password));
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else if status == StatusCode::NOT_FOUND {
            Err(ApiError::NotFound(path.to_string()))
        } else if status == StatusCode::CONFLICT {
            Err(ApiError::Conflict(resp.text().await.unwrap_or_default()))
        } else {
            Err(ApiError::Api {
                status: status.as_u16(),
                detail: resp.text().await.unwrap_or_default(),
            })
        }
    }

    /// Mutating responses carry a task handle; some synchronous endpoints
    /// answer with an empty body instead.
    async fn task_handle(resp: reqwest::Response) -> Result<TaskHandle> {
        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(TaskHandle::default());
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ClusterApi for HttpClient {
    async fn list(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Vec<Value>> {
        let resp = self.send(Method::GET, endpoint, query, None).await?;
        Ok(resp.json().await?)
    }

    async fn get(&self, endpoint: &str, uuid: &str) -> Result<Option<Value>> {
        let path = format!("{}/{}", endpoint, uuid);
        match self.send(Method::GET, &path, &[], None).await {
            Ok(resp) => Ok(Some(resp.json().await?)),
            Err(ApiError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, endpoint: &str, payload: Value) -> Result<TaskHandle> {
        let resp = self
            .send(Method::POST, endpoint, &[], Some(&payload))
            .await?;
        Self::task_handle(resp).await
    }

    async fn update(&self, endpoint: &str, uuid: &str, payload: Value) -> Result<TaskHandle> {
        let path = format!("{}/{}", endpoint, uuid);
        let resp = self
            .send(Method::PATCH, &path, &[], Some(&payload))
            .await?;
        Self::task_handle(resp).await
    }

    async fn delete(&self, endpoint: &str, uuid: &str) -> Result<TaskHandle> {
        let path = format!("{}/{}", endpoint, uuid);
        let resp = self.send(Method::DELETE, &path, &[], None).await?;
        Self::task_handle(resp).await
    }

    async fn action(&self, endpoint: &str, payload: Value) -> Result<TaskHandle> {
        let resp = self
            .send(Method::POST, endpoint, &[], Some(&payload))
            .await?;
        Self::task_handle(resp).await
    }

    async fn upload(&self, endpoint: &str, uuid: &str, content: Vec<u8>) -> Result<TaskHandle> {
        let url = self.url(&format!("{}/{}/data", endpoint, uuid));
        debug!(url = %url, bytes = content.len(), "Uploading content");

        let resp = self
            .http
            .put(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(content)
            .send()
            .await?;

        match resp.status() {
            status if status.is_success() => Self::task_handle(resp).await,
            status => Err(ApiError::Api {
                status: status.as_u16(),
                detail: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn task_status(&self, tag: &str) -> Result<TaskStatus> {
        let path = format!("{}/{}", endpoints::TASK_TAG, tag);
        let resp = self.send(Method::GET, &path, &[], None).await?;
        Ok(resp.json().await?)
    }
}
