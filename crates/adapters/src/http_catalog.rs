//! HTTP catalog client
//!
//! JSON over HTTP against the control service's deployable collection.

use accel_domain::{Deployable, Uuid};
use accel_ports::{CatalogClient, CatalogError};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};

pub struct HttpCatalogClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpCatalogClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_default_timeout(base_url: &str) -> Self {
        Self::new(base_url, Duration::from_secs(10))
    }

    fn collection_url(&self) -> String {
        format!("{}/v1/deployables", self.base_url)
    }

    fn item_url(&self, uuid: &Uuid) -> String {
        format!("{}/v1/deployables/{}", self.base_url, uuid)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, CatalogError> {
        timeout(self.timeout, request.send())
            .await
            .map_err(|_| {
                error!("Catalog {} timed out after {:?}", operation, self.timeout);
                CatalogError::Timeout
            })?
            .map_err(|e| {
                error!("Catalog {} failed: {}", operation, e);
                CatalogError::Communication(e.to_string())
            })
    }
}

/// Turn a non-success status into `Rejected`, keeping the response body
async fn ensure_success(operation: &str, response: Response) -> Result<Response, CatalogError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CatalogError::Rejected(format!(
        "{} failed with status {}: {}",
        operation, status, body
    )))
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, CatalogError> {
    response
        .json::<T>()
        .await
        .map_err(|e| CatalogError::Serialization(e.to_string()))
}

/// Decode a host listing record by record. The collection also carries
/// records of kinds this agent does not manage; those are skipped.
fn decode_listing(host: &str, records: Vec<Value>) -> Vec<Deployable> {
    records
        .into_iter()
        .filter_map(|record| {
            let uuid = record.get("uuid").and_then(Value::as_str).map(str::to_string);
            match serde_json::from_value::<Deployable>(record) {
                Ok(deployable) => Some(deployable),
                Err(e) => {
                    warn!(host = %host, uuid = ?uuid, "Skipping catalog record: {}", e);
                    None
                }
            }
        })
        .collect()
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn list_by_host(&self, host: &str) -> Result<Vec<Deployable>, CatalogError> {
        let request = self
            .request(Method::GET, &self.collection_url())
            .query(&[("host", host)]);
        let response = self.send("list", request).await?;
        let response = ensure_success("list", response).await?;
        let records: Vec<Value> = decode(response).await?;
        let deployables = decode_listing(host, records);
        debug!(host = %host, count = deployables.len(), "Listed deployables");
        Ok(deployables)
    }

    async fn create(&self, deployable: &Deployable) -> Result<Deployable, CatalogError> {
        let request = self
            .request(Method::POST, &self.collection_url())
            .json(deployable);
        let response = self.send("create", request).await?;
        let response = ensure_success("create", response).await?;
        decode(response).await
    }

    async fn update(&self, deployable: &Deployable) -> Result<(), CatalogError> {
        let request = self
            .request(Method::PUT, &self.item_url(&deployable.uuid))
            .json(deployable);
        let response = self.send("update", request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(deployable.uuid));
        }
        ensure_success("update", response).await?;
        Ok(())
    }

    async fn delete(&self, deployable: &Deployable) -> Result<(), CatalogError> {
        let request = self.request(Method::DELETE, &self.item_url(&deployable.uuid));
        let response = self.send("delete", request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(deployable.uuid));
        }
        ensure_success("delete", response).await?;
        Ok(())
    }

    async fn get(&self, uuid: &Uuid) -> Result<Option<Deployable>, CatalogError> {
        let request = self.request(Method::GET, &self.item_url(uuid));
        let response = self.send("get", request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success("get", response).await?;
        decode(response).await.map(Some)
    }
}
