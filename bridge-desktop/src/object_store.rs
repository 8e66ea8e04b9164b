//! Object store client speaking path-style HTTP (MinIO compatible endpoints)
//!
//! Objects live at `{endpoint}/{bucket}/{key}` and are authenticated with the
//! configured access id and secret as HTTP basic credentials.

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    remote::ObjectStore,
};
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Url};
use std::time::Duration;
use tracing::{debug, instrument};

use crate::http::{base_url, build_client, check_status, join_segments, map_send_error};

/// Credentials and location of the bucket
#[derive(Clone)]
pub struct ObjectStoreConfig {
    pub host: String,
    pub port: u16,
    pub access_id: String,
    pub secret: String,
    pub bucket: String,
}

impl std::fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("access_id", &self.access_id)
            .field("secret", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .finish()
    }
}

/// reqwest-backed [`ObjectStore`]
pub struct HttpObjectStore {
    client: Client,
    base: Url,
    config: ObjectStoreConfig,
}

impl HttpObjectStore {
    pub fn new(config: ObjectStoreConfig) -> Result<Self> {
        Self::with_timeout(config, Duration::from_secs(120))
    }

    pub fn with_timeout(config: ObjectStoreConfig, timeout: Duration) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(BridgeError::OperationFailed(
                "Object store bucket must not be empty".to_string(),
            ));
        }

        Ok(Self {
            client: build_client(timeout)?,
            base: base_url(&config.host, config.port)?,
            config,
        })
    }

    fn object_url(&self, key: &str) -> Result<Url> {
        join_segments(&self.base, &[self.config.bucket.as_str()], key)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.config.access_id, Some(&self.config.secret))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        let size = data.len();
        let response = self
            .authorize(self.client.put(self.object_url(key)?))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| map_send_error(e, key))?;

        check_status(response, key)?;
        debug!(key, size, "Stored object");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_object(&self, key: &str) -> Result<Bytes> {
        let response = self
            .authorize(self.client.get(self.object_url(key)?))
            .send()
            .await
            .map_err(|e| map_send_error(e, key))?;

        let data = check_status(response, key)?
            .bytes()
            .await
            .map_err(|e| map_send_error(e, key))?;

        debug!(key, size = data.len(), "Fetched object");
        Ok(data)
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, key: &str) -> Result<()> {
        let response = self
            .authorize(self.client.delete(self.object_url(key)?))
            .send()
            .await
            .map_err(|e| map_send_error(e, key))?;

        check_status(response, key)?;
        debug!(key, "Deleted object");
        Ok(())
    }
}
