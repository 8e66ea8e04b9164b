//! Remote Metadata Service client over HTTP/JSON
//!
//! Resource layout served by the metadata server:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list      | `GET /api/items` |
//! | get       | `GET /api/items/{path}` |
//! | put       | `PUT /api/items/{path}` with a JSON [`RemoteItem`] body |
//! | rename    | `POST /api/items/{path}/rename` with `{"new_path": ...}` |
//! | delete    | `DELETE /api/items/{path}` |

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    remote::{RemoteItem, RemoteMetadataService},
};
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::http::{base_url, build_client, check_status, join_segments, map_send_error};

const ITEMS_PREFIX: [&str; 2] = ["api", "items"];

#[derive(Serialize)]
struct RenameBody<'a> {
    new_path: &'a str,
}

/// reqwest-backed [`RemoteMetadataService`]
pub struct HttpMetadataClient {
    client: Client,
    base: Url,
}

impl HttpMetadataClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        Self::with_timeout(host, port, Duration::from_secs(30))
    }

    pub fn with_timeout(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base: base_url(host, port)?,
        })
    }

    fn item_url(&self, path: &str) -> Result<Url> {
        join_segments(&self.base, &ITEMS_PREFIX, path)
    }

    fn rename_url(&self, path: &str) -> Result<Url> {
        let mut url = self.item_url(path)?;
        url.path_segments_mut()
            .map_err(|_| BridgeError::OperationFailed("URL cannot be a base".to_string()))?
            .push("rename");
        Ok(url)
    }
}

#[async_trait]
impl RemoteMetadataService for HttpMetadataClient {
    #[instrument(skip(self))]
    async fn list_items(&self) -> Result<Vec<RemoteItem>> {
        let url = join_segments(&self.base, &ITEMS_PREFIX, "")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_send_error(e, "list items"))?;

        let items: Vec<RemoteItem> = check_status(response, "list items")?
            .json()
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid item list: {}", e)))?;

        debug!(count = items.len(), "Listed remote items");
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn get_item(&self, path: &str) -> Result<Option<RemoteItem>> {
        let response = self
            .client
            .get(self.item_url(path)?)
            .send()
            .await
            .map_err(|e| map_send_error(e, path))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let item = check_status(response, path)?
            .json()
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid item {}: {}", path, e)))?;
        Ok(Some(item))
    }

    #[instrument(skip(self, item), fields(path = %item.path))]
    async fn put_item(&self, item: &RemoteItem) -> Result<()> {
        let response = self
            .client
            .put(self.item_url(&item.path)?)
            .json(item)
            .send()
            .await
            .map_err(|e| map_send_error(e, &item.path))?;

        check_status(response, &item.path)?;
        debug!(path = %item.path, "Registered remote item");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn rename_item(&self, old_path: &str, new_path: &str) -> Result<()> {
        let response = self
            .client
            .post(self.rename_url(old_path)?)
            .json(&RenameBody { new_path })
            .send()
            .await
            .map_err(|e| map_send_error(e, old_path))?;

        check_status(response, old_path)?;
        debug!(old_path, new_path, "Renamed remote item");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_item(&self, path: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.item_url(path)?)
            .send()
            .await
            .map_err(|e| map_send_error(e, path))?;

        check_status(response, path)?;
        debug!(path, "Deleted remote item");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_urls() {
        let client = HttpMetadataClient::new("localhost", 8000).unwrap();

        assert_eq!(
            client.item_url("docs/a b.txt").unwrap().as_str(),
            "http://localhost:8000/api/items/docs/a%20b.txt"
        );
        assert_eq!(
            client.rename_url("x.txt").unwrap().as_str(),
            "http://localhost:8000/api/items/x.txt/rename"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        // Port 9 (discard) is closed on test hosts.
        let client =
            HttpMetadataClient::with_timeout("127.0.0.1", 9, Duration::from_secs(2)).unwrap();

        let err = client.list_items().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
