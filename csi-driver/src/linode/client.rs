//! HTTP client for the Linode API v4.

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::models::{
    ApiErrors, AttachVolumeRequest, CloneVolumeRequest, CreateVolumeRequest, Instance,
    InstanceDisk, Page, ResizeVolumeRequest, Volume,
};
use super::{CloudError, CloudVolumeService};

const PAGE_SIZE: u32 = 100;

/// Client for the Linode API, authenticated with a personal access token.
#[derive(Debug, Clone)]
pub struct LinodeClient {
    http: reqwest::Client,
    base_url: String,
}

impl LinodeClient {
    /// Build a client for the given endpoint and token.
    pub fn new(base_url: &str, token: &str) -> Result<Self, CloudError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| CloudError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Decode an API error body into a `CloudError`.
    async fn decode_error(response: reqwest::Response) -> CloudError {
        let status = response.status().as_u16();
        let message = match response.json::<ApiErrors>().await {
            Ok(errors) => errors.message(),
            Err(_) => "unparseable API error body".to_string(),
        };
        CloudError::Api { status, message }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        filter: Option<serde_json::Value>,
    ) -> Result<T, CloudError> {
        let mut request = self.http.get(self.url(path));
        if let Some(filter) = filter {
            request = request.header("X-Filter", filter.to_string());
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CloudError> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn post_empty<B: Serialize>(&self, path: &str, body: &B) -> Result<(), CloudError> {
        let response = self.http.post(self.url(path)).json(body).send().await?;
        if !response.status().is_success() {
            return Err(Self::decode_error(response).await);
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<StatusCode, CloudError> {
        let response = self.http.delete(self.url(path)).send().await?;
        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            return Err(Self::decode_error(response).await);
        }
        Ok(status)
    }

    /// Walk every page of a collection endpoint.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        filter: Option<serde_json::Value>,
    ) -> Result<Vec<T>, CloudError> {
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!("{}?page={}&page_size={}", path, page, PAGE_SIZE);
            let chunk: Page<T> = self.get_json(&url, filter.clone()).await?;
            items.extend(chunk.data);
            if page >= chunk.pages {
                return Ok(items);
            }
            page += 1;
        }
    }

    fn is_not_found(err: &CloudError) -> bool {
        matches!(err, CloudError::Api { status: 404, .. })
    }
}

#[tonic::async_trait]
impl CloudVolumeService for LinodeClient {
    async fn list_volumes(&self) -> Result<Vec<Volume>, CloudError> {
        self.get_all("/volumes", None).await
    }

    async fn get_volume(&self, volume_id: u64) -> Result<Volume, CloudError> {
        self.get_json(&format!("/volumes/{}", volume_id), None)
            .await
            .map_err(|e| {
                if Self::is_not_found(&e) {
                    CloudError::VolumeNotFound(volume_id)
                } else {
                    e
                }
            })
    }

    async fn find_volume_by_label(&self, label: &str) -> Result<Option<Volume>, CloudError> {
        let volumes: Vec<Volume> = self
            .get_all("/volumes", Some(json!({ "label": label })))
            .await?;
        Ok(volumes.into_iter().next())
    }

    async fn create_volume(
        &self,
        label: &str,
        region: &str,
        size_gib: u64,
    ) -> Result<Volume, CloudError> {
        debug!(label = %label, region = %region, size_gib = size_gib, "creating cloud volume");
        self.post_json(
            "/volumes",
            &CreateVolumeRequest {
                label,
                region,
                size: size_gib,
            },
        )
        .await
    }

    async fn clone_volume(&self, source_id: u64, label: &str) -> Result<Volume, CloudError> {
        debug!(source_id = source_id, label = %label, "cloning cloud volume");
        self.post_json(
            &format!("/volumes/{}/clone", source_id),
            &CloneVolumeRequest { label },
        )
        .await
        .map_err(|e| {
            if Self::is_not_found(&e) {
                CloudError::VolumeNotFound(source_id)
            } else {
                e
            }
        })
    }

    async fn delete_volume(&self, volume_id: u64) -> Result<(), CloudError> {
        // 404 means the volume is already gone; deletion is idempotent.
        self.delete(&format!("/volumes/{}", volume_id)).await?;
        Ok(())
    }

    async fn resize_volume(&self, volume_id: u64, size_gib: u64) -> Result<(), CloudError> {
        self.post_empty(
            &format!("/volumes/{}/resize", volume_id),
            &ResizeVolumeRequest { size: size_gib },
        )
        .await
        .map_err(|e| {
            if Self::is_not_found(&e) {
                CloudError::VolumeNotFound(volume_id)
            } else {
                e
            }
        })
    }

    async fn attach_volume(&self, volume_id: u64, linode_id: u64) -> Result<Volume, CloudError> {
        debug!(volume_id = volume_id, linode_id = linode_id, "attaching cloud volume");
        self.post_json(
            &format!("/volumes/{}/attach", volume_id),
            &AttachVolumeRequest {
                linode_id,
                persist_across_boots: false,
            },
        )
        .await
        .map_err(|e| {
            if Self::is_not_found(&e) {
                CloudError::VolumeNotFound(volume_id)
            } else {
                e
            }
        })
    }

    async fn detach_volume(&self, volume_id: u64) -> Result<(), CloudError> {
        debug!(volume_id = volume_id, "detaching cloud volume");
        self.post_empty(&format!("/volumes/{}/detach", volume_id), &json!({}))
            .await
            .map_err(|e| {
                if Self::is_not_found(&e) {
                    CloudError::VolumeNotFound(volume_id)
                } else {
                    e
                }
            })
    }

    async fn get_instance(&self, linode_id: u64) -> Result<Instance, CloudError> {
        self.get_json(&format!("/linode/instances/{}", linode_id), None)
            .await
            .map_err(|e| {
                if Self::is_not_found(&e) {
                    CloudError::InstanceNotFound(linode_id)
                } else {
                    e
                }
            })
    }

    async fn find_instance_by_label(&self, label: &str) -> Result<Option<Instance>, CloudError> {
        let instances: Vec<Instance> = self
            .get_all("/linode/instances", Some(json!({ "label": label })))
            .await?;
        Ok(instances.into_iter().next())
    }

    async fn list_instance_disks(&self, linode_id: u64) -> Result<Vec<InstanceDisk>, CloudError> {
        self.get_all(&format!("/linode/instances/{}/disks", linode_id), None)
            .await
            .map_err(|e| {
                if Self::is_not_found(&e) {
                    CloudError::InstanceNotFound(linode_id)
                } else {
                    e
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_url_joins() {
        let client = LinodeClient::new("https://api.linode.com/v4/", "token").unwrap();
        assert_eq!(
            client.url("/volumes/12"),
            "https://api.linode.com/v4/volumes/12"
        );
    }

    #[test]
    fn test_invalid_token_rejected() {
        assert!(matches!(
            LinodeClient::new("https://api.linode.com/v4", "bad\ntoken"),
            Err(CloudError::InvalidToken)
        ));
    }

    #[test]
    fn test_not_found_detection() {
        let err = CloudError::Api {
            status: 404,
            message: "Not found".to_string(),
        };
        assert!(LinodeClient::is_not_found(&err));

        let err = CloudError::Api {
            status: 500,
            message: "boom".to_string(),
        };
        assert!(!LinodeClient::is_not_found(&err));
    }
}
