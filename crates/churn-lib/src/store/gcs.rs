//! Google Cloud Storage backend over the JSON API
//!
//! Authenticates with a bearer token (for example the output of
//! `gcloud auth print-access-token`). Requests are not retried.

use super::{async_trait, ArtifactHandle, ArtifactStore};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Connection settings for [`GcsArtifactStore`]
#[derive(Debug, Clone)]
pub struct GcsConfig {
    pub endpoint: String,
    pub project_id: String,
    pub bucket: String,
    pub access_token: Option<String>,
    pub timeout: Duration,
}

impl GcsConfig {
    pub fn new(project_id: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_GCS_ENDPOINT.to_string(),
            project_id: project_id.into(),
            bucket: bucket.into(),
            access_token: None,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    time_created: DateTime<Utc>,
    #[serde(default)]
    size: Option<String>,
}

/// Bucket-scoped GCS client
pub struct GcsArtifactStore {
    client: Client,
    endpoint: Url,
    config: GcsConfig,
}

impl GcsArtifactStore {
    pub fn new(config: GcsConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::backend(&config.bucket, e))?;
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| StoreError::backend(&config.endpoint, e))?;
        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    /// `{endpoint}/{segments...}` with every segment percent-encoded, `/` included
    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::backend(&self.config.endpoint, "endpoint cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, name: &str) -> Result<Url, StoreError> {
        self.url(&["storage", "v1", "b", &self.config.bucket, "o", name])
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header("x-goog-user-project", &self.config.project_id);
        match &self.config.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, name: &str, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| StoreError::backend(name, e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::backend(name, format!("{status}: {body}")));
        }
        Ok(response)
    }
}

#[async_trait]
impl ArtifactStore for GcsArtifactStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ArtifactHandle>, StoreError> {
        let mut handles = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.url(&["storage", "v1", "b", &self.config.bucket, "o"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page: ObjectList = self
                .send(prefix, self.client.get(url))
                .await?
                .json()
                .await
                .map_err(|e| StoreError::backend(prefix, e))?;

            handles.extend(page.items.into_iter().map(|item| ArtifactHandle {
                size_bytes: item.size.and_then(|s| s.parse().ok()).unwrap_or(0),
                name: item.name,
                created_at: item.time_created,
            }));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(handles)
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let mut url = self.object_url(name)?;
        url.query_pairs_mut().append_pair("alt", "media");
        let bytes = self
            .send(name, self.client.get(url))
            .await?
            .bytes()
            .await
            .map_err(|e| StoreError::backend(name, e))?;
        Ok(bytes.to_vec())
    }

    async fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut url = self.url(&["upload", "storage", "v1", "b", &self.config.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", name);
        let request = self
            .client
            .post(url)
            .header("content-type", "application/octet-stream")
            .body(bytes.to_vec());
        self.send(name, request).await?;
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<(), StoreError> {
        let bucket = &self.config.bucket;
        let url = self.url(&["storage", "v1", "b", bucket, "o", src, "copyTo", "b", bucket, "o", dst])?;
        let request = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body("{}");
        self.send(src, request).await?;
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        let url = self.object_url(name)?;
        match self.send(name, self.client.get(url)).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let url = self.object_url(name)?;
        self.send(name, self.client.delete(url)).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "gcs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn store_for(server: &mockito::ServerGuard) -> GcsArtifactStore {
        let mut config = GcsConfig::new("demo-project", "churn-bucket");
        config.endpoint = server.url();
        config.access_token = Some("token-123".to_string());
        GcsArtifactStore::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_list_follows_pages_and_parses_creation_time() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/storage/v1/b/churn-bucket/o")
            .match_query(Matcher::Regex("^prefix=models%2Fprod%2F$".into()))
            .match_header("authorization", "Bearer token-123")
            .with_status(200)
            .with_body(
                r#"{"items":[{"name":"models/prod/a.csv","timeCreated":"2025-01-01T10:00:00.000Z","size":"42"}],
                    "nextPageToken":"p2"}"#,
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/storage/v1/b/churn-bucket/o")
            .match_query(Matcher::Regex("pageToken=p2".into()))
            .with_status(200)
            .with_body(r#"{"items":[{"name":"models/prod/b.csv","timeCreated":"2025-01-02T10:00:00Z"}]}"#)
            .create_async()
            .await;

        let store = store_for(&server);
        let handles = store.list("models/prod/").await.unwrap();

        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].name, "models/prod/a.csv");
        assert_eq!(handles[0].size_bytes, 42);
        assert!(handles[1].created_at > handles[0].created_at);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_read_returns_media_bytes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/storage/v1/b/churn-bucket/o/scaler.json")
            .match_query(Matcher::UrlEncoded("alt".into(), "media".into()))
            .with_status(200)
            .with_body("{\"columns\":[]}")
            .create_async()
            .await;

        let store = store_for(&server);
        let bytes = store.read("scaler.json").await.unwrap();
        assert_eq!(bytes, b"{\"columns\":[]}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_exists_maps_404_to_false() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/storage/v1/b/churn-bucket/o/missing.csv")
            .with_status(404)
            .create_async()
            .await;

        let store = store_for(&server);
        assert!(!store.exists("missing.csv").await.unwrap());
    }

    #[tokio::test]
    async fn test_server_error_is_backend_fault() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/storage/v1/b/churn-bucket/o")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body("permission denied")
            .create_async()
            .await;

        let store = store_for(&server);
        let err = store.list("models/").await.unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_copy_encodes_source_and_destination() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "POST",
                "/storage/v1/b/churn-bucket/o/models%2Fstage%2Fmodel_lr_1.joblib/copyTo/b/churn-bucket/o/models%2Fprod%2Fmodel_lr_1.joblib",
            )
            .match_header("authorization", "Bearer token-123")
            .with_status(200)
            .with_body(r#"{"name":"models/prod/model_lr_1.joblib"}"#)
            .create_async()
            .await;

        let store = store_for(&server);
        store
            .copy("models/stage/model_lr_1.joblib", "models/prod/model_lr_1.joblib")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_copy_missing_source_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock(
                "POST",
                "/storage/v1/b/churn-bucket/o/models%2Fstage%2Fgone.csv/copyTo/b/churn-bucket/o/models%2Fprod%2Fgone.csv",
            )
            .with_status(404)
            .create_async()
            .await;

        let store = store_for(&server);
        let err = store
            .copy("models/stage/gone.csv", "models/prod/gone.csv")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(name) if name == "models/stage/gone.csv"));
    }

    #[tokio::test]
    async fn test_write_uploads_media_with_object_name() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload/storage/v1/b/churn-bucket/o")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("uploadType".into(), "media".into()),
                Matcher::UrlEncoded("name".into(), "data/processed/scaler.json".into()),
            ]))
            .match_header("content-type", "application/octet-stream")
            .match_body("{\"means\":[]}")
            .with_status(200)
            .with_body(r#"{"name":"data/processed/scaler.json"}"#)
            .create_async()
            .await;

        let store = store_for(&server);
        store
            .write("data/processed/scaler.json", b"{\"means\":[]}")
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_targets_encoded_object() {
        let mut server = mockito::Server::new_async().await;
        let deleted = server
            .mock("DELETE", "/storage/v1/b/churn-bucket/o/data%2Fprocessed%2Fencoder.json")
            .with_status(204)
            .create_async()
            .await;
        server
            .mock("DELETE", "/storage/v1/b/churn-bucket/o/data%2Fprocessed%2Fmissing.json")
            .with_status(404)
            .create_async()
            .await;

        let store = store_for(&server);
        store.delete("data/processed/encoder.json").await.unwrap();
        deleted.assert_async().await;

        let err = store.delete("data/processed/missing.json").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_object_names_are_single_encoded_segments() {
        let config = GcsConfig::new("p", "b");
        let store = GcsArtifactStore::new(config).unwrap();
        let url = store.object_url("models/stage/x.csv").unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/b/o/models%2Fstage%2Fx.csv"
        );
    }
}
