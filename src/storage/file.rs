use crate::core::ApiFailure;
use crate::storage::StorageError;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use url::Url;

/// Represents a file within a Google Cloud Storage bucket.
pub struct File {
    client: ClientWithMiddleware,
    base_url: String,
    bucket_name: String,
    name: String,
}

/// Metadata for a Google Cloud Storage object.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub name: Option<String>,
    pub bucket: Option<String>,
    pub generation: Option<String>,
    pub content_type: Option<String>,
    pub time_created: Option<String>,
    pub updated: Option<String>,
    pub size: Option<String>,
}

impl ObjectMetadata {
    /// Last-updated time, falling back to the creation time.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated
            .as_deref()
            .or(self.time_created.as_deref())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListObjectsResponse {
    #[serde(default)]
    pub items: Vec<ObjectMetadata>,
    pub next_page_token: Option<String>,
}

impl File {
    pub(crate) fn new(
        client: ClientWithMiddleware,
        base_url: String,
        bucket_name: String,
        name: String,
    ) -> Self {
        Self {
            client,
            base_url,
            bucket_name,
            name,
        }
    }

    /// The object's JSON API URL. The name is a single path segment, so its
    /// slashes and spaces are percent-encoded (`%2F`, `%20`).
    fn object_url(&self) -> Result<Url, StorageError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| StorageError::ApiError(format!("Invalid storage URL {}: {}", self.base_url, e)))?;

        url.path_segments_mut()
            .map_err(|_| StorageError::ApiError(format!("Invalid storage URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["b", self.bucket_name.as_str(), "o", self.name.as_str()]);

        Ok(url)
    }

    /// Deletes the file.
    pub async fn delete(&self) -> Result<(), StorageError> {
        let response = self.client.delete(self.object_url()?).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(self.name.clone()));
        }

        if !response.status().is_success() {
            let failure = ApiFailure::from_response(response).await;
            return Err(StorageError::ApiError(failure.message("Delete failed")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest_middleware::ClientBuilder;

    fn file(base_url: &str, name: &str) -> File {
        let client = ClientBuilder::new(reqwest::Client::new()).build();
        File::new(client, base_url.to_string(), "test-bucket".to_string(), name.to_string())
    }

    #[test]
    fn test_object_url_encodes_name_as_one_path_segment() {
        let url = file("https://storage.googleapis.com/storage/v1", "avatars/u1/face one+1.jpg")
            .object_url()
            .unwrap();

        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/test-bucket/o/avatars%2Fu1%2Fface%20one+1.jpg"
        );
    }

    #[test]
    fn test_object_url_on_bare_host() {
        let url = file("http://127.0.0.1:8080", "a b.jpg").object_url().unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/b/test-bucket/o/a%20b.jpg");
    }
}
