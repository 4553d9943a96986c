use crate::core::ApiFailure;
use crate::storage::file::{File, ListObjectsResponse, ObjectMetadata};
use crate::storage::StorageError;
use reqwest_middleware::ClientWithMiddleware;

/// A reference to a Google Cloud Storage bucket.
#[derive(Clone)]
pub struct Bucket {
    client: ClientWithMiddleware,
    base_url: String,
    name: String,
}

impl Bucket {
    pub(crate) fn new(client: ClientWithMiddleware, base_url: String, name: String) -> Self {
        Self {
            client,
            base_url,
            name,
        }
    }

    /// Returns the name of the bucket.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets a `File` instance that refers to the object at the specified path.
    pub fn file(&self, name: &str) -> File {
        File::new(
            self.client.clone(),
            self.base_url.clone(),
            self.name.clone(),
            name.to_string(),
        )
    }

    /// Lists every object whose name starts with `prefix`, following page tokens.
    pub async fn list_files(&self, prefix: &str) -> Result<Vec<ObjectMetadata>, StorageError> {
        let url = format!("{}/b/{}/o", self.base_url, self.name);
        let mut objects = Vec::new();
        let mut next_page_token: Option<String> = None;

        loop {
            let mut params = vec![("prefix", prefix.to_string())];
            if let Some(token) = next_page_token.take() {
                params.push(("pageToken", token));
            }

            let response = self.client.get(&url).query(&params).send().await?;

            if !response.status().is_success() {
                let failure = ApiFailure::from_response(response).await;
                return Err(StorageError::ApiError(failure.message("List objects failed")));
            }

            let page: ListObjectsResponse = response.json().await?;
            objects.extend(page.items);

            match page.next_page_token {
                Some(token) if !token.is_empty() => next_page_token = Some(token),
                _ => break,
            }
        }

        Ok(objects)
    }
}
