use super::models::{
    Document, Fields, ListCollectionIdsRequest, ListCollectionIdsResponse, ListDocumentsResponse,
};
use super::FirestoreError;
use crate::core::ApiFailure;
use reqwest::{header, StatusCode};
use reqwest_middleware::ClientWithMiddleware;

const PAGE_SIZE: i32 = 300;

fn document_body(fields: &Fields) -> Result<Vec<u8>, FirestoreError> {
    Ok(serde_json::to_vec(&serde_json::json!({ "fields": fields }))?)
}

#[derive(Clone)]
pub struct DocumentReference<'a> {
    pub(crate) client: &'a ClientWithMiddleware,
    pub(crate) base_url: &'a str,
    pub(crate) path: String,
}

impl<'a> DocumentReference<'a> {
    /// Path relative to the database root.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.path)
    }

    pub fn collection(&self, collection_id: &str) -> CollectionReference<'a> {
        CollectionReference {
            client: self.client,
            base_url: self.base_url,
            path: format!("{}/{}", self.path, collection_id),
        }
    }

    /// Creates the document, failing with `AlreadyExists` instead of
    /// overwriting an existing one.
    pub async fn create(&self, fields: &Fields) -> Result<(), FirestoreError> {
        let (parent, id) = self
            .path
            .rsplit_once('/')
            .ok_or_else(|| FirestoreError::ApiError(format!("Invalid document path: {}", self.path)))?;

        let url = format!("{}/{}", self.base_url, parent);

        let response = self
            .client
            .post(&url)
            .query(&[("documentId", id)])
            .header(header::CONTENT_TYPE, "application/json")
            .body(document_body(fields)?)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Err(FirestoreError::AlreadyExists(self.path.clone()));
        }

        if !response.status().is_success() {
            let failure = ApiFailure::from_response(response).await;
            if failure.has_status("ALREADY_EXISTS") {
                return Err(FirestoreError::AlreadyExists(self.path.clone()));
            }
            return Err(FirestoreError::ApiError(failure.message("Create document failed")));
        }

        Ok(())
    }

    /// Updates only the given fields of an existing document.
    ///
    /// The write carries an `exists` precondition, so a missing document is
    /// reported as `NotFound` rather than created.
    pub async fn update_fields(&self, fields: &Fields) -> Result<(), FirestoreError> {
        let mut params: Vec<(&str, &str)> = fields
            .keys()
            .map(|field| ("updateMask.fieldPaths", field.as_str()))
            .collect();
        params.push(("currentDocument.exists", "true"));

        let response = self
            .client
            .patch(self.url())
            .query(&params)
            .header(header::CONTENT_TYPE, "application/json")
            .body(document_body(fields)?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(FirestoreError::NotFound(self.path.clone()));
        }

        if !response.status().is_success() {
            let failure = ApiFailure::from_response(response).await;
            if failure.has_status("NOT_FOUND") {
                return Err(FirestoreError::NotFound(self.path.clone()));
            }
            return Err(FirestoreError::ApiError(failure.message("Update document failed")));
        }

        Ok(())
    }

    /// Deletes the document. Deleting a missing document succeeds.
    pub async fn delete(&self) -> Result<(), FirestoreError> {
        let response = self.client.delete(self.url()).send().await?;

        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            let failure = ApiFailure::from_response(response).await;
            return Err(FirestoreError::ApiError(failure.message("Delete document failed")));
        }

        Ok(())
    }

    /// Lists the subcollections directly under this document.
    pub async fn list_collections(&self) -> Result<Vec<CollectionReference<'a>>, FirestoreError> {
        let url = format!("{}:listCollectionIds", self.url());
        let mut collections = Vec::new();
        let mut next_page_token = None;

        loop {
            let request = ListCollectionIdsRequest {
                page_size: Some(100),
                page_token: next_page_token.take(),
            };

            let response = self
                .client
                .post(&url)
                .header(header::CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(&request)?)
                .send()
                .await?;

            if !response.status().is_success() {
                let failure = ApiFailure::from_response(response).await;
                return Err(FirestoreError::ApiError(failure.message("List collections failed")));
            }

            let result: ListCollectionIdsResponse = response.json().await?;
            for id in result.collection_ids {
                collections.push(self.collection(&id));
            }

            match result.next_page_token {
                Some(token) if !token.is_empty() => next_page_token = Some(token),
                _ => break,
            }
        }

        Ok(collections)
    }

    /// Deletes this document and everything nested beneath it.
    ///
    /// Children are deleted before their parents. Returns the number of
    /// delete calls issued, including placeholder parents and the root.
    pub async fn delete_recursive(&self) -> Result<usize, FirestoreError> {
        let mut pending = vec![(self.clone(), false)];
        let mut deleted = 0;

        while let Some((doc, expanded)) = pending.pop() {
            if expanded {
                doc.delete().await?;
                deleted += 1;
                continue;
            }

            pending.push((doc.clone(), true));
            for collection in doc.list_collections().await? {
                for child in collection.list_documents(true).await? {
                    pending.push((collection.doc(child.id()), false));
                }
            }
        }

        Ok(deleted)
    }
}

#[derive(Clone)]
pub struct CollectionReference<'a> {
    pub(crate) client: &'a ClientWithMiddleware,
    pub(crate) base_url: &'a str,
    pub(crate) path: String,
}

impl<'a> CollectionReference<'a> {
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn doc(&self, document_id: &str) -> DocumentReference<'a> {
        DocumentReference {
            client: self.client,
            base_url: self.base_url,
            path: format!("{}/{}", self.path, document_id),
        }
    }

    /// Lists every document in the collection, following page tokens.
    ///
    /// With `show_missing`, documents that do not exist but have
    /// subcollections are included; they carry no create time.
    pub async fn list_documents(&self, show_missing: bool) -> Result<Vec<Document>, FirestoreError> {
        let url = format!("{}/{}", self.base_url, self.path);
        let mut documents = Vec::new();
        let mut next_page_token: Option<String> = None;

        loop {
            let mut params = vec![("pageSize", PAGE_SIZE.to_string())];
            if show_missing {
                params.push(("showMissing", "true".to_string()));
            }
            if let Some(token) = next_page_token.take() {
                params.push(("pageToken", token));
            }

            let response = self.client.get(&url).query(&params).send().await?;

            if !response.status().is_success() {
                let failure = ApiFailure::from_response(response).await;
                return Err(FirestoreError::ApiError(failure.message("List documents failed")));
            }

            let page: ListDocumentsResponse = response.json().await?;
            documents.extend(page.documents);

            match page.next_page_token {
                Some(token) if !token.is_empty() => next_page_token = Some(token),
                _ => break,
            }
        }

        Ok(documents)
    }
}
