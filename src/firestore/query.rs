use super::models::{
    CollectionSelector, CompositeFilter, CompositeOperator, Document, FieldFilter, FieldOperator,
    FieldReference, QueryFilter, RunQueryRequest, RunQueryResponse, StructuredQuery, Value,
};
use super::FirestoreError;
use crate::core::ApiFailure;
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;

/// A definition of a Firestore query, independent of any client.
#[derive(Clone, Debug)]
pub struct Query {
    pub(crate) query: StructuredQuery,
}

impl Query {
    /// Creates a query over every collection with the given id, at any depth.
    pub fn collection_group(collection_id: impl Into<String>) -> Self {
        Self {
            query: StructuredQuery {
                from: vec![CollectionSelector {
                    collection_id: collection_id.into(),
                    all_descendants: true,
                }],
                where_clause: None,
            },
        }
    }

    /// Adds a field filter. Multiple filters are combined with AND.
    pub fn where_value(mut self, field: &str, op: FieldOperator, value: Value) -> Self {
        let filter = QueryFilter::FieldFilter(FieldFilter {
            field: FieldReference {
                field_path: field.to_string(),
            },
            op,
            value,
        });

        self.query.where_clause = Some(match self.query.where_clause.take() {
            None => filter,
            Some(QueryFilter::CompositeFilter(mut cf)) if cf.op == CompositeOperator::And => {
                cf.filters.push(filter);
                QueryFilter::CompositeFilter(cf)
            }
            Some(existing) => QueryFilter::CompositeFilter(CompositeFilter {
                op: CompositeOperator::And,
                filters: vec![existing, filter],
            }),
        });

        self
    }
}

/// A `Query` attached to a Firestore client, ready for execution.
#[derive(Clone)]
pub struct ExecutableQuery<'a> {
    pub(crate) client: &'a ClientWithMiddleware,
    pub(crate) parent_url: String,
    pub(crate) query: Query,
}

impl<'a> ExecutableQuery<'a> {
    /// Executes the query and returns the matching documents.
    pub async fn get(&self) -> Result<Vec<Document>, FirestoreError> {
        let url = format!("{}:runQuery", self.parent_url);

        let request = RunQueryRequest {
            structured_query: self.query.query.clone(),
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
            return Err(FirestoreError::ApiError(failure.message("Run query failed")));
        }

        let responses: Vec<RunQueryResponse> = response.json().await?;

        Ok(responses.into_iter().filter_map(|res| res.document).collect())
    }
}
