//! REST adapter for the table read and generic mutation endpoints.

use crate::config::SyncConfig;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use rollcall_core::{
    Collection, Credential, Filters, MutationKind, MutationRequest, MutationTransport, SyncError,
    SyncResult, TableReader,
};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl From<ApiClientError> for SyncError {
    fn from(err: ApiClientError) -> Self {
        SyncError::Transport(err.to_string())
    }
}

/// Error body of either endpoint. Servers use `message` or `error`.
#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    read_path: String,
    mutation_path: String,
}

impl RestClient {
    pub fn new(config: &SyncConfig) -> Result<Self, ApiClientError> {
        Self::with_paths(
            &config.api_base_url,
            &config.read_path,
            &config.mutation_path,
            config.request_timeout(),
        )
    }

    pub fn with_paths(
        base_url: &str,
        read_path: &str,
        mutation_path: &str,
        timeout: Duration,
    ) -> Result<Self, ApiClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            read_path: read_path.trim_end_matches('/').to_string(),
            mutation_path: mutation_path.to_string(),
        })
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}{}/{}", self.base_url, self.read_path, table)
    }

    pub fn mutation_url(&self) -> String {
        format!("{}{}", self.base_url, self.mutation_path)
    }

    fn request(
        &self,
        method: Method,
        url: String,
        credential: Option<&Credential>,
    ) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match credential {
            Some(credential) => builder.header(AUTHORIZATION, credential.header_value()),
            None => builder,
        }
    }
}

fn method_for(kind: MutationKind) -> Method {
    match kind {
        MutationKind::Create | MutationKind::BulkCreate => Method::POST,
        MutationKind::Update => Method::PATCH,
        MutationKind::Delete => Method::DELETE,
    }
}

/// Server-supplied message from an error body, if any.
fn error_message(body: &str) -> Option<String> {
    let payload: ErrorPayload = serde_json::from_str(body).unwrap_or_default();
    payload
        .message
        .or(payload.error)
        .filter(|m| !m.trim().is_empty())
}

/// Strip a `{ "data": ... }` envelope. Records that merely have a `data`
/// column alongside other fields are left alone.
fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map)
            if map.contains_key("data")
                && map
                    .keys()
                    .all(|k| matches!(k.as_str(), "data" | "message" | "success" | "status")) =>
        {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn collection_from_body(table: &str, body: Value) -> SyncResult<Collection> {
    match unwrap_data(body) {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(SyncError::Transport(format!(
                    "table {} returned a non-object row: {}",
                    table, other
                ))),
            })
            .collect(),
        other => Err(SyncError::Transport(format!(
            "table {} returned {} instead of an array",
            table,
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_success_body(status: StatusCode, text: &str) -> Result<Value, ApiClientError> {
    if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(unwrap_data(serde_json::from_str(text)?))
}

#[async_trait]
impl TableReader for RestClient {
    async fn read_table(
        &self,
        table: &str,
        filters: &Filters,
        credential: Option<&Credential>,
    ) -> SyncResult<Collection> {
        let url = self.table_url(table);
        tracing::debug!(table, url = %url, "Reading table");
        let response = self
            .request(Method::GET, url, credential)
            .query(filters)
            .send()
            .await
            .map_err(ApiClientError::from)?;

        let status = response.status();
        let text = response.text().await.map_err(ApiClientError::from)?;
        if !status.is_success() {
            let message = error_message(&text).unwrap_or_else(|| text.trim().to_string());
            return Err(SyncError::Transport(format!(
                "HTTP {} reading {}: {}",
                status.as_u16(),
                table,
                message
            )));
        }
        let body = parse_success_body(status, &text)?;
        collection_from_body(table, body)
    }
}

#[async_trait]
impl MutationTransport for RestClient {
    async fn mutate(
        &self,
        request: &MutationRequest,
        credential: &Credential,
    ) -> SyncResult<Value> {
        let response = self
            .request(method_for(request.kind()), self.mutation_url(), Some(credential))
            .json(request)
            .send()
            .await
            .map_err(ApiClientError::from)?;

        let status = response.status();
        let text = response.text().await.map_err(ApiClientError::from)?;
        if !status.is_success() {
            return Err(SyncError::dispatch(
                request.table.clone(),
                status.as_u16(),
                error_message(&text),
            ));
        }
        Ok(parse_success_body(status, &text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> RestClient {
        RestClient::with_paths(
            "https://school.test/",
            "/api/tables/",
            "/api/mutate",
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client();
        assert_eq!(client.table_url("class_users"), "https://school.test/api/tables/class_users");
        assert_eq!(client.mutation_url(), "https://school.test/api/mutate");
    }

    #[test]
    fn test_methods_per_kind() {
        assert_eq!(method_for(MutationKind::Create), Method::POST);
        assert_eq!(method_for(MutationKind::BulkCreate), Method::POST);
        assert_eq!(method_for(MutationKind::Update), Method::PATCH);
        assert_eq!(method_for(MutationKind::Delete), Method::DELETE);
    }

    #[test]
    fn test_error_message_fields() {
        assert_eq!(error_message(r#"{"message": "email taken"}"#), Some("email taken".into()));
        assert_eq!(error_message(r#"{"error": "forbidden"}"#), Some("forbidden".into()));
        assert_eq!(error_message(r#"{"message": ""}"#), None);
        assert_eq!(error_message("<html>502</html>"), None);
    }

    #[test]
    fn test_unwrap_data_envelope_only() {
        assert_eq!(unwrap_data(json!({"data": [1, 2]})), json!([1, 2]));
        assert_eq!(unwrap_data(json!({"success": true, "data": {"id": 1}})), json!({"id": 1}));
        let record = json!({"id": 1, "data": "payload"});
        assert_eq!(unwrap_data(record.clone()), record);
    }

    #[test]
    fn test_collection_body_shapes() {
        let rows = collection_from_body("users", json!([{"user_id": 1}, {"user_id": 2}])).unwrap();
        assert_eq!(rows.len(), 2);
        let rows = collection_from_body("users", json!({"data": []})).unwrap();
        assert!(rows.is_empty());
        assert!(matches!(
            collection_from_body("users", json!({"user_id": 1})),
            Err(SyncError::Transport(_))
        ));
        assert!(collection_from_body("users", json!([1])).is_err());
    }

    #[test]
    fn test_empty_success_body_is_null() {
        assert_eq!(parse_success_body(StatusCode::NO_CONTENT, "").unwrap(), Value::Null);
        assert_eq!(parse_success_body(StatusCode::OK, "  ").unwrap(), Value::Null);
        let wrapped = parse_success_body(StatusCode::OK, r#"{"data": {"id": 3}}"#).unwrap();
        assert_eq!(wrapped, json!({"id": 3}));
    }
}
