use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// PostgreSQL SQLSTATE codes surfaced through PostgREST error bodies.
const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Check constraint violated: {0}")]
    CheckViolation(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.supabase_service_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, DbError> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", header_value(&self.service_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        // Server-side calls authenticate with the service key unless a caller token is given.
        let token = auth_token.unwrap_or(&self.service_key);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, DbError>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, DbError>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(classify_error(status, &error_text));
        }

        // DELETE/PATCH with `return=minimal` answer with an empty body.
        let bytes = response.bytes().await?;
        let raw: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };

        serde_json::from_slice::<T>(raw).map_err(|e| DbError::Decode(e.to_string()))
    }

    /// Exact row count for a filtered table path, read from the `Content-Range` header.
    pub async fn count(&self, path: &str, auth_token: Option<&str>) -> Result<u64, DbError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Counting rows at {}", url);

        let mut headers = self.get_headers(auth_token)?;
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));

        let response = self.client.request(Method::HEAD, &url)
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &error_text));
        }

        let content_range = response.headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| DbError::Decode("missing Content-Range header".to_string()))?;

        parse_content_range_total(content_range)
    }

    /// Rows of one page together with the exact total from `Content-Range`.
    ///
    /// PostgREST truncates responses at its `max-rows` setting without failing, so
    /// callers that need every row page until they have fetched `total`.
    pub async fn request_counted<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(Vec<T>, Option<u64>), DbError>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making counted {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(classify_error(status, &error_text));
        }

        let total = match response.headers().get("content-range").and_then(|v| v.to_str().ok()) {
            Some(content_range) => Some(parse_content_range_total(content_range)?),
            None => None,
        };

        let rows = response.json::<Vec<T>>().await
            .map_err(|e| DbError::Decode(e.to_string()))?;

        Ok((rows, total))
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, DbError> {
    HeaderValue::from_str(raw).map_err(|e| DbError::InvalidHeader(e.to_string()))
}

/// Parses `0-24/3573` or `*/0` into the total after the slash.
pub fn parse_content_range_total(content_range: &str) -> Result<u64, DbError> {
    content_range
        .rsplit('/')
        .next()
        .and_then(|total| total.trim().parse::<u64>().ok())
        .ok_or_else(|| DbError::Decode(format!("unparseable Content-Range '{}'", content_range)))
}

fn classify_error(status: StatusCode, error_text: &str) -> DbError {
    error!("API error ({}): {}", status, error_text);

    let body: Option<Value> = serde_json::from_str(error_text).ok();
    let code = body.as_ref()
        .and_then(|b| b.get("code"))
        .and_then(|c| c.as_str())
        .unwrap_or_default();
    let message = body.as_ref()
        .and_then(|b| b.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or(error_text)
        .to_string();

    match (status.as_u16(), code) {
        (_, UNIQUE_VIOLATION) => DbError::UniqueViolation {
            constraint: constraint_name(&message).unwrap_or_else(|| message.clone()),
        },
        (_, CHECK_VIOLATION) => DbError::CheckViolation(message),
        (401 | 403, _) => DbError::Auth(message),
        (404, _) => DbError::NotFound(message),
        (status, _) => DbError::Api { status, message },
    }
}

/// Extracts the quoted constraint name from a PostgreSQL violation message.
fn constraint_name(message: &str) -> Option<String> {
    let start = message.find('"')? + 1;
    let len = message[start..].find('"')?;
    Some(message[start..start + len].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total_is_parsed() {
        assert_eq!(parse_content_range_total("0-24/3573").unwrap(), 3573);
        assert_eq!(parse_content_range_total("*/0").unwrap(), 0);
        assert!(parse_content_range_total("0-24/*").is_err());
    }

    #[test]
    fn unique_violation_keeps_constraint_name() {
        let body = r#"{"code":"23505","details":null,"hint":null,"message":"duplicate key value violates unique constraint \"appointments_active_slot_ordinal_idx\""}"#;
        match classify_error(StatusCode::CONFLICT, body) {
            DbError::UniqueViolation { constraint } => {
                assert_eq!(constraint, "appointments_active_slot_ordinal_idx")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
