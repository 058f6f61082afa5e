//! Request and response values passed through the gateway.
//!
//! Requests are plain owned data so the gateway can dispatch the same
//! request twice (first attempt and retry) without mutating it.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use super::ApiError;

/// A single call against the backend, relative to the configured API URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add a header. Invalid header values are rejected up front rather than
    /// at dispatch time.
    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self, ApiError> {
        let value = HeaderValue::from_str(value).map_err(|e| {
            super::TransportError::InvalidRequest(format!("header {}: {}", name, e))
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|e| {
            super::TransportError::InvalidRequest(format!("failed to encode body: {}", e))
        })?;
        self.body = Some(value);
        Ok(self)
    }
}

/// A fully received response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ApiError::InvalidResponse(format!("failed to parse JSON response: {}", e))
        })
    }
}

/// Which dispatch of a request this is. A request is sent at most twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retry,
}

impl Attempt {
    /// The attempt after this one, or `None` when retries are exhausted.
    pub fn next(self) -> Option<Attempt> {
        match self {
            Attempt::First => Some(Attempt::Retry),
            Attempt::Retry => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header;

    #[test]
    fn test_request_builder() {
        let req = ApiRequest::post("/products")
            .query("cursor", 20)
            .header(header::ACCEPT_LANGUAGE, "ko")
            .unwrap()
            .json(&serde_json::json!({"name": "Lamp"}))
            .unwrap();

        assert_eq!(req.method, Method::POST);
        assert_eq!(req.path, "/products");
        assert_eq!(req.query, vec![("cursor".to_string(), "20".to_string())]);
        assert_eq!(req.headers.get(header::ACCEPT_LANGUAGE).unwrap(), "ko");
        assert_eq!(req.body.unwrap()["name"], "Lamp");
    }

    #[test]
    fn test_invalid_header_rejected() {
        let result = ApiRequest::get("/x").header(header::ACCEPT, "bad\nvalue");
        assert!(matches!(
            result,
            Err(ApiError::Transport(super::super::TransportError::InvalidRequest(_)))
        ));
    }

    #[test]
    fn test_response_json_error_is_invalid_response() {
        let resp = ApiResponse::new(StatusCode::OK, "not json");
        let parsed: Result<serde_json::Value, _> = resp.json();
        assert!(matches!(parsed, Err(ApiError::InvalidResponse(_))));
        assert_eq!(resp.text(), "not json");
    }

    #[test]
    fn test_attempt_allows_one_retry() {
        assert_eq!(Attempt::First.next(), Some(Attempt::Retry));
        assert_eq!(Attempt::Retry.next(), None);
    }
}
