//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The
//! client builds `HttpRequest` values and parses `HttpResponse` values
//! without touching the network; a `Transport` implementation (see
//! `session`) performs the actual I/O.
//!
//! All fields use owned types so a request can be inspected, logged, or
//! handed to any HTTP stack the host happens to use.

use std::fmt;

use crate::error::ApiError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload. JSON for almost every endpoint, multipart for the
/// profile-image upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Json(String),
    Multipart(Vec<u8>),
}

impl RequestBody {
    /// The JSON text, if this is a JSON body.
    pub fn as_json(&self) -> Option<&str> {
        match self {
            RequestBody::Json(text) => Some(text),
            RequestBody::Multipart(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RequestBody::Json(text) => text.as_bytes(),
            RequestBody::Multipart(bytes) => bytes,
        }
    }
}

/// An HTTP request described as plain data.
///
/// Built by `ApiClient::build_*` methods. `path` is the absolute URL.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    /// First header value with the given (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// An HTTP response described as plain data.
///
/// Constructed by the transport after executing an `HttpRequest`, then
/// passed to `ApiClient::parse_*` methods.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes an `HttpRequest` against the network.
///
/// Implementations must return non-2xx responses as data rather than as an
/// error; status interpretation belongs to the client's `parse_*` methods.
/// `Err` is reserved for failures where no response exists at all.
pub trait Transport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Blocking transport backed by `ureq`.
#[cfg(feature = "ureq")]
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

#[cfg(feature = "ureq")]
impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "ureq")]
impl UreqTransport {
    pub fn new() -> Self {
        // 4xx/5xx come back as data so `check_status` can normalize them.
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

#[cfg(feature = "ureq")]
impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let HttpRequest {
            method,
            path,
            headers,
            body,
        } = request;

        let result = match method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(&path);
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            HttpMethod::Delete => {
                let mut builder = self.agent.delete(&path);
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            HttpMethod::Post | HttpMethod::Put => {
                let mut builder = if method == HttpMethod::Post {
                    self.agent.post(&path)
                } else {
                    self.agent.put(&path)
                };
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                match &body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
