//! Request and response values exchanged between check modules and the crawler.
//!
//! These are plain owned values. The engine never inspects them beyond what is
//! needed for logging, fingerprinting and building altered probe requests.

use crate::fingerprint::PageFingerprint;
use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// An HTTP request to be sent by the crawler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(with = "method_serde")]
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl Request {
    /// Creates a new request with no headers and no body.
    pub fn new(method: Method, url: Url) -> Self {
        Request {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Creates a new `GET` request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Adds a header, keeping insertion order.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The request-line URI: path plus query string.
    pub fn uri(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }
}

/// A response delivered by the crawler for a submitted request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub url: Url,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    pub fn new(url: Url, status: u16, body: impl Into<Bytes>) -> Self {
        Response {
            url,
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    pub fn body_as_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Case-insensitive header lookup. Returns the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The host this response came from, with the port when it is not the default.
    pub fn host(&self) -> String {
        let host = self.url.host_str().unwrap_or("unknown");
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Computes the page fingerprint of this response.
    pub fn fingerprint(&self) -> PageFingerprint {
        PageFingerprint::from_response(self)
    }
}

mod method_serde {
    use reqwest::Method;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(method: &Method, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(method.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Method, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Method::from_bytes(raw.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_uri_includes_query() {
        let req = Request::get(Url::parse("http://example.com/a/b.php?id=1&x=2").unwrap());
        assert_eq!(req.uri(), "/a/b.php?id=1&x=2");

        let req = Request::get(Url::parse("http://example.com/index").unwrap());
        assert_eq!(req.uri(), "/index");
    }

    #[test]
    fn test_response_host_and_headers() {
        let res = Response::new(Url::parse("http://example.com:8080/").unwrap(), 200, "ok")
            .with_header("Content-Type", "text/html");
        assert_eq!(res.host(), "example.com:8080");
        assert_eq!(res.header("content-type"), Some("text/html"));
        assert_eq!(res.header("x-missing"), None);
        assert_eq!(res.body_as_string(), "ok");
    }

    #[test]
    fn test_request_serializes_method_as_string() {
        let req = Request::new(Method::POST, Url::parse("http://example.com/").unwrap());
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["method"], "POST");
        let back: Request = serde_json::from_value(json).unwrap();
        assert_eq!(back.method, Method::POST);
    }
}
