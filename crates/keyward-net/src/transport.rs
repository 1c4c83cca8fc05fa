//! Trusted transport
//!
//! JSON-over-HTTPS requests restricted to pinned hosts. The host check runs
//! before any socket is opened; the pin check runs after the TLS handshake
//! and before any request byte is written.

use crate::connector::HttpsConnector;
use crate::tls::{normalize_host, TrustAnchors};
use crate::transport_config::TransportSettings;
use crate::{NetworkError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Headers applied to every request, overriding caller values
pub const DEFENSIVE_HEADERS: [(&str, &str); 3] = [
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    ("X-Requested-With", "XMLHttpRequest"),
];

/// Framing headers owned by the connector; caller values are dropped
pub const RESERVED_HEADERS: [&str; 4] =
    ["Host", "Content-Length", "Transfer-Encoding", "Connection"];

/// Request method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl HttpMethod {
    /// Method token
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Parameters travel in the body rather than the query string
    pub fn carries_body(&self) -> bool {
        !matches!(self, HttpMethod::Get | HttpMethod::Delete)
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(NetworkError::InvalidConfig(format!(
                "Unsupported HTTP method: {}",
                other
            ))),
        }
    }
}

/// Fully encoded request, ready for a connector
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Method
    pub method: HttpMethod,
    /// Final URL, including query
    pub url: Url,
    /// Normalized host
    pub host: String,
    /// Port (443 unless given)
    pub port: u16,
    /// Header list, defensive headers last
    pub headers: Vec<(String, String)>,
    /// JSON body for body-carrying methods
    pub body: Option<Vec<u8>>,
}

impl PreparedRequest {
    /// Path plus query, as sent on the request line
    pub fn path_and_query(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_string(),
        }
    }

    /// Look up a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Undecoded response
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Check for a 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network capability behind [`TrustedTransport`]
///
/// Implementations must verify the server key with
/// [`TrustAnchors::verify`] before writing the request.
#[async_trait]
pub trait PinnedConnector: Send + Sync {
    /// Perform one request/response exchange
    async fn execute(&self, request: PreparedRequest, anchors: &TrustAnchors)
        -> Result<RawResponse>;
}

/// HTTPS client restricted to pinned hosts
pub struct TrustedTransport {
    anchors: TrustAnchors,
    connector: Arc<dyn PinnedConnector>,
    request_timeout: Duration,
    user_agent: String,
}

impl TrustedTransport {
    /// Create transport over a connector
    pub fn new(settings: &TransportSettings, connector: Arc<dyn PinnedConnector>) -> Result<Self> {
        settings.validate()?;
        let anchors = settings.anchors()?;
        info!(
            "Creating trusted transport ({} pinned hosts)",
            anchors.hosts().len()
        );

        Ok(Self {
            anchors,
            connector,
            request_timeout: settings.request_timeout(),
            user_agent: settings.user_agent.clone(),
        })
    }

    /// Create transport over the native TLS connector
    pub fn with_https(settings: &TransportSettings) -> Result<Self> {
        let connector = HttpsConnector::new(settings)?;
        Self::new(settings, Arc::new(connector))
    }

    /// Trust anchors
    pub fn anchors(&self) -> &TrustAnchors {
        &self.anchors
    }

    /// Check whether `url` points at a trusted https host
    pub fn is_trusted_url(&self, url: &str) -> bool {
        parse_https_url(url)
            .map(|(_, host, _)| self.anchors.is_trusted(&host))
            .unwrap_or(false)
    }

    /// Validate and encode a request without sending it
    pub fn prepare(
        &self,
        url: &str,
        method: HttpMethod,
        params: &Map<String, Value>,
        headers: &[(String, String)],
    ) -> Result<PreparedRequest> {
        let (mut url, host, port) = parse_https_url(url)?;

        if !self.anchors.is_trusted(&host) {
            warn!("Blocked request to untrusted host {}", host);
            return Err(NetworkError::UntrustedHost(host));
        }

        let mut request_headers: Vec<(String, String)> = Vec::with_capacity(headers.len() + 6);
        let mut set = |name: &str, value: &str| {
            request_headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
            request_headers.push((name.to_string(), value.to_string()));
        };

        set("Accept", "application/json");
        set("User-Agent", &self.user_agent);
        for (name, value) in headers {
            if RESERVED_HEADERS.iter().any(|r| r.eq_ignore_ascii_case(name)) {
                debug!("Dropping caller header {}", name);
                continue;
            }
            set(name, value);
        }

        let body = if method.carries_body() {
            set("Content-Type", "application/json");
            let body = serde_json::to_vec(params).map_err(|e| {
                NetworkError::InvalidConfig(format!("Failed to encode parameters: {}", e))
            })?;
            Some(body)
        } else {
            if !params.is_empty() {
                let mut query = url.query_pairs_mut();
                for (key, value) in params {
                    query.append_pair(key, &query_value(value));
                }
            }
            None
        };

        for (name, value) in DEFENSIVE_HEADERS {
            set(name, value);
        }

        Ok(PreparedRequest {
            method,
            url,
            host,
            port,
            headers: request_headers,
            body,
        })
    }

    /// Send a request to a pinned host and decode the JSON response
    ///
    /// Untrusted hosts fail with [`NetworkError::UntrustedHost`] before any
    /// I/O. Non-2xx statuses fail with [`NetworkError::Http`]; a body that
    /// does not decode as `T` fails with [`NetworkError::Decoding`].
    pub async fn secure_request<T: DeserializeOwned>(
        &self,
        url: &str,
        method: HttpMethod,
        params: &Map<String, Value>,
        headers: &[(String, String)],
    ) -> Result<T> {
        let request = self.prepare(url, method, params, headers)?;
        let host = request.host.clone();
        debug!("{} https://{}{}", method.as_str(), host, request.url.path());

        let response = tokio::time::timeout(
            self.request_timeout,
            self.connector.execute(request, &self.anchors),
        )
        .await
        .map_err(|_| {
            NetworkError::Timeout(format!(
                "Request to {} exceeded {}s",
                host,
                self.request_timeout.as_secs()
            ))
        })??;

        debug!("{} responded {}", host, response.status);
        if !response.is_success() {
            return Err(NetworkError::Http {
                status: response.status,
            });
        }

        decode_body(&response.body)
    }
}

fn parse_https_url(raw: &str) -> Result<(Url, String, u16)> {
    let url = Url::parse(raw).map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", raw, e)))?;
    if url.scheme() != "https" {
        return Err(NetworkError::InvalidUrl(format!(
            "Only https is allowed, got {}",
            url.scheme()
        )));
    }

    let host = match url.host() {
        Some(url::Host::Domain(domain)) => normalize_host(domain),
        Some(url::Host::Ipv4(ip)) => ip.to_string(),
        Some(url::Host::Ipv6(ip)) => ip.to_string(),
        None => return Err(NetworkError::InvalidUrl("URL has no host".to_string())),
    };
    let port = url.port().unwrap_or(443);

    Ok((url, host, port))
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    // An empty body decodes like `null` so `()` and `Option<_>` work
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"null".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| NetworkError::Decoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::CertificatePin;

    struct Unreachable;

    #[async_trait]
    impl PinnedConnector for Unreachable {
        async fn execute(&self, _: PreparedRequest, _: &TrustAnchors) -> Result<RawResponse> {
            Err(NetworkError::Connection("unreachable".to_string()))
        }
    }

    fn transport() -> TrustedTransport {
        let settings = TransportSettings {
            pins: vec![CertificatePin::new(
                "api.example.com",
                "IMKPFgQLfZljmVmDldVZN3Ve/LMDlwEk+fViBOyVAmY=",
                "test",
            )],
            ..Default::default()
        };
        TrustedTransport::new(&settings, Arc::new(Unreachable)).unwrap()
    }

    fn params(json: &str) -> Map<String, Value> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_get_params_go_in_query() {
        let request = transport()
            .prepare(
                "https://api.example.com/v1/items",
                HttpMethod::Get,
                &params(r#"{"q": "a b", "limit": 5}"#),
                &[],
            )
            .unwrap();

        assert!(request.body.is_none());
        assert_eq!(request.path_and_query(), "/v1/items?limit=5&q=a+b");
        assert_eq!(request.header("content-type"), None);
    }

    #[test]
    fn test_post_params_go_in_body() {
        let request = transport()
            .prepare(
                "https://api.example.com/v1/items",
                HttpMethod::Post,
                &params(r#"{"name": "x"}"#),
                &[],
            )
            .unwrap();

        assert_eq!(request.body.as_deref(), Some(br#"{"name":"x"}"#.as_slice()));
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.path_and_query(), "/v1/items");
    }

    #[test]
    fn test_defensive_headers_override_caller() {
        let request = transport()
            .prepare(
                "https://api.example.com/",
                HttpMethod::Get,
                &Map::new(),
                &[
                    ("x-frame-options".to_string(), "ALLOWALL".to_string()),
                    ("Authorization".to_string(), "Bearer t".to_string()),
                ],
            )
            .unwrap();

        for (name, value) in DEFENSIVE_HEADERS {
            assert_eq!(request.header(name), Some(value));
        }
        let frame_headers = request
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("X-Frame-Options"))
            .count();
        assert_eq!(frame_headers, 1);
        assert_eq!(request.header("authorization"), Some("Bearer t"));
    }

    #[test]
    fn test_caller_cannot_set_framing_headers() {
        let request = transport()
            .prepare(
                "https://api.example.com/v1/items",
                HttpMethod::Post,
                &params(r#"{"name": "x"}"#),
                &[
                    ("Host".to_string(), "evil.example.com".to_string()),
                    ("content-length".to_string(), "0".to_string()),
                    ("Transfer-Encoding".to_string(), "chunked".to_string()),
                    ("Connection".to_string(), "upgrade".to_string()),
                    ("Authorization".to_string(), "Bearer t".to_string()),
                ],
            )
            .unwrap();

        for name in RESERVED_HEADERS {
            assert_eq!(request.header(name), None, "{} leaked through", name);
        }
        assert_eq!(request.header("Authorization"), Some("Bearer t"));
    }

    #[test]
    fn test_url_checks() {
        let transport = transport();
        let empty = Map::new();

        assert!(matches!(
            transport.prepare("http://api.example.com/", HttpMethod::Get, &empty, &[]),
            Err(NetworkError::InvalidUrl(_))
        ));
        assert!(matches!(
            transport.prepare("not a url", HttpMethod::Get, &empty, &[]),
            Err(NetworkError::InvalidUrl(_))
        ));
        assert!(matches!(
            transport.prepare("https://evil.example.com/", HttpMethod::Get, &empty, &[]),
            Err(NetworkError::UntrustedHost(_))
        ));

        assert!(transport.is_trusted_url("https://API.example.com./x"));
        assert!(!transport.is_trusted_url("http://api.example.com/x"));
    }

    #[test]
    fn test_explicit_port() {
        let request = transport()
            .prepare("https://api.example.com:8443/", HttpMethod::Get, &Map::new(), &[])
            .unwrap();
        assert_eq!(request.port, 8443);
        assert_eq!(request.host, "api.example.com");
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("PATCH".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("TRACE".parse::<HttpMethod>().is_err());
        assert!(!HttpMethod::Delete.carries_body());
        assert!(HttpMethod::Put.carries_body());
    }

    #[test]
    fn test_decode_empty_body() {
        decode_body::<()>(b"").unwrap();
        let none: Option<u32> = decode_body(b"  ").unwrap();
        assert_eq!(none, None);
        assert!(matches!(
            decode_body::<u32>(b"{"),
            Err(NetworkError::Decoding(_))
        ));
    }
}
