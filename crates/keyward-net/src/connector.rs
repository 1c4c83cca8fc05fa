//! Native TLS connector with SPKI pinning
//!
//! TCP connect, TLS handshake against the system trust store, SPKI check of
//! the leaf certificate, then a single HTTP/1.1 exchange through hyper.

use crate::tls::{spki_pin_from_der, TrustAnchors};
use crate::transport::{PinnedConnector, PreparedRequest, RawResponse};
use crate::transport_config::TransportSettings;
use crate::{NetworkError, Result};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use native_tls::{Protocol, TlsConnector as NativeTlsConnector};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_native_tls::{TlsConnector, TlsStream};
use tracing::{debug, warn};

/// Production connector
pub struct HttpsConnector {
    tls: TlsConnector,
    connect_timeout: Duration,
}

impl HttpsConnector {
    /// Build connector (TLS 1.2 minimum, system roots)
    pub fn new(settings: &TransportSettings) -> Result<Self> {
        let connector = NativeTlsConnector::builder()
            .min_protocol_version(Some(Protocol::Tlsv12))
            .build()
            .map_err(|e| NetworkError::Tls(format!("TLS connector build failed: {}", e)))?;

        Ok(Self {
            tls: TlsConnector::from(connector),
            connect_timeout: settings.connect_timeout(),
        })
    }

    async fn handshake(&self, host: &str, port: u16) -> Result<TlsStream<TcpStream>> {
        let connect = async {
            let tcp = TcpStream::connect((host, port)).await.map_err(|e| {
                NetworkError::Connection(format!("Connection to {}:{} failed: {}", host, port, e))
            })?;
            self.tls
                .connect(host, tcp)
                .await
                .map_err(|e| NetworkError::Tls(format!("TLS handshake failed: {}", e)))
        };

        tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| {
                NetworkError::Timeout(format!(
                    "Connecting to {}:{} exceeded {}s",
                    host,
                    port,
                    self.connect_timeout.as_secs()
                ))
            })?
    }
}

/// SPKI pin of the certificate the server presented
fn peer_spki_pin(stream: &TlsStream<TcpStream>) -> Result<String> {
    let cert = stream
        .get_ref()
        .peer_certificate()
        .map_err(|e| NetworkError::Tls(format!("TLS peer certificate error: {}", e)))?
        .ok_or_else(|| NetworkError::Tls("No peer certificate presented".to_string()))?;
    let der = cert
        .to_der()
        .map_err(|e| NetworkError::Tls(format!("Failed to read DER certificate: {}", e)))?;
    spki_pin_from_der(&der)
}

#[async_trait]
impl PinnedConnector for HttpsConnector {
    async fn execute(
        &self,
        request: PreparedRequest,
        anchors: &TrustAnchors,
    ) -> Result<RawResponse> {
        let stream = self.handshake(&request.host, request.port).await?;

        let pin = peer_spki_pin(&stream)?;
        if let Err(e) = anchors.verify(&request.host, &pin) {
            warn!("Aborting connection to {} before request", request.host);
            return Err(e);
        }

        let (mut sender, connection) =
            hyper::client::conn::http1::handshake(TokioIo::new(stream))
                .await
                .map_err(|e| NetworkError::Connection(format!("HTTP handshake failed: {}", e)))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("HTTP connection closed with error: {}", e);
            }
        });

        let authority = if request.port == 443 {
            request.host.clone()
        } else {
            format!("{}:{}", request.host, request.port)
        };
        let mut builder = http::Request::builder()
            .method(request.method.as_str())
            .uri(request.path_and_query())
            .header(http::header::HOST, authority);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let http_request = builder
            .body(Full::new(Bytes::from(request.body.unwrap_or_default())))
            .map_err(|e| NetworkError::InvalidConfig(format!("Invalid request: {}", e)))?;

        let response = sender
            .send_request(http_request)
            .await
            .map_err(|e| NetworkError::Connection(format!("Request failed: {}", e)))?;

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
            .into_body()
            .collect()
            .await
            .map_err(|e| NetworkError::Connection(format!("Failed to read body: {}", e)))?
            .to_bytes()
            .to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
