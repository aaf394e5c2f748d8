use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use reqwest::header::AUTHORIZATION;
use reqwest::header::USER_AGENT;
use reqwest::multipart::Form;
use reqwest::multipart::Part;
use reqwest::Client;
use reqwest::ClientBuilder;
use tracing::debug;
use url::Url;

use crate::config::RestConfig;
use crate::errors::Error;
use crate::errors::Result;
use crate::errors::TransportError;
use crate::transport::RequestBody;
use crate::transport::Transport;
use crate::transport::TransportRequest;
use crate::transport::TransportResponse;

/// Configuration for HTTP client.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpClientConfig {
    /// Maximum idle connections per host (default: 50)
    pub pool_max_idle_per_host: usize,

    /// Idle timeout for connections (default: 90s)
    pub pool_idle_timeout: Duration,

    /// Connection establishment timeout (default: 10s)
    pub connect_timeout: Duration,

    /// Per-attempt request timeout (default: 30s)
    pub request_timeout: Duration,

    /// TCP keepalive interval (default: 60s)
    pub tcp_keepalive: Duration,

    /// Enable TCP_NODELAY (default: true)
    pub tcp_nodelay: bool,

    /// HTTP/2 adaptive window sizing (default: true)
    pub http2_adaptive_window: bool,

    /// HTTP/2 keep-alive interval (default: 30s)
    pub http2_keep_alive_interval: Duration,

    /// HTTP/2 keep-alive timeout (default: 20s)
    pub http2_keep_alive_timeout: Duration,

    /// Enable Hickory DNS for async resolution (default: true)
    pub hickory_dns: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: 50,
            pool_idle_timeout: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            tcp_keepalive: Duration::from_secs(60),
            tcp_nodelay: true,
            http2_adaptive_window: true,
            http2_keep_alive_interval: Duration::from_secs(30),
            http2_keep_alive_timeout: Duration::from_secs(20),
            hickory_dns: true,
        }
    }
}

impl HttpClientConfig {
    fn builder(&self) -> ClientBuilder {
        let mut builder = ClientBuilder::new()
            // Connection pooling
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(self.pool_idle_timeout)
            // TCP
            .tcp_nodelay(self.tcp_nodelay)
            .tcp_keepalive(Some(self.tcp_keepalive))
            // Timeouts
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            // TLS with rustls
            .use_rustls_tls()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            // HTTP/2
            .http2_adaptive_window(self.http2_adaptive_window)
            .http2_keep_alive_interval(Some(self.http2_keep_alive_interval))
            .http2_keep_alive_timeout(self.http2_keep_alive_timeout)
            // Compression
            .gzip(true)
            .brotli(true);

        if self.hickory_dns {
            builder = builder.hickory_dns(true);
        }

        builder
    }
}

/// reqwest-backed transport with the bot's credentials baked into every request
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(config: &RestConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|err| Error::InvalidRequest(format!("invalid base url {}: {err}", config.base_url)))?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bot {}", config.token)).map_err(|_| Error::InvalidRequest("token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(|_| Error::InvalidRequest("user agent is not a valid header value".into()))?,
        );

        let client = config.http.builder().default_headers(headers).build()?;

        Ok(Self { client, base_url: base.as_str().trim_end_matches('/').to_string() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build(&self, request: &TransportRequest) -> std::result::Result<reqwest::RequestBuilder, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method.clone(), &url).headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.body(body.clone()),
            // Forms are single-use, so each attempt gets a fresh one
            RequestBody::Multipart { payload_json, files } => {
                let mut form = Form::new();
                if let Some(payload) = payload_json {
                    let part = Part::bytes(payload.to_vec()).mime_str("application/json").map_err(|err| TransportError::Build(err.to_string()))?;
                    form = form.part("payload_json", part);
                }
                for file in files {
                    let part = Part::bytes(file.data.to_vec())
                        .file_name(file.filename.clone())
                        .mime_str(&file.mime)
                        .map_err(|err| TransportError::Build(err.to_string()))?;
                    form = form.part(file.field.clone(), part);
                }
                builder.multipart(form)
            }
        };

        Ok(builder)
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(&'a self, request: &'a TransportRequest) -> Pin<Box<dyn Future<Output = std::result::Result<TransportResponse, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let builder = self.build(request)?;
            debug!(method = %request.method, path = %request.path, "Sending request");

            let response = builder.send().await.map_err(TransportError::from_reqwest)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(TransportError::from_reqwest)?;

            Ok(TransportResponse { status, headers, body })
        })
    }
}
