use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Method;
use reqwest::StatusCode;

use crate::errors::TransportError;

/// Fully encoded request, ready to be sent any number of times
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    /// Path relative to the API base URL
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Bytes),
    /// `payload_json` part followed by one part per file
    Multipart { payload_json: Option<Bytes>, files: Vec<FilePart> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Form field name, `files[i]`
    pub field: String,
    pub filename: String,
    pub mime: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Performs one network exchange
///
/// Implementations hold no rate-limit state and never retry on their own.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: &'a TransportRequest) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + 'a>>;
}
