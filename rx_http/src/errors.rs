use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection failed after {attempts} attempt(s): {source}")]
    Connectivity { attempts: u32, source: TransportError },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Rate limited (global: {global}), retry after {retry_after:?}")]
    RateLimited { global: bool, retry_after: Duration, bucket: Option<String> },

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Failed to decode body of {status} response: {source}")]
    Decode { status: u16, source: serde_json::Error },

    #[error("Failed to deserialize payload: {0}")]
    Deserialize(serde_json::Error),

    #[error("Failed to encode request body: {0}")]
    Encode(serde_json::Error),

    #[error("Failed to read attachment {name}: {source}")]
    Attachment { name: String, source: io::Error },

    #[error("Route {template} is missing parameter {param}")]
    Route { template: String, param: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Faults raised below HTTP: the exchange never produced a status line
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection reset by peer")]
    ConnectionReset,

    #[error("Connection aborted")]
    ConnectionAborted,

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to build request: {0}")]
    Build(String),

    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),
}

impl TransportError {
    /// Faults worth retrying: the peer dropped the connection mid-exchange
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::ConnectionReset | TransportError::ConnectionAborted)
    }

    /// Classify a reqwest failure by the I/O error buried in its source chain
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(io_err) = cause.downcast_ref::<io::Error>() {
                match io_err.kind() {
                    io::ErrorKind::ConnectionReset => return TransportError::ConnectionReset,
                    io::ErrorKind::ConnectionAborted => return TransportError::ConnectionAborted,
                    _ => {}
                }
            }
            source = cause.source();
        }

        if err.is_timeout() {
            return TransportError::Timeout;
        }

        TransportError::Request(err)
    }
}

/// Application error returned by the API (any 4xx/5xx other than 429)
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{status} (error code {code}): {message}")]
pub struct HttpError {
    pub status: u16,
    pub code: i64,
    pub message: String,
    /// Nested field path -> `_errors` tree for validation failures
    pub errors: Option<Value>,
}

/// One leaf of a flattened validation error tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path such as `embeds.0.fields.1.name`, empty for top-level errors
    pub path: String,
    pub code: String,
    pub message: String,
}

impl HttpError {
    /// Flatten the nested `errors` tree into one entry per reported problem
    pub fn field_errors(&self) -> Vec<FieldError> {
        let mut out = Vec::new();
        if let Some(tree) = &self.errors {
            flatten(tree, &mut Vec::new(), &mut out);
        }
        out
    }
}

fn flatten<'a>(node: &'a Value, path: &mut Vec<&'a str>, out: &mut Vec<FieldError>) {
    let Value::Object(map) = node else {
        return;
    };

    for (key, child) in map {
        if key == "_errors" {
            let Value::Array(items) = child else {
                continue;
            };
            for item in items {
                out.push(FieldError {
                    path: path.join("."),
                    code: item.get("code").and_then(Value::as_str).unwrap_or_default().to_string(),
                    message: item.get("message").and_then(Value::as_str).unwrap_or_default().to_string(),
                });
            }
        } else {
            path.push(key);
            flatten(child, path, out);
            path.pop();
        }
    }
}
