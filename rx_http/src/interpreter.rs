use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use rx_ratelimit::parse_reset_after;
use rx_ratelimit::secs_to_duration;
use rx_ratelimit::BucketReport;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::errors::Error;
use crate::errors::HttpError;
use crate::errors::Result;

pub const RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATELIMIT_RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const RATELIMIT_BUCKET: &str = "x-ratelimit-bucket";
pub const RATELIMIT_GLOBAL: &str = "x-ratelimit-global";
pub const RATELIMIT_SCOPE: &str = "x-ratelimit-scope";

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
    Empty,
}

impl Payload {
    pub fn json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// Deserialize into a typed resource
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        let value = match self {
            Payload::Json(value) => value,
            Payload::Text(text) => Value::String(text),
            Payload::Empty => Value::Null,
        };
        serde_json::from_value(value).map_err(Error::Deserialize)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Success(Payload),
    RateLimited { global: bool, reset_after: Duration, bucket: Option<String> },
    ApplicationError(HttpError),
}

/// Result of interpreting one response
///
/// The bucket report is always produced, even when the body fails to decode, so the
/// limiter learns from every response.
#[derive(Debug)]
pub struct Interpretation {
    pub report: BucketReport,
    pub outcome: Result<Classification>,
}

/// Body of a 429
#[derive(Debug, Default, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
    global: Option<bool>,
    message: Option<String>,
}

/// Body of any other error status
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Option<Value>,
}

/// Classify a response and extract its rate-limit feedback
pub fn interpret(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Interpretation {
    let mut report = read_headers(headers);

    if status == StatusCode::TOO_MANY_REQUESTS {
        let parsed: RateLimitBody = serde_json::from_slice(body).unwrap_or_default();
        let scope = header_str(headers, RATELIMIT_SCOPE);

        let reset_after = report
            .reset_after
            .or_else(|| parsed.retry_after.and_then(secs_to_duration))
            .or_else(|| header_str(headers, RETRY_AFTER.as_str()).and_then(|v| v.trim().parse::<f64>().ok()).and_then(secs_to_duration))
            .unwrap_or_default();

        let global = is_global_header(headers) || parsed.global.unwrap_or(false) || scope.is_some_and(|s| s.eq_ignore_ascii_case("global"));

        debug!(global, reset_after_ms = reset_after.as_millis() as u64, scope = ?scope, message = ?parsed.message, "Rate limited");

        report.limited = true;
        report.global = global;
        report.reset_after = Some(reset_after);

        let outcome = Ok(Classification::RateLimited { global, reset_after, bucket: report.bucket.clone() });
        return Interpretation { report, outcome };
    }

    let outcome = if status.is_client_error() || status.is_server_error() {
        Ok(Classification::ApplicationError(application_error(status, headers, body)))
    } else {
        decode(status, headers, body).map(Classification::Success)
    };

    Interpretation { report, outcome }
}

/// Decode a body according to its content type
pub fn decode(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Result<Payload> {
    if status == StatusCode::NO_CONTENT || body.is_empty() {
        return Ok(Payload::Empty);
    }

    if is_json(headers) {
        serde_json::from_slice(body).map(Payload::Json).map_err(|source| Error::Decode { status: status.as_u16(), source })
    } else {
        Ok(Payload::Text(String::from_utf8_lossy(body).into_owned()))
    }
}

fn application_error(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> HttpError {
    let fallback = || status.canonical_reason().unwrap_or("Unknown error").to_string();

    if is_json(headers) {
        if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
            return HttpError { status: status.as_u16(), code: parsed.code, message: parsed.message.unwrap_or_else(fallback), errors: parsed.errors };
        }
    }

    let text = String::from_utf8_lossy(body).trim().to_string();
    HttpError { status: status.as_u16(), code: 0, message: if text.is_empty() { fallback() } else { text }, errors: None }
}

fn read_headers(headers: &HeaderMap) -> BucketReport {
    let remaining = header_str(headers, RATELIMIT_REMAINING).and_then(|value| match value.trim().parse::<u32>() {
        Ok(remaining) => Some(remaining),
        Err(_) => {
            warn!(header = RATELIMIT_REMAINING, value, "Ignoring malformed rate limit header");
            None
        }
    });

    let reset_after = header_str(headers, RATELIMIT_RESET_AFTER).and_then(|value| match parse_reset_after(value) {
        Ok(reset_after) => Some(reset_after),
        Err(err) => {
            warn!(error = %err, "Ignoring malformed rate limit header");
            None
        }
    });

    if let Some(limit) = header_str(headers, RATELIMIT_LIMIT) {
        debug!(limit, remaining = ?remaining, "Rate limit budget");
    }

    BucketReport { remaining, reset_after, bucket: header_str(headers, RATELIMIT_BUCKET).map(str::to_string), global: false, limited: false }
}

fn is_global_header(headers: &HeaderMap) -> bool {
    header_str(headers, RATELIMIT_GLOBAL).is_some_and(|value| !value.trim().eq_ignore_ascii_case("false"))
}

/// `application/json` or any `+json` media type, ignoring parameters
fn is_json(headers: &HeaderMap) -> bool {
    let Some(content_type) = header_str(headers, CONTENT_TYPE.as_str()) else {
        return false;
    };
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
