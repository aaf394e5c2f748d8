use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::json;
use serde_json::Value;

use crate::errors::Error;
use crate::errors::Result;
use crate::request::RequestSpec;
use crate::transport::FilePart;
use crate::transport::RequestBody;
use crate::transport::TransportRequest;

pub const AUDIT_LOG_REASON: HeaderName = HeaderName::from_static("x-audit-log-reason");

/// Methods that may carry a body
pub fn carries_body(method: &Method) -> bool {
    *method != Method::GET && *method != Method::HEAD && *method != Method::OPTIONS
}

/// Build the transport request for a logical call
///
/// `files` holds the attachment contents in the same order as the request's
/// attachments; it is ignored for bodiless methods.
pub fn encode(spec: &RequestSpec, files: Vec<Bytes>) -> Result<TransportRequest> {
    let route = spec.route();
    let method = route.method().clone();
    let path = route.path()?;

    let mut headers = HeaderMap::new();
    if let Some(reason) = spec.reason() {
        let value = HeaderValue::from_str(&urlencoding::encode(reason)).map_err(|_| Error::InvalidRequest("audit reason is not a valid header value".into()))?;
        headers.insert(AUDIT_LOG_REASON, value);
    }

    let body = if !carries_body(&method) {
        RequestBody::Empty
    } else if !spec.attachments().is_empty() {
        multipart(spec, files)?
    } else if let Some(json) = spec.json() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        RequestBody::Json(Bytes::from(serde_json::to_vec(json).map_err(Error::Encode)?))
    } else {
        RequestBody::Empty
    };

    Ok(TransportRequest { method, path, query: spec.query().to_vec(), headers, body })
}

fn multipart(spec: &RequestSpec, files: Vec<Bytes>) -> Result<RequestBody> {
    let attachments = spec.attachments();
    if files.len() != attachments.len() {
        return Err(Error::InvalidRequest(format!("expected {} attachment bodies, got {}", attachments.len(), files.len())));
    }

    let mut payload = spec.json().cloned();

    // Descriptions travel in the JSON part, matched to files by index
    if attachments.iter().any(|a| a.get_description().is_some()) {
        let meta: Vec<Value> = attachments
            .iter()
            .enumerate()
            .map(|(id, a)| match a.get_description() {
                Some(description) => json!({"id": id, "filename": a.name(), "description": description}),
                None => json!({"id": id, "filename": a.name()}),
            })
            .collect();

        match payload.get_or_insert_with(|| json!({})) {
            Value::Object(map) => {
                map.entry("attachments").or_insert(Value::Array(meta));
            }
            _ => return Err(Error::InvalidRequest("attachment descriptions require an object payload".into())),
        }
    }

    let payload_json = payload.map(|value| serde_json::to_vec(&value).map(Bytes::from)).transpose().map_err(Error::Encode)?;

    let files = attachments
        .iter()
        .zip(files)
        .enumerate()
        .map(|(i, (attachment, data))| FilePart { field: format!("files[{i}]"), filename: attachment.name().to_string(), mime: attachment.mime_type().to_string(), data })
        .collect();

    Ok(RequestBody::Multipart { payload_json, files })
}
