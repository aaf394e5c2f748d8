use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::attachment::FileAttachment;
use crate::errors::Error;
use crate::errors::Result;
use crate::route::Route;

/// One logical API call
///
/// Owns its attachments; executing the spec closes them whatever the outcome.
#[derive(Debug)]
pub struct RequestSpec {
    pub(crate) route: Route,
    pub(crate) json: Option<Value>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) attachments: Vec<FileAttachment>,
    pub(crate) reason: Option<String>,
    pub(crate) retries: u32,
}

impl RequestSpec {
    pub fn builder(route: impl Into<Route>) -> RequestSpecBuilder {
        RequestSpecBuilder {
            spec: RequestSpec { route: route.into(), json: None, query: Vec::new(), attachments: Vec::new(), reason: None, retries: 1 },
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn json(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn attachments(&self) -> &[FileAttachment] {
        &self.attachments
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Transport attempts allowed for transient faults, at least 1
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Close every attachment, logging failures instead of returning them
    pub(crate) fn close_attachments(&mut self) {
        for attachment in &mut self.attachments {
            if let Err(err) = attachment.close() {
                warn!(attachment = %attachment.name(), error = %err, "Failed to close attachment");
            }
        }
    }
}

#[derive(Debug)]
pub struct RequestSpecBuilder {
    spec: RequestSpec,
}

impl RequestSpecBuilder {
    /// Serialize `body` as the JSON payload
    pub fn json<T: Serialize + ?Sized>(self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(Error::Encode)?;
        Ok(self.json_value(value))
    }

    pub fn json_value(mut self, value: Value) -> Self {
        self.spec.json = Some(value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.spec.query.push((key.into(), value.to_string()));
        self
    }

    pub fn attachment(mut self, attachment: FileAttachment) -> Self {
        self.spec.attachments.push(attachment);
        self
    }

    pub fn attachments(mut self, attachments: impl IntoIterator<Item = FileAttachment>) -> Self {
        self.spec.attachments.extend(attachments);
        self
    }

    /// Audit log reason
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.spec.reason = Some(reason.into());
        self
    }

    /// Attempt budget for connection resets; 0 is treated as 1
    pub fn retries(mut self, retries: u32) -> Self {
        self.spec.retries = retries.max(1);
        self
    }

    pub fn build(self) -> RequestSpec {
        self.spec
    }
}
