use std::borrow::Cow;

use reqwest::Method;
use rx_ratelimit::RouteKey;

use crate::errors::Error;
use crate::errors::Result;

/// Path parameters the server partitions rate limits by
const MAJOR_PARAMS: [&str; 3] = ["channel_id", "guild_id", "webhook_id"];

/// Routes the client knows by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    GetGatewayBot,
    GetGuildMember,
    ModifyGuildMember,
    CreateMessage,
    CreateInteractionResponse,
    ExecuteWebhook,
}

impl Endpoint {
    pub fn method(self) -> Method {
        match self {
            Endpoint::GetGatewayBot | Endpoint::GetGuildMember => Method::GET,
            Endpoint::ModifyGuildMember => Method::PATCH,
            Endpoint::CreateMessage | Endpoint::CreateInteractionResponse | Endpoint::ExecuteWebhook => Method::POST,
        }
    }

    pub fn template(self) -> &'static str {
        match self {
            Endpoint::GetGatewayBot => "/gateway/bot",
            Endpoint::GetGuildMember | Endpoint::ModifyGuildMember => "/guilds/{guild_id}/members/{user_id}",
            Endpoint::CreateMessage => "/channels/{channel_id}/messages",
            Endpoint::CreateInteractionResponse => "/interactions/{interaction_id}/{interaction_token}/callback",
            Endpoint::ExecuteWebhook => "/webhooks/{webhook_id}/{webhook_token}",
        }
    }
}

/// Method plus path template with its parameters
///
/// The template, not the formatted path, feeds the rate-limit key: two calls to
/// the same route with different non-major ids share a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    method: Method,
    template: Cow<'static, str>,
    params: Vec<(String, String)>,
}

impl Route {
    pub fn new(method: Method, template: impl Into<Cow<'static, str>>) -> Self {
        Self { method, template: template.into(), params: Vec::new() }
    }

    pub fn endpoint(endpoint: Endpoint) -> Self {
        Self::new(endpoint.method(), endpoint.template())
    }

    /// Bind a `{name}` placeholder
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        let value = value.to_string();
        match self.params.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    /// Substitute every placeholder, percent-encoding the values
    pub fn path(&self) -> Result<String> {
        let mut path = String::with_capacity(self.template.len() + 32);
        let mut rest: &str = &self.template;

        while let Some(open) = rest.find('{') {
            let close = rest[open..]
                .find('}')
                .map(|offset| open + offset)
                .ok_or_else(|| Error::InvalidRequest(format!("unterminated placeholder in {}", self.template)))?;

            let name = &rest[open + 1..close];
            let value = self.get_param(name).ok_or_else(|| Error::Route { template: self.template.to_string(), param: name.to_string() })?;

            path.push_str(&rest[..open]);
            path.push_str(&urlencoding::encode(value));
            rest = &rest[close + 1..];
        }
        path.push_str(rest);

        Ok(path)
    }

    /// Rate-limit scope of this route
    pub fn key(&self) -> RouteKey {
        let mut key = RouteKey::new(&*self.template);
        for name in MAJOR_PARAMS {
            if let Some(value) = self.get_param(name) {
                key = match name {
                    "channel_id" => key.channel(value),
                    "guild_id" => key.guild(value),
                    _ => key.webhook(value),
                };
            }
        }
        key
    }
}

impl From<Endpoint> for Route {
    fn from(endpoint: Endpoint) -> Self {
        Route::endpoint(endpoint)
    }
}
