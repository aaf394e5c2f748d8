use std::future::Future;
use std::pin::Pin;

use rx_types::Field;
use rx_types::Interaction;
use rx_types::Message;
use rx_types::MessageReference;
use serde_json::json;
use serde_json::Value;

use crate::attachment::FileAttachment;
use crate::errors::Result;
use crate::interpreter::Payload;
use crate::request::RequestSpec;
use crate::rest::RestClient;
use crate::route::Endpoint;
use crate::route::Route;

/// Interaction response type for "reply with a message"
const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;

/// Objects that can be replied to
pub trait Respondable: Sync {
    /// Route the reply is posted to
    fn response_route(&self) -> Route;

    /// Shape the caller's message body into what the route expects
    fn prepare(&self, body: Value) -> Value {
        body
    }

    fn respond<'a>(&'a self, client: &'a RestClient, body: Value) -> Pin<Box<dyn Future<Output = Result<Payload>> + Send + 'a>> {
        self.respond_with_files(client, body, Vec::new())
    }

    fn respond_with_files<'a>(
        &'a self,
        client: &'a RestClient,
        body: Value,
        files: Vec<FileAttachment>,
    ) -> Pin<Box<dyn Future<Output = Result<Payload>> + Send + 'a>> {
        Box::pin(async move {
            let spec = RequestSpec::builder(self.response_route()).json_value(self.prepare(body)).attachments(files).build();
            client.execute(spec).await
        })
    }
}

impl Respondable for Interaction {
    fn response_route(&self) -> Route {
        Route::endpoint(Endpoint::CreateInteractionResponse).param("interaction_id", self.id).param("interaction_token", &self.token)
    }

    /// Wrap a bare message in a callback envelope; bodies that already carry a `type` pass through
    fn prepare(&self, body: Value) -> Value {
        if body.get("type").is_some() {
            return body;
        }
        json!({ "type": CHANNEL_MESSAGE_WITH_SOURCE, "data": body })
    }
}

impl Respondable for Message {
    fn response_route(&self) -> Route {
        Route::endpoint(Endpoint::CreateMessage).param("channel_id", self.channel_id)
    }

    /// Thread the reply to this message
    fn prepare(&self, mut body: Value) -> Value {
        let reference = MessageReference { message_id: self.id, channel_id: Field::Value(self.channel_id), guild_id: self.guild_id };
        if let Value::Object(map) = &mut body {
            if let Ok(reference) = serde_json::to_value(reference) {
                map.entry("message_reference").or_insert(reference);
            }
        }
        body
    }
}
