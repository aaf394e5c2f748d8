//! Plain resource objects mirroring the JSON payloads the REST client sends and
//! receives. Only the fields the client itself relies on are modelled.

use serde::Deserialize;
use serde::Serialize;

use crate::field::Field;
use crate::snowflake::Snowflake;

/// Response of `GET /gateway/bot`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayBot {
    pub url: String,
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    pub reset_after: u64,
    pub max_concurrency: u32,
}

/// An interaction received from a user (slash command, component click, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: Snowflake,
    pub application_id: Snowflake,
    #[serde(rename = "type")]
    pub kind: u8,
    pub token: String,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub guild_id: Field<Snowflake>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub channel_id: Field<Snowflake>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub guild_id: Field<Snowflake>,
    #[serde(default)]
    pub content: String,
}

/// Points a new message at the message it replies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReference {
    pub message_id: Snowflake,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub channel_id: Field<Snowflake>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub guild_id: Field<Snowflake>,
}

/// Body of `PATCH /guilds/{guild_id}/members/{user_id}`
///
/// Every field is three-state: `Missing` leaves the attribute untouched, `Null`
/// clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyGuildMember {
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub nick: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub roles: Field<Vec<Snowflake>>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub mute: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub deaf: Field<bool>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub channel_id: Field<Snowflake>,
    #[serde(default, skip_serializing_if = "Field::is_missing")]
    pub communication_disabled_until: Field<String>,
}
