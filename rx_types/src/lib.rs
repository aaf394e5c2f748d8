pub mod field;
pub mod gateway;
pub mod resources;
pub mod snowflake;

pub use field::Field;
pub use gateway::GatewayError;
pub use resources::GatewayBot;
pub use resources::Interaction;
pub use resources::Message;
pub use resources::MessageReference;
pub use resources::ModifyGuildMember;
pub use resources::SessionStartLimit;
pub use snowflake::Snowflake;
