use thiserror::Error;

/// Errors a Gateway connection can raise when the remote end closes the socket
///
/// The socket protocol itself lives outside this workspace; these types exist so
/// callers can share one error vocabulary between REST and Gateway code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("An invalid token was supplied to the Gateway")]
    InvalidToken,

    #[error("Too many Gateway commands were sent; the connection was dropped")]
    RateLimited,

    #[error("An invalid shard was supplied to the Gateway")]
    InvalidShard,

    #[error("The connection requires sharding")]
    RequiresSharding,

    #[error("An invalid intent or series of intents was supplied")]
    InvalidIntents,

    #[error("A disallowed intent was supplied")]
    DisallowedIntents,

    #[error("The Gateway closed the connection with code {0}")]
    RandomClose(u16),
}

impl GatewayError {
    /// Map a websocket close code to the error it signals
    pub fn from_close_code(code: u16) -> Self {
        match code {
            4004 => GatewayError::InvalidToken,
            4008 => GatewayError::RateLimited,
            4010 => GatewayError::InvalidShard,
            4011 => GatewayError::RequiresSharding,
            4013 => GatewayError::InvalidIntents,
            4014 => GatewayError::DisallowedIntents,
            other => GatewayError::RandomClose(other),
        }
    }

    /// Whether reconnecting with the same parameters can ever succeed
    pub fn is_fatal(&self) -> bool {
        !matches!(self, GatewayError::RateLimited | GatewayError::RandomClose(_))
    }
}
