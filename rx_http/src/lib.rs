pub mod attachment;
pub mod client;
pub mod config;
pub mod encoder;
pub mod errors;
pub mod interpreter;
pub mod request;
pub mod respondable;
pub mod rest;
pub mod route;
pub mod transport;

pub use attachment::AttachmentHandle;
pub use attachment::FileAttachment;
pub use client::HttpClientConfig;
pub use client::ReqwestTransport;
pub use config::RestConfig;
pub use errors::Error;
pub use errors::HttpError;
pub use errors::Result;
pub use errors::TransportError;
pub use interpreter::Classification;
pub use interpreter::Payload;
pub use request::RequestSpec;
pub use respondable::Respondable;
pub use rest::RestClient;
pub use route::Endpoint;
pub use route::Route;
pub use transport::Transport;
pub use transport::TransportRequest;
pub use transport::TransportResponse;
pub use tokio_util::sync::CancellationToken;
