// headlink-api: realtime call-center channel and outbound HTTP transport

pub mod error;
pub mod frame;
pub mod realtime;
pub mod transport;

pub use error::Error;
pub use realtime::{RealtimeClient, RealtimeConfig, ReconnectConfig};
