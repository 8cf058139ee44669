// htpi-api: Async adapters for the HTPI portal gateway (REST + event channel)

pub mod channel;
pub mod error;
pub mod reconnect;
pub mod rest;
pub mod transport;

pub use channel::{AckHandler, ChannelLink, ChannelSignal, ChannelTransport};
pub use error::Error;
pub use reconnect::ReconnectPolicy;
pub use rest::{LoginData, LoginRequired, ProfileUpdate, RestClient, TokenSource, User};
