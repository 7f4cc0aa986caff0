//! Session gateway: the WebSocket surface that maps inbound messages to
//! engine operations and fans resulting state out to lobby members

pub mod broadcast;
pub mod protocol;
pub mod session;

pub use broadcast::{Broadcaster, MockBroadcaster, WsBroadcaster};
pub use protocol::{ClientMessage, ServerMessage};
pub use session::SessionGateway;
