//! livewatch-control: client for the local automation-control server.
//!
//! One persistent WebSocket session, authenticated with the server's
//! salt/challenge handshake, used to start and stop streaming or recording.
//! The session is created lazily on the first action and recreated after
//! any close or error.

pub mod auth;
pub mod error;
pub mod protocol;
pub mod session;

pub use auth::compute_auth;
pub use error::ControlError;
pub use protocol::{ActionKind, ClientMessage, RequestType, ServerMessage};
pub use session::{
    ActionOutcome, AutomationControl, ClientOptions, ConnectionState, ControlClient,
};
