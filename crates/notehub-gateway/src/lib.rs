//! Real-time side of the chat: who is connected, which rooms each connection
//! is watching, and fan-out of room events to those connections.

pub mod auth;
pub mod connection;
pub mod hub;
pub mod router;
pub mod session;

pub use auth::{AuthError, IdentityVerifier, JwtVerifier, issue_token};
pub use hub::{EventSender, PresenceError, PresenceHub};
pub use router::BroadcastRouter;
pub use session::{ConnectionState, Session, SessionError};
