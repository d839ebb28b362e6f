//! # Chat Module
//!
//! Text-chat path of the bridge: a JSON WebSocket protocol, a registry of
//! open connections, and the per-connection session actor that drives the
//! language model (and optionally speech synthesis) for each message.

pub mod protocol;
pub mod registry;
pub mod session;

pub use protocol::{ClientMessage, ServerMessage};
pub use registry::ConnectionRegistry;
pub use session::ChatSession;
