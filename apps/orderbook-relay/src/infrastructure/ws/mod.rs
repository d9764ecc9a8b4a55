//! WebSocket Transport
//!
//! Server-side WebSocket handling: the accept loop, per-connection read and
//! write tasks, and the JSON subscription protocol spoken with clients.

pub mod protocol;
pub mod server;

pub use protocol::{ClientRequest, RequestError, parse_request};
pub use server::{RelayServer, WsServerError};
