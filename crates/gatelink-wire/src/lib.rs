//! Wire layer for the gateway protocol.
//!
//! STOMP-style frames (command, headers, body) carried inside a SockJS-style
//! envelope: a leading classifier byte plus a JSON array of one payload
//! string. This crate is the leaf of the stack; it knows nothing about
//! sockets or sessions.

pub mod assembler;
pub mod constants;
pub mod error;
pub mod frame;

pub use assembler::{InboundKind, MessageAssembler};
pub use error::{WireError, WireResult};
pub use frame::{Command, Frame};
