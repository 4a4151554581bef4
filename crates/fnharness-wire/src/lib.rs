//! Wire contract spoken by Lambda-style function processes.
//!
//! A function process serves Go's `net/rpc` over TCP, and `net/rpc` frames
//! every header and body with the `gob` encoding. This crate provides:
//!
//! - [`gob`]: a self-describing encoder/decoder for the gob stream format.
//! - [`rpc`]: `net/rpc` request/response framing on top of gob, client and
//!   server halves.
//! - [`messages`]: the `Function.Ping` / `Function.Invoke` payload types.

pub mod gob;
pub mod messages;
pub mod rpc;

pub use gob::GobError;
pub use rpc::{Client, RpcError, ServerConn};
