//! Todo store over TCP.
//!
//! Frames are a 4-byte big-endian length followed by a msgpack payload.
//! Clients send [`RpcRequest`]s; the server answers with
//! [`ServerFrame::Response`] and, once a connection has subscribed, pushes
//! [`ServerFrame::Event`]s on the same stream.
//!
//! [`RpcServer`] exposes any [`RemoteStore`](todo_store::RemoteStore);
//! [`RpcClient`] implements the same traits on the far side.

pub mod codec;
pub mod protocol;

mod client;
mod server;

pub use client::{ClientConfig, RpcClient};
pub use protocol::{RpcError, RpcRequest, RpcResponse, ServerFrame};
pub use server::RpcServer;
