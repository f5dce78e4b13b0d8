//! Agent Client Protocol (ACP) message bus.
//!
//! Bidirectional NDJSON/JSON-RPC communication between an agent and a
//! client over a pair of byte streams.
//!
//! Layers, leaf-first:
//! - `error`: protocol error taxonomy and handler-failure normalisation.
//! - `message`: the classified wire message model.
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based framing.
//! - `reader` / `writer`: inbound frame sequence and outbound writer task.
//! - `channel`: the duplex [`MessageChannel`](channel::MessageChannel).
//! - `connection`: correlation of requests and responses plus dispatch.
//! - `schema`: method names and typed parameters/results.
//! - `agent` / `client`: role-specific routers over a connection.
//! - `handshake`: client-side `initialize` exchange.
//! - `spawner`: launching an agent process with piped stdio.

pub mod agent;
pub mod channel;
pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod message;
pub mod reader;
pub mod schema;
pub mod spawner;
mod writer;

use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future returned by handler and capability traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
