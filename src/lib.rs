#![deny(missing_debug_implementations)]

//! Transport-agnostic client and server engines for SMTP
//! ([RFC 5321](https://datatracker.ietf.org/doc/html/rfc5321)).
//!
//! The protocol engines perform no I/O of their own: both halves of a
//! session operate over a pair of byte buffers, so the same engine runs over
//! blocking handles, non-blocking handles, event-loop sockets, in-memory
//! pipes, or a TLS transport.
//!
//! * [`buffer`] and [`transport`] are the sans-I/O boundary: append-only
//!   [`ByteBuf`](buffer::ByteBuf)s bound to a source/sink via
//!   [`Transport`](transport::Transport).
//! * [`rfc5321`] holds the grammar; [`codec`] wraps it into
//!   [`Decoder`](codec::decode::Decoder)s and
//!   [`Encode`](codec::encode::Encode)rs that never consume an incomplete
//!   message.
//! * [`server`] and [`client`] are the cooperating state machines; [`data`]
//!   is the DATA-phase dot-stuffing codec they share, and [`transaction`]
//!   carries one MAIL...DATA envelope.
//!
//! # Example
//!
//! ```rust
//! use smtp_toolkit::{
//!     client::{ClientConfig, ClientEngine},
//!     server::{ServerConfig, ServerEngine},
//!     transport::pipe,
//! };
//!
//! let (client_side, server_side) = pipe();
//! let mut client = ClientEngine::new(client_side, ClientConfig::default());
//! let mut server = ServerEngine::new(server_side, ServerConfig::default());
//!
//! // Exchange the greeting, then shake hands.
//! server.handle_io();
//! client.handle_io();
//! let handle = client.ehlo().unwrap();
//! server.handle_io();
//! client.handle_io();
//!
//! let response = client.take_response(handle).unwrap().unwrap();
//! assert_eq!(250, response.code().as_u16());
//! ```

pub mod buffer;
pub mod client;
pub mod codec;
pub mod data;
pub mod rfc5321;
pub mod server;
pub mod transaction;
pub mod transport;

/// This module is only available when the feature "tokio" was specified.
#[cfg(feature = "tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
pub mod tokio;

#[cfg(test)]
pub(crate) mod testing;

pub use smtp_types;
pub use smtp_types as types;
