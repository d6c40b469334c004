//! Tokio support.
//!
//! [`tokio_util::codec`] adapters over the same grammar the engines use, for
//! drivers that frame commands and responses straight off an async stream
//! instead of going through [`crate::transport`].

mod client;
mod server;

pub use client::{SmtpClientCodec, SmtpClientCodecError};
pub use server::{SmtpServerCodec, SmtpServerCodecError};
