#![deny(missing_debug_implementations)]

//! Misuse-resistant data structures for SMTP (RFC 5321).
//!
//! This crate contains the value types shared by the client and server halves
//! of an SMTP session: commands, responses, envelope routes, and the session
//! state vocabulary. It performs no parsing and no I/O; the wire grammar lives
//! in the `smtp-toolkit` crate.

pub mod command;
pub mod core;
pub mod envelope;
pub mod error;
pub mod response;
pub mod state;
pub mod utils;
