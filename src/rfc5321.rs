//! Parsers for the formal syntax of SMTP ([RFC 5321](https://datatracker.ietf.org/doc/html/rfc5321#section-4.1)).
//!
//! All parsers operate on complete command or response lines; the line
//! framing (finding the terminator, enforcing length limits, tolerating a
//! bare LF) is done by the codecs in [`crate::codec`] before any of these
//! parsers run. `SP` means exactly one space; TAB is not an accepted
//! substitute.

pub(crate) mod command;
pub(crate) mod core;
pub(crate) mod response;
