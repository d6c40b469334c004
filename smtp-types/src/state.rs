//! # State and Flow Diagram
//!
//! Both halves of an SMTP session move through the same state vocabulary; the
//! server transitions when it handles a command, the client when it correlates
//! a response. Most commands are only valid in certain states, and the server
//! answers an out-of-state command with `503 Bad sequence of commands`.
//!
//! ```text
//!      +----------------------+
//!      |connection established|
//!      +----------------------+
//!                 ||
//!                 \/ (connect)
//!      +----------------------+
//!      |    server greeting   |
//!      +----------------------+
//!          || (1)      || (2)
//!          \/          \/
//!     +---------+  +--------+
//!     |handshake|  | reject |
//!     +---------+  +--------+
//!          || (3)      ||
//!          \/          ||
//!      +-------+       ||
//!   ++>| ready |       ||
//!   || +-------+       ||
//!   ||     || (4)      ||
//!   ||     \/          ||
//!   ||  +------+       ||
//!   ||  | mail |       ||
//!   ||  +------+       ||
//!   ||     || (5)      ||
//!   ||     \/          ||
//!   ||  +------+       ||
//!   ||  | data |       ||
//!   ||  +------+       ||
//!   ||     || (6)      ||
//!   ||     \/          ||
//!   || +-------------+ ||
//!   ++=|data_complete| ||
//!      +-------------+ ||
//!          || (7)      || (7)
//!          \/          \/
//!      +--------------------+
//!      |    quit / abort    |
//!      +--------------------+
//!
//! (1) 220 greeting
//! (2) 554 greeting; only QUIT is permitted
//! (3) HELO or EHLO accepted with 250
//! (4) MAIL accepted with 250
//! (5) DATA accepted with 354; body bytes flow until <CRLF>.<CRLF>
//! (6) terminator seen; awaiting the final response
//! (7) QUIT/221 exchange, server 421, or unrecoverable failure
//! ```

/// State of an SMTP session.
///
/// Shared by [`Command`](crate::command::Command) legality checks and by the
/// engines on both sides of the connection.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SessionState {
    /// No bytes exchanged yet.
    Connect,

    /// Server greeting sent/received; awaiting HELO or EHLO.
    Handshake,

    /// The greeting was 554; only QUIT is permitted.
    Reject,

    /// Handshake complete; MAIL may be issued.
    Ready,

    /// MAIL accepted; RCPT and DATA are permitted.
    Mail,

    /// DATA accepted; body bytes are flowing.
    Data,

    /// The end-of-data terminator was seen; awaiting the final response.
    DataComplete,

    /// Graceful termination issued.
    Quit,

    /// Unrecoverable; the connection must be torn down.
    Abort,
}
