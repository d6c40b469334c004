//! # Serialization of messages.
//!
//! All message types implement [`Encode`]; `.encode().dump()` yields exactly
//! the bytes the corresponding parser accepts, `\r\n` terminator included.
//!
//! ## Example
//!
//! ```rust
//! use smtp_toolkit::{codec::encode::Encode, types::command::Command};
//!
//! let out = Command::Quit.encode().dump();
//!
//! assert_eq!(out, b"QUIT\r\n");
//! ```

use std::io::Write;

use smtp_types::{
    command::Command,
    core::{Domain, ReplyCode},
    envelope::{EnvelopeRoute, Mailbox},
    response::Response,
};

/// Serialized bytes of a message.
#[derive(Clone, Debug)]
pub struct Encoded {
    data: Vec<u8>,
}

impl Encoded {
    /// Take the encoded bytes.
    pub fn dump(self) -> Vec<u8> {
        self.data
    }
}

impl AsRef<[u8]> for Encoded {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

pub trait Encode {
    /// Create an [`Encoded`] for this message.
    fn encode(&self) -> Encoded;
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EncodeContext {
    accumulator: Vec<u8>,
}

impl EncodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dump(self) -> Vec<u8> {
        self.accumulator
    }
}

impl Write for EncodeContext {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.accumulator.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<T> Encode for T
where
    T: Encoder,
{
    fn encode(&self) -> Encoded {
        let mut encode_context = EncodeContext::new();
        T::encode_ctx(self, &mut encode_context).unwrap();

        Encoded {
            data: encode_context.dump(),
        }
    }
}

// -------------------------------------------------------------------------------------------------

pub trait Encoder {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()>;
}

// ----- Command -----------------------------------------------------------------------------------

impl Encoder for Command {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        match self {
            Command::Helo { domain } => {
                ctx.write_all(b"HELO ")?;
                domain.encode_ctx(ctx)?;
            }
            Command::Ehlo { domain } => {
                ctx.write_all(b"EHLO ")?;
                domain.encode_ctx(ctx)?;
            }
            Command::Mail { reverse_path } => {
                ctx.write_all(b"MAIL FROM:")?;
                reverse_path.encode_ctx(ctx)?;
            }
            Command::Rcpt { forward_path } => {
                ctx.write_all(b"RCPT TO:")?;
                forward_path.encode_ctx(ctx)?;
            }
            Command::Data => ctx.write_all(b"DATA")?,
            Command::Rset => ctx.write_all(b"RSET")?,
            Command::Noop => ctx.write_all(b"NOOP")?,
            Command::Vrfy { target } => {
                ctx.write_all(b"VRFY ")?;
                ctx.write_all(target.as_bytes())?;
            }
            Command::Quit => ctx.write_all(b"QUIT")?,
        }

        ctx.write_all(b"\r\n")
    }
}

impl Encoder for Domain {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.to_string().as_bytes())
    }
}

impl Encoder for Mailbox {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.to_wire_string().as_bytes())
    }
}

impl Encoder for EnvelopeRoute {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(b"<")?;

        for (nth, domain) in self.route.iter().enumerate() {
            if nth > 0 {
                ctx.write_all(b",")?;
            }
            ctx.write_all(b"@")?;
            domain.encode_ctx(ctx)?;
        }
        if !self.route.is_empty() {
            ctx.write_all(b":")?;
        }

        self.mailbox.encode_ctx(ctx)?;
        ctx.write_all(b">")?;

        for (name, value) in &self.params {
            ctx.write_all(b" ")?;
            ctx.write_all(name.as_bytes())?;
            if let Some(value) = value {
                ctx.write_all(b"=")?;
                ctx.write_all(value.as_bytes())?;
            }
        }

        Ok(())
    }
}

// ----- Response ----------------------------------------------------------------------------------

impl Encoder for Response {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        let last = self.lines().len() - 1;

        for (nth, line) in self.lines().iter().enumerate() {
            self.code().encode_ctx(ctx)?;
            ctx.write_all(if nth == last { b" " } else { b"-" })?;
            ctx.write_all(line.as_bytes())?;
            ctx.write_all(b"\r\n")?;
        }

        Ok(())
    }
}

impl Encoder for ReplyCode {
    fn encode_ctx(&self, ctx: &mut EncodeContext) -> std::io::Result<()> {
        ctx.write_all(self.to_string().as_bytes())
    }
}
