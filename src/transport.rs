//! The buffered, sans-I/O boundary between the engines and the outside world.
//!
//! The engines never touch a socket. They parse from the input [`ByteBuf`]
//! and render into the output [`ByteBuf`] of a [`Transport`], and they call
//! [`Transport::fetch`] / [`Transport::flush`] at points where a blocking
//! transport can make synchronous progress. A non-blocking or event-loop
//! driver instead calls `fetch`/`flush` from its own readiness callbacks and
//! re-enters the engine afterwards.
//!
//! [`BufferedTransport`] is the stock implementation over any
//! [`Stream`]; [`pipe`] builds a connected in-memory pair of them, which is
//! how the integration tests (and a TLS implementation's own tests) drive a
//! client engine against a server engine without sockets.

use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, Read, Write},
    rc::Rc,
};

use crate::buffer::{ByteBuf, Finality};

const DEFAULT_FETCH_HINT: usize = 65536;

/// A bidirectional byte stream a [`BufferedTransport`] can be bound to.
///
/// Implementations signal "no bytes available right now" with
/// [`io::ErrorKind::WouldBlock`]; the transport treats that (and
/// `Interrupted`) as transient. A TLS session type implements this trait by
/// multiplexing its handshake records inside `read`/`write`, which makes it
/// indistinguishable from a plain stream to everything above.
pub trait Stream: Read + Write {
    /// Close the write half of the stream; the peer's next read sees EOF.
    ///
    /// Errors are ignored by the transport (a closed or non-socket stream
    /// has nothing left to shut down).
    fn shutdown_write(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for std::net::TcpStream {
    fn shutdown_write(&mut self) -> io::Result<()> {
        std::net::TcpStream::shutdown(self, std::net::Shutdown::Write)
    }
}

/// The buffer pair the engines operate on.
pub trait Transport {
    /// Read from the source into the input buffer.
    ///
    /// Returns the number of bytes appended. Transient errors (interrupted,
    /// would-block) return 0 without marking finality; a true zero-byte read
    /// marks the input `Eof`; fatal errors mark it `Error`.
    fn fetch(&mut self, hint: Option<usize>) -> usize;

    /// Write pending output to the sink, dropping written bytes.
    ///
    /// Returns the number of bytes written. With `eof`, once the output
    /// drains, the write half is shut down and the output buffer becomes
    /// `Eof`; if bytes remain, the shutdown is deferred to the next flush
    /// that drains.
    fn flush(&mut self, eof: bool) -> usize;

    fn input(&mut self) -> &mut ByteBuf;

    fn output(&mut self) -> &mut ByteBuf;

    fn input_finality(&self) -> Finality;

    fn output_finality(&self) -> Finality;
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// A pair of [`ByteBuf`]s bound to a [`Stream`].
#[derive(Debug)]
pub struct BufferedTransport<S> {
    stream: S,
    input: ByteBuf,
    output: ByteBuf,
    shutdown_pending: bool,
}

impl<S: Stream> BufferedTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            input: ByteBuf::new(),
            output: ByteBuf::new(),
            shutdown_pending: false,
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Unbind, returning the stream and any unread/unwritten bytes.
    pub fn into_parts(self) -> (S, ByteBuf, ByteBuf) {
        (self.stream, self.input, self.output)
    }
}

impl<S: Stream> Transport for BufferedTransport<S> {
    fn fetch(&mut self, hint: Option<usize>) -> usize {
        if !self.input.finality().is_open() {
            return 0;
        }

        let hint = hint.unwrap_or(DEFAULT_FETCH_HINT);
        if hint == 0 {
            return 0;
        }

        match self.input.read_from(&mut self.stream, hint) {
            Ok(0) => {
                self.input.mark_eof();
                0
            }
            Ok(n) => n,
            Err(error) if is_transient(&error) => 0,
            Err(error) => {
                self.input.mark_error(error.kind());
                0
            }
        }
    }

    fn flush(&mut self, eof: bool) -> usize {
        if eof {
            self.shutdown_pending = true;
        }

        let mut written = 0;

        while self.output.unread_len() > 0 && self.output.finality().is_open() {
            match self.stream.write(self.output.unread()) {
                Ok(0) => {
                    self.output.mark_error(io::ErrorKind::WriteZero);
                }
                Ok(n) => {
                    self.output.advance(n);
                    written += n;
                }
                Err(error) if is_transient(&error) => break,
                Err(error) => {
                    self.output.mark_error(error.kind());
                }
            }
        }

        if self.shutdown_pending && self.output.unread_len() == 0 && self.output.finality().is_open()
        {
            let _ = self.stream.flush();
            let _ = self.stream.shutdown_write();
            self.output.mark_eof();
        }

        written
    }

    fn input(&mut self) -> &mut ByteBuf {
        &mut self.input
    }

    fn output(&mut self) -> &mut ByteBuf {
        &mut self.output
    }

    fn input_finality(&self) -> Finality {
        self.input.finality()
    }

    fn output_finality(&self) -> Finality {
        self.output.finality()
    }
}

// ----- In-memory pipe ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PipeShared {
    /// Bytes in flight from end A to end B, and the write-closed flag of A.
    a_to_b: VecDeque<u8>,
    a_closed: bool,
    b_to_a: VecDeque<u8>,
    b_closed: bool,
}

/// One end of an in-memory duplex stream.
///
/// Reads report [`io::ErrorKind::WouldBlock`] while the peer has not written
/// anything, and 0 (EOF) once the peer has shut its write half down. The
/// engines are single-threaded, so the shared state is a plain `Rc`.
#[derive(Clone, Debug)]
pub struct PipeStream {
    shared: Rc<RefCell<PipeShared>>,
    is_a: bool,
}

impl Read for PipeStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut guard = self.shared.borrow_mut();
        let shared = &mut *guard;
        let (incoming, peer_closed) = if self.is_a {
            (&mut shared.b_to_a, shared.b_closed)
        } else {
            (&mut shared.a_to_b, shared.a_closed)
        };

        if incoming.is_empty() {
            return if peer_closed {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        }

        let n = buf.len().min(incoming.len());
        for (slot, byte) in buf.iter_mut().zip(incoming.drain(..n)) {
            *slot = byte;
        }

        Ok(n)
    }
}

impl Write for PipeStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.shared.borrow_mut();
        let shared = &mut *guard;
        let (outgoing, closed) = if self.is_a {
            (&mut shared.a_to_b, shared.a_closed)
        } else {
            (&mut shared.b_to_a, shared.b_closed)
        };

        if closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }

        outgoing.extend(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for PipeStream {
    fn shutdown_write(&mut self) -> io::Result<()> {
        let mut shared = self.shared.borrow_mut();
        if self.is_a {
            shared.a_closed = true;
        } else {
            shared.b_closed = true;
        }
        Ok(())
    }
}

/// A connected pair of in-memory transports.
///
/// Everything flushed on one side becomes fetchable on the other.
pub fn pipe() -> (BufferedTransport<PipeStream>, BufferedTransport<PipeStream>) {
    let shared = Rc::new(RefCell::new(PipeShared::default()));

    (
        BufferedTransport::new(PipeStream {
            shared: Rc::clone(&shared),
            is_a: true,
        }),
        BufferedTransport::new(PipeStream {
            shared,
            is_a: false,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_round_trip() {
        let (mut a, mut b) = pipe();

        a.output().append(b"EHLO example.com\r\n");
        assert_eq!(18, a.flush(false));

        assert_eq!(18, b.fetch(None));
        assert_eq!(b"EHLO example.com\r\n", b.input().unread());
    }

    #[test]
    fn test_fetch_is_idempotent_on_would_block() {
        let (mut a, _b) = pipe();

        assert_eq!(0, a.fetch(None));
        assert_eq!(0, a.fetch(None));
        assert!(a.input_finality().is_open());
    }

    #[test]
    fn test_flush_eof_performs_half_close() {
        let (mut a, mut b) = pipe();

        a.output().append(b"221 Goodbye\r\n");
        a.flush(true);
        assert_eq!(Finality::Eof, a.output_finality());

        b.fetch(None);
        assert_eq!(b"221 Goodbye\r\n", b.input().unread());

        // Drain the data, then observe the half-close.
        let n = b.input().unread_len();
        b.input().advance(n);
        assert_eq!(0, b.fetch(None));
        assert_eq!(Finality::Eof, b.input_finality());
    }

    #[test]
    fn test_deferred_shutdown_when_output_not_drained() {
        struct Clogged;

        impl Read for Clogged {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::ErrorKind::WouldBlock.into())
            }
        }

        impl Write for Clogged {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::ErrorKind::WouldBlock.into())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        impl Stream for Clogged {}

        let mut transport = BufferedTransport::new(Clogged);
        transport.output().append(b"221 Goodbye\r\n");

        assert_eq!(0, transport.flush(true));
        assert!(transport.output_finality().is_open());
    }

    #[test]
    fn test_fatal_write_error_marks_output() {
        struct Broken;

        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Ok(0)
            }
        }

        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::ErrorKind::ConnectionReset.into())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        impl Stream for Broken {}

        let mut transport = BufferedTransport::new(Broken);
        transport.output().append(b"250 OK\r\n");

        assert_eq!(0, transport.flush(false));
        assert_eq!(
            Finality::Error(io::ErrorKind::ConnectionReset),
            transport.output_finality()
        );
    }
}
