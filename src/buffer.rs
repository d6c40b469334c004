//! The append-only byte buffer both engines read from and write into.

use std::io;

use bytes::{Buf, BytesMut};

/// Whether more bytes can ever appear on one half of a stream.
///
/// Distinguishes a clean end of stream from a fatal transport error. Once a
/// buffer is no longer [`Finality::Open`], nothing will be appended to it
/// again.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Finality {
    #[default]
    Open,
    Eof,
    Error(io::ErrorKind),
}

impl Finality {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

/// A growable byte buffer with a consumed cursor.
///
/// Writers append at the end; a reader consumes from the front by calling
/// [`ByteBuf::advance`] after inspecting [`ByteBuf::unread`]. When more than
/// half of the buffer has been consumed, the consumed prefix is discarded and
/// the cursor resets, so long sessions never grow the buffer beyond roughly
/// twice the size of the largest in-flight message.
#[derive(Debug, Default)]
pub struct ByteBuf {
    data: BytesMut,
    consumed: usize,
    finality: Finality,
}

impl ByteBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            consumed: 0,
            finality: Finality::Open,
        }
    }

    /// Append bytes at the end of the buffer.
    pub fn append(&mut self, bytes: &[u8]) {
        debug_assert!(self.finality().is_open(), "append after finality");
        self.data.extend_from_slice(bytes);
    }

    /// The bytes that have been appended but not yet consumed.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.consumed..]
    }

    pub fn unread_len(&self) -> usize {
        self.data.len() - self.consumed
    }

    /// Total bytes currently held, consumed prefix included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Move the consumed cursor forward by `n` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the unread length; consuming bytes that were
    /// never appended is a bug in the caller.
    pub fn advance(&mut self, n: usize) {
        assert!(n <= self.unread_len(), "advance past the end of the buffer");
        self.consumed += n;
        self.compact();
    }

    /// Drop the consumed prefix once it outweighs the unread remainder.
    ///
    /// Called internally by [`ByteBuf::advance`]; calling it again is a
    /// no-op hint.
    pub fn compact(&mut self) {
        if self.consumed > self.data.len() / 2 {
            self.data.advance(self.consumed);
            self.consumed = 0;
        }
    }

    pub fn finality(&self) -> Finality {
        self.finality
    }

    pub fn mark_eof(&mut self) {
        if self.finality.is_open() {
            self.finality = Finality::Eof;
        }
    }

    pub fn mark_error(&mut self, kind: io::ErrorKind) {
        if self.finality.is_open() {
            self.finality = Finality::Error(kind);
        }
    }

    /// Append up to `hint` bytes read from `reader`.
    pub(crate) fn read_from(
        &mut self,
        reader: &mut impl io::Read,
        hint: usize,
    ) -> io::Result<usize> {
        let len = self.data.len();
        self.data.resize(len + hint, 0);

        match reader.read(&mut self.data[len..]) {
            Ok(n) => {
                self.data.truncate(len + n);
                Ok(n)
            }
            Err(error) => {
                self.data.truncate(len);
                Err(error)
            }
        }
    }
}
