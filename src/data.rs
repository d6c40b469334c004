//! The DATA phase codec: dot-stuffing, dot-unstuffing, and the
//! `<CRLF>.<CRLF>` terminator.

use crate::buffer::ByteBuf;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum LineState {
    /// At the beginning of a line (initial state, or right after a CRLF).
    StartOfLine,
    /// Mid-line.
    MidLine,
    /// Saw CR, waiting for LF.
    SawCr,
}

/// Encodes an outgoing message body for the DATA phase.
///
/// Any line that starts with `.` gets an extra `.` prepended, and all line
/// terminators (bare LF, bare CR, CRLF) are normalized to CRLF. The encoder
/// is chunk-invariant: callers may write arbitrarily fragmented chunks and
/// the byte stream comes out the same as for the concatenation.
#[derive(Debug)]
pub struct DataEncoder {
    state: LineState,
}

impl Default for DataEncoder {
    fn default() -> Self {
        Self {
            state: LineState::StartOfLine,
        }
    }
}

impl DataEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at_line_start(&self) -> bool {
        self.state == LineState::StartOfLine
    }

    /// Encode `input` into `out`.
    pub fn write(&mut self, input: &[u8], out: &mut ByteBuf) {
        let mut start = 0;
        let mut i = 0;

        while i < input.len() {
            let byte = input[i];

            match self.state {
                LineState::SawCr => {
                    // The CR was withheld; emit the normalized terminator and
                    // re-process the byte at the start of the next line.
                    out.append(b"\r\n");
                    self.state = LineState::StartOfLine;
                    if byte == b'\n' {
                        i += 1;
                    }
                    start = i;
                    continue;
                }
                LineState::StartOfLine if byte == b'.' => {
                    out.append(&input[start..i]);
                    out.append(b"..");
                    i += 1;
                    start = i;
                    self.state = LineState::MidLine;
                    continue;
                }
                _ => {}
            }

            if byte == b'\r' {
                out.append(&input[start..i]);
                i += 1;
                start = i;
                self.state = LineState::SawCr;
            } else if byte == b'\n' {
                out.append(&input[start..i]);
                out.append(b"\r\n");
                i += 1;
                start = i;
                self.state = LineState::StartOfLine;
            } else {
                self.state = LineState::MidLine;
                i += 1;
            }
        }

        out.append(&input[start..]);
    }

    /// Append the `.\r\n` end-of-data terminator.
    ///
    /// Callers check [`DataEncoder::at_line_start`] first: terminating
    /// mid-line would splice the dot into the last body line.
    pub fn finish(&mut self, out: &mut ByteBuf) {
        debug_assert!(self.at_line_start(), "mail data ended with incomplete line");
        out.append(b".\r\n");
        self.state = LineState::StartOfLine;
    }

    pub fn reset(&mut self) {
        self.state = LineState::StartOfLine;
    }
}

/// Decodes an incoming message body during the DATA phase.
///
/// Consumes whole lines only, leaving a partial tail in the buffer for later
/// fetches. A lone `.` line is the terminator and is not delivered; any other
/// leading `.` is stripped; line terminators are preserved as received.
#[derive(Debug, Default)]
pub struct DataDecoder;

impl DataDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Consume whole lines from `input`, appending unstuffed bytes to `out`.
    ///
    /// Returns `true` once the terminator line has been consumed.
    pub fn decode(&self, input: &mut ByteBuf, out: &mut Vec<u8>) -> bool {
        loop {
            let consumed = {
                let unread = input.unread();

                let Some(position) = unread.iter().position(|b| *b == b'\n') else {
                    return false;
                };

                let line = &unread[..=position];
                if line == b".\r\n" || line == b".\n" {
                    input.advance(position + 1);
                    return true;
                }

                let stripped = match line.first() {
                    Some(b'.') => &line[1..],
                    _ => line,
                };
                out.extend_from_slice(stripped);

                position + 1
            };

            input.advance(consumed);
        }
    }
}
