//! Streaming Quoted-Printable encoder.

use std::io::{self, Read};

use super::DEFAULT_LINE_WIDTH;

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// A lazy Quoted-Printable byte source wrapping an underlying reader.
///
/// Implements RFC 2045 section 6.7 with the dot-stuffing precaution for
/// SMTP: a literal `.` at column 0 is always escaped, so an encoded body
/// can never produce the `\r\n.\r\n` end-of-data sequence.
///
/// Encoding rules in precedence order:
///
/// 1. CRLF passes through verbatim and resets the column counter. In text
///    mode a bare LF is normalized to CRLF.
/// 2. `.` at column 0 is force-encoded (`=2E`).
/// 3. TAB or SPACE immediately before a CRLF is force-encoded.
/// 4. Printable US-ASCII (33–60, 62–126) plus TAB and SPACE pass through;
///    everything else becomes `=HH`.
/// 5. A soft break `=\r\n` is inserted when the next emission would
///    overrun the line width.
pub struct QuotedPrintableEncoder<R> {
    inner: R,
    text_mode: bool,
    line_width: usize,
    line_chars: usize,
    in_buf: Vec<u8>,
    in_pos: usize,
    inner_eof: bool,
    pending: Vec<u8>,
}

impl<R: Read> QuotedPrintableEncoder<R> {
    /// Wraps `inner` with the default 76-column line width.
    pub fn new(inner: R) -> Self {
        Self::with_line_width(inner, DEFAULT_LINE_WIDTH)
    }

    /// Wraps `inner` with the given line width; 0 disables wrapping.
    pub fn with_line_width(inner: R, line_width: usize) -> Self {
        Self {
            inner,
            text_mode: false,
            line_width,
            line_chars: 0,
            in_buf: Vec::new(),
            in_pos: 0,
            inner_eof: false,
            pending: Vec::new(),
        }
    }

    /// Enables text mode: bare LF in the source is emitted as CRLF.
    #[must_use]
    pub fn text_mode(mut self, enabled: bool) -> Self {
        self.text_mode = enabled;
        self
    }

    /// Returns the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill_input(&mut self) -> io::Result<()> {
        if self.inner_eof {
            return Ok(());
        }
        self.in_buf.drain(..self.in_pos);
        self.in_pos = 0;

        let mut chunk = [0u8; 8192];
        let got = self.inner.read(&mut chunk)?;
        if got == 0 {
            self.inner_eof = true;
        } else {
            self.in_buf.extend_from_slice(&chunk[..got]);
        }
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.in_buf.len() - self.in_pos
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.in_buf.get(self.in_pos + offset).copied()
    }

    fn emit(&mut self, bytes: &[u8], out: &mut OutBuf<'_>) {
        for &b in bytes {
            out.push(b, &mut self.pending);
        }
    }

    /// Encodes one source unit. Returns false when more input lookahead is
    /// needed before the unit can be classified.
    fn step(&mut self, out: &mut OutBuf<'_>) -> bool {
        let c = match self.peek(0) {
            Some(c) => c,
            None => return false,
        };

        // Rule 1: CRLF verbatim. A lone trailing CR needs lookahead.
        if c == b'\r' {
            match self.peek(1) {
                Some(b'\n') => {
                    self.in_pos += 2;
                    self.emit(b"\r\n", out);
                    self.line_chars = 0;
                    return true;
                }
                None if !self.inner_eof => return false,
                _ => {}
            }
        }
        if self.text_mode && c == b'\n' {
            self.in_pos += 1;
            self.emit(b"\r\n", out);
            self.line_chars = 0;
            return true;
        }

        let mut force = false;

        // Rule 3: TAB/SPACE directly before CRLF.
        if c == b'\t' || c == b' ' {
            if self.remaining() < 3 && !self.inner_eof {
                return false;
            }
            force = self.peek(1) == Some(b'\r') && self.peek(2) == Some(b'\n');
        }

        // Rule 2: dot at column 0.
        if self.line_chars == 0 && c == b'.' {
            force = true;
        }

        let mut printable = !force
            && ((33..=60).contains(&c) || (62..=126).contains(&c) || c == b'\t' || c == b' ');

        // Rule 5: soft break, reserving a column for the break marker.
        if self.line_width > 0
            && self.line_chars + if printable { 2 } else { 4 } >= self.line_width
        {
            self.emit(b"=\r\n", out);
            self.line_chars = 0;
            // The break moved us back to column 0; rule 2 applies again.
            if c == b'.' {
                printable = false;
            }
        }

        self.in_pos += 1;
        if printable {
            self.emit(&[c], out);
            self.line_chars += 1;
        } else {
            self.emit(&[b'=', HEX[usize::from(c >> 4)], HEX[usize::from(c & 0x0f)]], out);
            self.line_chars += 3;
        }
        true
    }
}

impl<R: Read> Read for QuotedPrintableEncoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut out = OutBuf::new(buf);
        out.drain_pending(&mut self.pending);

        while !out.is_full() {
            if self.step(&mut out) {
                continue;
            }
            if self.inner_eof {
                break;
            }
            self.fill_input()?;
        }

        Ok(out.written())
    }
}

/// Output cursor over the caller's buffer with carry-over for bytes that
/// do not fit.
struct OutBuf<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> OutBuf<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn drain_pending(&mut self, pending: &mut Vec<u8>) {
        let take = pending.len().min(self.buf.len() - self.pos);
        self.buf[self.pos..self.pos + take].copy_from_slice(&pending[..take]);
        pending.drain(..take);
        self.pos += take;
    }

    fn push(&mut self, c: u8, pending: &mut Vec<u8>) {
        if self.pos < self.buf.len() && pending.is_empty() {
            self.buf[self.pos] = c;
            self.pos += 1;
        } else {
            pending.push(c);
        }
    }

    fn is_full(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn written(&self) -> usize {
        self.pos
    }
}
