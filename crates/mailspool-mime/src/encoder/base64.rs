//! Streaming Base64 encoder.

use std::io::{self, Read};

use super::DEFAULT_LINE_WIDTH;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// A lazy Base64 byte source wrapping an underlying reader.
///
/// Accumulates three input octets at a time and emits four alphabet
/// characters, inserting a CRLF whenever the output line reaches the
/// configured width. At end of input the residual quantum is emitted with
/// `=` padding and the last line is terminated with a CRLF.
pub struct Base64Encoder<R> {
    inner: R,
    line_width: usize,
    line_chars: usize,
    quantum: u32,
    quantum_len: usize,
    in_buf: Vec<u8>,
    in_pos: usize,
    inner_eof: bool,
    flushed: bool,
    produced_any: bool,
    pending: Vec<u8>,
}

impl<R: Read> Base64Encoder<R> {
    /// Wraps `inner` with the default 76-column line width.
    pub fn new(inner: R) -> Self {
        Self::with_line_width(inner, DEFAULT_LINE_WIDTH)
    }

    /// Wraps `inner` with the given line width; 0 disables wrapping.
    pub fn with_line_width(inner: R, line_width: usize) -> Self {
        Self {
            inner,
            line_width,
            line_chars: 0,
            quantum: 0,
            quantum_len: 0,
            in_buf: Vec::new(),
            in_pos: 0,
            inner_eof: false,
            flushed: false,
            produced_any: false,
            pending: Vec::new(),
        }
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

    fn put(&mut self, c: u8, out: &mut Sink<'_>) {
        out.push(c, &mut self.pending);
        self.produced_any = true;
        self.line_chars += 1;
        if self.line_width > 0 && self.line_chars >= self.line_width {
            out.push(b'\r', &mut self.pending);
            out.push(b'\n', &mut self.pending);
            self.line_chars = 0;
        }
    }

    fn put_quantum(&mut self, out: &mut Sink<'_>) {
        let pad = 3 - self.quantum_len;
        let q = self.quantum;
        self.put(ALPHABET[((q >> 18) & 0x3f) as usize], out);
        self.put(ALPHABET[((q >> 12) & 0x3f) as usize], out);
        if pad == 2 {
            self.put(b'=', out);
        } else {
            self.put(ALPHABET[((q >> 6) & 0x3f) as usize], out);
        }
        if pad >= 1 {
            self.put(b'=', out);
        } else {
            self.put(ALPHABET[(q & 0x3f) as usize], out);
        }
        self.quantum = 0;
        self.quantum_len = 0;
    }

    fn flush_tail(&mut self, out: &mut Sink<'_>) {
        if self.quantum_len > 0 {
            self.put_quantum(out);
        }
        if self.line_width > 0 && self.produced_any && self.line_chars > 0 {
            out.push(b'\r', &mut self.pending);
            out.push(b'\n', &mut self.pending);
            self.line_chars = 0;
        }
        self.flushed = true;
    }
}

impl<R: Read> Read for Base64Encoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut sink = Sink::new(buf);
        sink.drain_pending(&mut self.pending);

        while !sink.is_full() {
            if self.in_pos >= self.in_buf.len() {
                if self.inner_eof {
                    if !self.flushed {
                        self.flush_tail(&mut sink);
                    }
                    break;
                }
                self.fill_input()?;
                continue;
            }

            let c = self.in_buf[self.in_pos];
            self.in_pos += 1;
            self.quantum |= u32::from(c) << (16 - 8 * self.quantum_len);
            self.quantum_len += 1;
            if self.quantum_len == 3 {
                self.put_quantum(&mut sink);
            }
        }

        Ok(sink.written())
    }
}

/// Output cursor over the caller's buffer with carry-over for bytes that
/// do not fit.
struct Sink<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Sink<'a> {
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(data: &[u8]) -> Vec<u8> {
        let mut enc = Base64Encoder::new(Cursor::new(data.to_vec()));
        let mut out = Vec::new();
        enc.read_to_end(&mut out).unwrap();
        out
    }

    fn decode(encoded: &[u8]) -> Vec<u8> {
        use base64::Engine;
        let cleaned: Vec<u8> = encoded
            .iter()
            .copied()
            .filter(|b| !b"\r\n".contains(b))
            .collect();
        base64::engine::general_purpose::STANDARD.decode(cleaned).unwrap()
    }

    #[test]
    fn empty_input_produces_no_output() {
        assert!(encode(b"").is_empty());
    }

    #[test]
    fn single_byte_pads_twice() {
        assert_eq!(encode(&[0]), b"AA==\r\n".to_vec());
    }

    #[test]
    fn two_bytes_pad_once() {
        assert_eq!(encode(b"hi"), b"aGk=\r\n".to_vec());
    }

    #[test]
    fn known_vector() {
        assert_eq!(encode(b"Hello, World!"), b"SGVsbG8sIFdvcmxkIQ==\r\n".to_vec());
    }

    #[test]
    fn line_wrapping_at_width() {
        // 60 input bytes produce 80 characters: one full 76-char line plus 4.
        let data = vec![0xabu8; 60];
        let out = encode(&data);
        let text = String::from_utf8(out.clone()).unwrap();
        let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines[0].len(), 76);
        assert_eq!(lines[1].len(), 4);
        assert_eq!(decode(&out), data);
    }

    #[test]
    fn wrapping_disabled_with_zero_width() {
        let data = vec![0x5au8; 90];
        let mut enc = Base64Encoder::with_line_width(Cursor::new(data.clone()), 0);
        let mut out = Vec::new();
        enc.read_to_end(&mut out).unwrap();
        assert!(!out.contains(&b'\r'));
        assert_eq!(decode(&out), data);
    }

    #[test]
    fn round_trip_binary() {
        let data: Vec<u8> = (0u8..=255).cycle().take(1000).collect();
        assert_eq!(decode(&encode(&data)), data);
    }

    #[test]
    fn tiny_reads_carry_over() {
        let data = b"carry buffer exercise".to_vec();
        let mut enc = Base64Encoder::new(Cursor::new(data.clone()));
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match enc.read(&mut byte).unwrap() {
                0 => break,
                n => out.extend_from_slice(&byte[..n]),
            }
        }
        assert_eq!(decode(&out), data);
    }
}
