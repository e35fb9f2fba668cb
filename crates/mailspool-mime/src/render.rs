//! Streaming message renderer.
//!
//! Converts a [`Message`] into a monotone, wire-ready byte stream:
//! top-level headers, MIME boundaries, per-part headers, and
//! encoder-wrapped bodies. The consumer pulls bytes through a bounded
//! ring buffer, which gives natural backpressure: the traversal only
//! advances while buffer space is available, and at most one body source
//! is attached at any time.

use std::io::{Cursor, Read};

use crate::encoder::{Base64Encoder, QuotedPrintableEncoder};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::part::{BodyContent, EncoderChoice, MimeMultipart, MultipartKind, Part};
use crate::ring::RingBuffer;

/// Default ring buffer size.
const BUFFER_SIZE: usize = 128 * 1024;

/// Traversal state of the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    SimpleBody,
    MimeBoundary,
    MimePartHeaders,
    MimePartBody,
    Finished,
}

/// Iteration frame for one multipart on the traversal stack.
///
/// `child` is the index of the child the boundary/part states are looking
/// at; it stays on a nested multipart while that subtree renders and is
/// advanced when the subtree's terminal boundary has been emitted.
#[derive(Debug)]
struct Frame {
    child: usize,
}

/// Streaming renderer for one message.
///
/// Owns the message for the duration of rendering; body sources are
/// dropped as soon as their stream is exhausted.
pub struct MessageRenderer {
    state: State,
    ring: RingBuffer,
    top_headers: Vec<u8>,
    root: Part,
    stack: Vec<Frame>,
    source: Option<Box<dyn Read + Send>>,
    pending_body: Option<(EncoderChoice, BodyContent)>,
    processed_chunks: usize,
    total_chunks: usize,
}

impl MessageRenderer {
    /// Binds a renderer to `message` with the default 128 KiB buffer.
    #[must_use]
    pub fn new(message: Message) -> Self {
        Self::with_buffer_size(message, BUFFER_SIZE)
    }

    /// Binds a renderer with an explicit ring buffer size.
    #[must_use]
    pub fn with_buffer_size(mut message: Message, buffer_size: usize) -> Self {
        let mut headers = message.cook_headers();
        let body = message.take_body();

        // A bare MIME leaf renders inside a generated multipart container.
        let root = match body {
            Part::Mime(part) => {
                let mut wrapper = MimeMultipart::new(MultipartKind::Mixed);
                wrapper.push(part);
                Part::Multipart(wrapper)
            }
            other => other,
        };

        if matches!(root, Part::Multipart(_)) {
            headers.set("MIME-Version", "1.0");
        }

        let total_chunks = match &root {
            Part::Multipart(mp) => count_chunks(mp),
            _ => 2,
        };

        Self {
            state: State::Idle,
            ring: RingBuffer::new(buffer_size),
            top_headers: headers.render(),
            root,
            stack: Vec::new(),
            source: None,
            pending_body: None,
            processed_chunks: 0,
            total_chunks,
        }
    }

    /// Returns `(processed, total)` chunk counts.
    ///
    /// `processed` increases by one each time a queued chunk (headers,
    /// boundary, or part body) has been fully produced; `total` is fixed
    /// before rendering starts, so the pair normalizes to a percentage.
    #[must_use]
    pub fn progress(&self) -> (usize, usize) {
        (self.processed_chunks, self.total_chunks)
    }

    /// Returns true when the whole message has been produced and consumed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished && self.source.is_none() && self.ring.is_empty()
    }

    /// Borrows the contiguous bytes currently available for the consumer.
    #[must_use]
    pub fn view(&self) -> &[u8] {
        self.ring.readable()
    }

    /// Advances the read pointer past `n` consumed bytes.
    pub fn consume(&mut self, n: usize) {
        self.ring.consume(n);
    }

    /// Produces more output into the ring buffer.
    ///
    /// Drives the traversal FSM and the attached body source until the
    /// buffer is full or the message is complete. Call again after
    /// consuming bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when a body source fails to read; rendering cannot
    /// continue afterwards.
    pub fn pump(&mut self) -> Result<()> {
        loop {
            let Some(source) = self.source.as_mut() else {
                if self.state == State::Finished {
                    return Ok(());
                }
                self.advance();
                continue;
            };

            let free = self.ring.writable();
            if free.is_empty() {
                return Ok(());
            }

            let got = source
                .read(free)
                .map_err(|e| Error::Source(e.to_string()))?;
            if got == 0 {
                // End of stream: detach (dropping any encoder wrapper and
                // the source itself) and count the finished chunk.
                self.source = None;
                self.processed_chunks += 1;
                continue;
            }
            self.ring.commit(got);
        }
    }

    /// Attaches an in-memory chunk as the active source.
    fn enqueue(&mut self, chunk: Vec<u8>) {
        debug_assert!(self.source.is_none());
        self.source = Some(Box::new(Cursor::new(chunk)));
    }

    /// Runs one traversal step, attaching the next source or finishing.
    fn advance(&mut self) {
        match self.state {
            State::Idle => self.enter_body(),
            State::SimpleBody => {
                let content = match &mut self.root {
                    Part::Body(body) => std::mem::take(&mut body.content),
                    _ => BodyContent::default(),
                };
                self.source = Some(content.into_reader());
                self.state = State::Finished;
            }
            State::MimeBoundary => self.emit_boundary(),
            State::MimePartHeaders => self.emit_part_headers(),
            State::MimePartBody => self.attach_part_body(),
            State::Finished => {}
        }
    }

    fn enter_body(&mut self) {
        match &self.root {
            Part::Multipart(mp) => {
                let mut chunk = self.top_headers.clone();
                chunk.extend_from_slice(&mp.cook_headers().render());
                chunk.extend_from_slice(b"\r\n");
                self.enqueue(chunk);
                self.stack.push(Frame { child: 0 });
                self.state = State::MimeBoundary;
            }
            _ => {
                let mut chunk = self.top_headers.clone();
                chunk.extend_from_slice(b"\r\n");
                self.enqueue(chunk);
                self.state = State::SimpleBody;
            }
        }
    }

    /// Emits the boundary for the current frame position.
    ///
    /// The prefix CRLF appears only after a leaf sibling (a nested
    /// multipart already ended with its own terminal boundary line); the
    /// `--` suffix marks the terminal boundary of a sequence.
    fn emit_boundary(&mut self) {
        let depth = self.stack.len() - 1;
        let child = self.stack[depth].child;
        let multipart = self.multipart_at(depth);

        let mut chunk = Vec::new();
        if child > 0 {
            if let Some(Part::Mime(_)) = multipart.parts().get(child - 1) {
                chunk.extend_from_slice(b"\r\n");
            }
        }
        chunk.extend_from_slice(b"--");
        chunk.extend_from_slice(multipart.boundary().as_bytes());
        let at_end = child >= multipart.len();
        if at_end {
            chunk.extend_from_slice(b"--");
        }
        chunk.extend_from_slice(b"\r\n");
        self.enqueue(chunk);

        if at_end {
            self.stack.pop();
            if let Some(parent) = self.stack.last_mut() {
                parent.child += 1;
                self.state = State::MimeBoundary;
            } else {
                self.state = State::Finished;
            }
        } else {
            self.state = State::MimePartHeaders;
        }
    }

    fn emit_part_headers(&mut self) {
        let depth = self.stack.len() - 1;
        let child = self.stack[depth].child;

        if matches!(
            self.multipart_at(depth).parts().get(child),
            Some(Part::Multipart(_))
        ) {
            // Descend: the parent frame stays on this child until the
            // nested terminal boundary has been emitted.
            let chunk = {
                let Some(Part::Multipart(nested)) = self.multipart_at(depth).parts().get(child)
                else {
                    unreachable!()
                };
                let mut chunk = nested.cook_headers().render();
                chunk.extend_from_slice(b"\r\n");
                chunk
            };
            self.stack.push(Frame { child: 0 });
            self.enqueue(chunk);
            self.state = State::MimeBoundary;
            return;
        }

        self.stack[depth].child += 1;

        let part = match self.multipart_at_mut(depth).parts_mut().get_mut(child) {
            Some(Part::Mime(part)) => part,
            _ => {
                // Children are Mime or Multipart by construction.
                self.state = State::MimeBoundary;
                return;
            }
        };

        let content_type = part
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| sniff_content_type(&part.content).to_string());

        let encoder = match part.encoder() {
            EncoderChoice::Auto => {
                if content_type.starts_with("text/") {
                    EncoderChoice::QuotedPrintable
                } else {
                    EncoderChoice::Base64
                }
            }
            other => other,
        };

        let mut headers = part.cook_headers();
        headers.set("Content-Type", content_type.as_bytes());
        match encoder {
            EncoderChoice::Base64 => headers.set("Content-Transfer-Encoding", "base64"),
            EncoderChoice::QuotedPrintable => {
                headers.set("Content-Transfer-Encoding", "quoted-printable");
            }
            EncoderChoice::Passthrough | EncoderChoice::Auto => {}
        }

        let content = std::mem::take(&mut part.content);
        self.pending_body = Some((encoder, content));

        let mut chunk = headers.render();
        chunk.extend_from_slice(b"\r\n");
        self.enqueue(chunk);
        self.state = State::MimePartBody;
    }

    fn attach_part_body(&mut self) {
        let Some((encoder, content)) = self.pending_body.take() else {
            self.state = State::MimeBoundary;
            return;
        };

        let reader = content.into_reader();
        self.source = Some(match encoder {
            EncoderChoice::Base64 => Box::new(Base64Encoder::new(reader)),
            EncoderChoice::QuotedPrintable => Box::new(QuotedPrintableEncoder::new(reader)),
            EncoderChoice::Passthrough | EncoderChoice::Auto => reader,
        });
        self.state = State::MimeBoundary;
    }

    /// Resolves the multipart the frame at `depth` iterates over.
    ///
    /// Ancestor frames each point at the child that was descended into, so
    /// the path is implied by the stack itself.
    fn multipart_at(&self, depth: usize) -> &MimeMultipart {
        let Part::Multipart(root_mp) = &self.root else {
            panic!("traversal stack without multipart root");
        };
        let mut current = root_mp;
        for frame in &self.stack[..depth] {
            match current.parts().get(frame.child) {
                Some(Part::Multipart(nested)) => current = nested,
                _ => panic!("stack frame does not address a multipart"),
            }
        }
        current
    }

    fn multipart_at_mut(&mut self, depth: usize) -> &mut MimeMultipart {
        let Part::Multipart(root_mp) = &mut self.root else {
            panic!("traversal stack without multipart root");
        };
        let mut current = root_mp;
        for frame in &self.stack[..depth] {
            match current.parts_mut().get_mut(frame.child) {
                Some(Part::Multipart(nested)) => current = nested,
                _ => panic!("stack frame does not address a multipart"),
            }
        }
        current
    }
}

impl std::fmt::Debug for MessageRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRenderer")
            .field("state", &self.state)
            .field("processed_chunks", &self.processed_chunks)
            .field("total_chunks", &self.total_chunks)
            .finish_non_exhaustive()
    }
}

/// Counts the chunks a multipart will enqueue: its header block, one
/// boundary plus headers and body per leaf, the nested counts, and the
/// terminal boundary.
fn count_chunks(multipart: &MimeMultipart) -> usize {
    let mut total = 1;
    for part in multipart.parts() {
        total += 1;
        total += match part {
            Part::Multipart(nested) => count_chunks(nested),
            _ => 2,
        };
    }
    total + 1
}

/// Resolves a content type for a part that did not declare one.
///
/// Stands in for an external MIME database: a handful of magic numbers,
/// then an ASCII heuristic, falling back to `text/plain; charset=us-ascii`.
/// Streaming sources cannot be peeked and resolve to octet-stream.
fn sniff_content_type(content: &BodyContent) -> &'static str {
    let Some(bytes) = content.bytes() else {
        return "application/octet-stream";
    };

    const MAGIC: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b", "application/gzip"),
    ];
    for (magic, mime) in MAGIC {
        if bytes.starts_with(magic) {
            return mime;
        }
    }

    if bytes
        .iter()
        .all(|&b| b == b'\t' || b == b'\r' || b == b'\n' || (0x20..0x7f).contains(&b))
    {
        "text/plain; charset=us-ascii"
    } else {
        "application/octet-stream"
    }
}
