//! Per-stream line assembly with a size limit

use bytes::{Bytes, BytesMut};

/// A complete line ready for classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledLine {
    /// Content followed by its terminator, if any
    pub bytes: Bytes,
    /// Whether the original line exceeded the limit
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Buffering bytes of the current line
    Accumulating,
    /// Limit exceeded; dropping bytes until the next `\n`
    Discarding,
}

/// Splits a byte stream into lines
///
/// Lines are delimited by `\n`. With a non-zero `max_line_length`, a line
/// whose total length (content plus terminator) exceeds the limit is
/// emitted with only its first `max_line_length` content bytes followed by
/// its terminator, and marked truncated. Pending bytes never grow beyond
/// the limit between calls.
#[derive(Debug)]
pub struct LineAssembler {
    pending: BytesMut,
    mode: Mode,
    max_line_length: usize,
}

impl LineAssembler {
    /// Create an empty assembler; `max_line_length` of 0 means unlimited
    #[must_use]
    pub fn new(max_line_length: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            mode: Mode::Accumulating,
            max_line_length,
        }
    }

    /// Bytes of the current unterminated line
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the current line has been cut at the limit
    #[must_use]
    pub fn is_discarding(&self) -> bool {
        self.mode == Mode::Discarding
    }

    fn limited(&self) -> bool {
        self.max_line_length > 0
    }

    /// Feed a chunk, pushing every line it completes onto `out`
    pub fn feed(&mut self, mut chunk: &[u8], out: &mut Vec<AssembledLine>) {
        while !chunk.is_empty() {
            let newline = chunk.iter().position(|&b| b == b'\n');

            if self.mode == Mode::Discarding {
                let Some(idx) = newline else {
                    return;
                };
                let (head, rest) = chunk.split_at(idx + 1);
                let mut line = self.pending.split();
                line.extend_from_slice(terminator_of(head));
                out.push(AssembledLine {
                    bytes: line.freeze(),
                    truncated: true,
                });
                self.mode = Mode::Accumulating;
                chunk = rest;
                continue;
            }

            let Some(idx) = newline else {
                self.pending.extend_from_slice(chunk);
                if self.limited() && self.pending.len() > self.max_line_length {
                    self.pending.truncate(self.max_line_length);
                    self.mode = Mode::Discarding;
                }
                return;
            };

            let (head, rest) = chunk.split_at(idx + 1);
            self.pending.extend_from_slice(head);
            let line = self.pending.split().freeze();
            chunk = rest;

            if self.limited() && line.len() > self.max_line_length {
                out.push(self.truncate_line(&line));
            } else {
                out.push(AssembledLine {
                    bytes: line,
                    truncated: false,
                });
            }
        }
    }

    /// Emit the pending partial line, if any, and reset
    pub fn flush(&mut self) -> Option<AssembledLine> {
        let truncated = self.mode == Mode::Discarding;
        self.mode = Mode::Accumulating;
        if self.pending.is_empty() {
            return None;
        }
        Some(AssembledLine {
            bytes: self.pending.split().freeze(),
            truncated,
        })
    }

    /// Cut an over-long terminated line down to the limit
    ///
    /// The terminator is never split: it is taken whole from the original
    /// line and the content keeps at most `max_line_length` bytes.
    fn truncate_line(&self, line: &[u8]) -> AssembledLine {
        let terminator = terminator_of(line);
        let content_len = line.len() - terminator.len();
        let keep = content_len.min(self.max_line_length);

        let mut bytes = BytesMut::with_capacity(keep + terminator.len());
        bytes.extend_from_slice(&line[..keep]);
        bytes.extend_from_slice(terminator);
        AssembledLine {
            bytes: bytes.freeze(),
            truncated: true,
        }
    }
}

/// Trailing `\r* \n` of a line ending in `\n`
fn terminator_of(line: &[u8]) -> &[u8] {
    let Some(body) = line.strip_suffix(b"\n") else {
        return &[];
    };
    let crs = body.iter().rev().take_while(|&&b| b == b'\r').count();
    &line[line.len() - crs - 1..]
}
