//! AMI wire decoding
//!
//! Asterisk writes packets as `Key: Value` lines terminated by an empty
//! line. [`FrameDecoder`] accumulates raw bytes from the socket and yields
//! complete [`Frame`]s; a partial packet stays buffered until the rest
//! arrives. The `Asterisk Call Manager/x.y` greeting sent on connect is
//! skipped.

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::error::{AmiError, AmiResult};
use crate::frame::Frame;

/// Upper bound on a single buffered packet
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

const BANNER_PREFIX: &str = "Asterisk Call Manager";

/// Incremental decoder for inbound AMI packets
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
    /// Dropping the tail of an oversized packet up to its terminator
    discarding: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_frame_size,
            discarding: false,
        }
    }

    /// Append bytes read from the connection
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes waiting for a packet terminator
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Pop the next complete frame
    ///
    /// Returns `Ok(None)` when more data is needed. An oversized packet is
    /// reported once as a codec error and skipped through its terminating
    /// blank line; decoding resumes with the packet after it.
    pub fn next_frame(&mut self) -> AmiResult<Option<Frame>> {
        loop {
            if !self.discarding {
                self.skip_banner();
            }

            let Some((end, terminator_len)) = find_terminator(&self.buffer) else {
                if self.discarding {
                    self.keep_tail();
                    return Ok(None);
                }
                if self.buffer.len() > self.max_frame_size {
                    let dropped = self.buffer.len();
                    self.discarding = true;
                    self.keep_tail();
                    return Err(self.oversized(dropped));
                }
                return Ok(None);
            };

            if self.discarding {
                self.buffer.advance(end + terminator_len);
                self.discarding = false;
                debug!("Resynchronised after oversized packet");
                continue;
            }
            if end > self.max_frame_size {
                self.buffer.advance(end + terminator_len);
                return Err(self.oversized(end));
            }

            let block = self.buffer.split_to(end);
            self.buffer.advance(terminator_len);

            let text = String::from_utf8_lossy(&block);
            let frame = parse_block(&text);
            if frame.is_empty() {
                // Stray blank lines between packets
                continue;
            }
            return Ok(Some(frame));
        }
    }

    fn oversized(&self, size: usize) -> AmiError {
        AmiError::Codec(format!("Packet exceeds {} bytes ({} buffered)", self.max_frame_size, size))
    }

    /// Drop buffered bytes of a discarded packet, keeping enough to spot a
    /// terminator split across reads
    fn keep_tail(&mut self) {
        let keep = self.buffer.len().min(3);
        self.buffer.advance(self.buffer.len() - keep);
    }

    fn skip_banner(&mut self) {
        if !self.buffer.starts_with(BANNER_PREFIX.as_bytes()) {
            return;
        }
        if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            debug!("AMI greeting: {}", String::from_utf8_lossy(&line).trim_end());
        }
    }
}

/// Find the end of the first packet: a blank line in either `\r\n` or `\n` style
fn find_terminator(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| (p, 4));
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|p| (p, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_block(text: &str) -> Frame {
    let mut frame = Frame::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() => frame.insert(key, value.trim()),
            _ => warn!("Skipping malformed AMI line: {:?}", line),
        }
    }
    frame
}

/// Decode every complete frame in `data` at once
pub fn decode_all(data: &[u8]) -> AmiResult<Vec<Frame>> {
    let mut decoder = FrameDecoder::new();
    decoder.extend(data);
    let mut frames = Vec::new();
    while let Some(frame) = decoder.next_frame()? {
        frames.push(frame);
    }
    Ok(frames)
}
