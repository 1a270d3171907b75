//! Newline framing for the socket transport.
//!
//! Reads arrive in arbitrary chunks. [`LineFramer`] buffers them and yields
//! each complete `\n`-terminated line, keeping any unterminated remainder for
//! the next push. Chunk boundaries never change the sequence of lines
//! produced.

/// Default cap on one unterminated frame (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame exceeds {limit} bytes without a newline")]
    Oversized { limit: usize },
}

/// Incremental line splitter.
#[derive(Debug, Clone)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_len,
        }
    }

    /// Append a chunk and drain every complete line.
    ///
    /// A trailing `\r` is stripped and blank lines are skipped. Invalid UTF-8
    /// is replaced lossily; the decoder then rejects the frame on its own.
    /// On overflow the buffer is cleared and the error returned.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, FrameError> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let mut line = &self.buf[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                lines.push(String::from_utf8_lossy(line).into_owned());
            }
            start = end + 1;
        }
        self.buf.drain(..start);

        if self.buf.len() > self.max_frame_len {
            self.buf.clear();
            return Err(FrameError::Oversized {
                limit: self.max_frame_len,
            });
        }
        Ok(lines)
    }

    /// Drop any partial frame (called when the connection goes away).
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Bytes held waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
