//! Incremental line splitting over a byte stream.
//!
//! The streaming response body arrives as arbitrary byte chunks; records
//! are newline-delimited. Chunk boundaries can fall anywhere, including in
//! the middle of a multi-byte UTF-8 character, so decoding has to be
//! stateful: undecoded trailing bytes are carried into the next `append`
//! rather than decoded per-chunk.

const REPLACEMENT: char = '\u{FFFD}';

/// Accumulates raw bytes and yields complete, newline-terminated records.
#[derive(Debug, Default)]
pub struct LineBuffer {
    /// Bytes not yet decoded (at most an incomplete UTF-8 sequence after
    /// each `append`).
    bytes: Vec<u8>,
    /// Decoded text not yet terminated by a newline.
    pending: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return the complete records it unlocked, in order.
    /// Records are trimmed; empty lines are dropped.
    pub fn append(&mut self, chunk: &[u8]) -> Vec<String> {
        self.bytes.extend_from_slice(chunk);
        self.decode_available();

        let mut records = Vec::new();
        while let Some(newline_pos) = self.pending.find('\n') {
            let line = self.pending[..newline_pos].trim().to_string();
            self.pending.drain(..=newline_pos);
            if !line.is_empty() {
                records.push(line);
            }
        }
        records
    }

    /// End-of-stream: a non-terminated remainder is not a valid record and
    /// is dropped silently.
    pub fn flush(&mut self) {
        self.bytes.clear();
        self.pending.clear();
    }

    /// Move the maximal decodable prefix of `bytes` into `pending`. A valid
    /// but incomplete trailing sequence stays buffered; invalid sequences
    /// become U+FFFD so a corrupt byte cannot stall the stream.
    fn decode_available(&mut self) {
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.bytes[start..]) {
                Ok(valid) => {
                    self.pending.push_str(valid);
                    start = self.bytes.len();
                    break;
                }
                Err(err) => {
                    let valid_up_to = start + err.valid_up_to();
                    // Safe: from_utf8 validated this prefix.
                    self.pending
                        .push_str(std::str::from_utf8(&self.bytes[start..valid_up_to]).unwrap_or(""));
                    match err.error_len() {
                        Some(bad_len) => {
                            self.pending.push(REPLACEMENT);
                            start = valid_up_to + bad_len;
                        }
                        None => {
                            // Incomplete trailing sequence: keep for the
                            // next chunk.
                            start = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }
        self.bytes.drain(..start);
    }
}
