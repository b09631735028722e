//! Newline framing for byte streams whose chunk boundaries are arbitrary.
//!
//! Chunks are appended to a byte buffer; every complete `\n`-terminated line
//! is split off as a record and the unterminated tail waits for the next
//! chunk. Buffering bytes (not text) keeps multi-byte characters intact when
//! a chunk boundary falls inside one.

use futures::{Stream, StreamExt};

pub const RECORD_SEPARATOR: u8 = b'\n';

/// Incremental newline splitter.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every record it completed, in order.
    ///
    /// Blank records are skipped. A trailing `\r` is stripped so CRLF
    /// producers frame the same way.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // The retained tail holds no separator, so only the new bytes need scanning.
        let mut search_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[search_from..]
            .iter()
            .position(|byte| *byte == RECORD_SEPARATOR)
        {
            let end = search_from + offset;
            if let Some(record) = decode_record(&self.buffer[start..end]) {
                records.push(record);
            }
            start = end + 1;
            search_from = start;
        }
        self.buffer.drain(..start);
        records
    }

    /// Bytes held back waiting for a separator.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// End of input. The unterminated tail is discarded, never promoted to a
    /// record; returns how many bytes were dropped.
    pub fn finish(self) -> usize {
        self.buffer.len()
    }
}

fn decode_record(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = String::from_utf8_lossy(line);
    if text.trim().is_empty() {
        return None;
    }
    Some(text.into_owned())
}

/// Adapt a stream of byte chunks into a lazy stream of records.
///
/// A chunk error is passed through and ends the stream; records completed
/// before it have already been yielded.
pub fn records<S, B, E>(chunks: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    async_stream::stream! {
        let mut chunks = std::pin::pin!(chunks);
        let mut decoder = LineDecoder::new();

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    for record in decoder.push(bytes.as_ref()) {
                        yield Ok(record);
                    }
                }
                Err(err) => {
                    yield Err(err);
                    return;
                }
            }
        }

        let dropped = decoder.finish();
        if dropped > 0 {
            tracing::debug!(dropped, "discarding unterminated trailing record");
        }
    }
}
