//! Incremental tokenizer for child-process output.
//!
//! Trainers print ordinary log lines and, in between, progress bars that redraw
//! themselves with a bare carriage return. Both kinds of boundary end a token
//! here, so progress updates show up as their own entries instead of being
//! glued onto the next line with control characters.

use futures::Stream;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::{ReaderStream, StreamReader};

/// Default read size for a single chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Unterminated bytes beyond `OVERFLOW_CHUNKS * chunk_size` are force-flushed.
const OVERFLOW_CHUNKS: usize = 4;

/// Splits a byte stream into trimmed, non-empty text tokens.
///
/// A token ends at `\n` (with a preceding `\r` stripped), at a bare `\r`, or
/// when the buffer overflows without seeing either. Invalid UTF-8 is replaced,
/// never fatal. One tokenizer serves exactly one process invocation.
#[derive(Debug)]
pub struct StreamTokenizer<R> {
    reader: R,
    chunk_size: usize,
    buf: Vec<u8>,
    scratch: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> StreamTokenizer<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    #[must_use]
    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { reader, chunk_size, buf: Vec::new(), scratch: vec![0; chunk_size], eof: false }
    }

    fn overflow_threshold(&self) -> usize {
        self.chunk_size * OVERFLOW_CHUNKS
    }

    /// Returns the next token, or `None` once the source is exhausted.
    pub async fn next_token(&mut self) -> io::Result<Option<String>> {
        loop {
            while let Some(raw) = self.take_terminated() {
                if let Some(token) = decode(&raw) {
                    return Ok(Some(token));
                }
            }

            if self.buf.len() > self.overflow_threshold() {
                let raw = self.take_overflow();
                if let Some(token) = decode(&raw) {
                    return Ok(Some(token));
                }
                continue;
            }

            if self.eof {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let raw = std::mem::take(&mut self.buf);
                return Ok(decode(&raw));
            }

            let n = self.reader.read(&mut self.scratch).await?;
            if n == 0 {
                self.eof = true;
            } else {
                self.buf.extend_from_slice(&self.scratch[..n]);
            }
        }
    }

    /// Pops the bytes before the first complete terminator, if any.
    fn take_terminated(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|b| *b == b'\n' || *b == b'\r')?;
        let consumed = if self.buf[pos] == b'\n' {
            pos + 1
        } else {
            match self.buf.get(pos + 1) {
                Some(b'\n') => pos + 2,
                Some(_) => pos + 1,
                // A trailing `\r` might be the first half of `\r\n`.
                None if self.eof => pos + 1,
                None => return None,
            }
        };

        let mut raw: Vec<u8> = self.buf.drain(..consumed).collect();
        raw.truncate(pos);
        Some(raw)
    }

    /// Pops the whole buffer, keeping back an incomplete trailing UTF-8 sequence.
    fn take_overflow(&mut self) -> Vec<u8> {
        let keep = incomplete_utf8_tail(&self.buf);
        let split = self.buf.len() - keep;
        let rest = self.buf.split_off(split);
        std::mem::replace(&mut self.buf, rest)
    }

    /// Turns the tokenizer into a `Stream` of tokens.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<String>> {
        futures::stream::try_unfold(self, |mut tokenizer| async move {
            Ok(tokenizer.next_token().await?.map(|token| (token, tokenizer)))
        })
    }
}

fn decode(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/// Number of trailing bytes that start a UTF-8 sequence the buffer doesn't finish.
fn incomplete_utf8_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let b = bytes[bytes.len() - back];
        if b & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = match b {
            0xF0..=0xFF => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

/// Interleaves two pipes into one reader, in arrival order.
///
/// Used to observe a child's stdout and stderr through a single tokenizer.
pub fn merge_readers<A, B>(first: A, second: B) -> impl AsyncRead + Unpin + Send
where
    A: AsyncRead + Unpin + Send,
    B: AsyncRead + Unpin + Send,
{
    StreamReader::new(futures::stream::select(ReaderStream::new(first), ReaderStream::new(second)))
}
