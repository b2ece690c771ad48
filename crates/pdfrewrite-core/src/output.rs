//! Append-only byte sink with a monotonic position counter
//!
//! The counter is the only source of cross-reference offsets: every write
//! returns the offset at which its bytes begin.

use std::io::{self, Write};

pub struct OutputStream<W: Write> {
    sink: W,
    position: u64,
}

impl<W: Write> OutputStream<W> {
    pub fn new(sink: W) -> Self {
        Self { sink, position: 0 }
    }

    /// Append `bytes`, returning the offset of their first byte
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<u64> {
        let start = self.position;
        self.sink.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(start)
    }

    pub fn write_str(&mut self, text: &str) -> io::Result<u64> {
        self.write(text.as_bytes())
    }

    /// Bytes written so far
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}
