//! The byte-stream interface consumed by the transport layer (spec §6).
//!
//! Exactly one component — `bridge_link::transport::Transport` — ever
//! touches an implementor of these traits; everything else in the link
//! engine only ever sees decoded frames.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamReadError {
    WouldBlock,
    /// The caller's read buffer was too small for what was available.
    BufferOverflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamWriteError {
    WouldBlock,
}

pub trait StreamRead {
    /// Copies as many currently-available bytes as fit into `buf`,
    /// returning how many were read. Never blocks.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamReadError>;

    /// Number of bytes the stream could currently deliver, if the
    /// platform can report it cheaply. Used by flow control (spec §4.4)
    /// to compute fill level against the configured watermark buffer
    /// size; a stream that can't report this simply returns `None` and
    /// flow control is skipped.
    fn bytes_available(&self) -> Option<usize> {
        None
    }
}

pub trait StreamWrite {
    fn write(&mut self, buf: &[u8]) -> Result<usize, StreamWriteError>;
    fn flush(&mut self);

    /// True while a previous `write` is still draining out the wire.
    fn is_tx_busy(&self) -> bool {
        false
    }

    /// Ends the stream and restarts it at `baud`, for `SET_BAUDRATE`
    /// (spec §4.10). Platforms that can't do this (e.g. a fixed-rate
    /// loopback in tests) may leave this a no-op.
    fn change_baud(&mut self, _baud: u32) {}
}

pub trait Stream: StreamRead + StreamWrite {}
impl<T: StreamRead + StreamWrite> Stream for T {}
