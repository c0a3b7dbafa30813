//! Error taxonomy (spec §7). Every fallible operation returns a typed,
//! `Debug`/`PartialEq` enum — no panics on any data-driven path.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CobsError {
    /// The destination buffer cannot hold the worst-case encoded size.
    BufferTooSmall,
    /// A run-length code claimed more bytes than remained in the input.
    DecodeError,
    /// The decoded length would exceed the caller's output capacity.
    Overflow,
}

/// Frame build/parse errors (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    BufferTooSmall,
    PayloadTooLarge,
    /// Too short for header+CRC, declared length inconsistent with
    /// actual length, or version mismatch.
    Malformed,
    CrcMismatch,
    Overflow,
}

/// Run-length codec errors (spec §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionError {
    /// The destination buffer is too small for the result.
    OutputTooSmall,
    /// An escape sequence was truncated at the end of the input.
    Malformed,
}

/// Handshake/crypto errors (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// The received authentication tag did not match.
    TagMismatch,
    /// A nonce or shared secret was the wrong length.
    InvalidLength,
    /// The power-on self-test known-answer vectors did not match.
    SelfTestFailed,
}

/// Transport-level errors (spec §4.4), wrapping the lower codecs plus
/// the underlying stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    StreamRead(bridge_common::stream::StreamReadError),
    StreamWrite(bridge_common::stream::StreamWriteError),
    Cobs(CobsError),
    Frame(FrameError),
    /// The RX accumulation buffer filled without seeing a delimiter.
    RxOverflow,
}

/// Errors surfaced by the public `LinkEngine` API (spec §7's
/// "resource errors": immediate failure to the caller, no side effects).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The TX queue has no room for another critical frame.
    QueueFull,
    /// The payload is larger than `MAX_PAYLOAD_SIZE`.
    PayloadTooLarge,
    /// The link is `Unsynchronized` and the frame is not a
    /// handshake/system frame.
    NotSynchronized,
    /// The link is in `Fault`; no outbound traffic is possible.
    Fault,
    /// A `LINK_RESET` payload was malformed or the wrong length.
    InvalidConfig,
    /// The handshake or a subsequent authenticated frame failed a crypto check.
    Crypto(CryptoError),
}
