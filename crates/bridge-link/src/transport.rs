//! Transport layer (spec §4.4): owns the byte stream, the COBS framing
//! around it, and flow control. Everything above this layer only ever
//! sees decoded `Frame`s; everything below it is raw bytes.

use bridge_common::stream::{Stream, StreamReadError, StreamWriteError};

use crate::cobs;
use crate::consts::{
    FRAME_DELIMITER, MAX_ENCODED_FRAME_SIZE, MAX_RAW_FRAME_SIZE, FLOW_CONTROL_HIGH_WATERMARK,
    FLOW_CONTROL_LOW_WATERMARK,
};
use crate::error::TransportError;
use crate::frame::Frame;

/// A flow-control edge transition the caller should act on by emitting
/// an `XOFF`/`XON` frame. Only fires on the watermark crossing, not on
/// every poll, so the link doesn't spam control frames (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSignal {
    None,
    AssertXoff,
    AssertXon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowState {
    Open,
    Throttled,
}

pub struct Transport<S> {
    stream: S,
    rx_buf: [u8; MAX_ENCODED_FRAME_SIZE],
    rx_len: usize,
    decode_buf: [u8; MAX_RAW_FRAME_SIZE],
    last_tx: [u8; MAX_ENCODED_FRAME_SIZE],
    last_tx_len: usize,
    flow_state: FlowState,
}

impl<S: Stream> Transport<S> {
    pub fn new(stream: S) -> Self {
        Transport {
            stream,
            rx_buf: [0u8; MAX_ENCODED_FRAME_SIZE],
            rx_len: 0,
            decode_buf: [0u8; MAX_RAW_FRAME_SIZE],
            last_tx: [0u8; MAX_ENCODED_FRAME_SIZE],
            last_tx_len: 0,
            flow_state: FlowState::Open,
        }
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Builds, COBS-encodes, and writes a frame. The encoded bytes are
    /// retained so `resend_last` can retransmit on an ACK timeout
    /// without re-deriving them.
    pub fn send_frame(
        &mut self,
        command_id: u16,
        payload: &[u8],
        compressed: bool,
    ) -> Result<(), TransportError> {
        let mut raw = [0u8; MAX_RAW_FRAME_SIZE];
        let raw_len = Frame::build(&mut raw, command_id, payload, compressed)
            .map_err(TransportError::Frame)?;

        let encoded_len = cobs::encode(&raw[..raw_len], &mut self.last_tx)
            .map_err(TransportError::Cobs)?;
        self.last_tx_len = encoded_len;

        self.write_all(encoded_len)
    }

    /// Retransmits the most recently sent frame verbatim (spec §4.11:
    /// retry must resend identical bytes, not rebuild the frame, so a
    /// peer that already saw it once can dedup on CRC).
    pub fn resend_last(&mut self) -> Result<(), TransportError> {
        if self.last_tx_len == 0 {
            return Ok(());
        }
        self.write_all(self.last_tx_len)
    }

    fn write_all(&mut self, len: usize) -> Result<(), TransportError> {
        let mut written = 0;
        while written < len {
            written += self
                .stream
                .write(&self.last_tx[written..len])
                .map_err(TransportError::StreamWrite)?;
        }
        Ok(())
    }

    /// Pulls whatever bytes are currently available from the stream into
    /// the accumulation buffer and, if a full delimited frame is now
    /// present, decodes and parses it.
    pub fn poll_rx(&mut self) -> Result<Option<Frame>, TransportError> {
        let rx_len = self.rx_len;
        match self.stream.read(&mut self.rx_buf[rx_len..]) {
            Ok(n) => self.rx_len += n,
            Err(StreamReadError::WouldBlock) => {}
            Err(e) => return Err(TransportError::StreamRead(e)),
        }

        if self.rx_len >= self.rx_buf.len() {
            // No delimiter seen across a full buffer's worth of bytes:
            // drop everything and resynchronize on the next delimiter,
            // rather than wedging forever.
            self.rx_len = 0;
            return Err(TransportError::RxOverflow);
        }

        let Some(delim_pos) = self.rx_buf[..self.rx_len]
            .iter()
            .position(|&b| b == FRAME_DELIMITER)
        else {
            return Ok(None);
        };

        let frame_end = delim_pos + 1;
        let decoded_len = cobs::decode(
            &self.rx_buf[..frame_end],
            &mut self.decode_buf,
            MAX_RAW_FRAME_SIZE,
        )
        .map_err(TransportError::Cobs)?;

        // Shift any bytes belonging to the next frame to the front.
        self.rx_buf.copy_within(frame_end..self.rx_len, 0);
        self.rx_len -= frame_end;

        let frame = Frame::parse(&self.decode_buf[..decoded_len]).map_err(TransportError::Frame)?;
        Ok(Some(frame))
    }

    /// Compares the stream's reported fill level against the watermarks
    /// and returns an edge-triggered signal for the caller to act on.
    /// Streams that can't report fill level (`bytes_available() ==
    /// None`) never throttle.
    pub fn check_flow_control(&mut self) -> FlowSignal {
        let Some(fill) = self.stream.bytes_available() else {
            return FlowSignal::None;
        };

        match self.flow_state {
            FlowState::Open if fill >= FLOW_CONTROL_HIGH_WATERMARK => {
                self.flow_state = FlowState::Throttled;
                FlowSignal::AssertXoff
            }
            FlowState::Throttled if fill <= FLOW_CONTROL_LOW_WATERMARK => {
                self.flow_state = FlowState::Open;
                FlowSignal::AssertXon
            }
            _ => FlowSignal::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_common::stream::{StreamRead, StreamWrite};
    use std::collections::VecDeque;

    struct LoopbackStream {
        inbox: VecDeque<u8>,
        outbox: Vec<u8>,
        fill: Option<usize>,
    }

    impl LoopbackStream {
        fn new() -> Self {
            LoopbackStream {
                inbox: VecDeque::new(),
                outbox: Vec::new(),
                fill: None,
            }
        }

        fn feed(&mut self, bytes: &[u8]) {
            self.inbox.extend(bytes);
        }
    }

    impl StreamRead for LoopbackStream {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamReadError> {
            let n = buf.len().min(self.inbox.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.inbox.pop_front().unwrap();
            }
            Ok(n)
        }

        fn bytes_available(&self) -> Option<usize> {
            self.fill
        }
    }

    impl StreamWrite for LoopbackStream {
        fn write(&mut self, buf: &[u8]) -> Result<usize, StreamWriteError> {
            self.outbox.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) {}
    }

    #[test]
    fn send_frame_writes_cobs_delimited_bytes() {
        let mut transport = Transport::new(LoopbackStream::new());
        transport.send_frame(0x0300, b"hi", false).unwrap();
        let out = &transport.stream.outbox;
        assert_eq!(*out.last().unwrap(), FRAME_DELIMITER);
        assert!(!out[..out.len() - 1].contains(&FRAME_DELIMITER));
    }

    #[test]
    fn poll_rx_returns_none_until_delimiter_arrives() {
        let mut transport = Transport::new(LoopbackStream::new());
        transport.stream.feed(&[1, 2, 3]);
        assert!(transport.poll_rx().unwrap().is_none());
    }

    #[test]
    fn send_then_loop_back_parses_identical_frame() {
        let mut sender = Transport::new(LoopbackStream::new());
        sender.send_frame(0x0300, b"hello", false).unwrap();
        let wire = sender.stream.outbox.clone();

        let mut receiver = Transport::new(LoopbackStream::new());
        receiver.stream.feed(&wire);
        let frame = receiver.poll_rx().unwrap().expect("frame decoded");
        assert_eq!(frame.command_id, 0x0300);
        assert_eq!(frame.payload(), b"hello");
    }

    #[test]
    fn resend_last_retransmits_identical_bytes() {
        let mut transport = Transport::new(LoopbackStream::new());
        transport.send_frame(0x0300, b"hi", false).unwrap();
        let first = transport.stream.outbox.clone();
        transport.stream.outbox.clear();
        transport.resend_last().unwrap();
        assert_eq!(transport.stream.outbox, first);
    }

    #[test]
    fn flow_control_asserts_xoff_then_xon_with_hysteresis() {
        let mut transport = Transport::new(LoopbackStream::new());
        transport.stream.fill = Some(0);
        assert_eq!(transport.check_flow_control(), FlowSignal::None);

        transport.stream.fill = Some(FLOW_CONTROL_HIGH_WATERMARK);
        assert_eq!(transport.check_flow_control(), FlowSignal::AssertXoff);
        // Staying high doesn't re-fire.
        assert_eq!(transport.check_flow_control(), FlowSignal::None);

        transport.stream.fill = Some(FLOW_CONTROL_HIGH_WATERMARK - 1);
        assert_eq!(transport.check_flow_control(), FlowSignal::None);

        transport.stream.fill = Some(FLOW_CONTROL_LOW_WATERMARK);
        assert_eq!(transport.check_flow_control(), FlowSignal::AssertXon);
    }
}
