/*! A reliable, authenticated, length-prefixed binary RPC link between a
resource-constrained MCU and a Linux host over a point-to-point serial
channel.

The layers, bottom to top:

- [`cobs`] / [`crc32`] — byte-stuffing and the frame checksum.
- [`frame`] — the wire layout: `version | payload_length | command_id |
  payload | crc32`.
- [`transport`] — owns the byte stream, frames it, and tracks flow control.
- [`fsm`] — the four-state link state machine (`Unsynchronized`,
  `Idle`, `AwaitingAck`, `Fault`).
- [`timer`] — the fixed set of named one-shot timers the engine schedules.
- [`queue`] — the bounded FIFO of critical frames awaiting ACK.
- [`crypto`] — the HKDF/HMAC handshake responder.
- [`compression`] — the optional run-length payload codec.
- [`router`] — categorizes and dispatches decoded application commands.
- [`status`] — status codes and the link-health observation hook.
- [`engine`] — composes everything above behind `LinkEngine::tick`.

No module here allocates or blocks; every buffer is a fixed-size array
sized from `consts::MAX_PAYLOAD_SIZE`. */

#![no_std]

pub mod cobs;
pub mod compression;
pub mod consts;
pub mod crc32;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod frame;
pub mod fsm;
pub mod queue;
pub mod router;
pub mod status;
pub mod timer;
pub mod transport;

pub use engine::{LinkConfig, LinkEngine};
pub use error::LinkError;
pub use fsm::{LinkEvent, LinkState};
pub use frame::Frame;
pub use router::{Category, CommandContext, CommandRouter, RouterOutcome};
pub use status::{NullStatusCallback, StatusCallback, StatusCode};
