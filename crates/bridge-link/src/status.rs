//! Status codes (spec §6) and the local status-observation hook.

use crate::consts::command_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Error,
    CmdUnknown,
    Malformed,
    CrcMismatch,
    Timeout,
    NotImplemented,
    Ack,
    Overflow,
}

impl StatusCode {
    /// The wire command id a frame carrying this status is emitted under.
    pub const fn command_id(self) -> u16 {
        match self {
            StatusCode::Ok => command_id::STATUS_OK,
            StatusCode::Error => command_id::STATUS_ERROR,
            StatusCode::CmdUnknown => command_id::STATUS_CMD_UNKNOWN,
            StatusCode::Malformed => command_id::STATUS_MALFORMED,
            StatusCode::CrcMismatch => command_id::STATUS_CRC_MISMATCH,
            StatusCode::Timeout => command_id::STATUS_TIMEOUT,
            StatusCode::NotImplemented => command_id::STATUS_NOT_IMPLEMENTED,
            StatusCode::Ack => command_id::STATUS_ACK,
            StatusCode::Overflow => command_id::STATUS_OVERFLOW,
        }
    }
}

/// Optional hook invoked whenever the engine emits a status frame, so the
/// local application can observe link health without parsing wire
/// traffic (spec §6).
pub trait StatusCallback {
    fn on_status(&mut self, code: StatusCode);
}

/// A `StatusCallback` that does nothing, for callers that don't need the
/// hook.
pub struct NullStatusCallback;
impl StatusCallback for NullStatusCallback {
    fn on_status(&mut self, _code: StatusCode) {}
}
