//! Protocol constants (spec §6). One definition site so both the router
//! and (eventually) a host-side counterpart import identical values —
//! drifting these between endpoints is the single most common source of
//! interop bugs.

pub const PROTOCOL_VERSION: u8 = 0x02;

/// Implementer's choice, per spec's open question; frozen here. Both
/// endpoints must agree on this value.
pub const MAX_PAYLOAD_SIZE: usize = 256;

pub const FRAME_DELIMITER: u8 = 0x00;
pub const CRC_TRAILER_SIZE: usize = 4;
pub const FRAME_HEADER_SIZE: usize = 5; // version(1) + payload_length(2) + command_id(2)

/// Header + max payload + CRC trailer: the largest a *decoded* frame may be.
pub const MAX_RAW_FRAME_SIZE: usize = FRAME_HEADER_SIZE + MAX_PAYLOAD_SIZE + CRC_TRAILER_SIZE;

/// Worst-case COBS-stuffed size of `MAX_RAW_FRAME_SIZE` bytes plus the
/// trailing delimiter, per spec §4.1 ("ceil(N/254) + 1 bytes plus the
/// terminator").
pub const MAX_ENCODED_FRAME_SIZE: usize = MAX_RAW_FRAME_SIZE + MAX_RAW_FRAME_SIZE.div_ceil(254) + 1;

pub const COMPRESSION_FLAG: u16 = 0x8000;
pub const COMMAND_ID_MASK: u16 = 0x7fff;

pub const HANDSHAKE_NONCE_LEN: usize = 16;
pub const HANDSHAKE_TAG_LEN: usize = 16;
pub const MAX_SHARED_SECRET_LEN: usize = 32;

pub const HKDF_SALT: &[u8] = b"bridge/v2/handshake";
pub const HKDF_INFO: &[u8] = b"auth";

pub const DEFAULT_ACK_TIMEOUT_MS: u32 = 75;
pub const ACK_TIMEOUT_MS_MIN: u32 = 25;
pub const ACK_TIMEOUT_MS_MAX: u32 = 60_000;

pub const DEFAULT_ACK_RETRY_LIMIT: u8 = 3;
pub const ACK_RETRY_LIMIT_MIN: u8 = 1;
pub const ACK_RETRY_LIMIT_MAX: u8 = 8;

pub const DEFAULT_RESPONSE_TIMEOUT_MS: u32 = 100;
pub const RESPONSE_TIMEOUT_MS_MIN: u32 = 100;
pub const RESPONSE_TIMEOUT_MS_MAX: u32 = 180_000;

pub const STARTUP_STABILIZATION_MS: u32 = 100;
pub const BAUD_SETTLE_MS: u32 = 50;
pub const MAX_CONSECUTIVE_CRC_ERRORS: u8 = 5;
pub const RX_DEDUP_INTERVAL_MS: u32 = 1000;

/// Minimum capacity of the critical-frame TX queue (spec §4.7).
pub const TX_QUEUE_MIN_CAPACITY: usize = 3;

/// Flow-control watermarks, expressed against an assumed input buffer
/// size (spec §4.4 example: 64 bytes, 75%/25%).
pub const FLOW_CONTROL_BUFFER_SIZE: usize = 64;
pub const FLOW_CONTROL_HIGH_WATERMARK: usize = (FLOW_CONTROL_BUFFER_SIZE * 3) / 4; // 48
pub const FLOW_CONTROL_LOW_WATERMARK: usize = FLOW_CONTROL_BUFFER_SIZE / 4; // 16

/// LINK_RESET config payload: ack_timeout_ms(u16) + retry_limit(u8) + response_timeout_ms(u32).
pub const LINK_RESET_PAYLOAD_LEN: usize = 7;

pub mod command_id {
    // STATUS: 0x0000-0x00FF
    pub const STATUS_OK: u16 = 0x0000;
    pub const STATUS_ERROR: u16 = 0x0001;
    pub const STATUS_ACK: u16 = 0x0002;
    pub const STATUS_CMD_UNKNOWN: u16 = 0x0003;
    pub const STATUS_MALFORMED: u16 = 0x0004;
    pub const STATUS_CRC_MISMATCH: u16 = 0x0005;
    pub const STATUS_TIMEOUT: u16 = 0x0006;
    pub const STATUS_NOT_IMPLEMENTED: u16 = 0x0007;
    pub const STATUS_OVERFLOW: u16 = 0x0008;

    // SYSTEM: 0x0100-0x01FF
    pub const LINK_SYNC: u16 = 0x0100;
    pub const LINK_SYNC_RESP: u16 = 0x0101;
    pub const LINK_RESET: u16 = 0x0102;
    pub const LINK_RESET_RESP: u16 = 0x0103;
    pub const GET_VERSION: u16 = 0x0104;
    pub const GET_VERSION_RESP: u16 = 0x0105;
    pub const SET_BAUDRATE: u16 = 0x0106;
    pub const SET_BAUDRATE_RESP: u16 = 0x0107;
    pub const XOFF: u16 = 0x0108;
    pub const XON: u16 = 0x0109;

    // GPIO: 0x0200-0x02FF
    pub const SET_PIN_MODE: u16 = 0x0200;
    pub const DIGITAL_WRITE: u16 = 0x0201;
    pub const DIGITAL_READ: u16 = 0x0202;
    pub const DIGITAL_READ_RESP: u16 = 0x0203;
    pub const ANALOG_WRITE: u16 = 0x0204;
    pub const ANALOG_READ: u16 = 0x0205;
    pub const ANALOG_READ_RESP: u16 = 0x0206;

    // CONSOLE: 0x0300-0x03FF
    pub const CONSOLE_WRITE: u16 = 0x0300;
    pub const CONSOLE_READ: u16 = 0x0301;
    pub const CONSOLE_READ_RESP: u16 = 0x0302;

    // DATASTORE: 0x0400-0x04FF
    pub const DATASTORE_PUT: u16 = 0x0400;
    pub const DATASTORE_GET: u16 = 0x0401;
    pub const DATASTORE_GET_RESP: u16 = 0x0402;

    // MAILBOX: 0x0500-0x05FF
    pub const MAILBOX_PUSH: u16 = 0x0500;
    pub const MAILBOX_PEEK: u16 = 0x0501;
    pub const MAILBOX_POP: u16 = 0x0502;

    // FILESYSTEM: 0x0600-0x06FF
    pub const FILE_OPEN: u16 = 0x0600;
    pub const FILE_READ: u16 = 0x0601;
    pub const FILE_WRITE: u16 = 0x0602;
    pub const FILE_CLOSE: u16 = 0x0603;

    // PROCESS: 0x0700-0x07FF
    pub const PROCESS_RUN: u16 = 0x0700;
    pub const PROCESS_RUN_RESP: u16 = 0x0701;
    pub const PROCESS_CHECK: u16 = 0x0702;
}

/// Commands that require an ACK ("critical" set, spec §4.11), centralized
/// here rather than scattered across runtime checks.
pub const REQUIRES_ACK: &[u16] = &[
    command_id::CONSOLE_WRITE,
    command_id::DATASTORE_PUT,
    command_id::MAILBOX_PUSH,
    command_id::FILE_WRITE,
    command_id::SET_PIN_MODE,
    command_id::DIGITAL_WRITE,
    command_id::ANALOG_WRITE,
];

pub fn requires_ack(command_id: u16) -> bool {
    REQUIRES_ACK.contains(&command_id)
}

/// Frames that may be emitted while `Unsynchronized` (spec §3).
pub const HANDSHAKE_WHITELIST: &[u16] = &[
    command_id::LINK_SYNC,
    command_id::LINK_SYNC_RESP,
    command_id::LINK_RESET,
    command_id::LINK_RESET_RESP,
    command_id::GET_VERSION_RESP,
];

pub fn is_handshake_frame(command_id: u16) -> bool {
    HANDSHAKE_WHITELIST.contains(&command_id)
}
