//! Link engine (spec §4.8–§4.13, §3's lifecycle): composes the transport,
//! FSM, timer service, TX queue, crypto, router, and status callback into
//! the single instance a caller's `main` owns and drives with `tick()`,
//! the way the teacher's `SplitBus` composes its bus, clock, and queues
//! behind one `poll()` call.

use bridge_common::stream::Stream;
use bridge_common::{dev_error, dev_info, dev_warn};

use crate::compression::{self, should_compress};
use crate::consts::{
    command_id, is_handshake_frame, requires_ack, ACK_RETRY_LIMIT_MAX, ACK_RETRY_LIMIT_MIN,
    ACK_TIMEOUT_MS_MAX, ACK_TIMEOUT_MS_MIN, BAUD_SETTLE_MS, DEFAULT_ACK_RETRY_LIMIT,
    DEFAULT_ACK_TIMEOUT_MS, DEFAULT_RESPONSE_TIMEOUT_MS, HANDSHAKE_NONCE_LEN, HANDSHAKE_TAG_LEN,
    LINK_RESET_PAYLOAD_LEN, MAX_CONSECUTIVE_CRC_ERRORS, MAX_PAYLOAD_SIZE,
    RESPONSE_TIMEOUT_MS_MAX, RESPONSE_TIMEOUT_MS_MIN, RX_DEDUP_INTERVAL_MS,
    STARTUP_STABILIZATION_MS, TX_QUEUE_MIN_CAPACITY,
};
use crate::crypto::{self, SessionKey};
use crate::error::LinkError;
use crate::fsm::{self, LinkEvent, LinkState};
use crate::queue::{PendingFrame, TxQueue};
use crate::router::{Category, CommandContext, CommandRouter, RouterOutcome};
use crate::status::{StatusCallback, StatusCode};
use crate::timer::{TimerId, TimerService};
use crate::transport::{FlowSignal, Transport};

/// Mutable timing configuration, changeable only via a validated
/// `LINK_RESET` payload (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    pub ack_timeout_ms: u32,
    pub ack_retry_limit: u8,
    pub response_timeout_ms: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            ack_retry_limit: DEFAULT_ACK_RETRY_LIMIT,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
        }
    }
}

impl LinkConfig {
    /// Parses a 7-byte `LINK_RESET` payload (`ack_timeout_ms(u16 BE) |
    /// retry_limit(u8) | response_timeout_ms(u32 BE)`), falling back to
    /// the default for any field outside its valid range (spec S7).
    fn from_reset_payload(payload: &[u8]) -> Result<Self, LinkError> {
        if payload.len() != LINK_RESET_PAYLOAD_LEN {
            return Err(LinkError::InvalidConfig);
        }

        let ack_timeout_ms = u16::from_be_bytes([payload[0], payload[1]]) as u32;
        let ack_retry_limit = payload[2];
        let response_timeout_ms = u32::from_be_bytes([payload[3], payload[4], payload[5], payload[6]]);

        let defaults = LinkConfig::default();
        Ok(LinkConfig {
            ack_timeout_ms: if (ACK_TIMEOUT_MS_MIN..=ACK_TIMEOUT_MS_MAX).contains(&ack_timeout_ms) {
                ack_timeout_ms
            } else {
                defaults.ack_timeout_ms
            },
            ack_retry_limit: if (ACK_RETRY_LIMIT_MIN..=ACK_RETRY_LIMIT_MAX).contains(&ack_retry_limit) {
                ack_retry_limit
            } else {
                defaults.ack_retry_limit
            },
            response_timeout_ms: if (RESPONSE_TIMEOUT_MS_MIN..=RESPONSE_TIMEOUT_MS_MAX)
                .contains(&response_timeout_ms)
            {
                response_timeout_ms
            } else {
                defaults.response_timeout_ms
            },
        })
    }

    fn to_resp_payload(self) -> [u8; LINK_RESET_PAYLOAD_LEN] {
        let mut out = [0u8; LINK_RESET_PAYLOAD_LEN];
        out[0..2].copy_from_slice(&(self.ack_timeout_ms as u16).to_be_bytes());
        out[2] = self.ack_retry_limit;
        out[3..7].copy_from_slice(&self.response_timeout_ms.to_be_bytes());
        out
    }
}

#[derive(Default)]
struct DedupState {
    last_crc: Option<u32>,
    last_seen_ms: u64,
}

/// Composes every lower layer into one engine instance, driven entirely
/// by `tick(dt_ms)` plus the caller's `send`/`begin`/`teardown` calls —
/// no suspension points, no callback re-entering `tick` (spec §5).
pub struct LinkEngine<S: Stream, R: CommandRouter, C: StatusCallback = crate::status::NullStatusCallback, const N: usize = TX_QUEUE_MIN_CAPACITY> {
    transport: Transport<S>,
    router: R,
    status_cb: C,
    queue: TxQueue<N>,
    timers: TimerService,
    state: LinkState,
    config: LinkConfig,
    session_key: Option<SessionKey>,
    stabilizing: bool,
    uptime_ms: u64,
    last_command_id: u16,
    retry_count: u8,
    dedup: DedupState,
    consecutive_crc_errors: u8,
    pending_baud: Option<u32>,
}

impl<S: Stream, R: CommandRouter, C: StatusCallback, const N: usize> LinkEngine<S, R, C, N> {
    pub fn new(stream: S, router: R, status_cb: C) -> Self {
        LinkEngine {
            transport: Transport::new(stream),
            router,
            status_cb,
            queue: TxQueue::new(),
            timers: TimerService::new(),
            state: LinkState::Unsynchronized,
            config: LinkConfig::default(),
            session_key: None,
            stabilizing: true,
            uptime_ms: 0,
            last_command_id: 0,
            retry_count: 0,
            dedup: DedupState::default(),
            consecutive_crc_errors: 0,
            pending_baud: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Runs the crypto self-test, derives the session key (or leaves the
    /// link unauthenticated if `secret` is empty), registers timers, and
    /// begins the startup-stabilization window (spec §3's lifecycle).
    pub fn begin(&mut self, secret: &[u8]) -> Result<(), LinkError> {
        if crypto::power_on_self_test().is_err() {
            dev_error!("crypto self-test failed; entering Fault");
            self.apply_event(LinkEvent::CryptoFault);
            return Err(LinkError::Crypto(crate::error::CryptoError::SelfTestFailed));
        }

        self.session_key = if secret.is_empty() {
            None
        } else {
            Some(SessionKey::derive(secret))
        };

        self.stabilizing = true;
        self.timers.arm(TimerId::StartupStabilization, STARTUP_STABILIZATION_MS);
        self.timers.arm(TimerId::RxDedupe, RX_DEDUP_INTERVAL_MS);
        dev_info!("link engine starting up");
        Ok(())
    }

    /// Zeroizes the session key and clears queued/dedup state (spec §3:
    /// "teardown zeroizes the secret and clears queues").
    pub fn teardown(&mut self) {
        self.session_key = None;
        self.queue.clear();
        self.dedup = DedupState::default();
        self.timers.cancel_all();
        dev_info!("link engine torn down");
    }

    /// Forces recovery from `Fault` (or any state) back to
    /// `Unsynchronized`. Distinct from an inbound `LINK_RESET` frame,
    /// which is refused while `Fault` (see `handle_system_frame`); this
    /// is the supervisor-level escape hatch the FSM's `Reset` event
    /// implies by allowing `(Fault, Reset) -> Unsynchronized`.
    pub fn reset_link(&mut self) {
        self.apply_event(LinkEvent::Reset);
        self.enter_safe_state();
    }

    /// Enqueues or immediately transmits `command_id`/`payload` per the
    /// outbound filter (spec §4.7).
    pub fn send(&mut self, command_id: u16, payload: &[u8]) -> Result<(), LinkError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(LinkError::PayloadTooLarge);
        }
        match self.state {
            LinkState::Fault => return Err(LinkError::Fault),
            LinkState::Unsynchronized if !is_handshake_frame(command_id) => {
                return Err(LinkError::NotSynchronized);
            }
            _ => {}
        }

        if requires_ack(command_id) {
            if self.queue.is_full() {
                return Err(LinkError::QueueFull);
            }
            let mut scratch = [0u8; MAX_PAYLOAD_SIZE];
            let (bytes, compressed) = maybe_compress(payload, &mut scratch);
            let ok = self.queue.enqueue(PendingFrame::new(command_id, bytes, compressed));
            debug_assert!(ok, "queue.is_full() was just checked false");

            if self.state != LinkState::AwaitingAck {
                self.flush_front();
            }
            Ok(())
        } else {
            self.transmit_now(command_id, payload)
        }
    }

    fn transmit_now(&mut self, command_id: u16, payload: &[u8]) -> Result<(), LinkError> {
        let mut scratch = [0u8; MAX_PAYLOAD_SIZE];
        let (bytes, compressed) = maybe_compress(payload, &mut scratch);
        self.transport
            .send_frame(command_id, bytes, compressed)
            .map_err(|_| LinkError::PayloadTooLarge)
    }

    /// Drains the TX queue's front element onto the wire and arms the
    /// ACK timer, transitioning `Idle -> AwaitingAck`.
    fn flush_front(&mut self) {
        let Some(front) = self.queue.front().copied() else {
            return;
        };
        if self.transport
            .send_frame(front.command_id, front.payload(), front.compressed)
            .is_err()
        {
            dev_warn!("failed to transmit queued frame {:#06x}", front.command_id);
            return;
        }
        self.last_command_id = front.command_id;
        self.retry_count = 0;
        self.timers.arm(TimerId::AckTimeout, self.config.ack_timeout_ms);
        self.apply_event(LinkEvent::SendCritical);
    }

    fn apply_event(&mut self, event: LinkEvent) {
        if let Some(next) = fsm::transition(self.state, event) {
            dev_info!("link state {:?} -> {:?} on {:?}", self.state, next, event);
            self.state = next;
        }
    }

    /// One cooperative scheduling step (spec §5): advances timers by
    /// `dt_ms`, drains and dispatches inbound frames, reacts to flow
    /// control, and (if `Idle` with a queued frame) flushes the send
    /// path. Never blocks.
    pub fn tick(&mut self, dt_ms: u32) {
        self.uptime_ms += dt_ms as u64;
        self.handle_timers(dt_ms);

        if self.stabilizing {
            // Drain and discard input; no frames accepted yet.
            let _ = self.transport.poll_rx();
            return;
        }

        self.handle_rx();

        // No frames are produced while a baud change is pending (spec
        // §4.10): the stream is about to be torn down and restarted.
        if self.pending_baud.is_some() {
            return;
        }

        self.handle_flow_control();
        if self.state == LinkState::Idle && !self.queue.is_empty() {
            self.flush_front();
        }
    }

    fn handle_timers(&mut self, dt_ms: u32) {
        let fired = self.timers.tick(dt_ms);

        if fired.contains(TimerId::StartupStabilization) {
            self.stabilizing = false;
            dev_info!("startup stabilization complete");
        }

        if fired.contains(TimerId::RxDedupe) {
            self.dedup = DedupState::default();
            self.timers.arm(TimerId::RxDedupe, RX_DEDUP_INTERVAL_MS);
        }

        if fired.contains(TimerId::AckTimeout) {
            self.on_ack_timeout();
        }

        if fired.contains(TimerId::BaudrateChange) {
            if let Some(baud) = self.pending_baud.take() {
                self.transport.stream_mut().flush();
                self.transport.stream_mut().change_baud(baud);
                dev_info!("baud rate switched to {baud}");
            }
        }
    }

    fn on_ack_timeout(&mut self) {
        if self.retry_count < self.config.ack_retry_limit {
            self.retry_count += 1;
            dev_warn!("ACK timeout; retry {}/{}", self.retry_count, self.config.ack_retry_limit);
            let _ = self.transport.resend_last();
            self.timers.arm(TimerId::AckTimeout, self.config.ack_timeout_ms);
        } else {
            dev_error!("ACK retries exhausted; entering safe state");
            self.status_cb.on_status(StatusCode::Timeout);
            let _ = self.transport.send_frame(StatusCode::Timeout.command_id(), &[], false);
            self.apply_event(LinkEvent::Timeout);
            self.enter_safe_state();
        }
    }

    fn handle_flow_control(&mut self) {
        match self.transport.check_flow_control() {
            FlowSignal::AssertXoff => {
                let _ = self.transport.send_frame(command_id::XOFF, &[], false);
            }
            FlowSignal::AssertXon => {
                let _ = self.transport.send_frame(command_id::XON, &[], false);
            }
            FlowSignal::None => {}
        }
    }

    fn handle_rx(&mut self) {
        loop {
            match self.transport.poll_rx() {
                Ok(None) => break,
                Ok(Some(frame)) => {
                    self.consecutive_crc_errors = 0;
                    self.dispatch_frame(frame);
                }
                Err(crate::error::TransportError::Frame(crate::error::FrameError::CrcMismatch)) => {
                    self.on_crc_mismatch();
                }
                Err(crate::error::TransportError::Frame(_)) => {
                    self.status_cb.on_status(StatusCode::Malformed);
                    let _ = self.transport.send_frame(StatusCode::Malformed.command_id(), &[], false);
                }
                Err(_) => break,
            }
        }
    }

    fn on_crc_mismatch(&mut self) {
        self.consecutive_crc_errors = self.consecutive_crc_errors.saturating_add(1);
        self.status_cb.on_status(StatusCode::CrcMismatch);
        let _ = self.transport.send_frame(StatusCode::CrcMismatch.command_id(), &[], false);
        dev_warn!("CRC mismatch ({}/{})", self.consecutive_crc_errors, MAX_CONSECUTIVE_CRC_ERRORS);
        if self.consecutive_crc_errors >= MAX_CONSECUTIVE_CRC_ERRORS {
            dev_error!("persistent CRC errors; entering safe state");
            self.apply_event(LinkEvent::Reset);
            self.enter_safe_state();
        }
    }

    fn dispatch_frame(&mut self, frame: crate::frame::Frame) {
        // A faulted link ignores all inbound traffic; only `reset_link`
        // (the engine-level API, not a wire frame) can recover it.
        if self.state == LinkState::Fault {
            return;
        }

        let effective_id = frame.effective_command_id();

        if effective_id == command_id::STATUS_ACK {
            self.handle_ack(frame.payload());
            return;
        }
        if effective_id == command_id::STATUS_MALFORMED {
            self.handle_malformed_status(frame.payload());
            return;
        }

        let mut decompressed = [0u8; MAX_PAYLOAD_SIZE];
        let payload: &[u8] = if frame.compressed {
            match compression::decompress(frame.payload(), &mut decompressed) {
                Ok(len) => &decompressed[..len],
                Err(_) => {
                    self.status_cb.on_status(StatusCode::Malformed);
                    let _ = self.transport.send_frame(StatusCode::Malformed.command_id(), &[], false);
                    return;
                }
            }
        } else {
            frame.payload()
        };

        if matches!(crate::router::categorize(effective_id), Category::Status | Category::System) {
            self.handle_system_frame(effective_id, payload);
            return;
        }

        let needs_ack = requires_ack(effective_id);
        if needs_ack && self.is_duplicate(frame.crc) {
            dev_info!("duplicate of {:#06x}; re-acking without dispatch", effective_id);
            self.send_ack(effective_id);
            return;
        }

        let ctx = CommandContext { command_id: effective_id, payload };
        let mut out = [0u8; MAX_PAYLOAD_SIZE];
        let outcome = self.router.dispatch(&ctx, &mut out);

        if needs_ack {
            self.dedup.last_crc = Some(frame.crc);
            self.dedup.last_seen_ms = self.uptime_ms;
            self.send_ack(effective_id);
        }

        match outcome {
            RouterOutcome::Reply { command_id, len } => {
                let _ = self.transport.send_frame(command_id, &out[..len], false);
            }
            RouterOutcome::NoReply => {}
            RouterOutcome::NotImplemented => {
                self.status_cb.on_status(StatusCode::NotImplemented);
                let _ = self
                    .transport
                    .send_frame(StatusCode::NotImplemented.command_id(), &[], false);
            }
        }
    }

    fn is_duplicate(&self, crc: u32) -> bool {
        let Some(last_crc) = self.dedup.last_crc else {
            return false;
        };
        if last_crc != crc {
            return false;
        }
        let elapsed = self.uptime_ms.saturating_sub(self.dedup.last_seen_ms);
        let low = self.config.ack_timeout_ms as u64;
        let high = self.config.ack_timeout_ms as u64 * (self.config.ack_retry_limit as u64 + 1);
        (low..=high).contains(&elapsed)
    }

    fn send_ack(&mut self, acked_command_id: u16) {
        let payload = acked_command_id.to_be_bytes();
        let _ = self.transport.send_frame(command_id::STATUS_ACK, &payload, false);
    }

    fn handle_ack(&mut self, payload: &[u8]) {
        if self.state != LinkState::AwaitingAck {
            return;
        }
        let matches = payload.is_empty()
            || (payload.len() == 2 && u16::from_be_bytes([payload[0], payload[1]]) == self.last_command_id);
        if !matches {
            return;
        }

        self.timers.cancel(TimerId::AckTimeout);
        self.queue.pop_front();
        self.retry_count = 0;
        self.apply_event(LinkEvent::AckReceived);

        if !self.queue.is_empty() {
            self.flush_front();
        }
    }

    fn handle_malformed_status(&mut self, payload: &[u8]) {
        if self.state != LinkState::AwaitingAck {
            return;
        }
        let matches = payload.is_empty()
            || (payload.len() == 2 && u16::from_be_bytes([payload[0], payload[1]]) == self.last_command_id);
        if !matches {
            return;
        }
        let _ = self.transport.resend_last();
        self.retry_count += 1;
    }

    fn handle_system_frame(&mut self, command_id: u16, payload: &[u8]) {
        match command_id {
            crate::consts::command_id::LINK_SYNC => self.handle_link_sync(payload),
            crate::consts::command_id::LINK_RESET => self.handle_link_reset(payload),
            crate::consts::command_id::GET_VERSION => {
                let _ = self.transport.send_frame(
                    crate::consts::command_id::GET_VERSION_RESP,
                    &[crate::consts::PROTOCOL_VERSION],
                    false,
                );
            }
            crate::consts::command_id::SET_BAUDRATE => self.handle_set_baudrate(payload),
            _ => {
                dev_info!("ignoring inbound system command {command_id:#06x}");
            }
        }
    }

    fn handle_link_sync(&mut self, payload: &[u8]) {
        if payload.len() != HANDSHAKE_NONCE_LEN {
            dev_warn!("LINK_SYNC nonce has wrong length ({} bytes)", payload.len());
            self.apply_event(LinkEvent::HandshakeFailed);
            return;
        }

        let mut resp = [0u8; HANDSHAKE_NONCE_LEN + HANDSHAKE_TAG_LEN];
        resp[..HANDSHAKE_NONCE_LEN].copy_from_slice(payload);
        let resp_len = if let Some(key) = &self.session_key {
            let tag = key.tag(payload);
            resp[HANDSHAKE_NONCE_LEN..].copy_from_slice(&tag);
            HANDSHAKE_NONCE_LEN + HANDSHAKE_TAG_LEN
        } else {
            HANDSHAKE_NONCE_LEN
        };

        let _ = self
            .transport
            .send_frame(crate::consts::command_id::LINK_SYNC_RESP, &resp[..resp_len], false);
        self.apply_event(LinkEvent::HandshakeComplete);
        dev_info!("handshake complete");
    }

    fn handle_link_reset(&mut self, payload: &[u8]) {
        // `dispatch_frame` already refuses all inbound traffic while
        // `Fault`; only the engine-level `reset_link` API recovers from it.
        self.config = match LinkConfig::from_reset_payload(payload) {
            Ok(cfg) => cfg,
            Err(_) => {
                let _ = self.transport.send_frame(StatusCode::Malformed.command_id(), &[], false);
                return;
            }
        };

        let resp = self.config.to_resp_payload();
        let _ = self
            .transport
            .send_frame(crate::consts::command_id::LINK_RESET_RESP, &resp, false);

        self.apply_event(LinkEvent::Reset);
        self.enter_safe_state();
    }

    fn handle_set_baudrate(&mut self, payload: &[u8]) {
        if payload.len() != 4 {
            let _ = self.transport.send_frame(StatusCode::Malformed.command_id(), &[], false);
            return;
        }
        let baud = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let _ = self
            .transport
            .send_frame(crate::consts::command_id::SET_BAUDRATE_RESP, &[], false);
        self.pending_baud = Some(baud);
        self.timers.arm(TimerId::BaudrateChange, BAUD_SETTLE_MS);
    }

    /// Safe-state housekeeping (spec §4.13): stop the ACK/startup timers,
    /// clear the TX queue and dedup state, zero `last_command_id`, and
    /// reset the retry and CRC-error counters. Callers apply the
    /// matching FSM transition themselves before calling this.
    fn enter_safe_state(&mut self) {
        self.timers.cancel(TimerId::AckTimeout);
        self.timers.cancel(TimerId::StartupStabilization);
        self.queue.clear();
        self.dedup = DedupState::default();
        self.last_command_id = 0;
        self.retry_count = 0;
        self.consecutive_crc_errors = 0;
    }
}

fn maybe_compress<'a>(payload: &[u8], scratch: &'a mut [u8; MAX_PAYLOAD_SIZE]) -> (&'a [u8], bool) {
    if !should_compress(payload) {
        scratch[..payload.len()].copy_from_slice(payload);
        return (&scratch[..payload.len()], false);
    }
    match compression::compress(payload, scratch) {
        Ok(len) if len < payload.len() => (&scratch[..len], true),
        _ => {
            scratch[..payload.len()].copy_from_slice(payload);
            (&scratch[..payload.len()], false)
        }
    }
}
