//! Link FSM (spec §4.6): a flat tagged-variant state plus a pure
//! transition function, replacing the deep inheritance/virtual-dispatch
//! hierarchy flagged for redesign in spec §9 — the state set is small and
//! closed, so a `match` is all this needs.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unsynchronized,
    Idle,
    AwaitingAck,
    Fault,
}

impl LinkState {
    /// `Synchronized` is the logical union of `{Idle, AwaitingAck}` (spec §3).
    pub const fn is_synchronized(self) -> bool {
        matches!(self, LinkState::Idle | LinkState::AwaitingAck)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    HandshakeComplete,
    HandshakeFailed,
    SendCritical,
    AckReceived,
    Timeout,
    Reset,
    CryptoFault,
}

/// Pure transition table lookup (spec §4.6). Returns `None` when the
/// event has no effect on the state (e.g. `SendCritical` while already
/// `AwaitingAck`, which just enqueues without transitioning).
pub const fn transition(state: LinkState, event: LinkEvent) -> Option<LinkState> {
    use LinkEvent::*;
    use LinkState::*;

    match (state, event) {
        (Unsynchronized, HandshakeComplete) => Some(Idle),
        (Unsynchronized, HandshakeFailed) => Some(Fault),
        (Unsynchronized, CryptoFault) => Some(Fault),

        (Idle, SendCritical) => Some(AwaitingAck),
        (Idle, Reset) => Some(Unsynchronized),
        (Idle, CryptoFault) => Some(Fault),

        (AwaitingAck, SendCritical) => None, // queued, no transition
        (AwaitingAck, AckReceived) => Some(Idle),
        (AwaitingAck, Timeout) => Some(Unsynchronized),
        (AwaitingAck, Reset) => Some(Unsynchronized),
        (AwaitingAck, CryptoFault) => Some(Fault),

        (Fault, Reset) => Some(Unsynchronized),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LinkEvent::*;
    use LinkState::*;

    #[test]
    fn handshake_brings_link_up() {
        assert_eq!(transition(Unsynchronized, HandshakeComplete), Some(Idle));
    }

    #[test]
    fn fault_is_terminal_except_for_reset() {
        for event in [
            HandshakeComplete,
            HandshakeFailed,
            SendCritical,
            AckReceived,
            Timeout,
            CryptoFault,
        ] {
            assert_eq!(transition(Fault, event), None, "{event:?} must not leave Fault");
        }
        assert_eq!(transition(Fault, Reset), Some(Unsynchronized));
    }

    #[test]
    fn send_critical_while_awaiting_ack_does_not_transition() {
        assert_eq!(transition(AwaitingAck, SendCritical), None);
    }

    #[test]
    fn crypto_fault_from_any_non_fault_state_goes_to_fault() {
        assert_eq!(transition(Unsynchronized, CryptoFault), Some(Fault));
        assert_eq!(transition(Idle, CryptoFault), Some(Fault));
        assert_eq!(transition(AwaitingAck, CryptoFault), Some(Fault));
    }

    #[test]
    fn synchronized_union() {
        assert!(Idle.is_synchronized());
        assert!(AwaitingAck.is_synchronized());
        assert!(!Unsynchronized.is_synchronized());
        assert!(!Fault.is_synchronized());
    }
}
