//! Command router (spec §4.8): branch-free categorization of an incoming
//! command id into one of the fixed ranges declared in `consts`, dispatched
//! to a compile-time `CommandRouter` implementation rather than a vtable —
//! there is exactly one router per link, known at build time, so dynamic
//! dispatch buys nothing here.

use crate::consts::command_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Status,
    System,
    Gpio,
    Console,
    Datastore,
    Mailbox,
    Filesystem,
    Process,
    Unknown,
}

/// Categorizes a command id by range membership alone, no per-command
/// branching (spec §4.8: "categorization must be a range test, not a
/// lookup table keyed on every individual command"). `Status` and
/// `System` are both handled by the engine itself (never forwarded to
/// `CommandRouter::dispatch`) but kept as distinct variants so an
/// unsolicited inbound `STATUS_*` frame is observably categorized
/// rather than folded into `System`.
pub const fn categorize(command_id: u16) -> Category {
    let masked = command_id & crate::consts::COMMAND_ID_MASK;
    match masked & 0xff00 {
        0x0000 => Category::Status,
        0x0100 => Category::System,
        0x0200 => Category::Gpio,
        0x0300 => Category::Console,
        0x0400 => Category::Datastore,
        0x0500 => Category::Mailbox,
        0x0600 => Category::Filesystem,
        0x0700 => Category::Process,
        _ => Category::Unknown,
    }
}

/// A decoded, non-system command handed to the application-level router.
/// Borrows its payload from the frame buffer that owns it; never copied.
pub struct CommandContext<'a> {
    pub command_id: u16,
    pub payload: &'a [u8],
}

/// What a handler wants to do in response to a command. Any reply payload
/// is written directly into the caller-provided `out` buffer rather than
/// returned by value, matching the no-allocation discipline elsewhere.
pub enum RouterOutcome {
    /// Emit a reply frame under `command_id` carrying `len` bytes already
    /// written to the `out` buffer passed to the handler.
    Reply { command_id: u16, len: usize },
    /// The command was accepted; no reply frame is sent.
    NoReply,
    /// The handler does not implement this command.
    NotImplemented,
}

/// Implemented once per application to receive categorized, non-system
/// commands. The engine handles `System` commands itself (handshake,
/// link reset, baud changes) and never forwards them here.
pub trait CommandRouter {
    fn on_gpio(&mut self, ctx: &CommandContext, out: &mut [u8]) -> RouterOutcome {
        let _ = (ctx, out);
        RouterOutcome::NotImplemented
    }

    fn on_console(&mut self, ctx: &CommandContext, out: &mut [u8]) -> RouterOutcome {
        let _ = (ctx, out);
        RouterOutcome::NotImplemented
    }

    fn on_datastore(&mut self, ctx: &CommandContext, out: &mut [u8]) -> RouterOutcome {
        let _ = (ctx, out);
        RouterOutcome::NotImplemented
    }

    fn on_mailbox(&mut self, ctx: &CommandContext, out: &mut [u8]) -> RouterOutcome {
        let _ = (ctx, out);
        RouterOutcome::NotImplemented
    }

    fn on_filesystem(&mut self, ctx: &CommandContext, out: &mut [u8]) -> RouterOutcome {
        let _ = (ctx, out);
        RouterOutcome::NotImplemented
    }

    fn on_process(&mut self, ctx: &CommandContext, out: &mut [u8]) -> RouterOutcome {
        let _ = (ctx, out);
        RouterOutcome::NotImplemented
    }

    /// Any command id outside every declared range.
    fn on_unknown(&mut self, ctx: &CommandContext, out: &mut [u8]) -> RouterOutcome {
        let _ = (ctx, out);
        RouterOutcome::NotImplemented
    }

    /// Dispatches `ctx` to the matching category handler. `Status` and
    /// `System` commands never reach here; routing them is the engine's job.
    fn dispatch(&mut self, ctx: &CommandContext, out: &mut [u8]) -> RouterOutcome {
        match categorize(ctx.command_id) {
            Category::Gpio => self.on_gpio(ctx, out),
            Category::Console => self.on_console(ctx, out),
            Category::Datastore => self.on_datastore(ctx, out),
            Category::Mailbox => self.on_mailbox(ctx, out),
            Category::Filesystem => self.on_filesystem(ctx, out),
            Category::Process => self.on_process(ctx, out),
            Category::Unknown => self.on_unknown(ctx, out),
            Category::Status | Category::System => RouterOutcome::NotImplemented,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_categorize_correctly() {
        assert_eq!(categorize(command_id::STATUS_OK), Category::Status);
        assert_eq!(categorize(command_id::LINK_SYNC), Category::System);
        assert_eq!(categorize(command_id::SET_PIN_MODE), Category::Gpio);
        assert_eq!(categorize(command_id::CONSOLE_WRITE), Category::Console);
        assert_eq!(categorize(command_id::DATASTORE_GET), Category::Datastore);
        assert_eq!(categorize(command_id::MAILBOX_PUSH), Category::Mailbox);
        assert_eq!(categorize(command_id::FILE_OPEN), Category::Filesystem);
        assert_eq!(categorize(command_id::PROCESS_RUN), Category::Process);
        assert_eq!(categorize(0x0f00), Category::Unknown);
    }

    #[test]
    fn categorize_ignores_compression_flag_bit() {
        let flagged = command_id::CONSOLE_WRITE | crate::consts::COMPRESSION_FLAG;
        assert_eq!(categorize(flagged), Category::Console);
    }

    struct EchoRouter;
    impl CommandRouter for EchoRouter {
        fn on_console(&mut self, ctx: &CommandContext, out: &mut [u8]) -> RouterOutcome {
            out[..ctx.payload.len()].copy_from_slice(ctx.payload);
            RouterOutcome::Reply {
                command_id: command_id::CONSOLE_READ_RESP,
                len: ctx.payload.len(),
            }
        }
    }

    #[test]
    fn dispatch_reaches_the_matching_handler() {
        let mut router = EchoRouter;
        let ctx = CommandContext {
            command_id: command_id::CONSOLE_WRITE,
            payload: b"hi",
        };
        let mut out = [0u8; 16];
        match router.dispatch(&ctx, &mut out) {
            RouterOutcome::Reply { command_id, len } => {
                assert_eq!(command_id, command_id::CONSOLE_READ_RESP);
                assert_eq!(&out[..len], b"hi");
            }
            _ => panic!("expected Reply"),
        }
    }

    #[test]
    fn unhandled_category_defaults_to_not_implemented() {
        let mut router = EchoRouter;
        let ctx = CommandContext {
            command_id: command_id::SET_PIN_MODE,
            payload: &[],
        };
        let mut out = [0u8; 1];
        assert!(matches!(
            router.dispatch(&ctx, &mut out),
            RouterOutcome::NotImplemented
        ));
    }
}
