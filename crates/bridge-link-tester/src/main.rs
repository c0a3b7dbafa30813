//! Host-side exerciser for `bridge-link`. Opens a real serial port, runs
//! a `LinkEngine` over it exactly as firmware would, and prints whatever
//! the router/status callback observe — for bring-up against the real
//! Linux-host counterpart without flashing an MCU.
//!
//! The engine only ever plays the responder role (see
//! `bridge_link::engine`), so this tool waits for the peer to send
//! `LINK_SYNC`; it never initiates a handshake itself.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use bridge_common::dev_info;
use bridge_common::time::Clock;
use bridge_link::consts::command_id;
use bridge_link::router::{CommandContext, CommandRouter, RouterOutcome};
use bridge_link::status::{StatusCallback, StatusCode};
use bridge_link::LinkEngine;
use clap::Parser;
use nix::time::{clock_gettime, ClockId};
use rustyline::DefaultEditor;
use serial2::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};

#[derive(Parser, Debug)]
#[command(about = "Runs a bridge-link responder over a real serial port")]
struct Args {
    /// Serial device, e.g. /dev/ttyUSB0
    port: String,
    baud_rate: u32,

    /// Shared root secret (UTF-8). Omit to run unauthenticated.
    #[clap(long)]
    secret: Option<String>,
}

#[derive(Clone, Copy)]
struct MonotonicInstant {
    nanos: u64,
}

struct LinuxMonotonicClock;

impl Clock for LinuxMonotonicClock {
    type TInstant = MonotonicInstant;

    fn current_instant(&self) -> MonotonicInstant {
        let ts = clock_gettime(ClockId::CLOCK_MONOTONIC).expect("CLOCK_MONOTONIC unavailable");
        MonotonicInstant {
            nanos: (ts.tv_sec() as u64) * 1_000_000_000 + ts.tv_nsec() as u64,
        }
    }

    fn diff(&self, newer: MonotonicInstant, older: MonotonicInstant) -> bridge_common::time::TimeDirection {
        if newer.nanos >= older.nanos {
            bridge_common::time::TimeDirection::Forward(Duration::from_nanos(newer.nanos - older.nanos))
        } else {
            bridge_common::time::TimeDirection::Backward(Duration::from_nanos(older.nanos - newer.nanos))
        }
    }
}

/// Wraps a real serial port as the byte stream the engine reads/writes.
/// `bytes_available` is left at its default `None` — serial2 has no
/// portable cheap way to ask the kernel how many bytes are queued, so
/// flow control simply stays disengaged against this stream, same as
/// any platform spec §4.4 allows to skip it.
struct SerialStream {
    port: SerialPort,
}

impl bridge_common::stream::StreamRead for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, bridge_common::stream::StreamReadError> {
        use std::io::Read;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => {
                dev_info!("serial read error: {e}");
                Ok(0)
            }
        }
    }
}

impl bridge_common::stream::StreamWrite for SerialStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize, bridge_common::stream::StreamWriteError> {
        use std::io::Write;
        self.port
            .write(buf)
            .map_err(|_| bridge_common::stream::StreamWriteError::WouldBlock)
    }

    fn flush(&mut self) {
        use std::io::Write;
        let _ = self.port.flush();
    }

    fn change_baud(&mut self, baud: u32) {
        if let Ok(mut settings) = self.port.get_configuration() {
            if settings.set_baud_rate(baud).is_ok() {
                let _ = self.port.set_configuration(&settings);
            }
        }
    }
}

/// Prints every application command the peer sends; implements no
/// subsystem, so every category bottoms out at `NotImplemented`.
struct CliRouter;

impl CommandRouter for CliRouter {
    fn on_gpio(&mut self, ctx: &CommandContext, _out: &mut [u8]) -> RouterOutcome {
        println!("gpio command {:#06x} payload={:02x?}", ctx.command_id, ctx.payload);
        RouterOutcome::NotImplemented
    }

    fn on_console(&mut self, ctx: &CommandContext, _out: &mut [u8]) -> RouterOutcome {
        if ctx.command_id == command_id::CONSOLE_WRITE {
            println!("console: {}", String::from_utf8_lossy(ctx.payload));
            RouterOutcome::NoReply
        } else {
            RouterOutcome::NotImplemented
        }
    }

    fn on_datastore(&mut self, ctx: &CommandContext, _out: &mut [u8]) -> RouterOutcome {
        println!("datastore command {:#06x} payload={:02x?}", ctx.command_id, ctx.payload);
        RouterOutcome::NotImplemented
    }

    fn on_mailbox(&mut self, ctx: &CommandContext, _out: &mut [u8]) -> RouterOutcome {
        println!("mailbox command {:#06x} payload={:02x?}", ctx.command_id, ctx.payload);
        RouterOutcome::NotImplemented
    }

    fn on_filesystem(&mut self, ctx: &CommandContext, _out: &mut [u8]) -> RouterOutcome {
        println!("filesystem command {:#06x} payload={:02x?}", ctx.command_id, ctx.payload);
        RouterOutcome::NotImplemented
    }

    fn on_process(&mut self, ctx: &CommandContext, _out: &mut [u8]) -> RouterOutcome {
        println!("process command {:#06x} payload={:02x?}", ctx.command_id, ctx.payload);
        RouterOutcome::NotImplemented
    }

    fn on_unknown(&mut self, ctx: &CommandContext, _out: &mut [u8]) -> RouterOutcome {
        println!("unknown command {:#06x} payload={:02x?}", ctx.command_id, ctx.payload);
        RouterOutcome::NotImplemented
    }
}

struct CliStatusCallback;

impl StatusCallback for CliStatusCallback {
    fn on_status(&mut self, code: StatusCode) {
        println!("status: {code:?}");
    }
}

/// Commands the interactive shell can inject into the running engine.
/// Only `Console`/`Gpio` simulate an application layer pushing data
/// outbound; the rest exercise engine-level control.
enum ShellCommand {
    Console(String),
    Gpio { pin: u8, value: u8 },
    Reset,
}

fn parse_line(line: &str) -> Option<ShellCommand> {
    let mut parts = line.split_whitespace();
    match parts.next()? {
        "console" => Some(ShellCommand::Console(parts.collect::<Vec<_>>().join(" "))),
        "gpio" => {
            let pin = parts.next()?.parse().ok()?;
            let value = parts.next()?.parse().ok()?;
            Some(ShellCommand::Gpio { pin, value })
        }
        "reset" => Some(ShellCommand::Reset),
        _ => None,
    }
}

fn main() {
    env_logger::builder().parse_default_env().init();
    let args = Args::parse();

    let port = SerialPort::open(&args.port, |mut settings: Settings| {
        settings.set_raw();
        settings.set_baud_rate(args.baud_rate).unwrap();
        settings.set_char_size(CharSize::Bits8);
        settings.set_parity(Parity::None);
        settings.set_stop_bits(StopBits::One);
        settings.set_flow_control(FlowControl::None);
        Ok(settings)
    })
    .expect("failed to open serial port");
    port.set_read_timeout(Duration::from_millis(1)).unwrap();

    let stream = SerialStream { port };
    let mut engine: LinkEngine<SerialStream, CliRouter, CliStatusCallback> =
        LinkEngine::new(stream, CliRouter, CliStatusCallback);
    engine
        .begin(args.secret.as_deref().unwrap_or("").as_bytes())
        .expect("crypto self-test failed");

    let (tx, rx) = mpsc::channel::<ShellCommand>();

    let engine_thread = thread::spawn(move || {
        let clock = LinuxMonotonicClock;
        let mut last = clock.current_instant();
        loop {
            let dt_ms = clock.elapsed_ms_since(last);
            last = clock.current_instant();
            engine.tick(dt_ms);

            while let Ok(cmd) = rx.try_recv() {
                match cmd {
                    ShellCommand::Console(text) => {
                        if let Err(e) = engine.send(command_id::CONSOLE_WRITE, text.as_bytes()) {
                            println!("send failed: {e:?}");
                        }
                    }
                    ShellCommand::Gpio { pin, value } => {
                        if let Err(e) = engine.send(command_id::DIGITAL_WRITE, &[pin, value]) {
                            println!("send failed: {e:?}");
                        }
                    }
                    ShellCommand::Reset => engine.reset_link(),
                }
            }

            thread::sleep(Duration::from_millis(1));
        }
    });

    dev_info!("link engine running on {}", args.port);
    println!("commands: console <text> | gpio <pin> <0|1> | reset | quit");
    let mut rl = DefaultEditor::new().expect("failed to start input reader");
    loop {
        match rl.readline("> ") {
            Ok(line) if line.trim() == "quit" => break,
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                match parse_line(&line) {
                    Some(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    None => println!("unrecognized command: {line}"),
                }
            }
            Err(_) => break,
        }
    }

    drop(tx);
    // The engine thread loops forever; dropping the sender lets it keep
    // draining an empty channel harmlessly until the process exits.
    let _ = engine_thread;
}
