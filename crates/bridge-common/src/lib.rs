#![no_std]

pub mod stream;
pub mod time;
mod devlog;

pub use log as __log;

/// Wrapping distance between two counters that both saturate at `max`,
/// e.g. sequence numbers or ring-buffer cursors.
#[macro_export]
macro_rules! diff_wrapped {
    ($max:expr, $newer:expr, $older:expr) => {
        if ($newer) > ($older) {
            ($newer) - ($older)
        } else {
            (($max) + 1) - ($older) + ($newer)
        }
    };
}
