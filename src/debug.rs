//! Audio-thread diagnostics for the DustPress plugin.
//!
//! The plugin records two things through `dp_log!`: the sample rate and
//! lookahead latency reported to the host in `initialize`, and every block
//! where the host moved a control (tagged with the engine's coefficient
//! revision). Messages land in a pre-allocated ring from `process` and are
//! flushed to `/tmp/dustpress.log` by `drain_to_file()` on the next
//! `initialize`. Without the `debug` feature the macro compiles to nothing.

use std::fmt;

#[cfg(feature = "debug")]
pub mod logger {
    use std::cell::UnsafeCell;
    use std::fmt;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::OnceLock;

    const LOG_PATH: &str = "/tmp/dustpress.log";
    const LOG_CAP: usize = 128;
    const LOG_MSG_MAX: usize = 256;

    #[derive(Copy, Clone)]
    struct LogEntry {
        len: u16,
        bytes: [u8; LOG_MSG_MAX],
    }

    impl Default for LogEntry {
        fn default() -> Self {
            Self {
                len: 0,
                bytes: [0; LOG_MSG_MAX],
            }
        }
    }

    /// Single-producer (audio thread) / single-consumer (drain) ring.
    struct LogRing {
        head: AtomicUsize,
        tail: AtomicUsize,
        slots: Box<[UnsafeCell<LogEntry>]>,
    }

    unsafe impl Sync for LogRing {}

    impl LogRing {
        fn new() -> Self {
            let slots: Vec<UnsafeCell<LogEntry>> = (0..LOG_CAP)
                .map(|_| UnsafeCell::new(LogEntry::default()))
                .collect();
            Self {
                head: AtomicUsize::new(0),
                tail: AtomicUsize::new(0),
                slots: slots.into_boxed_slice(),
            }
        }

        /// Drops the message when the ring is full.
        fn push(&self, entry: LogEntry) {
            let cap = self.slots.len();
            let head = self.head.load(Ordering::Relaxed);
            let next = (head + 1) % cap;
            if next == self.tail.load(Ordering::Acquire) {
                return;
            }
            unsafe {
                *self.slots[head].get() = entry;
            }
            self.head.store(next, Ordering::Release);
        }

        fn pop(&self) -> Option<LogEntry> {
            let cap = self.slots.len();
            let tail = self.tail.load(Ordering::Relaxed);
            if tail == self.head.load(Ordering::Acquire) {
                return None;
            }
            let entry = unsafe { *self.slots[tail].get() };
            self.tail.store((tail + 1) % cap, Ordering::Release);
            Some(entry)
        }
    }

    static LOGGER: OnceLock<LogRing> = OnceLock::new();
    static LOG_ENABLED: AtomicBool = AtomicBool::new(false);

    /// Allocate the ring. Call from a non-realtime context.
    pub fn init_logger() {
        let _ = LOGGER.get_or_init(LogRing::new);
        LOG_ENABLED.store(true, Ordering::Relaxed);
    }

    /// Stack buffer that truncates instead of growing.
    struct FixedBuf {
        entry: LogEntry,
    }

    impl fmt::Write for FixedBuf {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            let len = self.entry.len as usize;
            let n = s.len().min(LOG_MSG_MAX - len);
            self.entry.bytes[len..len + n].copy_from_slice(&s.as_bytes()[..n]);
            self.entry.len = (len + n) as u16;
            Ok(())
        }
    }

    pub fn log_args(args: fmt::Arguments) {
        if !LOG_ENABLED.load(Ordering::Relaxed) {
            return;
        }
        let Some(ring) = LOGGER.get() else {
            return;
        };
        let mut buf = FixedBuf {
            entry: LogEntry::default(),
        };
        let _ = fmt::write(&mut buf, args);
        ring.push(buf.entry);
    }

    pub fn drain_to_file() {
        if !LOG_ENABLED.load(Ordering::Relaxed) {
            return;
        }
        let Some(ring) = LOGGER.get() else {
            return;
        };
        let Ok(mut file) = OpenOptions::new().create(true).append(true).open(LOG_PATH) else {
            return;
        };

        while let Some(entry) = ring.pop() {
            let len = entry.len as usize;
            if len == 0 {
                continue;
            }
            // Truncation may split a multi-byte char
            let msg = String::from_utf8_lossy(&entry.bytes[..len]);
            let _ = writeln!(file, "{}", msg);
        }
    }

}

#[cfg(feature = "debug")]
pub(crate) fn dp_log_inner(args: fmt::Arguments) {
    logger::log_args(args);
}

#[cfg(not(feature = "debug"))]
pub(crate) fn dp_log_inner(_args: fmt::Arguments) {}

#[macro_export]
macro_rules! dp_log {
    ($($arg:tt)*) => {
        $crate::debug::dp_log_inner(format_args!($($arg)*))
    };
}
