//! Kernel logging: a [`log`] facade backed by the serial console.
//!
//! Early boot code writes to serial directly via [`crate::arch::x86_64::serial`]
//! before this is installed; after [`init`] runs, `log::info!`/`warn!`/`error!`
//! are available everywhere. A ring buffer of the most recent lines is kept
//! so the panic handler can dump recent history (§7).

use core::fmt::Write;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex;

const RECENT_LOG_CAPACITY: usize = 32;
const RECENT_LOG_LINE_LEN: usize = 96;

struct RecentLogs {
    lines: [[u8; RECENT_LOG_LINE_LEN]; RECENT_LOG_CAPACITY],
    lens: [u8; RECENT_LOG_CAPACITY],
    next: usize,
}

impl RecentLogs {
    const fn new() -> Self {
        Self {
            lines: [[0; RECENT_LOG_LINE_LEN]; RECENT_LOG_CAPACITY],
            lens: [0; RECENT_LOG_CAPACITY],
            next: 0,
        }
    }

    fn push(&mut self, s: &str) {
        let slot = self.next % RECENT_LOG_CAPACITY;
        let bytes = s.as_bytes();
        let n = bytes.len().min(RECENT_LOG_LINE_LEN);
        self.lines[slot][..n].copy_from_slice(&bytes[..n]);
        self.lens[slot] = n as u8;
        self.next += 1;
    }

    /// Iterates the retained lines oldest-first.
    fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        let count = self.next.min(RECENT_LOG_CAPACITY);
        let start = self.next.saturating_sub(count);
        (start..self.next).map(move |i| {
            let slot = i % RECENT_LOG_CAPACITY;
            core::str::from_utf8(&self.lines[slot][..self.lens[slot] as usize]).unwrap_or("<bad utf8>")
        })
    }
}

static RECENT: Mutex<RecentLogs> = Mutex::new(RecentLogs::new());
static LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        LOG_COUNT.fetch_add(1, Ordering::Relaxed);

        let mut line = heapless::String::<RECENT_LOG_LINE_LEN>::new();
        let _ = write!(line, "[{:<5}] {}", record.level(), record.args());
        RECENT.lock().push(&line);

        #[cfg(not(test))]
        {
            let mut serial = crate::arch::x86_64::serial::console();
            let _ = writeln!(serial, "[{:<5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Installs the global logger. Idempotent; safe to call once during early
/// boot, before interrupts are enabled.
pub fn init(level: log::LevelFilter) {
    // `set_logger` fails only if called twice; the kernel only calls it once
    // from the boot path, so silently ignoring a repeat call is correct.
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

/// Runs `f` with the most recently logged lines, oldest first. Used by the
/// panic handler's diagnostic dump; takes a callback rather than returning
/// borrowed data since the backing buffer lives behind a lock.
pub fn with_recent_lines(mut f: impl FnMut(&str)) {
    for line in RECENT.lock().iter() {
        f(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_logs_wraps_and_preserves_order() {
        let mut logs = RecentLogs::new();
        for i in 0..(RECENT_LOG_CAPACITY + 5) {
            let mut s = heapless::String::<32>::new();
            let _ = write!(s, "line-{i}");
            logs.push(&s);
        }
        let collected: alloc::vec::Vec<_> = logs.iter().map(alloc::string::ToString::to_string).collect();
        assert_eq!(collected.len(), RECENT_LOG_CAPACITY);
        assert_eq!(collected[0], "line-5");
        assert_eq!(collected[RECENT_LOG_CAPACITY - 1], alloc::format!("line-{}", RECENT_LOG_CAPACITY + 4));
    }
}
