/*!
Event logger: bounded in-memory queue drained by a dedicated worker.

Purpose
- `log(level, subsystem, message)` never blocks the caller: the record is
  enqueued if the queue has room and silently dropped otherwise.
- A worker thread drains the queue to a text sink, one line per record:
  `[<ms> ms] [<LEVEL>] [<SUBSYS>] <message>`, ms measured from simulation
  start on the monotonic clock.
- Every call also mirrors the formatted line into the world-state
  three-slot recent-log ring for the dashboard, and re-emits the event
  through `tracing` so `RUST_LOG` diagnostics see the same stream.

Shutdown
- `shutdown()` clears the running flag and posts the readiness semaphore
  once; the worker drains whatever is left and exits.
*/

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::sync::Semaphore;
use crate::world::SharedWorld;

/// Queue capacity; producers drop records beyond this.
pub const MAX_LOG_QUEUE: usize = 512;

pub const LOG_HEADER: &str = "=== EXAM OS SIMULATION LOG ===";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Subsystem tag on every record; matches the component that emitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Scheduler,
    Memory,
    Io,
    Interrupt,
}

impl Subsystem {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Subsystem::Scheduler => "SCHEDULER",
            Subsystem::Memory => "MEMORY",
            Subsystem::Io => "IO",
            Subsystem::Interrupt => "INTERRUPT",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp_ns: u64,
    pub level: Level,
    pub subsystem: Subsystem,
    pub message: String,
}

impl LogRecord {
    /// Sink line format shared by the worker and the tests.
    pub fn render(&self) -> String {
        format!(
            "[{:>8} ms] [{:<5}] [{:<10}] {}",
            self.timestamp_ns / 1_000_000,
            self.level.as_str(),
            self.subsystem.as_str(),
            self.message
        )
    }
}

struct LoggerInner {
    queue: Mutex<VecDeque<LogRecord>>,
    ready: Semaphore,
    running: AtomicBool,
    start: Instant,
    world: SharedWorld,
}

/// Cloneable producer handle. All clones feed the same queue.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<LoggerInner>,
}

impl Logger {
    pub fn new(world: SharedWorld, start: Instant) -> Self {
        Self {
            inner: Arc::new(LoggerInner {
                queue: Mutex::new(VecDeque::with_capacity(MAX_LOG_QUEUE)),
                ready: Semaphore::new(0),
                running: AtomicBool::new(true),
                start,
                world,
            }),
        }
    }

    /// Enqueue one event. Never blocks; drops the record when the queue is
    /// full. The dashboard ring and the `tracing` mirror are updated either
    /// way.
    pub fn log(&self, level: Level, subsystem: Subsystem, message: impl Into<String>) {
        let message = message.into();
        let record = LogRecord {
            timestamp_ns: self.inner.start.elapsed().as_nanos() as u64,
            level,
            subsystem,
            message,
        };

        match level {
            Level::Info => {
                tracing::info!(subsystem = subsystem.as_str(), "{}", record.message);
            }
            Level::Warn => {
                tracing::warn!(subsystem = subsystem.as_str(), "{}", record.message);
            }
            Level::Error => {
                tracing::error!(subsystem = subsystem.as_str(), "{}", record.message);
            }
        }

        {
            let mut world = self.inner.world.lock();
            world.push_recent_log(format!(
                "[{:<9}] {:<11} {}",
                level.as_str(),
                subsystem.as_str(),
                record.message
            ));
        }

        let mut queue = self.inner.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() < MAX_LOG_QUEUE {
            queue.push_back(record);
            drop(queue);
            self.inner.ready.post();
        }
        // full queue: drop silently, never block the caller
    }

    /// Clear the running flag and wake the worker so it can drain and exit.
    pub fn shutdown(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.ready.post();
    }

    /// Spawn the drain worker writing to `sink`.
    pub fn spawn(&self, mut sink: Box<dyn Write + Send>) -> io::Result<JoinHandle<()>> {
        let inner = Arc::clone(&self.inner);
        thread::Builder::new()
            .name("logger".into())
            .spawn(move || {
                loop {
                    inner.ready.wait();

                    let record = {
                        let mut queue = inner.queue.lock().unwrap_or_else(|e| e.into_inner());
                        if queue.is_empty() && !inner.running.load(Ordering::SeqCst) {
                            break;
                        }
                        queue.pop_front()
                    };

                    if let Some(record) = record {
                        let _ = writeln!(sink, "{}", record.render());
                        let _ = sink.flush();
                    }
                }
            })
    }

    #[cfg(test)]
    pub(crate) fn queued(&self) -> usize {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Open a text sink with a header line, degrading to stderr when the file
/// cannot be created. The simulation continues either way.
pub fn open_sink(path: &Path, header: &str) -> Box<dyn Write + Send> {
    let mut sink: Box<dyn Write + Send> = match File::create(path) {
        Ok(file) => Box::new(file),
        Err(e) => {
            eprintln!("WARNING: could not open {}: {e}; logging to stderr", path.display());
            Box::new(io::stderr())
        }
    };
    let _ = writeln!(sink, "{header}\n");
    let _ = sink.flush();
    sink
}
