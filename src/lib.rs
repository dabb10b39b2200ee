#![doc = r#"
Exam OS simulator library crate.

An operating-system teaching simulator that models an online-exam
workload: a fleet of student processes is admitted into a single-CPU
machine that schedules them, pages their working sets through a small
physical memory, accepts answer submissions through a bounded
producer/consumer buffer, and reacts to asynchronous events through a
dispatched interrupt vector table. Wall-clock advances in discrete ticks
driven by a central clock.

Modules:
- clock: tick worker, the heartbeat every other component paces to
- config: defaults, `config.conf` parser and CLI overlay
- dashboard: read-only terminal status view (crossterm behind the
  `dashboard` feature; one-line headless fallback otherwise)
- error: crate error type
- interrupt: vector table, pending queue, detectors and dispatcher
- io_buffer: bounded submission buffer with non-blocking producers
- logger: bounded event-log queue drained to a text sink
- machine: wiring façade that spawns the workers and drives a run
- memory: demand-paged memory manager with LRU/FIFO eviction
- process: PCB and process lifecycle states
- report: final boxed summary report
- scheduler: batch admission plus round-robin / shortest-remaining-time
  scheduling
- sync: counting semaphore
- world: the shared world-state record under one lock

In tests, shared builders are available under `crate::test_utils`.
"#]

pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod interrupt;
pub mod io_buffer;
pub mod logger;
pub mod machine;
pub mod memory;
pub mod process;
pub mod report;
pub mod scheduler;
pub mod sync;
pub mod world;

// Re-export commonly used types at the crate root for convenience.
pub use config::{Cli, Config, PageAlgo, SchedAlgo};
pub use error::SimError;
pub use machine::Machine;
pub use world::{SharedWorld, WorldState};

// Shared test utilities (only compiled for tests)
#[cfg(test)]
pub mod test_utils;
