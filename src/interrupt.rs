/*!
Interrupt subsystem: vector table, pending queue, condition detectors and
the dispatcher worker.

Flow per tick
- The timeout detector walks the PCB table under the world lock,
  decrementing `remaining_time` on READY/RUNNING processes. A process that
  reaches zero is marked TERMINATED in place (so it cannot fire twice),
  the lock is released, EXAM_TIMEOUT is raised for its pid, and the walk
  resumes. This is the authoritative time-decrement path for the life of a
  PCB; the scheduler burns quantum on its own queue copy in parallel.
- The overload detector raises OVERLOAD when the submission buffer fill
  fraction reaches 0.95.
- The drain loop try-waits on the readiness semaphore and dispatches each
  pending interrupt through the vector table. The IVT lock is released
  before a handler runs; handlers may raise further interrupts.

Handlers receive `(pid, &HandlerCtx)`; the context carries the scheduler,
memory, I/O, logger and world handles, all wired once at init.
*/

use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::io_buffer::IoBuffer;
use crate::logger::{Level, Logger, Subsystem};
use crate::memory::MemoryManager;
use crate::process::ProcessState;
use crate::scheduler::Scheduler;
use crate::sync::Semaphore;
use crate::world::SharedWorld;

pub const INT_EXAM_TIMEOUT: u8 = 0;
pub const INT_OVERLOAD: u8 = 1;
pub const INT_PAGE_FAULT: u8 = 2;
pub const INT_SUBMIT_COMPLETE: u8 = 3;

/// Vector-table capacity.
pub const MAX_INTERRUPTS: usize = 8;

/// Pending-queue capacity; over-capacity raises are silently dropped.
const PENDING_CAPACITY: usize = 64;

/// Buffer fill fraction that trips the overload detector.
pub const OVERLOAD_THRESHOLD: f32 = 0.95;

/// Capability surface handed to every handler at dispatch time.
#[derive(Clone)]
pub struct HandlerCtx {
    pub cfg: Arc<Config>,
    pub world: SharedWorld,
    pub scheduler: Arc<Scheduler>,
    pub memory: Arc<MemoryManager>,
    pub io: IoBuffer,
    pub logger: Logger,
}

pub type HandlerFn = fn(i32, &HandlerCtx);

struct IvtEntry {
    id: u8,
    name: &'static str,
    handler: HandlerFn,
}

#[derive(Debug, Clone, Copy)]
pub struct PendingInterrupt {
    pub id: u8,
    /// Target pid; -1 when the interrupt is not process-scoped.
    pub pid: i32,
    pub timestamp_ms: u64,
}

struct PendingRing {
    slots: Vec<Option<PendingInterrupt>>,
    head: usize,
    tail: usize,
    count: usize,
}

pub struct InterruptController {
    ivt: Mutex<Vec<IvtEntry>>,
    pending: Mutex<PendingRing>,
    ready: Semaphore,
    world: SharedWorld,
    logger: Logger,
    start: Instant,
}

impl InterruptController {
    pub fn new(world: SharedWorld, logger: Logger, start: Instant) -> Self {
        Self {
            ivt: Mutex::new(Vec::with_capacity(MAX_INTERRUPTS)),
            pending: Mutex::new(PendingRing {
                slots: vec![None; PENDING_CAPACITY],
                head: 0,
                tail: 0,
                count: 0,
            }),
            ready: Semaphore::new(0),
            world,
            logger,
            start,
        }
    }

    /// Install the four built-in handlers.
    pub fn register_defaults(&self) {
        self.register(INT_EXAM_TIMEOUT, "EXAM_TIMEOUT", handle_exam_timeout);
        self.register(INT_OVERLOAD, "OVERLOAD", handle_overload);
        self.register(INT_PAGE_FAULT, "PAGE_FAULT", handle_page_fault);
        self.register(INT_SUBMIT_COMPLETE, "SUBMIT_COMPLETE", handle_submit_complete);
        self.logger.log(
            Level::Info,
            Subsystem::Interrupt,
            "Interrupt vector table initialized (4 handlers)",
        );
    }

    /// Append an entry to the vector table; full tables ignore the call.
    pub fn register(&self, id: u8, name: &'static str, handler: HandlerFn) {
        let mut ivt = self.ivt.lock().unwrap_or_else(|e| e.into_inner());
        if ivt.len() < MAX_INTERRUPTS {
            ivt.push(IvtEntry { id, name, handler });
        }
    }

    /// Queue an interrupt for dispatch. Non-blocking; raises beyond the
    /// ring capacity are dropped.
    pub fn raise(&self, id: u8, pid: i32) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.count < PENDING_CAPACITY {
            let tail = pending.tail;
            pending.slots[tail] = Some(PendingInterrupt {
                id,
                pid,
                timestamp_ms: self.start.elapsed().as_millis() as u64,
            });
            pending.tail = (pending.tail + 1) % PENDING_CAPACITY;
            pending.count += 1;
            self.ready.post();
        }
    }

    fn dispatch(&self, pi: PendingInterrupt, ctx: &HandlerCtx) {
        let entry = {
            let ivt = self.ivt.lock().unwrap_or_else(|e| e.into_inner());
            ivt.iter()
                .find(|e| e.id == pi.id)
                .map(|e| (e.name, e.handler))
        };
        // IVT lock is released before the handler runs.

        match entry {
            Some((name, handler)) => {
                self.logger.log(
                    Level::Info,
                    Subsystem::Interrupt,
                    format!(
                        "Dispatching INT_{} ({name}) for PID {} at {}ms",
                        pi.id, pi.pid, pi.timestamp_ms
                    ),
                );
                handler(pi.pid, ctx);
            }
            None => {
                self.logger.log(
                    Level::Warn,
                    Subsystem::Interrupt,
                    "Unknown interrupt ID received",
                );
            }
        }
    }

    /// Authoritative per-tick decrement of `remaining_time` on live PCBs;
    /// expirations are marked TERMINATED in place and EXAM_TIMEOUT raised.
    fn check_timeouts(&self) {
        let mut world = self.world.lock();
        let mut idx = 0;
        loop {
            if idx >= world.processes.len() {
                break;
            }
            if world.processes[idx].is_active() {
                world.processes[idx].remaining_time -= 1;
                if world.processes[idx].remaining_time <= 0 {
                    let pid = world.processes[idx].pid;
                    // Mark first so the timeout cannot fire twice.
                    world.processes[idx].state = ProcessState::Terminated;
                    drop(world);
                    self.raise(INT_EXAM_TIMEOUT, pid);
                    world = self.world.lock();
                }
            }
            idx += 1;
        }
    }

    fn check_overload(&self, io: &IoBuffer) {
        if io.fill_fraction() >= OVERLOAD_THRESHOLD {
            self.raise(INT_OVERLOAD, -1);
        }
    }

    /// Dispatch everything currently pending.
    fn drain(&self, ctx: &HandlerCtx) {
        while self.ready.try_wait() {
            let popped = {
                let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                if pending.count == 0 {
                    None
                } else {
                    let head = pending.head;
                    let pi = pending.slots[head].take();
                    pending.head = (pending.head + 1) % PENDING_CAPACITY;
                    pending.count -= 1;
                    pi
                }
            };
            let Some(pi) = popped else { break };
            self.dispatch(pi, ctx);
        }
    }

    /// One dispatcher iteration: detectors, then the pending queue.
    pub fn run_tick(&self, ctx: &HandlerCtx) {
        self.check_timeouts();
        self.check_overload(&ctx.io);
        self.drain(ctx);
    }

    pub fn spawn(
        self: &Arc<Self>,
        ctx: HandlerCtx,
        tick_ms: u64,
    ) -> io::Result<JoinHandle<()>> {
        let ints = Arc::clone(self);
        thread::Builder::new()
            .name("interrupt".into())
            .spawn(move || {
                ints.logger.log(
                    Level::Info,
                    Subsystem::Interrupt,
                    "Interrupt handler thread started",
                );
                loop {
                    if !ints.world.is_running() {
                        break;
                    }
                    ints.run_tick(&ctx);
                    thread::sleep(Duration::from_millis(tick_ms));
                }
                ints.logger.log(
                    Level::Info,
                    Subsystem::Interrupt,
                    "Interrupt thread exiting",
                );
            })
    }

    #[cfg(test)]
    fn ivt_len(&self) -> usize {
        self.ivt.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).count
    }
}

/// EXAM_TIMEOUT: persist whatever the student had as a partial submission,
/// reclaim their frames, terminate the process.
fn handle_exam_timeout(pid: i32, ctx: &HandlerCtx) {
    ctx.logger.log(
        Level::Warn,
        Subsystem::Interrupt,
        format!("TIMEOUT: PID {pid} exam expired — saving partial submission"),
    );

    let answer = format!("PARTIAL_PID{pid}");
    ctx.io.submit(pid, 0, &answer, true);

    if pid > 0 {
        ctx.memory.free_process((pid - 1) as usize);
    }
    ctx.scheduler.terminate(pid);

    ctx.world.lock().timeouts_fired += 1;
}

/// OVERLOAD: count the signal and apply brief back-pressure in the
/// dispatcher before declaring the condition resolved.
fn handle_overload(_pid: i32, ctx: &HandlerCtx) {
    ctx.logger.log(
        Level::Warn,
        Subsystem::Interrupt,
        "OVERLOAD: Buffer critical — pausing new submissions",
    );
    ctx.world.lock().overload_signals += 1;

    thread::sleep(Duration::from_millis(2 * ctx.cfg.tick_ms));

    ctx.logger.log(
        Level::Info,
        Subsystem::Interrupt,
        "OVERLOAD resolved — resuming normal operation",
    );
}

/// PAGE_FAULT: informational; eviction happens inside `MemoryManager`.
fn handle_page_fault(pid: i32, ctx: &HandlerCtx) {
    ctx.logger.log(
        Level::Info,
        Subsystem::Interrupt,
        format!("PAGE FAULT raised for PID {pid}"),
    );
}

/// SUBMIT_COMPLETE: informational.
fn handle_submit_complete(pid: i32, ctx: &HandlerCtx) {
    ctx.logger.log(
        Level::Info,
        Subsystem::Interrupt,
        format!("Submission complete for PID {pid}"),
    );
}
