/*!
World state: the single shared record every subsystem reads and writes.

One mutex guards all of it. Subsystems keep their private structures
(ready queue, frame pool, rings) under their own locks and only reach into
the world for counters, the PCB table and the control flags. Lock ordering:
a subsystem lock may be held while taking the world lock, never the
reverse.

Read-only consumers (dashboard, driver loop) take a full snapshot by clone
so they never hold the lock while rendering.
*/

use std::sync::{Arc, Mutex, MutexGuard};

use crate::process::{Pcb, ProcessState};

/// Fixed capacity of the PCB table.
pub const MAX_STUDENTS: usize = 200;

/// Slots in the recent-log ring shown by the dashboard.
pub const RECENT_LOG_SLOTS: usize = 3;

#[derive(Debug, Clone)]
pub struct WorldState {
    // CPU
    pub running_pid: i32,
    pub cpu_utilization: f32,
    pub context_switches: u64,
    pub completed_processes: usize,

    // Memory
    pub page_faults: u64,
    pub page_hits: u64,
    pub frames_used: usize,

    // I/O buffer
    pub buffer_count: usize,
    pub total_submissions: u64,
    pub dropped_submissions: u64,
    pub flush_count: u64,

    // Interrupts
    pub timeouts_fired: u64,
    pub overload_signals: u64,

    // Processes
    pub processes: Vec<Pcb>,

    // Simulation control
    pub simulation_running: bool,
    pub current_tick: u64,

    // Recent log lines for the dashboard. `log_index` counts all lines ever
    // mirrored; only the last three survive.
    pub recent_logs: [String; RECENT_LOG_SLOTS],
    pub log_index: u64,
}

impl WorldState {
    pub fn new() -> Self {
        Self {
            running_pid: -1,
            cpu_utilization: 0.0,
            context_switches: 0,
            completed_processes: 0,
            page_faults: 0,
            page_hits: 0,
            frames_used: 0,
            buffer_count: 0,
            total_submissions: 0,
            dropped_submissions: 0,
            flush_count: 0,
            timeouts_fired: 0,
            overload_signals: 0,
            processes: Vec::with_capacity(MAX_STUDENTS),
            simulation_running: true,
            current_tick: 0,
            recent_logs: std::array::from_fn(|_| String::from("--- no events yet ---")),
            log_index: 0,
        }
    }

    #[inline]
    pub fn pcb(&self, pid: i32) -> Option<&Pcb> {
        self.processes.iter().find(|p| p.pid == pid)
    }

    #[inline]
    pub fn pcb_mut(&mut self, pid: i32) -> Option<&mut Pcb> {
        self.processes.iter_mut().find(|p| p.pid == pid)
    }

    /// Number of PCBs that can still consume CPU time.
    pub fn active_processes(&self) -> usize {
        self.processes.iter().filter(|p| p.is_active()).count()
    }

    /// Mirror one formatted log line into the ring.
    pub fn push_recent_log(&mut self, line: String) {
        let idx = (self.log_index % RECENT_LOG_SLOTS as u64) as usize;
        self.recent_logs[idx] = line;
        self.log_index += 1;
    }

    /// Mark `pid` terminated if it is not already. Returns whether this call
    /// performed the transition (used for idempotent completion counting).
    pub fn mark_terminated(&mut self, pid: i32) -> bool {
        match self.pcb_mut(pid) {
            Some(p) if p.state != ProcessState::Terminated => {
                p.state = ProcessState::Terminated;
                true
            }
            _ => false,
        }
    }
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle to the locked world state. Created once in
/// `machine::Machine` before any worker spawns.
#[derive(Debug, Clone)]
pub struct SharedWorld {
    inner: Arc<Mutex<WorldState>>,
}

impl SharedWorld {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(WorldState::new())),
        }
    }

    /// Acquire the world lock. A poisoned lock is recovered rather than
    /// propagated; the simulator degrades, it does not abort.
    pub fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Full copy of the state for read-only consumers.
    pub fn snapshot(&self) -> WorldState {
        self.lock().clone()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.lock().simulation_running
    }

    /// Clear the cancellation token. Every worker observes it within one
    /// tick and exits at its next loop top.
    pub fn stop(&self) {
        self.lock().simulation_running = false;
    }
}

impl Default for SharedWorld {
    fn default() -> Self {
        Self::new()
    }
}
