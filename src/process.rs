/*!
Process control blocks for simulated student exam sessions.

Each admitted student is modelled as one PCB. PCBs are appended to the
world-state table on admission and mutated in place; entries are never
removed (termination is marked, the slot remains for reporting).
*/

/// Lifecycle states of a simulated process.
///
/// `Waiting` is part of the classic five-state model and is kept for
/// completeness; the shipped scheduling policies never park a process there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    New,
    Ready,
    Running,
    Waiting,
    Terminated,
}

/// Process control block. `pid` is positive and stable for the whole run;
/// `remaining_time` is in ticks and only ever decreases while the process
/// is alive.
#[derive(Debug, Clone)]
pub struct Pcb {
    pub pid: i32,
    pub state: ProcessState,
    /// Higher = more urgent. Initialised to 1 on admission; the shipped
    /// policies key on `remaining_time` instead (the PRIORITY policy is
    /// shortest-remaining-time-first in behaviour).
    pub priority: i32,
    /// Nominal exam duration in ticks.
    pub total_time: i32,
    /// Ticks left before the exam times out.
    pub remaining_time: i32,
    pub waiting_time: i32,
    pub turnaround_time: i32,
    pub pages_used: i32,
}

impl Pcb {
    pub fn new(pid: i32, total_time: i32, remaining_time: i32) -> Self {
        Self {
            pid,
            state: ProcessState::New,
            priority: 1,
            total_time,
            remaining_time,
            waiting_time: 0,
            turnaround_time: 0,
            pages_used: 0,
        }
    }

    /// Whether the process can still consume CPU time.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.state, ProcessState::Ready | ProcessState::Running)
    }
}
