/*!
Process scheduler: batch admission plus one scheduling decision per tick
under the selected policy.

Policies
- Round-robin: a cyclic index over the ready list; the indexed entry burns
  one `time_quantum` per tick and is swap-removed on completion.
- Priority: a min-heap keyed by `remaining_time` — shortest remaining time
  first in behaviour, PRIORITY by historical name. The PCB `priority`
  field is admitted as 1 and never consulted.

The ready structure holds lightweight copies (pid + remaining time); the
authoritative PCB lives in the world table. The interrupt thread's timeout
detector decrements the world copy by 1 per tick while the scheduler burns
quantum on its own copy, so observable process lifetime is the shorter of
the two paths. Completion from either side funnels through `terminate`,
which is idempotent per pid.

Lock ordering: ready-queue lock before the terminated-set lock before the
world lock; never the reverse.
*/

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;
use rand::rngs::StdRng;

use crate::config::{Config, SchedAlgo};
use crate::logger::{Level, Logger, Subsystem};
use crate::process::{Pcb, ProcessState};
use crate::world::SharedWorld;

/// Ready-queue entry: the scheduler's private copy of what it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    remaining: i32,
    pid: i32,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.remaining
            .cmp(&other.remaining)
            .then(self.pid.cmp(&other.pid))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

enum ReadyQueue {
    RoundRobin { entries: Vec<QueueEntry>, index: usize },
    Priority { heap: BinaryHeap<Reverse<QueueEntry>> },
}

impl ReadyQueue {
    fn new(algo: SchedAlgo) -> Self {
        match algo {
            SchedAlgo::RoundRobin => ReadyQueue::RoundRobin {
                entries: Vec::new(),
                index: 0,
            },
            SchedAlgo::Priority => ReadyQueue::Priority {
                heap: BinaryHeap::new(),
            },
        }
    }

    fn push(&mut self, entry: QueueEntry) {
        match self {
            ReadyQueue::RoundRobin { entries, .. } => entries.push(entry),
            ReadyQueue::Priority { heap } => heap.push(Reverse(entry)),
        }
    }

    fn len(&self) -> usize {
        match self {
            ReadyQueue::RoundRobin { entries, .. } => entries.len(),
            ReadyQueue::Priority { heap } => heap.len(),
        }
    }
}

pub struct Scheduler {
    queue: Mutex<ReadyQueue>,
    /// Pids already funnelled through `terminate`; keeps completion
    /// counting idempotent across the natural and timeout paths.
    terminated: Mutex<HashSet<i32>>,
    cfg: Arc<Config>,
    world: SharedWorld,
    logger: Logger,
}

impl Scheduler {
    pub fn new(cfg: Arc<Config>, world: SharedWorld, logger: Logger) -> Self {
        logger.log(Level::Info, Subsystem::Scheduler, "Scheduler initialized");
        Self {
            queue: Mutex::new(ReadyQueue::new(cfg.sched_algo)),
            terminated: Mutex::new(HashSet::new()),
            cfg,
            world,
            logger,
        }
    }

    /// Admit one PCB: append it to the world table in READY state and
    /// enqueue it under the active policy. Never fails.
    pub fn add(&self, mut pcb: Pcb) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        pcb.state = ProcessState::Ready;

        {
            let mut world = self.world.lock();
            world.processes.push(pcb.clone());
        }

        queue.push(QueueEntry {
            remaining: pcb.remaining_time,
            pid: pcb.pid,
        });
        drop(queue);

        self.logger.log(
            Level::Info,
            Subsystem::Scheduler,
            format!(
                "PID {} added to ready queue (remaining={} ticks)",
                pcb.pid, pcb.remaining_time
            ),
        );
    }

    /// Mark `pid` TERMINATED and count the completion. Idempotent: repeat
    /// calls for the same pid (timeout handler, stale ready-queue copies)
    /// are no-ops.
    pub fn terminate(&self, pid: i32) {
        {
            let mut terminated = self.terminated.lock().unwrap_or_else(|e| e.into_inner());
            if !terminated.insert(pid) {
                return;
            }
        }

        {
            let mut world = self.world.lock();
            if world.pcb(pid).is_none() {
                return;
            }
            world.mark_terminated(pid);
            world.completed_processes += 1;
        }

        self.logger.log(
            Level::Info,
            Subsystem::Scheduler,
            format!("PID {pid} terminated"),
        );
    }

    /// Admit up to 5 new students if the table is not yet full. The worker
    /// calls this every 10 ticks; exposed for tests.
    pub fn admit_batch(&self, rng: &mut StdRng) {
        let admitted = self.world.lock().processes.len();
        if admitted >= self.cfg.num_students {
            return;
        }

        let batch = (self.cfg.num_students - admitted).min(5);
        for i in 0..batch {
            let pid = (admitted + i + 1) as i32;
            let remaining = self.cfg.exam_duration - rng.random_range(0..10);
            self.add(Pcb::new(pid, self.cfg.exam_duration, remaining));
        }
    }

    /// One scheduling decision under the configured policy.
    pub fn run_tick(&self) {
        match self.cfg.sched_algo {
            SchedAlgo::RoundRobin => self.run_round_robin(),
            SchedAlgo::Priority => self.run_priority(),
        }
    }

    fn set_idle(&self) {
        let mut world = self.world.lock();
        world.running_pid = -1;
        world.cpu_utilization = 0.0;
    }

    fn run_round_robin(&self) {
        let (pid, n) = {
            let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            let ReadyQueue::RoundRobin { entries, index } = &*queue else {
                return;
            };
            if entries.is_empty() {
                drop(queue);
                self.set_idle();
                return;
            }
            (entries[*index % entries.len()].pid, entries.len())
        };

        {
            let mut world = self.world.lock();
            world.running_pid = pid;
            world.cpu_utilization = 100.0 * n as f32 / (n + 1) as f32;
            world.context_switches += 1;
        }

        // Burn one quantum on the selected entry.
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        let ReadyQueue::RoundRobin { entries, index } = &mut *queue else {
            return;
        };
        if entries.is_empty() {
            return;
        }
        let idx = *index % entries.len();
        entries[idx].remaining -= self.cfg.time_quantum;

        if entries[idx].remaining <= 0 {
            let done = entries.swap_remove(idx);
            self.terminate(done.pid);
            self.logger.log(
                Level::Info,
                Subsystem::Scheduler,
                format!("PID {} completed exam (RR)", done.pid),
            );
        } else {
            *index = (idx + 1) % entries.len();
        }
    }

    fn run_priority(&self) {
        let popped = {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            match &mut *queue {
                ReadyQueue::Priority { heap } => heap.pop(),
                ReadyQueue::RoundRobin { .. } => return,
            }
        };
        let Some(Reverse(mut entry)) = popped else {
            self.set_idle();
            return;
        };

        {
            let mut world = self.world.lock();
            world.running_pid = entry.pid;
            world.cpu_utilization = 100.0
                * (self.cfg.num_students - world.completed_processes.min(self.cfg.num_students))
                    as f32
                / self.cfg.num_students.max(1) as f32;
            world.context_switches += 1;
        }

        entry.remaining -= self.cfg.time_quantum;

        if entry.remaining <= 0 {
            self.terminate(entry.pid);
            self.logger.log(
                Level::Info,
                Subsystem::Scheduler,
                format!("PID {} completed exam (PRIORITY)", entry.pid),
            );
        } else {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.push(entry);
        }
    }

    #[cfg(test)]
    fn ready_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Scheduler worker: admission every 10 ticks, one decision per tick.
    pub fn spawn(self: &Arc<Self>, tick_ms: u64, mut rng: StdRng) -> io::Result<JoinHandle<()>> {
        let sched = Arc::clone(self);
        thread::Builder::new()
            .name("scheduler".into())
            .spawn(move || {
                sched.logger.log(
                    Level::Info,
                    Subsystem::Scheduler,
                    "Scheduler thread started",
                );
                loop {
                    let (running, tick) = {
                        let world = sched.world.lock();
                        (world.simulation_running, world.current_tick)
                    };
                    if !running {
                        break;
                    }

                    // New students join the exam in batches over time.
                    if tick % 10 == 0 {
                        sched.admit_batch(&mut rng);
                    }

                    sched.run_tick();
                    thread::sleep(Duration::from_millis(tick_ms));
                }
                sched.logger.log(
                    Level::Info,
                    Subsystem::Scheduler,
                    "Scheduler thread exiting",
                );
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{quiet_logger, tiny_config};
    use rand::SeedableRng;

    fn scheduler(mut mutate: impl FnMut(&mut Config)) -> (Arc<Scheduler>, SharedWorld) {
        let mut cfg = tiny_config();
        mutate(&mut cfg);
        let world = SharedWorld::new();
        let logger = quiet_logger(&world);
        let sched = Arc::new(Scheduler::new(Arc::new(cfg), world.clone(), logger));
        (sched, world)
    }

    #[test]
    fn add_registers_pcb_as_ready() {
        let (sched, world) = scheduler(|_| {});
        sched.add(Pcb::new(1, 10, 10));

        let snap = world.snapshot();
        assert_eq!(snap.processes.len(), 1);
        assert_eq!(snap.processes[0].state, ProcessState::Ready);
        assert_eq!(sched.ready_len(), 1);
    }

    #[test]
    fn terminate_is_idempotent_per_pid() {
        let (sched, world) = scheduler(|_| {});
        sched.add(Pcb::new(1, 10, 10));

        sched.terminate(1);
        sched.terminate(1);
        sched.terminate(99); // unknown pid: no count

        let snap = world.snapshot();
        assert_eq!(snap.completed_processes, 1);
        assert_eq!(snap.processes[0].state, ProcessState::Terminated);
    }

    #[test]
    fn round_robin_rotates_fairly_and_completes() {
        let (sched, world) = scheduler(|cfg| {
            cfg.sched_algo = SchedAlgo::RoundRobin;
            cfg.time_quantum = 1;
            cfg.num_students = 4;
        });
        for pid in 1..=4 {
            sched.add(Pcb::new(pid, 8, 8));
        }

        let mut selections = [0u32; 5];
        for _ in 0..32 {
            sched.run_tick();
            let pid = world.snapshot().running_pid;
            selections[pid as usize] += 1;
        }

        let snap = world.snapshot();
        assert_eq!(snap.context_switches, 32);
        assert_eq!(snap.completed_processes, 4);
        for pid in 1..=4 {
            assert!(
                selections[pid] >= 6,
                "pid {pid} ran only {} times",
                selections[pid]
            );
        }

        // Queue is drained; the next decision parks the CPU.
        sched.run_tick();
        let snap = world.snapshot();
        assert_eq!(snap.running_pid, -1);
        assert_eq!(snap.cpu_utilization, 0.0);
        assert_eq!(snap.context_switches, 32);
    }

    #[test]
    fn round_robin_reports_utilization_from_queue_depth() {
        let (sched, world) = scheduler(|cfg| {
            cfg.sched_algo = SchedAlgo::RoundRobin;
            cfg.time_quantum = 1;
        });
        for pid in 1..=4 {
            sched.add(Pcb::new(pid, 8, 8));
        }
        sched.run_tick();
        assert_eq!(world.snapshot().cpu_utilization, 80.0); // 100 * 4 / 5
    }

    #[test]
    fn priority_pops_shortest_remaining_first() {
        let (sched, world) = scheduler(|cfg| {
            cfg.sched_algo = SchedAlgo::Priority;
            cfg.time_quantum = 5;
            cfg.num_students = 3;
        });
        sched.add(Pcb::new(1, 10, 10));
        sched.add(Pcb::new(2, 10, 4));
        sched.add(Pcb::new(3, 10, 7));

        let mut order = Vec::new();
        for _ in 0..5 {
            sched.run_tick();
            order.push(world.snapshot().running_pid);
        }

        // pid 2 (4 ticks) finishes first, pid 3 (7) runs twice, pid 1 (10)
        // runs twice.
        assert_eq!(order, vec![2, 3, 3, 1, 1]);
        assert_eq!(world.snapshot().completed_processes, 3);
    }

    #[test]
    fn admission_fills_in_batches_of_five() {
        let (sched, world) = scheduler(|cfg| {
            cfg.num_students = 12;
            cfg.exam_duration = 50;
        });
        let mut rng = StdRng::seed_from_u64(11);

        sched.admit_batch(&mut rng);
        assert_eq!(world.snapshot().processes.len(), 5);
        sched.admit_batch(&mut rng);
        assert_eq!(world.snapshot().processes.len(), 10);
        sched.admit_batch(&mut rng);
        assert_eq!(world.snapshot().processes.len(), 12);
        sched.admit_batch(&mut rng);
        assert_eq!(world.snapshot().processes.len(), 12);

        let snap = world.snapshot();
        for (i, p) in snap.processes.iter().enumerate() {
            assert_eq!(p.pid, i as i32 + 1);
            assert!(p.remaining_time > 40 && p.remaining_time <= 50);
            assert_eq!(p.state, ProcessState::Ready);
        }
    }
}
