/*!
Bounded submission buffer: non-blocking producers, batched flushing.

Purpose
- `submit` is the producer side used by the simulated students and the
  timeout handler. It try-waits on the empty-slot semaphore and drops the
  submission (counted, logged at ERROR) when the buffer is full; it never
  blocks the caller.
- The flusher worker synthesises answer traffic from the running process,
  optionally fires the demo-mode submission storm, and drains the ring to
  the submissions sink when fill reaches the threshold or every 15 ticks.

Ordering
- Drained in FIFO order of completed `submit` calls; cross-producer order
  is whatever the buffer lock serialised. Records carry their raw
  timestamp for later sorting.
*/

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::Rng;
use rand::rngs::StdRng;

use crate::config::Config;
use crate::logger::{Level, Logger, Subsystem};
use crate::sync::Semaphore;
use crate::world::SharedWorld;

/// Default ring capacity.
pub const BUFFER_CAPACITY: usize = 256;

/// Drain when the ring is this full.
pub const FLUSH_THRESHOLD: f32 = 0.80;

/// Answers are textual and capped; longer inputs are truncated.
pub const MAX_ANSWER_LEN: usize = 128;

pub const SUBMISSIONS_HEADER: &str = "=== EXAM SUBMISSIONS ===";

#[derive(Debug, Clone)]
pub struct Submission {
    pub pid: i32,
    pub question_id: i32,
    pub answer: String,
    pub timestamp_ms: u64,
    /// Set for timeout-induced submissions.
    pub is_partial: bool,
}

impl Submission {
    /// On-disk record format.
    pub fn render(&self) -> String {
        format!(
            "[{} ms] PID={:<3} Q={:<2} {} ANSWER={}",
            self.timestamp_ms,
            self.pid,
            self.question_id,
            if self.is_partial { "[PARTIAL]" } else { "        " },
            self.answer
        )
    }
}

struct Ring {
    slots: Vec<Option<Submission>>,
    head: usize,
    tail: usize,
    count: usize,
}

struct IoInner {
    ring: Mutex<Ring>,
    empty_slots: Semaphore,
    filled_slots: Semaphore,
    capacity: usize,
    world: SharedWorld,
    logger: Logger,
    start: Instant,
}

/// Cloneable handle to the bounded submission buffer.
#[derive(Clone)]
pub struct IoBuffer {
    inner: Arc<IoInner>,
}

impl IoBuffer {
    pub fn new(cfg: &Config, world: SharedWorld, logger: Logger, start: Instant) -> Self {
        let capacity = cfg.buffer_capacity.max(1);
        logger.log(Level::Info, Subsystem::Io, "I/O buffer initialized");
        Self {
            inner: Arc::new(IoInner {
                ring: Mutex::new(Ring {
                    slots: vec![None; capacity],
                    head: 0,
                    tail: 0,
                    count: 0,
                }),
                empty_slots: Semaphore::new(capacity),
                filled_slots: Semaphore::new(0),
                capacity,
                world,
                logger,
                start,
            }),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Fraction of slots currently occupied.
    pub fn fill_fraction(&self) -> f32 {
        let ring = self.inner.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.count as f32 / self.inner.capacity as f32
    }

    /// Producer entry point. Returns whether the submission was accepted;
    /// a full buffer drops it and bumps the dropped counter. Never blocks.
    pub fn submit(&self, pid: i32, question_id: i32, answer: &str, is_partial: bool) -> bool {
        let inner = &self.inner;

        if !inner.empty_slots.try_wait() {
            inner.world.lock().dropped_submissions += 1;
            inner.logger.log(
                Level::Error,
                Subsystem::Io,
                format!("DROP: PID {pid} Q{question_id} — buffer full!"),
            );
            return false;
        }

        let answer = if answer.is_empty() { "EMPTY" } else { answer };
        let answer: String = answer.chars().take(MAX_ANSWER_LEN).collect();

        {
            let mut ring = inner.ring.lock().unwrap_or_else(|e| e.into_inner());
            let tail = ring.tail;
            ring.slots[tail] = Some(Submission {
                pid,
                question_id,
                answer,
                timestamp_ms: inner.start.elapsed().as_millis() as u64,
                is_partial,
            });
            ring.tail = (ring.tail + 1) % inner.capacity;
            ring.count += 1;

            let mut world = inner.world.lock();
            world.buffer_count = ring.count;
            world.total_submissions += 1;
        }
        inner.filled_slots.post();

        inner.logger.log(
            Level::Info,
            Subsystem::Io,
            format!(
                "PID {pid} submitted Q{question_id}{}",
                if is_partial { " (PARTIAL/timeout)" } else { "" }
            ),
        );
        true
    }

    /// Drain the ring to `sink`, bounded by the fill level observed on
    /// entry. Returns how many records were written.
    pub fn flush(&self, sink: &mut (dyn Write + Send)) -> usize {
        let inner = &self.inner;
        let target = {
            let ring = inner.ring.lock().unwrap_or_else(|e| e.into_inner());
            ring.count
        };
        if target == 0 {
            return 0;
        }

        let mut flushed = 0;
        while flushed < target {
            if !inner.filled_slots.try_wait() {
                break;
            }

            let record = {
                let mut ring = inner.ring.lock().unwrap_or_else(|e| e.into_inner());
                let head = ring.head;
                let record = ring.slots[head].take();
                ring.head = (ring.head + 1) % inner.capacity;
                ring.count -= 1;
                inner.world.lock().buffer_count = ring.count;
                record
            };
            inner.empty_slots.post();

            if let Some(s) = record {
                let _ = writeln!(sink, "{}", s.render());
                flushed += 1;
            }
        }

        if flushed > 0 {
            let _ = sink.flush();
            inner.world.lock().flush_count += 1;
            inner.logger.log(
                Level::Info,
                Subsystem::Io,
                format!("Flushed {flushed} submissions to disk"),
            );
        }
        flushed
    }

    /// Demo-mode burst: up to 30 synthesised submissions in rapid
    /// succession, sized by how many processes exist. Exercises the drop
    /// path.
    pub fn submission_storm(&self, rng: &mut StdRng) {
        self.inner.logger.log(
            Level::Warn,
            Subsystem::Io,
            "SUBMISSION STORM triggered — 30 simultaneous submissions!",
        );

        let count = self.inner.world.lock().processes.len();
        let storms = count.min(30);
        for i in 0..storms {
            let answer = format!("ANS_{i}_{}", rng.random_range(0..100));
            self.submit(i as i32 + 1, rng.random_range(1..=10), &answer, false);
        }
    }

    /// Wake any final semaphore wait during shutdown.
    pub fn shutdown(&self) {
        self.inner.filled_slots.post();
    }

    /// Flusher worker. Synthesises traffic, handles the storm, drains on
    /// threshold or every 15 ticks, and performs one final drain when the
    /// running flag clears.
    pub fn spawn(
        &self,
        mut sink: Box<dyn Write + Send>,
        demo_mode: bool,
        tick_ms: u64,
        mut rng: StdRng,
    ) -> io::Result<JoinHandle<()>> {
        let io = self.clone();
        thread::Builder::new().name("io".into()).spawn(move || {
            io.inner
                .logger
                .log(Level::Info, Subsystem::Io, "I/O buffer thread started");

            let mut storm_triggered = false;
            loop {
                let (running, tick, process_count, pid) = {
                    let world = io.inner.world.lock();
                    (
                        world.simulation_running,
                        world.current_tick,
                        world.processes.len(),
                        world.running_pid,
                    )
                };

                if !running {
                    // Final drain before exit.
                    io.flush(&mut *sink);
                    break;
                }

                if demo_mode && tick >= 30 && !storm_triggered && process_count >= 10 {
                    io.submission_storm(&mut rng);
                    storm_triggered = true;
                }

                // 30% chance the running process submits an answer this tick.
                if pid > 0 && process_count > 0 && rng.random_bool(0.3) {
                    let answer = format!("ANS_{}", rng.random_range(0..1000));
                    io.submit(pid, rng.random_range(1..=10), &answer, false);
                }

                if io.fill_fraction() >= FLUSH_THRESHOLD || tick % 15 == 0 {
                    io.flush(&mut *sink);
                }

                thread::sleep(Duration::from_millis(tick_ms));
            }

            io.inner
                .logger
                .log(Level::Info, Subsystem::Io, "I/O buffer thread exiting");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Pcb;
    use crate::test_utils::{SharedSink, quiet_logger, tiny_config};
    use rand::SeedableRng;

    fn buffer(capacity: usize) -> (IoBuffer, SharedWorld) {
        let mut cfg = tiny_config();
        cfg.buffer_capacity = capacity;
        let world = SharedWorld::new();
        let logger = quiet_logger(&world);
        let io = IoBuffer::new(&cfg, world.clone(), logger, Instant::now());
        (io, world)
    }

    #[test]
    fn submit_accounts_in_world_state() {
        let (io, world) = buffer(4);
        assert!(io.submit(1, 3, "ANS_42", false));
        assert!(io.submit(2, 1, "ANS_7", false));

        let snap = world.snapshot();
        assert_eq!(snap.total_submissions, 2);
        assert_eq!(snap.buffer_count, 2);
        assert_eq!(snap.dropped_submissions, 0);
        assert!((io.fill_fraction() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn full_buffer_drops_and_counts() {
        let (io, world) = buffer(4);
        for i in 0..4 {
            assert!(io.submit(i, 1, "x", false));
        }
        for i in 0..10 {
            assert!(!io.submit(100 + i, 1, "y", false));
        }

        let snap = world.snapshot();
        assert_eq!(snap.total_submissions, 4);
        assert_eq!(snap.dropped_submissions, 10);
        assert_eq!(snap.buffer_count, 4);
    }

    #[test]
    fn flush_drains_fifo_and_reopens_slots() {
        let (io, world) = buffer(4);
        io.submit(1, 1, "first", false);
        io.submit(2, 2, "second", false);
        io.submit(3, 3, "third", false);

        let sink = SharedSink::new();
        let drained = io.flush(&mut sink.writer());
        assert_eq!(drained, 3);

        let text = sink.contents();
        let first = text.find("first").expect("first flushed");
        let second = text.find("second").expect("second flushed");
        let third = text.find("third").expect("third flushed");
        assert!(first < second && second < third);

        let snap = world.snapshot();
        assert_eq!(snap.buffer_count, 0);
        assert_eq!(snap.flush_count, 1);

        // Slots are reusable after the drain.
        assert!(io.submit(4, 4, "again", false));
    }

    #[test]
    fn ring_wraps_across_flushes() {
        let (io, _world) = buffer(2);
        let sink = SharedSink::new();

        io.submit(1, 1, "a", false);
        io.submit(2, 1, "b", false);
        io.flush(&mut sink.writer());
        io.submit(3, 1, "c", false);
        io.submit(4, 1, "d", false);
        io.flush(&mut sink.writer());

        let text = sink.contents();
        let order: Vec<usize> = ["a", "b", "c", "d"]
            .iter()
            .map(|s| text.find(&format!("ANSWER={s}")).expect("flushed"))
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn partial_submissions_are_marked_on_disk() {
        let sub = Submission {
            pid: 7,
            question_id: 0,
            answer: "PARTIAL_PID7".into(),
            timestamp_ms: 120,
            is_partial: true,
        };
        assert_eq!(sub.render(), "[120 ms] PID=7   Q=0  [PARTIAL] ANSWER=PARTIAL_PID7");

        let normal = Submission {
            pid: 12,
            question_id: 5,
            answer: "ANS_9".into(),
            timestamp_ms: 130,
            is_partial: false,
        };
        assert_eq!(normal.render(), "[130 ms] PID=12  Q=5           ANSWER=ANS_9");
    }

    #[test]
    fn long_answers_are_truncated() {
        let (io, _world) = buffer(2);
        let long = "x".repeat(MAX_ANSWER_LEN + 50);
        assert!(io.submit(1, 1, &long, false));

        let sink = SharedSink::new();
        io.flush(&mut sink.writer());
        let text = sink.contents();
        let answer = text
            .lines()
            .find_map(|l| l.split("ANSWER=").nth(1))
            .expect("answer on disk");
        assert_eq!(answer.len(), MAX_ANSWER_LEN);
    }

    #[test]
    fn storm_fills_buffer_and_exercises_drop_path() {
        let (io, world) = buffer(8);
        {
            let mut w = world.lock();
            for pid in 1..=30 {
                w.processes.push(Pcb::new(pid, 10, 10));
            }
        }

        let mut rng = StdRng::seed_from_u64(7);
        io.submission_storm(&mut rng);

        let snap = world.snapshot();
        assert_eq!(snap.total_submissions, 8);
        assert_eq!(snap.dropped_submissions, 22);
        assert!(io.fill_fraction() >= 0.95);
    }
}
