/*!
Machine: the façade that wires the subsystems together and drives a run.

Construction builds every component handle up front — shared world,
logger, scheduler, memory, I/O buffer, interrupt controller — and hands
each worker the capability surface it needs. There are no ambient
globals; everything flows from here.

Run sequence
- Open the output sinks (degrading to stderr when a file cannot be
  created), register the interrupt vector, spawn one worker per
  subsystem, then poll the end conditions on the calling thread:
  `current_tick >= exam_duration`, all students completed, or the running
  flag cleared externally (dashboard `q`).
- Shutdown is cooperative: clear the flag, post the logger/IO readiness
  semaphores, join every worker, write the summary report.
*/

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::config::Config;
use crate::error::SimError;
use crate::interrupt::{HandlerCtx, InterruptController};
use crate::io_buffer::{IoBuffer, SUBMISSIONS_HEADER};
use crate::logger::{LOG_HEADER, Logger, open_sink};
use crate::memory::MemoryManager;
use crate::scheduler::Scheduler;
use crate::world::{SharedWorld, WorldState};
use crate::{clock, report};

pub struct Machine {
    cfg: Arc<Config>,
    world: SharedWorld,
    logger: Logger,
    scheduler: Arc<Scheduler>,
    memory: Arc<MemoryManager>,
    io: IoBuffer,
    interrupts: Arc<InterruptController>,
    output_dir: PathBuf,
}

impl Machine {
    pub fn new(cfg: Config) -> Self {
        Self::with_output_dir(cfg, PathBuf::from("output"))
    }

    pub fn with_output_dir(cfg: Config, output_dir: PathBuf) -> Self {
        let cfg = Arc::new(cfg);
        let start = Instant::now();
        let world = SharedWorld::new();
        let logger = Logger::new(world.clone(), start);
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&cfg),
            world.clone(),
            logger.clone(),
        ));
        let memory = Arc::new(MemoryManager::new(
            &cfg,
            world.clone(),
            logger.clone(),
            start,
        ));
        let io = IoBuffer::new(&cfg, world.clone(), logger.clone(), start);
        let interrupts = Arc::new(InterruptController::new(
            world.clone(),
            logger.clone(),
            start,
        ));

        Self {
            cfg,
            world,
            logger,
            scheduler,
            memory,
            io,
            interrupts,
            output_dir,
        }
    }

    /// Shared world handle, for snapshot consumers wired outside the core
    /// (dashboard, tests).
    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    /// Per-worker RNG stream. Seeded runs derive disjoint deterministic
    /// streams; unseeded runs draw from the OS.
    fn stream_rng(&self, stream: u64) -> StdRng {
        match self.cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            None => StdRng::from_os_rng(),
        }
    }

    /// Run the simulation to completion and return the final snapshot.
    pub fn run(&self) -> Result<WorldState, SimError> {
        if let Err(e) = fs::create_dir_all(&self.output_dir) {
            eprintln!(
                "WARNING: could not create {}: {e}; sinks degrade to stderr",
                self.output_dir.display()
            );
        }
        let log_sink = open_sink(&self.output_dir.join("system_log.txt"), LOG_HEADER);
        let submissions_sink = open_sink(
            &self.output_dir.join("submissions.txt"),
            SUBMISSIONS_HEADER,
        );

        self.interrupts.register_defaults();
        let ctx = HandlerCtx {
            cfg: Arc::clone(&self.cfg),
            world: self.world.clone(),
            scheduler: Arc::clone(&self.scheduler),
            memory: Arc::clone(&self.memory),
            io: self.io.clone(),
            logger: self.logger.clone(),
        };

        let tick_ms = self.cfg.tick_ms;
        let mut workers: Vec<(&'static str, JoinHandle<()>)> = Vec::new();
        workers.push(("tick", clock::spawn(self.world.clone(), tick_ms)?));
        workers.push(("logger", self.logger.spawn(log_sink)?));
        workers.push(("scheduler", self.scheduler.spawn(tick_ms, self.stream_rng(1))?));
        workers.push(("memory", self.memory.spawn(tick_ms, self.stream_rng(2))?));
        workers.push((
            "io",
            self.io.spawn(
                submissions_sink,
                self.cfg.demo_mode,
                tick_ms,
                self.stream_rng(3),
            )?,
        ));
        workers.push(("interrupt", self.interrupts.spawn(ctx, tick_ms)?));

        // Driver: poll the end conditions once per tick.
        loop {
            let (running, tick, done) = {
                let world = self.world.lock();
                (
                    world.simulation_running,
                    world.current_tick,
                    world.completed_processes,
                )
            };
            if !running {
                break;
            }
            if tick >= self.cfg.exam_duration.max(0) as u64 {
                self.world.stop();
                break;
            }
            if done >= self.cfg.num_students {
                self.world.stop();
                break;
            }
            thread::sleep(Duration::from_millis(tick_ms));
        }

        // Cooperative shutdown: flag first, then unblock any final waits.
        self.world.stop();
        self.io.shutdown();
        self.logger.shutdown();

        let mut failed: Option<&'static str> = None;
        for (name, handle) in workers {
            if handle.join().is_err() {
                failed = failed.or(Some(name));
            }
        }
        if let Some(name) = failed {
            return Err(SimError::Worker(name.into()));
        }

        let summary = self.world.snapshot();
        if let Err(e) = report::write_summary(&summary, &self.output_dir.join("summary.txt")) {
            eprintln!("WARNING: could not write summary report: {e}");
        }
        Ok(summary)
    }
}
