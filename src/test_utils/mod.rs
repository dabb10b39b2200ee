//! Shared test utilities.
//!
//! These helpers de-duplicate construction logic across the subsystem
//! tests: a small configuration, a logger with no worker attached, an
//! in-memory sink for flush assertions, and a fully wired interrupt
//! context. They intentionally support just what the test suite needs.

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::Config;
use crate::interrupt::{HandlerCtx, InterruptController};
use crate::io_buffer::IoBuffer;
use crate::logger::Logger;
use crate::memory::MemoryManager;
use crate::scheduler::Scheduler;
use crate::world::SharedWorld;

/// Small dimensions so tests run in microseconds and edge conditions
/// (full buffers, full frame pools) are cheap to reach.
pub fn tiny_config() -> Config {
    Config {
        num_students: 4,
        memory_frames: 4,
        time_quantum: 1,
        exam_duration: 20,
        buffer_capacity: 8,
        tick_ms: 1,
        seed: Some(7),
        ..Config::default()
    }
}

/// Logger handle with no drain worker; records queue up (bounded) and the
/// world recent-log ring still mirrors every call.
pub fn quiet_logger(world: &SharedWorld) -> Logger {
    Logger::new(world.clone(), Instant::now())
}

/// In-memory `Write` sink shared between the test and a worker.
#[derive(Clone)]
pub struct SharedSink {
    buf: Arc<Mutex<Vec<u8>>>,
}

pub struct SinkWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl SharedSink {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn writer(&self) -> SinkWriter {
        SinkWriter {
            buf: Arc::clone(&self.buf),
        }
    }

    pub fn boxed(&self) -> Box<dyn Write + Send> {
        Box::new(self.writer())
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap_or_else(|e| e.into_inner())).into_owned()
    }
}

impl Write for SinkWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Fully wired interrupt context over `tiny_config` (with `mutate`
/// applied), sharing one world. Handlers are NOT registered; call
/// `register_defaults` where the test needs them.
pub fn test_ctx(
    mut mutate: impl FnMut(&mut Config),
) -> (Arc<InterruptController>, HandlerCtx, SharedWorld) {
    let mut cfg = tiny_config();
    mutate(&mut cfg);
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

    let ctx = HandlerCtx {
        cfg,
        world: world.clone(),
        scheduler,
        memory,
        io,
        logger,
    };
    (interrupts, ctx, world)
}
