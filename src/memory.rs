/*!
Demand-paged memory manager: per-process page tables over a shared frame
pool, with pluggable LRU/FIFO victim selection.

Model
- Processes address memory by 0-based slot (`pid - 1`) and virtual page in
  `[0, MAX_PAGES)`. A frame records its owner slot, resident page, FIFO
  load order and last-access time; a page-table entry mirrors the mapping
  from the other side. `valid` ⇔ `frame_number ≥ 0` ⇔ the frame points
  back at this entry.
- `access` resolves hits in place and services faults by linear free-frame
  scan, then eviction: FIFO picks the smallest `load_order`, LRU the
  smallest `last_accessed`; ties break toward the lowest frame index.
- Write accesses mark the entry dirty; evicting a dirty page logs the
  simulated disk write and clears the bit (evictions are logged, not
  materialised).

Concurrency
- One lock guards the frame pool, the FIFO counter and all page tables.
  World counters are updated with the world lock taken strictly after the
  memory lock.
*/

use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::Rng;
use rand::rngs::StdRng;

use crate::config::{Config, PageAlgo};
use crate::logger::{Level, Logger, Subsystem};
use crate::world::{MAX_STUDENTS, SharedWorld};

/// Fixed capacity of the frame pool.
pub const MAX_FRAMES: usize = 256;

/// Virtual pages per process.
pub const MAX_PAGES: usize = 64;

/// Nominal working-set window the memory worker draws accesses from.
pub const WORKING_SET_PAGES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

/// One physical frame. `pid` is the owning process slot, -1 when free.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub pid: i32,
    pub virtual_page: i32,
    pub load_order: u64,
    pub last_accessed: u64,
}

impl Frame {
    fn free() -> Self {
        Self {
            pid: -1,
            virtual_page: -1,
            load_order: 0,
            last_accessed: 0,
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.pid == -1
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageTableEntry {
    pub frame_number: i32,
    pub valid: bool,
    pub dirty: bool,
    /// Monotonic nanoseconds since simulation start; LRU key.
    pub last_accessed: u64,
    /// Monotonic sequence assigned at load; FIFO key.
    pub load_order: u64,
}

impl Default for PageTableEntry {
    fn default() -> Self {
        Self {
            frame_number: -1,
            valid: false,
            dirty: false,
            last_accessed: 0,
            load_order: 0,
        }
    }
}

struct MemoryInner {
    frames: Vec<Frame>,
    tables: Vec<Vec<PageTableEntry>>,
    fifo_counter: u64,
}

pub struct MemoryManager {
    inner: Mutex<MemoryInner>,
    total_frames: usize,
    algo: PageAlgo,
    world: SharedWorld,
    logger: Logger,
    start: Instant,
}

impl MemoryManager {
    pub fn new(cfg: &Config, world: SharedWorld, logger: Logger, start: Instant) -> Self {
        let total_frames = cfg.memory_frames.min(MAX_FRAMES);
        let inner = MemoryInner {
            frames: vec![Frame::free(); total_frames],
            tables: vec![vec![PageTableEntry::default(); MAX_PAGES]; MAX_STUDENTS],
            fifo_counter: 0,
        };
        logger.log(Level::Info, Subsystem::Memory, "Memory subsystem initialized");
        Self {
            inner: Mutex::new(inner),
            total_frames,
            algo: cfg.page_algo,
            world,
            logger,
            start,
        }
    }

    #[inline]
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    /// Resolve one access. Returns the frame index, servicing a fault if
    /// needed. Out-of-range inputs return `None` and count as neither hit
    /// nor fault.
    pub fn access(&self, slot: usize, vpage: usize, kind: AccessKind) -> Option<usize> {
        if slot >= MAX_STUDENTS || vpage >= MAX_PAGES {
            return None;
        }

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.now();

        let entry = inner.tables[slot][vpage];
        if entry.valid {
            let frame = entry.frame_number as usize;
            inner.tables[slot][vpage].last_accessed = now;
            if kind == AccessKind::Write {
                inner.tables[slot][vpage].dirty = true;
            }
            inner.frames[frame].last_accessed = now;

            self.world.lock().page_hits += 1;
            return Some(frame);
        }

        // Page fault
        self.world.lock().page_faults += 1;
        self.logger.log(
            Level::Warn,
            Subsystem::Memory,
            format!("Page fault: PID {slot} page {vpage}"),
        );

        let frame = match inner.frames.iter().position(Frame::is_free) {
            Some(free) => free,
            None => {
                let victim = self.choose_victim(&inner.frames);
                self.logger.log(
                    Level::Info,
                    Subsystem::Memory,
                    format!("Evicting frame {victim} ({})", self.algo),
                );
                victim
            }
        };

        self.load_page(&mut inner, slot, vpage, frame, kind, now);

        let used = inner.frames.iter().filter(|f| !f.is_free()).count();
        self.world.lock().frames_used = used;

        Some(frame)
    }

    /// Victim frame under the configured policy; ties break toward the
    /// lowest frame index.
    fn choose_victim(&self, frames: &[Frame]) -> usize {
        let key = |f: &Frame| match self.algo {
            PageAlgo::Fifo => f.load_order,
            PageAlgo::Lru => f.last_accessed,
        };
        let mut victim = 0;
        for (i, f) in frames.iter().enumerate().skip(1) {
            if key(f) < key(&frames[victim]) {
                victim = i;
            }
        }
        victim
    }

    fn load_page(
        &self,
        inner: &mut MemoryInner,
        slot: usize,
        vpage: usize,
        frame: usize,
        kind: AccessKind,
        now: u64,
    ) {
        // Invalidate the previous owner's mapping.
        let prev = inner.frames[frame];
        if prev.pid >= 0 && (prev.pid as usize) < MAX_STUDENTS && prev.virtual_page >= 0 {
            let (ppid, ppage) = (prev.pid as usize, prev.virtual_page as usize);
            inner.tables[ppid][ppage].valid = false;
            inner.tables[ppid][ppage].frame_number = -1;
            if inner.tables[ppid][ppage].dirty {
                self.logger.log(
                    Level::Warn,
                    Subsystem::Memory,
                    format!("Dirty eviction: PID {ppid} page {ppage} → disk write"),
                );
                inner.tables[ppid][ppage].dirty = false;
            }
        }

        inner.fifo_counter += 1;
        let order = inner.fifo_counter;
        inner.frames[frame] = Frame {
            pid: slot as i32,
            virtual_page: vpage as i32,
            load_order: order,
            last_accessed: now,
        };
        inner.tables[slot][vpage] = PageTableEntry {
            frame_number: frame as i32,
            valid: true,
            dirty: kind == AccessKind::Write,
            last_accessed: now,
            load_order: order,
        };
    }

    /// Release every frame owned by `slot` and invalidate its page-table
    /// entries. A no-op for slots that own nothing or are out of range.
    pub fn free_process(&self, slot: usize) {
        if slot >= MAX_STUDENTS {
            return;
        }

        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            for i in 0..inner.frames.len() {
                if inner.frames[i].pid == slot as i32 {
                    let vp = inner.frames[i].virtual_page as usize;
                    inner.tables[slot][vp].valid = false;
                    inner.tables[slot][vp].frame_number = -1;
                    inner.frames[i].pid = -1;
                    inner.frames[i].virtual_page = -1;
                }
            }

            let used = inner.frames.iter().filter(|f| !f.is_free()).count();
            self.world.lock().frames_used = used;
        }

        self.logger.log(
            Level::Info,
            Subsystem::Memory,
            format!("Freed all frames for PID {slot}"),
        );
    }

    /// Frame index currently backing `(slot, vpage)`, if resident.
    pub fn resident(&self, slot: usize, vpage: usize) -> Option<usize> {
        if slot >= MAX_STUDENTS || vpage >= MAX_PAGES {
            return None;
        }
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = inner.tables[slot][vpage];
        entry.valid.then_some(entry.frame_number as usize)
    }

    /// Copy of the frame pool (dashboards, consistency checks).
    pub fn frames_snapshot(&self) -> Vec<Frame> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .frames
            .clone()
    }

    pub fn pte(&self, slot: usize, vpage: usize) -> Option<PageTableEntry> {
        if slot >= MAX_STUDENTS || vpage >= MAX_PAGES {
            return None;
        }
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Some(inner.tables[slot][vpage])
    }

    /// Frame/page-table bijection check: every owned frame is referenced by
    /// exactly the entry it names, and every valid entry points at a frame
    /// that agrees.
    pub fn consistent(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for (i, f) in inner.frames.iter().enumerate() {
            if f.is_free() {
                continue;
            }
            let entry = inner.tables[f.pid as usize][f.virtual_page as usize];
            if !entry.valid || entry.frame_number != i as i32 {
                return false;
            }
        }
        for (slot, table) in inner.tables.iter().enumerate() {
            for (vp, entry) in table.iter().enumerate() {
                if !entry.valid {
                    continue;
                }
                let f = inner.frames[entry.frame_number as usize];
                if f.pid != slot as i32 || f.virtual_page != vp as i32 {
                    return false;
                }
            }
        }
        true
    }

    /// Memory worker: each tick, issue 1-3 random accesses for the running
    /// process, simulating program behaviour in lieu of a real guest.
    pub fn spawn(
        self: &Arc<Self>,
        tick_ms: u64,
        mut rng: StdRng,
    ) -> io::Result<JoinHandle<()>> {
        let mem = Arc::clone(self);
        thread::Builder::new().name("memory".into()).spawn(move || {
            mem.logger
                .log(Level::Info, Subsystem::Memory, "Memory thread started");
            loop {
                let (running, pid) = {
                    let world = mem.world.lock();
                    (world.simulation_running, world.running_pid)
                };
                if !running {
                    break;
                }

                if pid > 0 {
                    let accesses = rng.random_range(1..=3);
                    for _ in 0..accesses {
                        let vpage = rng.random_range(0..WORKING_SET_PAGES);
                        let kind = if rng.random_bool(0.3) {
                            AccessKind::Write
                        } else {
                            AccessKind::Read
                        };
                        mem.access((pid - 1) as usize, vpage, kind);
                    }
                }

                thread::sleep(Duration::from_millis(tick_ms));
            }
            mem.logger
                .log(Level::Info, Subsystem::Memory, "Memory thread exiting");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{quiet_logger, tiny_config};

    fn manager(frames: usize, algo: PageAlgo) -> (MemoryManager, SharedWorld) {
        let mut cfg = tiny_config();
        cfg.memory_frames = frames;
        cfg.page_algo = algo;
        let world = SharedWorld::new();
        let logger = quiet_logger(&world);
        let mem = MemoryManager::new(&cfg, world.clone(), logger, Instant::now());
        (mem, world)
    }

    #[test]
    fn first_access_faults_then_hits() {
        let (mem, world) = manager(4, PageAlgo::Lru);
        let frame = mem.access(0, 0, AccessKind::Read).expect("valid access");
        assert_eq!(mem.access(0, 0, AccessKind::Read), Some(frame));

        let snap = world.snapshot();
        assert_eq!(snap.page_faults, 1);
        assert_eq!(snap.page_hits, 1);
        assert_eq!(snap.frames_used, 1);
        assert!(mem.consistent());
    }

    #[test]
    fn out_of_range_access_is_uncounted() {
        let (mem, world) = manager(4, PageAlgo::Lru);
        assert_eq!(mem.access(MAX_STUDENTS, 0, AccessKind::Read), None);
        assert_eq!(mem.access(0, MAX_PAGES, AccessKind::Read), None);

        let snap = world.snapshot();
        assert_eq!(snap.page_faults, 0);
        assert_eq!(snap.page_hits, 0);
    }

    #[test]
    fn fifo_evicts_oldest_load() {
        let (mem, _world) = manager(2, PageAlgo::Fifo);
        mem.access(0, 0, AccessKind::Read);
        mem.access(0, 1, AccessKind::Read);
        // Touch page 0 again; FIFO must ignore recency.
        mem.access(0, 0, AccessKind::Read);

        let frame = mem.access(0, 2, AccessKind::Read).expect("fault services");
        assert_eq!(frame, 0); // page 0 was loaded first
        assert_eq!(mem.resident(0, 0), None);
        assert_eq!(mem.resident(0, 2), Some(0));
        assert_eq!(mem.resident(0, 1), Some(1));
        assert!(mem.consistent());
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let (mem, _world) = manager(2, PageAlgo::Lru);
        mem.access(0, 0, AccessKind::Read);
        mem.access(0, 1, AccessKind::Read);
        // Refresh page 0 so page 1 becomes the LRU victim.
        mem.access(0, 0, AccessKind::Read);

        let frame = mem.access(0, 2, AccessKind::Read).expect("fault services");
        assert_eq!(frame, 1);
        assert_eq!(mem.resident(0, 1), None);
        assert_eq!(mem.resident(0, 0), Some(0));
        assert!(mem.consistent());
    }

    /// Nine distinct pages under eight frames: page 0 is touched once and
    /// never again, pages 1-8 repeatedly. Both policies must evict page 0
    /// first, and re-touching page 0 costs exactly one more fault.
    #[test]
    fn nine_pages_under_eight_frames_divergence_trace() {
        for algo in [PageAlgo::Fifo, PageAlgo::Lru] {
            let (mem, world) = manager(8, algo);

            mem.access(0, 0, AccessKind::Read);
            for vp in 1..8 {
                mem.access(0, vp, AccessKind::Read);
            }
            assert_eq!(world.snapshot().page_faults, 8);

            // Ninth page: pool is full, page 0 is both the oldest load and
            // the least recently used.
            mem.access(0, 8, AccessKind::Read);
            assert_eq!(mem.resident(0, 0), None);
            assert_eq!(mem.resident(0, 8), Some(0));

            for _ in 0..2 {
                for vp in 1..9 {
                    mem.access(0, vp, AccessKind::Read);
                }
            }
            let before = world.snapshot().page_faults;
            assert_eq!(before, 9); // rounds over 1-8 were all hits

            mem.access(0, 0, AccessKind::Read);
            assert_eq!(world.snapshot().page_faults, before + 1);
            assert!(mem.consistent());
        }
    }

    #[test]
    fn dirty_eviction_is_logged_and_cleared() {
        let (mem, world) = manager(1, PageAlgo::Fifo);
        mem.access(0, 0, AccessKind::Write);
        assert!(mem.pte(0, 0).expect("pte").dirty);

        mem.access(0, 1, AccessKind::Read);
        let snap = world.snapshot();
        assert!(
            snap.recent_logs.iter().any(|l| l.contains("Dirty eviction")),
            "dirty eviction should be logged: {:?}",
            snap.recent_logs
        );
        // The bit does not survive the eviction.
        assert!(!mem.pte(0, 0).expect("pte").dirty);
    }

    #[test]
    fn free_process_releases_frames_and_mappings() {
        let (mem, world) = manager(4, PageAlgo::Lru);
        mem.access(0, 0, AccessKind::Read);
        mem.access(0, 1, AccessKind::Read);
        mem.access(1, 0, AccessKind::Read);
        assert_eq!(world.snapshot().frames_used, 3);

        mem.free_process(0);
        assert_eq!(world.snapshot().frames_used, 1);
        assert_eq!(mem.resident(0, 0), None);
        assert_eq!(mem.resident(0, 1), None);
        assert!(mem.resident(1, 0).is_some());
        assert!(mem.consistent());

        // Unknown slots are a no-op.
        mem.free_process(MAX_STUDENTS + 5);
        assert_eq!(world.snapshot().frames_used, 1);
    }
}
