/*!
Simulation configuration: defaults, `config.conf` parser, CLI overlay.

Precedence is defaults → file → CLI, last wins.

File format
- Whitespace-tolerant `KEY = VALUE` lines.
- Keys prefixed with `#` are skipped; unknown keys are ignored.
- A missing file is fine; defaults apply.
- Recognised keys: NUM_STUDENTS, MEMORY_FRAMES, PAGE_SIZE, TIME_QUANTUM,
  EXAM_DURATION, BUFFER_CAPACITY, SCHEDULING_ALGO (ROUND_ROBIN | PRIORITY),
  PAGE_REPLACE (FIFO | LRU).

CLI flags mirror the file keys (`--students`, `--frames`, `--quantum`,
`--duration`, `--algo RR|PRIORITY`, `--page LRU|FIFO`, `--demo`, `--seed`).
Unknown flags are ignored rather than rejected.
*/

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use clap::{Parser, ValueEnum};

use crate::error::SimError;
use crate::world::MAX_STUDENTS;

/// Scheduling policy selector.
///
/// `Priority` keeps its historical name but is shortest-remaining-time-first
/// in behaviour: the ready heap is keyed by `remaining_time` and the PCB
/// `priority` field is never consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SchedAlgo {
    #[value(name = "RR")]
    RoundRobin,
    #[value(name = "PRIORITY")]
    Priority,
}

impl fmt::Display for SchedAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedAlgo::RoundRobin => write!(f, "ROUND_ROBIN"),
            SchedAlgo::Priority => write!(f, "PRIORITY"),
        }
    }
}

/// Page-replacement policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PageAlgo {
    #[value(name = "LRU")]
    Lru,
    #[value(name = "FIFO")]
    Fifo,
}

impl fmt::Display for PageAlgo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageAlgo::Lru => write!(f, "LRU"),
            PageAlgo::Fifo => write!(f, "FIFO"),
        }
    }
}

/// Command-line overlay. Every field is optional; unset fields leave the
/// file/default value in place. `ignore_errors` keeps the contract that
/// unknown flags are ignored.
#[derive(Debug, Default, Parser)]
#[command(
    name = "examos",
    about = "Operating-system teaching simulator for an online-exam workload",
    ignore_errors = true
)]
pub struct Cli {
    /// Number of student processes to admit
    #[arg(long)]
    pub students: Option<usize>,

    /// Physical memory frames in the shared pool
    #[arg(long)]
    pub frames: Option<usize>,

    /// Scheduler time quantum in ticks
    #[arg(long)]
    pub quantum: Option<i32>,

    /// Exam duration in ticks
    #[arg(long)]
    pub duration: Option<i32>,

    /// Scheduling policy
    #[arg(long, value_enum)]
    pub algo: Option<SchedAlgo>,

    /// Page-replacement policy
    #[arg(long, value_enum)]
    pub page: Option<PageAlgo>,

    /// Demo mode: trigger a submission storm at tick 30
    #[arg(long)]
    pub demo: bool,

    /// Seed for reproducible runs (workers derive per-worker streams)
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub num_students: usize,
    pub memory_frames: usize,
    pub page_size: usize,
    pub time_quantum: i32,
    pub exam_duration: i32,
    pub sched_algo: SchedAlgo,
    pub page_algo: PageAlgo,
    pub buffer_capacity: usize,
    pub demo_mode: bool,
    /// Length of one tick in wall-clock milliseconds. Not exposed through
    /// the file or CLI; tests shrink it to run fast.
    pub tick_ms: u64,
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_students: 50,
            memory_frames: 64,
            page_size: 4,
            time_quantum: 5,
            exam_duration: 100,
            sched_algo: SchedAlgo::Priority,
            page_algo: PageAlgo::Lru,
            buffer_capacity: 256,
            demo_mode: false,
            tick_ms: 100,
            seed: None,
        }
    }
}

impl Config {
    /// Defaults, then the config file (if present), then CLI flags.
    pub fn load(path: impl AsRef<Path>, cli: &Cli) -> Result<Self, SimError> {
        let mut cfg = Config::default();
        cfg.merge_file(path)?;
        cfg.merge_cli(cli);
        cfg.clamp();
        Ok(cfg)
    }

    /// Parse `KEY = VALUE` lines from `path` into `self`. Returns whether a
    /// file was found; absence is not an error.
    pub fn merge_file(&mut self, path: impl AsRef<Path>) -> Result<bool, SimError> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(SimError::ConfigFile {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            // Values are single tokens; anything after the first whitespace
            // (e.g. a trailing comment) is dropped.
            let Some(value) = value.split_whitespace().next() else {
                continue;
            };
            if key.starts_with('#') {
                continue;
            }

            match key {
                "NUM_STUDENTS" => Self::set_parsed(&mut self.num_students, value),
                "MEMORY_FRAMES" => Self::set_parsed(&mut self.memory_frames, value),
                "PAGE_SIZE" => Self::set_parsed(&mut self.page_size, value),
                "TIME_QUANTUM" => Self::set_parsed(&mut self.time_quantum, value),
                "EXAM_DURATION" => Self::set_parsed(&mut self.exam_duration, value),
                "BUFFER_CAPACITY" => Self::set_parsed(&mut self.buffer_capacity, value),
                "SCHEDULING_ALGO" => {
                    self.sched_algo = if value == "ROUND_ROBIN" {
                        SchedAlgo::RoundRobin
                    } else {
                        SchedAlgo::Priority
                    };
                }
                "PAGE_REPLACE" => {
                    self.page_algo = if value == "FIFO" {
                        PageAlgo::Fifo
                    } else {
                        PageAlgo::Lru
                    };
                }
                _ => {} // unknown keys ignored
            }
        }

        Ok(true)
    }

    /// Overlay CLI flags; unset flags leave the current value in place.
    pub fn merge_cli(&mut self, cli: &Cli) {
        if let Some(n) = cli.students {
            self.num_students = n;
        }
        if let Some(n) = cli.frames {
            self.memory_frames = n;
        }
        if let Some(n) = cli.quantum {
            self.time_quantum = n;
        }
        if let Some(n) = cli.duration {
            self.exam_duration = n;
        }
        if let Some(algo) = cli.algo {
            self.sched_algo = algo;
        }
        if let Some(page) = cli.page {
            self.page_algo = page;
        }
        if cli.demo {
            self.demo_mode = true;
        }
        if cli.seed.is_some() {
            self.seed = cli.seed;
        }
    }

    fn set_parsed<T: std::str::FromStr>(slot: &mut T, value: &str) {
        if let Ok(v) = value.parse() {
            *slot = v;
        }
    }

    /// Keep table-backed sizes inside their fixed capacities.
    fn clamp(&mut self) {
        self.num_students = self.num_students.min(MAX_STUDENTS);
        self.memory_frames = self.memory_frames.min(crate::memory::MAX_FRAMES);
    }

    /// Boxed configuration echo printed at startup.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("┌─── Configuration ───────────────────────┐\n");
        out.push_str(&format!("│ Students     : {:<26}│\n", self.num_students));
        out.push_str(&format!("│ Memory Frames: {:<26}│\n", self.memory_frames));
        out.push_str(&format!("│ Time Quantum : {:<26}│\n", self.time_quantum));
        out.push_str(&format!("│ Exam Duration: {:<26}│\n", self.exam_duration));
        out.push_str(&format!("│ Scheduling   : {:<26}│\n", self.sched_algo.to_string()));
        out.push_str(&format!("│ Page Replace : {:<26}│\n", self.page_algo.to_string()));
        out.push_str(&format!(
            "│ Demo Mode    : {:<26}│\n",
            if self.demo_mode { "ON" } else { "OFF" }
        ));
        out.push_str("└─────────────────────────────────────────┘");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("examos-config-{}-{}", std::process::id(), name));
        let mut f = fs::File::create(&path).expect("create temp config");
        f.write_all(contents.as_bytes()).expect("write temp config");
        path
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.num_students, 50);
        assert_eq!(cfg.memory_frames, 64);
        assert_eq!(cfg.page_size, 4);
        assert_eq!(cfg.time_quantum, 5);
        assert_eq!(cfg.exam_duration, 100);
        assert_eq!(cfg.sched_algo, SchedAlgo::Priority);
        assert_eq!(cfg.page_algo, PageAlgo::Lru);
        assert_eq!(cfg.buffer_capacity, 256);
        assert!(!cfg.demo_mode);
        assert_eq!(cfg.tick_ms, 100);
    }

    #[test]
    fn missing_file_keeps_defaults() {
        let mut cfg = Config::default();
        let found = cfg
            .merge_file("/nonexistent/examos/config.conf")
            .expect("absent file is not an error");
        assert!(!found);
        assert_eq!(cfg.num_students, 50);
    }

    #[test]
    fn file_overrides_defaults() {
        let path = write_temp(
            "basic",
            "NUM_STUDENTS = 10\n\
             MEMORY_FRAMES = 8\n\
             SCHEDULING_ALGO = ROUND_ROBIN\n\
             PAGE_REPLACE = FIFO\n",
        );
        let mut cfg = Config::default();
        assert!(cfg.merge_file(&path).expect("file parses"));
        fs::remove_file(&path).ok();

        assert_eq!(cfg.num_students, 10);
        assert_eq!(cfg.memory_frames, 8);
        assert_eq!(cfg.sched_algo, SchedAlgo::RoundRobin);
        assert_eq!(cfg.page_algo, PageAlgo::Fifo);
    }

    #[test]
    fn commented_and_unknown_keys_are_ignored() {
        let path = write_temp(
            "comments",
            "#NUM_STUDENTS = 99\n\
             NOT_A_KEY = 42\n\
             garbage line without equals\n\
             TIME_QUANTUM = 3\n",
        );
        let mut cfg = Config::default();
        assert!(cfg.merge_file(&path).expect("file parses"));
        fs::remove_file(&path).ok();

        assert_eq!(cfg.num_students, 50);
        assert_eq!(cfg.time_quantum, 3);
    }

    #[test]
    fn cli_wins_over_file() {
        let path = write_temp("precedence", "NUM_STUDENTS = 10\nEXAM_DURATION = 40\n");
        let cli = Cli {
            students: Some(25),
            page: Some(PageAlgo::Fifo),
            ..Cli::default()
        };
        let mut cfg = Config::default();
        cfg.merge_file(&path).expect("file parses");
        cfg.merge_cli(&cli);
        fs::remove_file(&path).ok();

        assert_eq!(cfg.num_students, 25); // CLI
        assert_eq!(cfg.exam_duration, 40); // file
        assert_eq!(cfg.page_algo, PageAlgo::Fifo); // CLI
    }

    #[test]
    fn load_clamps_to_table_capacities() {
        let cli = Cli {
            students: Some(100_000),
            frames: Some(100_000),
            ..Cli::default()
        };
        let cfg = Config::load("/nonexistent/examos/config.conf", &cli).expect("load");
        assert_eq!(cfg.num_students, MAX_STUDENTS);
        assert_eq!(cfg.memory_frames, crate::memory::MAX_FRAMES);
    }

    #[test]
    fn render_mentions_the_chosen_policies() {
        let cfg = Config {
            sched_algo: SchedAlgo::RoundRobin,
            page_algo: PageAlgo::Fifo,
            demo_mode: true,
            ..Config::default()
        };
        let echo = cfg.render();
        assert!(echo.contains("ROUND_ROBIN"));
        assert!(echo.contains("FIFO"));
        assert!(echo.contains("ON"));
    }
}
