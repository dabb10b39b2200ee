/*!
Terminal dashboard: a read-only snapshot consumer on its own worker.

With the `dashboard` feature the worker redraws a full-screen status view
every 500 ms using crossterm (alternate screen, raw mode) and clears the
running flag when `q` is pressed. Without the feature the worker degrades
to a one-line status print per second, so headless runs and CI stay
usable.

The frame renderer is a pure function over a world snapshot; the worker
never holds the world lock while drawing.
*/
#![allow(dead_code)]

use std::io;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::process::ProcessState;
use crate::world::{SharedWorld, WorldState};

/// Rows of the process table shown before the list is elided.
const PROCESS_ROWS: usize = 8;

fn state_code(state: ProcessState) -> &'static str {
    match state {
        ProcessState::New => "NEW",
        ProcessState::Ready => "READY",
        ProcessState::Running => "RUN",
        ProcessState::Waiting => "WAIT",
        ProcessState::Terminated => "DONE",
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Text progress bar, `width` cells filled proportionally to `pct` (0-100).
fn bar(pct: f32, width: usize) -> String {
    let filled = ((pct / 100.0 * width as f32) as usize).min(width);
    let mut out = String::with_capacity(width * 3);
    for _ in 0..filled {
        out.push('█');
    }
    for _ in filled..width {
        out.push('·');
    }
    out
}

/// Render one dashboard frame from a snapshot.
fn render_frame(snap: &WorldState, elapsed: Duration, frames_total: usize) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "╔═══ EXAM OS DASHBOARD ═══ tick {:>5} ═══ elapsed {} ═══ (q to quit)\n",
        snap.current_tick,
        format_elapsed(elapsed)
    ));

    out.push_str(&format!(
        "║ CPU     [{}] {:>5.1}%   running PID {:<4} switches {:<6} completed {}\n",
        bar(snap.cpu_utilization, 20),
        snap.cpu_utilization,
        snap.running_pid,
        snap.context_switches,
        snap.completed_processes
    ));

    let frame_pct = if frames_total > 0 {
        snap.frames_used as f32 / frames_total as f32 * 100.0
    } else {
        0.0
    };
    let accesses = snap.page_faults + snap.page_hits;
    let hit_rate = if accesses > 0 {
        snap.page_hits as f32 / accesses as f32 * 100.0
    } else {
        0.0
    };
    out.push_str(&format!(
        "║ MEMORY  [{}] {:>3}/{:<3} frames   faults {:<6} hits {:<6} hit rate {:>5.1}%\n",
        bar(frame_pct, 20),
        snap.frames_used,
        frames_total,
        snap.page_faults,
        snap.page_hits,
        hit_rate
    ));

    out.push_str(&format!(
        "║ I/O     buffer {:<4} total {:<6} dropped {:<5} flushes {}\n",
        snap.buffer_count, snap.total_submissions, snap.dropped_submissions, snap.flush_count
    ));

    out.push_str(&format!(
        "║ INT     timeouts {:<5} overloads {}\n",
        snap.timeouts_fired, snap.overload_signals
    ));

    out.push_str(&format!("╠═══ PROCESSES ({}) ═══\n", snap.processes.len()));
    for p in snap.processes.iter().take(PROCESS_ROWS) {
        out.push_str(&format!(
            "║  PID {:<4} {:<6} remaining {:<5} of {}\n",
            p.pid,
            state_code(p.state),
            p.remaining_time,
            p.total_time
        ));
    }
    if snap.processes.len() > PROCESS_ROWS {
        out.push_str(&format!(
            "║  … {} more\n",
            snap.processes.len() - PROCESS_ROWS
        ));
    }

    out.push_str("╠═══ RECENT EVENTS ═══\n");
    for line in &snap.recent_logs {
        out.push_str(&format!("║  {line}\n"));
    }
    out.push('╝');
    out
}

#[cfg(feature = "dashboard")]
mod term {
    use super::*;
    use std::io::Write;
    use std::thread;
    use std::time::Instant;

    use crossterm::cursor::{Hide, MoveTo, Show};
    use crossterm::event::{self, Event, KeyCode};
    use crossterm::style::Print;
    use crossterm::terminal::{
        self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen,
    };
    use crossterm::{execute, queue};

    const REFRESH: Duration = Duration::from_millis(500);

    pub fn spawn(world: SharedWorld, frames_total: usize) -> io::Result<JoinHandle<()>> {
        thread::Builder::new().name("dashboard".into()).spawn(move || {
            if let Err(e) = run(&world, frames_total) {
                eprintln!("dashboard error: {e}");
            }
        })
    }

    fn run(world: &SharedWorld, frames_total: usize) -> io::Result<()> {
        let mut out = io::stdout();
        terminal::enable_raw_mode()?;
        execute!(out, EnterAlternateScreen, Hide)?;

        let result = draw_loop(&mut out, world, frames_total);

        execute!(out, Show, LeaveAlternateScreen)?;
        terminal::disable_raw_mode()?;
        result
    }

    fn draw_loop(
        out: &mut impl Write,
        world: &SharedWorld,
        frames_total: usize,
    ) -> io::Result<()> {
        let start = Instant::now();
        loop {
            while event::poll(Duration::from_millis(0))? {
                if let Event::Key(key) = event::read()? {
                    if matches!(key.code, KeyCode::Char('q') | KeyCode::Char('Q')) {
                        world.stop();
                        return Ok(());
                    }
                }
            }

            let snap = world.snapshot();
            if !snap.simulation_running {
                return Ok(());
            }

            let frame = render_frame(&snap, start.elapsed(), frames_total);
            queue!(out, MoveTo(0, 0), Clear(ClearType::All))?;
            for (row, line) in frame.lines().enumerate() {
                queue!(out, MoveTo(0, row as u16), Print(line))?;
            }
            out.flush()?;

            thread::sleep(REFRESH);
        }
    }
}

#[cfg(feature = "dashboard")]
pub use term::spawn;

/// Headless fallback: one status line per second on stdout.
#[cfg(not(feature = "dashboard"))]
pub fn spawn(world: SharedWorld, frames_total: usize) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("dashboard".into())
        .spawn(move || {
            loop {
                let snap = world.snapshot();
                if !snap.simulation_running {
                    break;
                }
                println!(
                    "  [tick {:>5}] cpu {:>5.1}% | completed {:>3}/{:<3} | faults {:<5} hits {:<6} | buffer {:<4} dropped {:<4} | frames {}/{}",
                    snap.current_tick,
                    snap.cpu_utilization,
                    snap.completed_processes,
                    snap.processes.len(),
                    snap.page_faults,
                    snap.page_hits,
                    snap.buffer_count,
                    snap.dropped_submissions,
                    snap.frames_used,
                    frames_total
                );
                std::thread::sleep(Duration::from_millis(1000));
            }
        })
}
