/*!
Final summary report: a boxed plain-text rendering of the world-state
counters, written to `output/summary.txt` at shutdown and echoed to the
terminal.
*/

use std::fs;
use std::io;
use std::path::Path;

use crate::world::WorldState;

/// Render the boxed report from a final snapshot.
pub fn render_summary(world: &WorldState) -> String {
    let total = world.page_faults + world.page_hits;
    let hit_rate = if total > 0 {
        world.page_hits as f32 / total as f32 * 100.0
    } else {
        0.0
    };

    let mut out = String::new();
    out.push_str("╔══════════════════════════════════════════╗\n");
    out.push_str("║       EXAM OS SIMULATION REPORT          ║\n");
    out.push_str("╠══════════════════════════════════════════╣\n");
    out.push_str("║ CPU                                      ║\n");
    out.push_str(&format!("║   Context Switches  : {:<18} ║\n", world.context_switches));
    out.push_str(&format!("║   Completed Exams   : {:<18} ║\n", world.completed_processes));
    out.push_str(&format!("║   Timeouts Fired    : {:<18} ║\n", world.timeouts_fired));
    out.push_str("╠══════════════════════════════════════════╣\n");
    out.push_str("║ MEMORY                                   ║\n");
    out.push_str(&format!("║   Page Faults       : {:<18} ║\n", world.page_faults));
    out.push_str(&format!("║   Page Hits         : {:<18} ║\n", world.page_hits));
    out.push_str(&format!("║   Hit Rate          : {:<17.1}% ║\n", hit_rate));
    out.push_str("╠══════════════════════════════════════════╣\n");
    out.push_str("║ I/O BUFFER                               ║\n");
    out.push_str(&format!("║   Total Submissions : {:<18} ║\n", world.total_submissions));
    out.push_str(&format!("║   Dropped           : {:<18} ║\n", world.dropped_submissions));
    out.push_str(&format!("║   Flush Count       : {:<18} ║\n", world.flush_count));
    out.push_str("╠══════════════════════════════════════════╣\n");
    out.push_str("║ INTERRUPTS                               ║\n");
    out.push_str(&format!("║   Overload Signals  : {:<18} ║\n", world.overload_signals));
    out.push_str("╚══════════════════════════════════════════╝\n");
    out
}

/// Write the report to `path`.
pub fn write_summary(world: &WorldState, path: &Path) -> io::Result<()> {
    fs::write(path, render_summary(world))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_reports_counters_and_hit_rate() {
        let mut world = WorldState::new();
        world.context_switches = 120;
        world.completed_processes = 10;
        world.timeouts_fired = 2;
        world.page_faults = 25;
        world.page_hits = 75;
        world.total_submissions = 42;
        world.dropped_submissions = 3;
        world.flush_count = 5;
        world.overload_signals = 1;

        let report = render_summary(&world);
        assert!(report.contains("Context Switches  : 120"));
        assert!(report.contains("Completed Exams   : 10"));
        assert!(report.contains("Page Faults       : 25"));
        assert!(report.contains("Hit Rate          : 75.0"));
        assert!(report.contains("Total Submissions : 42"));
        assert!(report.contains("Dropped           : 3"));
        assert!(report.contains("Overload Signals  : 1"));
    }

    #[test]
    fn hit_rate_handles_no_accesses() {
        let world = WorldState::new();
        let report = render_summary(&world);
        assert!(report.contains("Hit Rate          : 0.0"));
    }
}
