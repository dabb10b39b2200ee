use std::io::IsTerminal;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use examos::{Cli, Config, Machine, SimError, dashboard, report};

fn print_banner() {
    println!();
    println!("  ╔═══════════════════════════════════════════╗");
    println!("  ║      EXAM OS SIMULATION  v1.0             ║");
    println!("  ║  CPU Scheduling | Paging | I/O | Signals  ║");
    println!("  ╚═══════════════════════════════════════════╝");
    println!();
}

fn main() -> Result<(), SimError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    print_banner();

    let cli = Cli::parse();
    let cfg = Config::load("config.conf", &cli)?;
    println!("{}", cfg.render());

    if cfg.demo_mode {
        println!("\n  [DEMO MODE] Submission storm at tick 30");
    }

    println!("\n  Starting simulation in 2 seconds...\n");
    thread::sleep(Duration::from_secs(2));

    let frames_total = cfg.memory_frames;
    let machine = Machine::new(cfg);

    // The dashboard is a read-only snapshot consumer outside the core; it
    // exits on its own once the running flag clears. Skip it when stdout
    // is not a terminal.
    let dash = if std::io::stdout().is_terminal() {
        Some(dashboard::spawn(machine.world().clone(), frames_total)?)
    } else {
        None
    };

    let summary = machine.run()?;

    if let Some(dash) = dash {
        if dash.join().is_err() {
            eprintln!("WARNING: dashboard worker panicked");
        }
    }

    println!("\n  Simulation complete. Writing report...\n");
    println!("{}", report::render_summary(&summary));

    println!("\n  Output files:");
    println!("    output/system_log.txt   — full event log");
    println!("    output/submissions.txt  — all submissions");
    println!("    output/summary.txt      — final statistics\n");

    Ok(())
}
