use std::sync::Arc;

use anyhow::Context;
use blinky_board::LogConsole;
use blinky_demos::Demo;
use blinky_rtos::KernelConfig;
use clap::Parser;
use colored::Colorize;

mod logger;

#[derive(Parser, Debug)]
#[command(author, version, about = "Runs a blinky RTOS demo on the simulated kernel")]
struct Opts {
    /// Demo program to run
    #[arg(value_enum)]
    demo: Demo,

    /// Virtual time to run for
    #[arg(long, default_value_t = 5000, value_name = "MS")]
    ms: u64,

    #[arg(long = "tick-rate", default_value_t = 1000, value_name = "HZ")]
    tick_rate: u32,

    /// Demo output is logged at `info`; lower levels add kernel detail
    #[arg(long = "log-level", default_value = "info", value_name = "LEVEL")]
    log_level: log::LevelFilter,
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    logger::init(opts.log_level).context("failed to install logger")?;

    let config = KernelConfig::builder().tick_rate_hz(opts.tick_rate).build();
    let summary = blinky_demos::run(opts.demo, config, opts.ms, Arc::new(LogConsole))
        .with_context(|| format!("demo {} failed", opts.demo))?;

    println!(
        "{} {} after {} ticks ({} tasks, {} idle entries)",
        "finished".green().bold(),
        opts.demo,
        summary.ticks,
        summary.tasks,
        summary.idle_entries
    );
    Ok(())
}
