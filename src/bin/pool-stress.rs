use std::process::exit;

use clap::{Parser, ValueEnum};
use log::{error, info};

use taskpool::stress::{self, Backend, StressConfig, StressReport};
use taskpool::{hardware_concurrency, PoolError, Result};

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "pool-stress", version, about = "Stress test a task thread pool")]
struct Cli {
    /// Pool backend: "shared" or "rayon"
    #[arg(long, default_value = "shared", value_name = "BACKEND")]
    backend: String,

    /// Worker threads (defaults to the number of logical CPUs)
    #[arg(long, value_name = "N")]
    threads: Option<u32>,

    /// Tasks submitted per iteration
    #[arg(long, default_value_t = 10_000, value_name = "N")]
    tasks: usize,

    /// Concurrent submitting threads
    #[arg(long, default_value_t = 8, value_name = "N")]
    producers: usize,

    /// Number of pools to create and tear down
    #[arg(long, default_value_t = 1, value_name = "N")]
    iterations: usize,

    /// Report format
    #[arg(long, value_enum, default_value = "text")]
    format: Format,
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = StressConfig {
        backend: cli.backend.parse::<Backend>()?,
        threads: cli.threads.unwrap_or(hardware_concurrency() as u32),
        tasks: cli.tasks,
        producers: cli.producers,
        iterations: cli.iterations,
    };

    info!("pool-stress {}", env!("CARGO_PKG_VERSION"));
    info!("Backend: {}, workers: {}", config.backend, config.threads);

    let report = stress::run(&config)?;
    match cli.format {
        Format::Text => print_text(&report),
        Format::Json => println!("{}", serde_json::to_string(&report)?),
    }

    if !report.is_exact() {
        return Err(PoolError::StringError(format!(
            "Expected {} completed tasks, counted {}",
            report.tasks * report.iterations,
            report.completed
        )));
    }
    Ok(())
}

fn print_text(report: &StressReport) {
    println!("backend:    {}", report.backend);
    println!("threads:    {}", report.threads);
    println!("tasks:      {}", report.tasks);
    println!("producers:  {}", report.producers);
    println!("iterations: {}", report.iterations);
    println!("completed:  {}", report.completed);
    println!("elapsed:    {} ms", report.elapsed_ms);
}
