use clap::Parser;
use rand::Rng;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use loopcast::assembler;
use loopcast::bumpers::BumperSelector;
use loopcast::config;
use loopcast::errors::AppError;
use loopcast::scheduler;
use loopcast::verify;

#[derive(Parser)]
#[command(name = "loopcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deterministic minimal-cycle playlist scheduler for looping linear-TV channels")]
#[command(long_about = None)]
struct Cli {
    /// Channel config file path
    #[arg(short, long, default_value = "./channel.json")]
    config: String,

    /// Override solver.time_limit_sec from the config file
    #[arg(long, value_name = "SECONDS")]
    time_limit_sec: Option<u32>,

    /// Override solver.seed from the config file (0 still means "auto")
    #[arg(long, value_name = "SEED")]
    seed: Option<u32>,

    /// Skip the post-solve verification pass
    #[arg(long)]
    skip_verify: bool,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let log_filter = format!("loopcast={}", cli.log_level);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("loopcast v{}", env!("CARGO_PKG_VERSION"));

    match run(&cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            std::process::ExitCode::from(exit_code(&err))
        }
    }
}

fn exit_code(err: &AppError) -> u8 {
    match err {
        AppError::Config(_) => 2,
        AppError::NoContent => 3,
        AppError::Infeasible { .. } => 4,
        AppError::VerifyFailure { .. } => 5,
        AppError::Io(_) => 2,
    }
}

fn run(cli: &Cli) -> Result<(), AppError> {
    let mut channel = config::load(&cli.config)?;
    info!(path = %cli.config, "configuration loaded");

    if let Some(t) = cli.time_limit_sec {
        channel.solver.time_limit_sec = t;
    }
    if let Some(s) = cli.seed {
        channel.solver.seed = s;
    }
    if channel.solver.seed == 0 {
        // Auto: draw a fresh non-zero seed now, at the CLI boundary, so the
        // rest of the pipeline only ever sees a concrete seed.
        let mut rng = rand::thread_rng();
        channel.solver.seed = loop {
            let candidate: u32 = rng.gen();
            if candidate != 0 {
                break candidate;
            }
        };
        info!(seed = channel.solver.seed, "auto-materialized seed");
    }

    let (result, stats) = scheduler::solve(&channel)?;
    info!(
        target_block_s = stats.target_block_s,
        blocks = stats.block_count,
        repeats_used = stats.repeats_used,
        total_waste_s = stats.total_waste_s,
        seed = stats.seed,
        "solved"
    );

    let mut selector = BumperSelector::new(&channel.bumpers, stats.seed);
    let cycle = assembler::assemble(&result, &mut selector);
    info!(entries = cycle.entries.len(), "assembled cycle");

    if !cli.skip_verify {
        let findings = verify::verify(&channel, &cycle);
        let errors = findings.iter().filter(|f| f.level == verify::Level::Error).count();
        for f in &findings {
            match f.level {
                verify::Level::Error => error!("{}", f.message),
                verify::Level::Warn => tracing::warn!("{}", f.message),
            }
        }
        if errors > 0 {
            return Err(AppError::verify_failure(findings));
        }
        info!("verification passed");
    }

    Ok(())
}
