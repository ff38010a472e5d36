use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use indicatif::ProgressBar;
use tracing::Level;

use feldspar::{
    post_processor, scene,
    solver::TracingObserver,
    FeldsparError, TickStatus,
};

#[derive(Parser, Debug)]
#[command(version, about = "Runs a feldspar scene and writes the resulting graph as csv", long_about = None)]
struct Args {
    /// The scene json file to run
    scene: PathBuf,

    /// Number of ticks to run, overriding the scene settings
    #[arg(short('t'), long)]
    ticks: Option<usize>,

    /// Where to write the node table
    #[arg(long, default_value = "nodes.csv")]
    nodes_output: PathBuf,

    /// Where to write the element table
    #[arg(long, default_value = "elements.csv")]
    elements_output: PathBuf,

    /// Log every solver stage, including matrix dumps
    #[arg(short('v'), long)]
    verbose: bool,
}

fn run(args: &Args) -> Result<(), FeldsparError> {
    let scene::Scene {
        mut sandbox,
        settings,
    } = scene::load_scene(&args.scene)?;

    if args.verbose {
        sandbox.solver_mut().add_observer(Box::new(TracingObserver));
    }

    let ticks = args.ticks.unwrap_or(settings.ticks);
    tracing::info!(
        "running {ticks} {:?} ticks with time step {}",
        settings.mode,
        settings.time_step
    );

    let mut solved = 0;
    let mut aborted = 0;
    let bar = ProgressBar::new(ticks as u64);
    for _ in 0..ticks {
        match sandbox.tick(settings.time_step) {
            TickStatus::Solved(_) | TickStatus::Integrated => solved += 1,
            TickStatus::Aborted(_) => aborted += 1,
            TickStatus::Idle => {}
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    if aborted > 0 {
        tracing::warn!("{aborted} of {ticks} ticks were aborted");
    }
    tracing::info!("completed {solved} of {ticks} ticks");

    post_processor::csv_output(sandbox.graph(), &args.nodes_output, &args.elements_output)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
