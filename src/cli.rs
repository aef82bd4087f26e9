use crate::config::load_config;
use crate::layout::{CancellationToken, LayoutPlan, Severity, compute_layout_with_cancel};
use crate::layout_dump::{write_layout_dump, write_layout_dump_to};
use crate::parser::parse_request;
use anyhow::Result;
use clap::Parser;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "dlayout",
    version,
    about = "Place components and route connectors for a diagram request"
)]
pub struct Args {
    /// Request file (.json / .json5) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file for the layout dump. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Layout rules JSON file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Override the refinement iteration budget
    #[arg(long = "max-iterations")]
    pub max_iterations: Option<usize>,

    /// Canvas width
    #[arg(short = 'w', long = "width")]
    pub width: Option<f32>,

    /// Canvas height
    #[arg(short = 'H', long = "height")]
    pub height: Option<f32>,

    /// Stop refining after this many milliseconds and keep the best plan
    #[arg(long = "deadline-ms")]
    pub deadline_ms: Option<u64>,

    /// Exit non-zero when the plan does not pass validation
    #[arg(long)]
    pub strict: bool,

    /// Debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    if let Some(width) = args.width {
        config.canvas.width = width;
    }
    if let Some(height) = args.height {
        config.canvas.height = height;
    }
    if let Some(max) = args.max_iterations {
        config.max_iterations = max;
    }

    let input = read_input(args.input.as_deref())?;
    let request = parse_request(&input)?;
    let mut cancel = CancellationToken::new();
    if let Some(ms) = args.deadline_ms {
        cancel = cancel.with_timeout(Duration::from_millis(ms));
    }

    let plan = compute_layout_with_cancel(&request, &config, &cancel);
    match args.output.as_deref() {
        Some(path) => write_layout_dump(path, &plan)?,
        None => {
            let stdout = io::stdout();
            write_layout_dump_to(stdout.lock(), &plan)?;
            println!();
        }
    }

    if args.strict && !plan.passed {
        return Err(anyhow::anyhow!(summary(&plan)));
    }
    Ok(())
}

fn summary(plan: &LayoutPlan) -> String {
    format!(
        "Layout did not pass after {} iteration(s): score {:.1}, {} error(s), {} crossing(s)",
        plan.iterations,
        plan.score,
        plan.count(Severity::Error),
        plan.crossings.total
    )
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return Ok(std::fs::read_to_string(path)?);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}
