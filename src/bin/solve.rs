use clap::Parser;
use equations::{Session, Solver, SolverConfig};
use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
    process,
    time::Duration,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "solve")]
#[command(about = "Solve a system of equations written as plain text")]
#[command(version)]
struct Args {
    /// A file containing the equations (defaults to stdin)
    input: Option<PathBuf>,
    /// A JSON file with solver settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// The finite difference step
    #[arg(long)]
    step: Option<f64>,
    /// How many iterations each block is allowed to take
    #[arg(long)]
    max_iterations: Option<usize>,
    /// The number of decimal places in the result
    #[arg(long)]
    accuracy: Option<u32>,
    /// The time limit in seconds
    #[arg(long)]
    max_time: Option<u64>,
    /// The largest number of unknowns allowed in a single block
    #[arg(long)]
    max_variables: Option<usize>,
    /// Print the solution as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => {
            let config: SolverConfig =
                serde_json::from_str(&fs::read_to_string(path)?)?;
            config.validate()?;
            config
        },
        None => SolverConfig::default(),
    };

    let text = match &args.input {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        },
    };

    let mut session = Session::with_solver(Solver::with_config(config));
    let mut settings_ok = true;

    if let Some(step) = args.step {
        settings_ok &= session.set_step(step);
    }
    if let Some(max_iterations) = args.max_iterations {
        settings_ok &= session.set_max_iterations(max_iterations);
    }
    if let Some(accuracy) = args.accuracy {
        settings_ok &= session.set_accuracy(accuracy);
    }
    if let Some(seconds) = args.max_time {
        settings_ok &= session.set_max_time(Duration::from_secs(seconds));
    }
    if let Some(max_variables) = args.max_variables {
        settings_ok &= session.set_max_variables_per_block(max_variables);
    }

    let solution = if settings_ok {
        session.solve_text(&text)
    } else {
        None
    };

    let solution = match solution {
        Some(solution) => solution,
        None => {
            for error in session.errors() {
                eprintln!("{}", error);
            }
            process::exit(1);
        },
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&solution)?);
    } else {
        for (name, value) in solution.iter() {
            println!("{} = {}", name, value);
        }
    }

    Ok(())
}
