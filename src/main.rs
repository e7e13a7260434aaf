use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use graft::config::{self, Strategy};
use graft::exec::RunOutput;
use graft::fitness::{ElapsedTime, FitnessError, FitnessFunction, ResultLine, StdoutNumber};
use graft::search::{LocalSearch, RandomEdits, SearchHooks, Tabu};
use graft::{EditKind, EngineMap, Program, ProgramConfig, SearchConfig, SearchReport, Selection};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "graft")]
#[command(about = "Genetic improvement of source code", long_about = None)]
#[command(version)]
struct Cli {
    /// Log every evaluation at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for a patch that improves the program's fitness
    Search {
        /// Project root containing the target files
        project: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Search strategy (local or tabu)
        #[arg(long)]
        strategy: Option<Strategy>,

        /// Number of independent epochs
        #[arg(long)]
        epochs: Option<usize>,

        /// Iterations per epoch
        #[arg(long)]
        max_iter: Option<usize>,

        /// Evaluations of the unmodified program used for the baseline
        #[arg(long)]
        warmup: Option<usize>,

        /// Test command time limit in seconds
        #[arg(long)]
        timeout: Option<f64>,

        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Fitness source: number (last stdout line), elapsed, or result:<key>
        #[arg(long, default_value = "number")]
        fitness: FitnessChoice,

        /// End an epoch once a candidate reaches this fitness or lower
        #[arg(long)]
        stop_at: Option<f64>,

        /// Draw targets proportionally to the configured weights
        #[arg(long)]
        weighted: bool,

        /// Edit kinds to draw from, comma separated
        #[arg(long, value_delimiter = ',')]
        operators: Vec<EditKind>,
    },

    /// List the modification points of the target files
    Points {
        /// Project root containing the target files
        project: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Only list this target file
        #[arg(short, long)]
        file: Option<String>,
    },
}

#[derive(clap::Args)]
struct TargetArgs {
    /// Config file (defaults to .graft.toml or .graft.json in the project)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Mutation granularity
    #[arg(short, long, value_enum, default_value_t = Granularity::Tree)]
    granularity: Granularity,
}

#[derive(Clone, Copy, ValueEnum)]
enum Granularity {
    /// Statements, for supported languages (lines elsewhere)
    Tree,
    /// Lines everywhere
    Line,
}

#[derive(Clone)]
enum FitnessChoice {
    Number,
    Elapsed,
    Result(ResultLine),
}

impl FromStr for FitnessChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "number" => Ok(FitnessChoice::Number),
            "elapsed" => Ok(FitnessChoice::Elapsed),
            _ => match s.strip_prefix("result:") {
                Some(key) if !key.is_empty() => Ok(FitnessChoice::Result(ResultLine::new(key))),
                _ => Err(format!(
                    "unknown fitness '{s}' (expected number, elapsed or result:<key>)"
                )),
            },
        }
    }
}

impl FitnessFunction for FitnessChoice {
    fn compute(&self, output: &RunOutput) -> Result<f64, FitnessError> {
        match self {
            FitnessChoice::Number => StdoutNumber.compute(output),
            FitnessChoice::Elapsed => ElapsedTime.compute(output),
            FitnessChoice::Result(line) => line.compute(output),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Search {
            project,
            target,
            strategy,
            epochs,
            max_iter,
            warmup,
            timeout,
            seed,
            fitness,
            stop_at,
            weighted,
            operators,
        } => {
            let mut config = load_config(&project, target.config.as_deref())?;
            let search = &mut config.search;
            if let Some(strategy) = strategy {
                search.strategy = strategy;
            }
            if let Some(epochs) = epochs {
                search.epochs = epochs;
            }
            if let Some(max_iter) = max_iter {
                search.max_iter = max_iter;
            }
            if let Some(warmup) = warmup {
                search.warmup_reps = warmup;
            }
            if let Some(timeout) = timeout {
                search.timeout_secs = timeout;
            }
            if seed.is_some() {
                search.seed = seed;
            }
            if weighted {
                search.selection = Selection::Weighted;
            }
            if !operators.is_empty() {
                search.operators = operators;
            }
            cmd_search(&project, config, target.granularity, fitness, stop_at)
        }

        Commands::Points {
            project,
            target,
            file,
        } => {
            let config = load_config(&project, target.config.as_deref())?;
            cmd_points(&project, config, target.granularity, file.as_deref())
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("graft=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("graft=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(project: &Path, explicit: Option<&Path>) -> Result<ProgramConfig> {
    let config = match explicit {
        Some(path) => config::load_from_path(path)?,
        None => config::load_from_project(project)?,
    };
    Ok(config)
}

fn build_program(
    project: &Path,
    config: ProgramConfig,
    granularity: Granularity,
) -> Result<Program> {
    let engines = match granularity {
        Granularity::Tree => EngineMap::trees(),
        Granularity::Line => EngineMap::lines(),
    };
    Program::builder(project)
        .config(config)
        .engines(engines)
        .build()
        .with_context(|| format!("failed to load project {}", project.display()))
}

fn cmd_search(
    project: &Path,
    config: ProgramConfig,
    granularity: Granularity,
    fitness: FitnessChoice,
    stop_at: Option<f64>,
) -> Result<()> {
    let settings = config.search.clone();
    let program = build_program(project, config, granularity)?;

    let mut neighbourhood = RandomEdits::new(settings.operators.clone())
        .removal_probability(settings.removal_probability)
        .selection(settings.selection);
    if let Some(target) = stop_at {
        neighbourhood = neighbourhood.stop_at(target);
    }

    let search_config = settings.search_config();
    match settings.strategy {
        Strategy::Local => run_search(&program, neighbourhood, fitness, &search_config),
        Strategy::Tabu => {
            let hooks = Tabu::new(neighbourhood).max_attempts(settings.tabu_attempts);
            run_search(&program, hooks, fitness, &search_config)
        }
    }
}

fn run_search<H: SearchHooks>(
    program: &Program,
    hooks: H,
    fitness: FitnessChoice,
    config: &SearchConfig,
) -> Result<()> {
    let mut search = LocalSearch::new(program, hooks, fitness);
    let report = search.run(config)?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &SearchReport<'_>) {
    println!();
    println!("{}", "Search Report".bold());
    println!("Baseline fitness: {}", report.baseline);

    for epoch in &report.epochs {
        let mark = if epoch.success {
            "✓".green()
        } else {
            "·".normal()
        };
        println!();
        println!(
            "{} Epoch {}: best {} after {} iterations ({} evaluations, {} invalid, {:.2?})",
            mark,
            epoch.epoch,
            format!("{}", epoch.best_fitness).bold(),
            epoch.iterations,
            epoch.fitness_evals,
            epoch.invalid,
            epoch.elapsed,
        );
        println!("  Patch: {}", epoch.best);
        if !epoch.diff.is_empty() {
            display_diff(&epoch.diff);
        }
    }

    let improved = report
        .epochs
        .iter()
        .filter(|epoch| epoch.best_fitness < report.baseline)
        .count();
    println!();
    println!("{}", "Summary:".bold());
    println!(
        "  {} of {} epochs improved on the baseline",
        format!("{improved}").green(),
        report.epochs.len()
    );
}

fn display_diff(diff: &str) {
    for line in diff.lines() {
        let line = if line.starts_with("---") || line.starts_with("+++") || line.starts_with("@@") {
            line.dimmed()
        } else if line.starts_with('-') {
            line.red()
        } else if line.starts_with('+') {
            line.green()
        } else {
            line.normal()
        };
        println!("  {line}");
    }
}

fn cmd_points(
    project: &Path,
    config: ProgramConfig,
    granularity: Granularity,
    only: Option<&str>,
) -> Result<()> {
    let program = build_program(project, config, granularity)?;
    let files: Vec<usize> = match only {
        Some(path) => vec![program
            .file_index(path)
            .with_context(|| format!("{path} is not a target file"))?],
        None => (0..program.files().len()).collect(),
    };

    for index in files {
        let file = &program.files()[index];
        println!(
            "{} {}",
            file.path().bold(),
            format!("({}, {} points)", file.engine().id(), file.points().len()).dimmed()
        );
        for row in program.describe_points(index) {
            println!("{row}");
        }
    }
    Ok(())
}
