mod profile;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use seedforge_core::{ParsedSchema, build_graph, group_by_level, topological_sort};
use seedforge_generate::{Engine, PatternGenerator, RunOptions, RunResult, SeedSink};
use seedforge_persist::{DEFAULT_BATCH_SIZE, PostgresPersister, PostgresSink, SeedFileSink};

use profile::Profile;

#[derive(Debug, Error)]
enum CliError {
    #[error("profile error: {0}")]
    Profile(#[from] profile::ProfileError),
    #[error("generation error: {0}")]
    Generation(#[from] seedforge_generate::GenerationError),
    #[error("persistence error: {0}")]
    Persist(#[from] seedforge_persist::PersistError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(
    name = "seedforge",
    version,
    about = "Dependency-ordered synthetic seed data for relational schemas"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the insert order, generation levels, and any dependency cycles.
    Plan(PlanArgs),
    /// Dry run: generate rows and write them to a seed file.
    Generate(GenerateArgs),
    /// Generate rows and persist them to a Postgres database.
    Seed(SeedArgs),
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// Path to the parsed schema document (schema.json).
    #[arg(long)]
    schema: PathBuf,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Path to the parsed schema document (schema.json).
    #[arg(long)]
    schema: PathBuf,
    /// Optional toml run profile.
    #[arg(long)]
    profile: Option<PathBuf>,
    /// Default row count, overriding the profile.
    #[arg(long)]
    rows: Option<u64>,
    /// Output directory for seed_data.json and run_report.json.
    #[arg(long, default_value = "out")]
    out: PathBuf,
}

#[derive(Args, Debug)]
struct SeedArgs {
    /// Path to the parsed schema document (schema.json).
    #[arg(long)]
    schema: PathBuf,
    /// Database connection string.
    #[arg(long, value_name = "CONNECTION_STRING")]
    conn: String,
    /// Optional toml run profile.
    #[arg(long)]
    profile: Option<PathBuf>,
    /// Default row count, overriding the profile.
    #[arg(long)]
    rows: Option<u64>,
    /// Rows per insert statement.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// Optional path for the run report.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        Command::Plan(args) => run_plan(args),
        Command::Generate(args) => run_generate(args).await,
        Command::Seed(args) => run_seed(args).await,
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_schema(path: &Path) -> Result<ParsedSchema, CliError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn run_plan(args: PlanArgs) -> Result<(), CliError> {
    let schema = load_schema(&args.schema)?;
    let graph = build_graph(&schema.tables);
    let topo = topological_sort(&graph);
    let levels = group_by_level(&graph);

    println!("insert order:");
    for (index, table) in topo.order.iter().enumerate() {
        println!("  {:>3}. {table}", index + 1);
    }

    println!("levels:");
    for (index, level) in levels.iter().enumerate() {
        println!("  {index}: {}", level.join(", "));
    }

    if topo.cycles.is_empty() {
        println!("no dependency cycles detected");
    } else {
        println!("dependency cycles (foreign keys inside them are not guaranteed):");
        for cycle in &topo.cycles {
            println!("  {}", cycle.join(" -> "));
        }
    }

    Ok(())
}

fn load_options(profile_path: Option<&Path>, rows: Option<u64>) -> Result<RunOptions, CliError> {
    let profile = match profile_path {
        Some(path) => Profile::load(path)?,
        None => Profile::default(),
    };
    Ok(profile.into_run_options(rows))
}

fn build_engine(options: RunOptions) -> Engine {
    let seed = options.seed;
    Engine::new(
        Arc::new(PatternGenerator::new(seed)),
        Arc::new(PatternGenerator::new(seed)),
        options,
    )
}

async fn run_to_sink(
    schema_path: &Path,
    options: RunOptions,
    sink: &dyn SeedSink,
) -> Result<RunResult, CliError> {
    let schema = load_schema(schema_path)?;
    let engine = build_engine(options);
    Ok(engine.run(&schema, sink).await?)
}

async fn run_generate(args: GenerateArgs) -> Result<(), CliError> {
    let options = load_options(args.profile.as_deref(), args.rows)?;

    std::fs::create_dir_all(&args.out)?;
    let sink = SeedFileSink::new(args.out.join("seed_data.json"));
    let result = run_to_sink(&args.schema, options, &sink).await?;
    sink.write()?;

    let report_path = args.out.join("run_report.json");
    std::fs::write(&report_path, serde_json::to_vec_pretty(&result.report)?)?;

    info!(
        seed_file = %sink.path().display(),
        report = %report_path.display(),
        "dry run complete"
    );
    print_summary(&result);
    Ok(())
}

async fn run_seed(args: SeedArgs) -> Result<(), CliError> {
    // Connection is a precondition: fail before generating anything.
    let persister = PostgresPersister::connect(&args.conn).await?;
    let sink = PostgresSink::new(persister, args.batch_size.max(1));

    let options = load_options(args.profile.as_deref(), args.rows)?;
    let result = run_to_sink(&args.schema, options, &sink).await?;

    if let Some(report_path) = args.report {
        std::fs::write(&report_path, serde_json::to_vec_pretty(&result.report)?)?;
        info!(report = %report_path.display(), "run report written");
    }

    print_summary(&result);
    Ok(())
}

fn print_summary(result: &RunResult) {
    let report = &result.report;

    println!("run {}", report.run_id);
    for table in &report.tables {
        println!(
            "  {:<24} generated {:>5}  inserted {:>5}  skipped {:>4}  retries {:>2}  via {:?}",
            table.table,
            table.rows_generated,
            table.inserted,
            table.failed,
            table.retries,
            table.source
        );
    }
    if !report.cycles.is_empty() {
        println!("  cycles detected: {}", report.cycles.len());
    }
    if !report.violations.is_empty() {
        println!(
            "  referential integrity violations: {}",
            report.violations.len()
        );
    }
    for note in &report.notes {
        println!("  note: {note}");
    }
    println!("  done in {} ms", report.duration_ms);
}
