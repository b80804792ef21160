use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use mimeo_engine::{EngineError, Formatter, FuncRegistry, Resolver};
use mimeo_model::{Cache, Method};
use mimeo_schema::{FileSampleSource, SchemaError, load_service_str};
use mimeo_sim::{FileStore, SimError, Simulator};

#[derive(Debug, Error)]
enum CliError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("{0}")]
    Sim(#[from] SimError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("logging error: {0}")]
    Logging(String),
}

#[derive(Parser, Debug)]
#[command(name = "mimeo", version, about = "Data generation and API simulation")]
struct Cli {
    /// Service definition file.
    #[arg(long, global = true, default_value = "service.json")]
    file: PathBuf,
    /// Directory holding sample sets for func.sample().
    #[arg(long, global = true, default_value = "samples")]
    samples: PathBuf,
    /// Directory holding persisted records.
    #[arg(long, global = true, default_value = "store")]
    store: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the loaded entity tree and API list.
    Inspect,
    /// Render one entity.
    Entity(EntityArgs),
    /// Run one simulated API call.
    Call(CallArgs),
    /// Print the usage text of every template function.
    Funcs,
}

#[derive(Args, Debug)]
struct EntityArgs {
    /// Full dotted entity name.
    name: String,
    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
    /// RNG seed; omitted means OS entropy.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct CallArgs {
    /// HTTP method.
    #[arg(long, value_name = "METHOD")]
    method: String,
    /// Request path, e.g. /api/employees/5.
    #[arg(long)]
    path: String,
    /// Query parameter, key=value. Repeatable.
    #[arg(long, value_name = "KEY=VALUE")]
    query: Vec<String>,
    /// File holding the request body JSON.
    #[arg(long)]
    body: Option<PathBuf>,
    /// Render a sample request body instead of calling.
    #[arg(long, default_value_t = false)]
    request: bool,
    /// RNG seed; omitted means OS entropy.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Json,
    Sql,
    Csv,
}

fn main() -> Result<(), CliError> {
    init_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect => run_inspect(&cli.file, &cli.samples),
        Command::Entity(args) => run_entity(&cli.file, &cli.samples, args),
        Command::Call(args) => run_call(&cli.file, &cli.samples, &cli.store, args),
        Command::Funcs => run_funcs(),
    }
}

fn init_logging() -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|err| CliError::Logging(err.to_string()))
}

fn load_resolver(file: &Path, samples: &Path) -> Result<Resolver, CliError> {
    let definition = fs::read_to_string(file)?;
    let service = load_service_str(&definition)?;
    tracing::info!(file = %file.display(), apis = service.apis.len(), "service loaded");
    Ok(Resolver::new(
        service,
        Box::new(FileSampleSource::new(samples)),
    ))
}

fn make_rng(seed: Option<u64>) -> Result<ChaCha8Rng, CliError> {
    match seed {
        Some(seed) => Ok(ChaCha8Rng::seed_from_u64(seed)),
        None => ChaCha8Rng::try_from_os_rng()
            .map_err(|err| CliError::InvalidArgs(format!("cannot seed the rng: {err}"))),
    }
}

fn run_inspect(file: &Path, samples: &Path) -> Result<(), CliError> {
    let resolver = load_resolver(file, samples)?;
    print!("{}", resolver.service().pretty());
    Ok(())
}

fn run_entity(file: &Path, samples: &Path, args: EntityArgs) -> Result<(), CliError> {
    let resolver = load_resolver(file, samples)?;
    let entity = resolver.find_entity(&args.name)?;
    let formatter = Formatter::new(&resolver);
    let mut rng = make_rng(args.seed)?;

    let output = match args.format {
        OutputFormat::Json => {
            formatter.entity_to_json(&entity, &mut Cache::new(), None, &mut rng)?
        }
        OutputFormat::Sql => formatter.entity_to_sql(&entity, &mut rng)?,
        OutputFormat::Csv => formatter.entity_to_csv(&entity, &mut rng)?,
    };
    println!("{output}");
    Ok(())
}

fn run_call(file: &Path, samples: &Path, store: &Path, args: CallArgs) -> Result<(), CliError> {
    let method = Method::parse(&args.method)
        .ok_or_else(|| CliError::InvalidArgs(format!("unknown method '{}'", args.method)))?;

    let mut query = Vec::new();
    for pair in &args.query {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| CliError::InvalidArgs(format!("query '{pair}' is not key=value")))?;
        query.push((key, value));
    }

    let body = match &args.body {
        Some(path) => Some(fs::read_to_string(path)?),
        None => None,
    };

    let resolver = load_resolver(file, samples)?;
    let simulator = Simulator::new(resolver, FileStore::new(store));
    let mut rng = make_rng(args.seed)?;

    if args.request {
        let json = simulator.get_request(method, &args.path, &query, &mut rng)?;
        println!("{json}");
        return Ok(());
    }

    match simulator.call(method, &args.path, &query, body.as_deref(), &mut rng)? {
        Some(json) => println!("{json}"),
        None => tracing::info!("call completed with no response body"),
    }
    Ok(())
}

fn run_funcs() -> Result<(), CliError> {
    let registry = FuncRegistry::new();
    for func in registry.iter() {
        println!("{}", func.usage());
    }
    Ok(())
}
