/// Version injected at compile time via AZRM_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("AZRM_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{bail, Context, Result};
use azrm::arm::ArmClient;
use azrm::config::Config;
use azrm::resource::{Operation, ProviderContext, ResourceRegistry};
use azrm::resourceid::ResourceId;
use azrm::sdk::streamanalytics::{Output, OutputId, OutputsClient};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Declarative Azure Resource Manager provider
#[derive(Parser, Debug)]
#[command(name = "azrm", version, about, long_about = None)]
struct Args {
    /// Subscription to manage
    #[arg(short, long, global = true)]
    subscription: Option<String>,

    /// Resource Manager endpoint
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a resource from a JSON or YAML configuration file
    Create {
        /// Resource type, e.g. azurerm_iothub_route
        resource_type: String,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Read the current state of a resource
    Read {
        resource_type: String,
        #[arg(long)]
        id: String,
    },
    /// Apply a changed configuration to an existing resource
    Update {
        resource_type: String,
        #[arg(long)]
        id: String,
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Delete a resource
    Delete {
        resource_type: String,
        #[arg(long)]
        id: String,
    },
    /// List the supported resource types
    Types,
    /// Check an identifier and print its canonical form
    ParseId { resource_type: String, id: String },
    /// Test the datasource of a Stream Analytics output
    TestOutput {
        output_id: String,
        /// Output definition to test instead of the stored one
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // RUST_LOG directives refine the chosen level, e.g. `azrm::arm=trace`
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(tracing_level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("azrm {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("azrm").join("azrm.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".azrm").join("azrm.log");
    }
    PathBuf::from("azrm.log")
}

/// Read a configuration file, YAML when the extension says so, JSON otherwise
fn read_config_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let value = if is_yaml {
        serde_yaml::from_str(&content).with_context(|| format!("parsing {:?} as YAML", path))?
    } else {
        serde_json::from_str(&content).with_context(|| format!("parsing {:?} as JSON", path))?
    };
    Ok(value)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Testing an output starts a long-running operation on the service, so it
/// gets the update budget rather than the read one
const TEST_OUTPUT_OPERATION: Operation = Operation::Update;

fn build_context(args: &Args, config: &Config) -> Result<ProviderContext> {
    let Some(subscription_id) = config.effective_subscription(args.subscription.as_deref()) else {
        bail!("no subscription configured, pass --subscription or set ARM_SUBSCRIPTION_ID");
    };
    let endpoint = config.effective_endpoint(args.endpoint.as_deref());
    let credentials = config.credentials(&endpoint)?;

    let client = ArmClient::new(credentials, &subscription_id, &endpoint)?.with_poll_settings(config.poll_settings());
    Ok(ProviderContext::new(client).with_timeouts(config.effective_timeouts()))
}

async fn run(args: Args) -> Result<()> {
    let config = Config::load();
    let registry = ResourceRegistry::builtin();

    match &args.command {
        Command::Types => {
            for name in registry.type_names() {
                println!("{}", name);
            }
        }
        Command::ParseId { resource_type, id } => {
            println!("{}", registry.require(resource_type)?.parse_id(id)?);
        }
        Command::Create { resource_type, config: path } => {
            let handler = registry.require(resource_type)?;
            let body = read_config_file(path)?;
            let ctx = build_context(&args, &config)?;
            print_json(&handler.create(&ctx, body).await?)?;
        }
        Command::Read { resource_type, id } => {
            let handler = registry.require(resource_type)?;
            let ctx = build_context(&args, &config)?;
            match handler.read(&ctx, id).await? {
                Some(state) => print_json(&state)?,
                None => bail!("{} no longer exists", id),
            }
        }
        Command::Update {
            resource_type,
            id,
            config: path,
        } => {
            let handler = registry.require(resource_type)?;
            let body = read_config_file(path)?;
            let ctx = build_context(&args, &config)?;
            print_json(&handler.update(&ctx, id, body).await?)?;
        }
        Command::Delete { resource_type, id } => {
            let handler = registry.require(resource_type)?;
            let ctx = build_context(&args, &config)?;
            handler.delete(&ctx, id).await?;
            println!("Deleted {}", id);
        }
        Command::TestOutput { output_id, config: path } => {
            let id = OutputId::parse(output_id)?;
            let output: Output = match path {
                Some(path) => serde_json::from_value(read_config_file(path)?)?,
                None => Output {
                    name: Some(id.name.clone()),
                    ..Output::default()
                },
            };
            let ctx = build_context(&args, &config)?;
            let client = OutputsClient::new(&ctx.client);
            let status = ctx
                .run(TEST_OUTPUT_OPERATION, &id, |deadline| client.test_then_poll(&id, &output, deadline))
                .await?;
            print_json(&status)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let result = run(args).await;
    if let Err(err) = &result {
        tracing::error!("{:#}", err);
    }
    result
}
