use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use metrics::counter;
use tracing::{info, warn};

use scalr_client::{Fixture, MemoryClient, ScalrApi};
use scalr_core::{Attrs, StateDoc};
use scalr_persist::{SqliteStateStore, StateStore};
use scalr_provider::{Host, Provider, ProviderConfig};
use scalr_schema::{Mode, ResourceSchema};

#[derive(Parser, Debug)]
#[command(name = "scalrctl", version, about = "Scalr provider CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Control-plane snapshot (JSON) the commands run against; written back after changes
    #[arg(long = "fixture", global = true, env = "SCALR_FIXTURE")]
    fixture: Option<PathBuf>,

    /// State database (default: ~/.scalr/state.db)
    #[arg(long = "state", global = true, env = "SCALR_STATE_PATH")]
    state: Option<String>,

    /// Default account for every `account_id` attribute
    #[arg(long = "account", global = true, env = "SCALR_ACCOUNT_ID")]
    account: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List resource types and data sources with their schema versions
    Resources,
    /// Show the declared fields of a resource type or data source
    Schema { type_name: String },
    /// Upgrade a state document file ({"version": N, "attrs": {...}})
    Migrate {
        type_name: String,
        file: PathBuf,
        /// Stop at this version instead of the current one
        #[arg(long = "to")]
        to: Option<u32>,
    },
    /// Inspect stored state
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
    /// Create, update or replace an instance to match a config file (YAML or JSON)
    Apply {
        type_name: String,
        name: String,
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Re-read an instance from the remote; drops state if it is gone
    Refresh { type_name: String, name: String },
    /// Delete the remote object and its state
    Destroy { type_name: String, name: String },
    /// Adopt an existing remote object
    Import { type_name: String, name: String, id: String },
    /// Query a data source
    Lookup {
        type_name: String,
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
}

impl Commands {
    fn label(&self) -> &'static str {
        match self {
            Self::Resources => "resources",
            Self::Schema { .. } => "schema",
            Self::Migrate { .. } => "migrate",
            Self::State { .. } => "state",
            Self::Apply { .. } => "apply",
            Self::Refresh { .. } => "refresh",
            Self::Destroy { .. } => "destroy",
            Self::Import { .. } => "import",
            Self::Lookup { .. } => "lookup",
        }
    }
}

#[derive(Subcommand, Debug)]
enum StateCommands {
    Ls {
        #[arg(long = "type")]
        type_name: Option<String>,
    },
    Show { type_name: String, name: String },
    /// Run the migration chain on a stored document without refreshing it
    Upgrade { type_name: String, name: String },
}

fn init_tracing() {
    let env = std::env::var("SCALR_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("SCALR_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid SCALR_METRICS_ADDR; expected host:port");
        }
    }
}

fn load_fixture(path: Option<&Path>) -> Result<MemoryClient> {
    let Some(path) = path else { return Ok(MemoryClient::new()) };
    if !path.exists() {
        info!(path = %path.display(), "fixture missing; starting from an empty control plane");
        return Ok(MemoryClient::new());
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let fixture: Fixture = serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(MemoryClient::from_fixture(fixture))
}

fn save_fixture(path: Option<&Path>, client: &MemoryClient) -> Result<()> {
    let Some(path) = path else { return Ok(()) };
    let text = serde_json::to_string_pretty(&client.fixture()?)?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Attribute map from a YAML or JSON file.
fn read_attrs(path: &Path) -> Result<Attrs> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value = serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    match value {
        serde_json::Value::Object(attrs) => Ok(attrs),
        serde_json::Value::Null => Ok(Attrs::new()),
        _ => anyhow::bail!("{}: expected a mapping of attributes", path.display()),
    }
}

fn open_store(path: Option<&str>) -> Result<SqliteStateStore> {
    match path {
        Some(p) => SqliteStateStore::open(p),
        None => SqliteStateStore::open_default(),
    }
}

fn print_doc(output: Output, doc: &StateDoc) -> Result<()> {
    match output {
        Output::Human => {
            println!("version: {}", doc.version);
            for (k, v) in &doc.attrs {
                println!("{:<34} {}", k, v);
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(doc)?),
    }
    Ok(())
}

fn print_schema(output: Output, schema: &ResourceSchema) -> Result<()> {
    match output {
        Output::Human => {
            println!("{} (version {})", schema.type_name, schema.version);
            println!("{:<34} {:<18} FLAGS", "FIELD", "MODE");
            for f in schema.fields {
                let mode = match f.mode {
                    Mode::Required => "required",
                    Mode::Optional => "optional",
                    Mode::OptionalComputed => "optional+computed",
                    Mode::Computed => "computed",
                };
                let mut flags = Vec::new();
                if f.force_new {
                    flags.push("force-new");
                }
                if f.deprecated.is_some() {
                    flags.push("deprecated");
                }
                if f.default.is_some() {
                    flags.push("default");
                }
                println!("{:<34} {:<18} {}", f.name, mode, flags.join(","));
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(schema)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    counter!("cli_commands_total", 1u64, "command" => cli.command.label());

    let client = Arc::new(load_fixture(cli.fixture.as_deref())?);
    let mut config = ProviderConfig::from_env();
    if let Some(account) = cli.account.clone() {
        config = config.with_account(account);
    }
    let api: Arc<dyn ScalrApi> = client.clone();
    let provider = Provider::new(config, api);
    let output = cli.output;

    match cli.command {
        Commands::Resources => match output {
            Output::Human => {
                println!("KIND          TYPE                           VERSION");
                for t in provider.resource_types() {
                    println!("{:<13} {:<30} {}", "resource", t, provider.schema(t)?.version);
                }
                for t in provider.data_source_types() {
                    println!("{:<13} {:<30} -", "data-source", t);
                }
            }
            Output::Json => {
                #[derive(serde::Serialize)]
                struct Row {
                    type_name: &'static str,
                    version: u32,
                    migrations: Vec<(u32, &'static str)>,
                }
                let mut rows = Vec::new();
                for t in provider.resource_types() {
                    let r = provider.resource(t)?;
                    rows.push(Row { type_name: t, version: r.schema().version, migrations: r.migrations().describe_steps() });
                }
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
        },
        Commands::Schema { type_name } => {
            let schema = match provider.schema(&type_name) {
                Ok(s) => s,
                Err(_) => provider.data_source(&type_name)?.schema(),
            };
            print_schema(output, schema)?;
        }
        Commands::Migrate { type_name, file, to } => {
            let text = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let doc: StateDoc = serde_yaml::from_str(&text).with_context(|| format!("parsing {}", file.display()))?;
            let r = provider.resource(&type_name)?;
            let target = to.unwrap_or_else(|| r.migrations().current_version());
            info!(type_name = %type_name, from = doc.version, to = target, "migrate invoked");
            let doc = r.migrations().upgrade_to(doc, target, &**provider.api()).await?;
            print_doc(output, &doc)?;
        }
        Commands::State { command } => {
            let host = Host::new(provider, open_store(cli.state.as_deref())?);
            match command {
                StateCommands::Ls { type_name } => {
                    let rows = host.store().list(type_name.as_deref())?;
                    match output {
                        Output::Human => {
                            println!("{:<28} {:<20} {:<8} ID", "TYPE", "NAME", "VERSION");
                            for row in rows {
                                println!("{:<28} {:<20} {:<8} {}", row.type_name, row.name, row.doc.version, row.doc.id().unwrap_or("-"));
                            }
                        }
                        Output::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
                    }
                }
                StateCommands::Show { type_name, name } => match host.store().get(&type_name, &name)? {
                    Some(row) => print_doc(output, &row.doc)?,
                    None => eprintln!("no state for {}.{}", type_name, name),
                },
                StateCommands::Upgrade { type_name, name } => match host.upgrade(&type_name, &name).await? {
                    Some(doc) => print_doc(output, &doc)?,
                    None => eprintln!("no state for {}.{}", type_name, name),
                },
            }
            save_fixture(cli.fixture.as_deref(), &client)?;
        }
        Commands::Apply { type_name, name, file } => {
            let config = read_attrs(&file)?;
            let host = Host::new(provider, open_store(cli.state.as_deref())?);
            let res = host.apply(&type_name, &name, &config).await;
            save_fixture(cli.fixture.as_deref(), &client)?;
            let outcome = res?;
            match output {
                Output::Human => {
                    for w in &outcome.warnings {
                        eprintln!("warning: {}", w);
                    }
                    println!(
                        "{}.{}: {} ({})",
                        type_name,
                        name,
                        serde_json::to_value(outcome.action)?.as_str().unwrap_or_default(),
                        outcome.state.id().unwrap_or("-")
                    );
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
            }
        }
        Commands::Refresh { type_name, name } => {
            let host = Host::new(provider, open_store(cli.state.as_deref())?);
            let res = host.refresh(&type_name, &name).await;
            save_fixture(cli.fixture.as_deref(), &client)?;
            match res? {
                Some(doc) => print_doc(output, &doc)?,
                None => {
                    warn!(type_name = %type_name, name = %name, "no live object");
                    println!("{}.{}: gone", type_name, name);
                }
            }
        }
        Commands::Destroy { type_name, name } => {
            let host = Host::new(provider, open_store(cli.state.as_deref())?);
            let res = host.destroy(&type_name, &name).await;
            save_fixture(cli.fixture.as_deref(), &client)?;
            if res? {
                println!("{}.{}: destroyed", type_name, name);
            } else {
                println!("{}.{}: not managed", type_name, name);
            }
        }
        Commands::Import { type_name, name, id } => {
            let host = Host::new(provider, open_store(cli.state.as_deref())?);
            let doc = host.import(&type_name, &name, &id).await?;
            print_doc(output, &doc)?;
        }
        Commands::Lookup { type_name, file } => {
            let query = read_attrs(&file)?;
            let attrs = provider.read_data_source(&type_name, &query).await?;
            match output {
                Output::Human => print_doc(output, &StateDoc::new(0, attrs))?,
                Output::Json => println!("{}", serde_json::to_string_pretty(&attrs)?),
            }
        }
    }

    Ok(())
}
