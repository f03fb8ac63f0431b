//! tsmeta CLI - Admin Command Line Interface
//!
//! Opens a local schema store and runs one administrative command on it.

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tsmeta_common::{Compression, Config, DataType, Encoding, PartialPath, StringMap};
use tsmeta_meta_store::{MetadataStore, PatternScope};

#[derive(Parser, Debug)]
#[command(name = "tsmeta-cli")]
#[command(about = "tsmeta schema store admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file (TOML); missing file means defaults
    #[arg(short, long, env = "TSMETA_CONFIG", default_value = "tsmeta.toml")]
    config: PathBuf,

    /// Override the store data directory
    #[arg(long, env = "TSMETA_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (overrides the config file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Storage group operations
    Sg {
        #[command(subcommand)]
        action: SgCommands,
    },
    /// Timeseries operations
    Ts {
        #[command(subcommand)]
        action: TsCommands,
    },
    /// Device operations
    Device {
        #[command(subcommand)]
        action: DeviceCommands,
    },
    /// Namespace node operations
    Nodes {
        #[command(subcommand)]
        action: NodesCommands,
    },
    /// Check whether a node exists at a canonical path
    Exists { path: PartialPath },
    /// Print every stored key
    Dump,
}

#[derive(ClapArgs, Debug)]
struct CountArgs {
    /// Path pattern
    #[arg(default_value = "root.**")]
    pattern: PartialPath,

    /// Require the pattern prefix to be covered by a storage group
    #[arg(long)]
    bounded: bool,
}

impl CountArgs {
    const fn scope(&self) -> PatternScope {
        if self.bounded {
            PatternScope::StorageGroupBounded
        } else {
            PatternScope::Loose
        }
    }
}

#[derive(Subcommand, Debug)]
enum SgCommands {
    /// Declare a storage group
    Declare { path: PartialPath },
    /// Show or set the TTL of a storage group
    Ttl {
        path: PartialPath,
        /// New TTL; omit to show the current one
        ttl: Option<u64>,
        /// Clear the TTL
        #[arg(long, conflicts_with = "ttl")]
        clear: bool,
    },
    /// Delete storage groups with everything below them
    Delete {
        #[arg(required = true)]
        paths: Vec<PartialPath>,
    },
    /// Count storage groups
    Count(CountArgs),
    /// List storage groups
    List {
        #[arg(default_value = "root.**")]
        pattern: PartialPath,
    },
}

#[derive(Subcommand, Debug)]
enum TsCommands {
    /// Create a timeseries
    Create {
        path: PartialPath,
        #[arg(short = 't', long)]
        data_type: DataType,
        #[arg(short, long, default_value = "PLAIN")]
        encoding: Encoding,
        #[arg(short, long, default_value = "SNAPPY")]
        compression: Compression,
        #[arg(short, long)]
        alias: Option<String>,
        /// Encoder property as key=value (repeatable)
        #[arg(long = "prop", value_parser = parse_key_val)]
        props: Vec<(String, String)>,
    },
    /// Create aligned timeseries under one device
    CreateAligned {
        device: PartialPath,
        /// NAME:TYPE[:ENCODING[:COMPRESSION]] (repeatable)
        #[arg(short, long = "measurement", required = true)]
        measurements: Vec<String>,
    },
    /// Set the alias of a timeseries
    Alias { path: PartialPath, alias: String },
    /// Add tags (key=value) to a timeseries
    Tag {
        path: PartialPath,
        #[arg(required = true, value_parser = parse_key_val)]
        tags: Vec<(String, String)>,
    },
    /// Delete timeseries matched by a pattern
    Delete { pattern: PartialPath },
    /// Count timeseries
    Count(CountArgs),
    /// Show timeseries matched by a pattern
    Show {
        #[arg(default_value = "root.**")]
        pattern: PartialPath,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum DeviceCommands {
    /// Count devices
    Count(CountArgs),
}

#[derive(Subcommand, Debug)]
enum NodesCommands {
    /// Count nodes at a level (root = 0)
    Count {
        #[command(flatten)]
        count: CountArgs,
        #[arg(short, long)]
        level: usize,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    Ok((key.to_string(), value.to_string()))
}

struct AlignedSpec {
    name: String,
    data_type: DataType,
    encoding: Encoding,
    compression: Compression,
}

fn parse_aligned_spec(s: &str) -> Result<AlignedSpec> {
    let mut parts = s.split(':');
    let name = parts.next().unwrap_or_default().to_string();
    let Some(data_type) = parts.next() else {
        bail!("expected NAME:TYPE[:ENCODING[:COMPRESSION]], got '{s}'");
    };
    let data_type: DataType = data_type.parse()?;
    let encoding: Encoding = parts.next().map_or(Ok(Encoding::Plain), str::parse::<Encoding>)?;
    let compression: Compression = parts.next().map_or(Ok(Compression::Snappy), str::parse::<Compression>)?;
    if parts.next().is_some() {
        bail!("too many fields in '{s}'");
    }
    Ok(AlignedSpec {
        name,
        data_type,
        encoding,
        compression,
    })
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(data_dir) = args.data_dir.clone() {
        config.store.data_dir = data_dir;
    }
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!(?config, "Configuration loaded");
    let store = MetadataStore::open(config.store)?;
    let result = run(&store, args.command);
    store.close();
    result
}

fn run(store: &MetadataStore, command: Commands) -> Result<()> {
    match command {
        Commands::Sg { action } => match action {
            SgCommands::Declare { path } => {
                store.declare_storage_group(&path)?;
                println!("Declared storage group {path}");
            }
            SgCommands::Ttl { path, ttl, clear } => {
                if clear || ttl.is_some() {
                    store.set_ttl(&path, ttl)?;
                }
                match store.get_ttl(&path)? {
                    Some(ttl) => println!("{path}: TTL {ttl}"),
                    None => println!("{path}: no TTL"),
                }
            }
            SgCommands::Delete { paths } => {
                store.delete_storage_groups(&paths)?;
                println!("Deleted {} storage group(s)", paths.len());
            }
            SgCommands::Count(count) => {
                println!("{}", store.count_storage_groups(&count.pattern, count.scope())?);
            }
            SgCommands::List { pattern } => {
                for sg in store.list_storage_groups(&pattern)? {
                    println!("{sg}");
                }
            }
        },
        Commands::Ts { action } => match action {
            TsCommands::Create {
                path,
                data_type,
                encoding,
                compression,
                alias,
                props,
            } => {
                let props: Option<StringMap> =
                    (!props.is_empty()).then(|| props.into_iter().collect());
                store.create_measurement(
                    &path,
                    data_type,
                    encoding,
                    compression,
                    props,
                    alias.as_deref(),
                )?;
                println!("Created timeseries {path}");
            }
            TsCommands::CreateAligned {
                device,
                measurements,
            } => {
                let specs = measurements
                    .iter()
                    .map(|s| parse_aligned_spec(s))
                    .collect::<Result<Vec<_>>>()?;
                let names: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
                let data_types: Vec<DataType> = specs.iter().map(|s| s.data_type).collect();
                let encodings: Vec<Encoding> = specs.iter().map(|s| s.encoding).collect();
                let compressions: Vec<Compression> = specs.iter().map(|s| s.compression).collect();
                store.create_aligned_measurements(
                    &device,
                    &names,
                    &data_types,
                    &encodings,
                    &compressions,
                )?;
                println!("Created {} aligned timeseries under {device}", names.len());
            }
            TsCommands::Alias { path, alias } => {
                store.set_alias(&path, &alias)?;
                println!("{path} is now also {alias}");
            }
            TsCommands::Tag { path, tags } => {
                store.upsert_tags(&path, tags.into_iter().collect())?;
                println!("Tagged {path}");
            }
            TsCommands::Delete { pattern } => {
                let deleted = store.delete_measurements(&pattern)?;
                for path in &deleted {
                    println!("{path}");
                }
                println!("Deleted {} timeseries", deleted.len());
            }
            TsCommands::Count(count) => {
                println!("{}", store.count_timeseries(&count.pattern, count.scope())?);
            }
            TsCommands::Show { pattern, json } => {
                let tree = store.fetch_schema(&pattern)?;
                if json {
                    let entries: Vec<_> = tree.measurements().collect();
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                } else {
                    println!(
                        "{:<40} {:<12} {:<8} {:<10} {:<10} {:<8} STORAGE GROUP",
                        "TIMESERIES", "ALIAS", "TYPE", "ENCODING", "COMPRESSOR", "ALIGNED"
                    );
                    for entry in tree.measurements() {
                        println!(
                            "{:<40} {:<12} {:<8} {:<10} {:<10} {:<8} {}",
                            entry.path.to_string(),
                            entry.alias.as_deref().unwrap_or("-"),
                            entry.schema.data_type.to_string(),
                            entry.schema.encoding.to_string(),
                            entry.schema.compression.to_string(),
                            entry.aligned,
                            entry.storage_group
                        );
                    }
                }
            }
        },
        Commands::Device { action } => match action {
            DeviceCommands::Count(count) => {
                println!("{}", store.count_devices(&count.pattern, count.scope())?);
            }
        },
        Commands::Nodes { action } => match action {
            NodesCommands::Count { count, level } => {
                println!(
                    "{}",
                    store.count_nodes_at_level(&count.pattern, level, count.scope())?
                );
            }
        },
        Commands::Exists { path } => {
            println!("{}", store.path_exists(&path)?);
        }
        Commands::Dump => {
            for line in store.dump_keys()? {
                println!("{line}");
            }
        }
    }
    Ok(())
}
