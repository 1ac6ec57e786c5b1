//! CLI binary for guestinfo-metadata crate.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use guestinfo_metadata::{
    DmiOracle, GuestInfoClient, MemoryClient, MetadataError, MetadataProvider, RpcToolClient,
    StaticOracle, VirtualizationOracle, VmwareProvider, DEFAULT_CONFIG_DIR, DEFAULT_RPCTOOL,
    GUEST_USERDATA,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Exit code for failures that abort provider selection entirely.
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "guestinfo-metadata")]
#[command(
    author,
    version,
    about = "Fetch and decode VMware guestinfo metadata and userdata"
)]
struct Cli {
    /// Path to the vmware-rpctool helper
    #[arg(long, global = true, default_value = DEFAULT_RPCTOOL)]
    rpctool: PathBuf,

    /// Give up on a single guestinfo fetch after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Read guestinfo keys from a JSON snapshot instead of the hypervisor
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether this host is a VMware guest with userdata
    Probe,

    /// Write metadata to the config directory and output the userdata
    Extract {
        /// Directory the metadata file is written to
        #[arg(long, default_value = DEFAULT_CONFIG_DIR)]
        config_dir: PathBuf,

        /// Write userdata to this file instead of stdout
        #[arg(long)]
        userdata_out: Option<PathBuf>,
    },

    /// Decode a single guestinfo key
    Fetch {
        /// The guestinfo key
        #[arg(default_value = GUEST_USERDATA)]
        key: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Maximum decoded size in bytes to accept (fails if exceeded)
        #[arg(short, long)]
        max_size: Option<usize>,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Raw,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "raw" => Ok(OutputFormat::Raw),
            _ => Err(format!("unknown format: {}", s)),
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            if e.is_fatal_probe() {
                ExitCode::from(EXIT_FATAL)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, MetadataError> {
    match cli.snapshot {
        Some(path) => {
            let data = tokio::fs::read(&path).await?;
            let client = MemoryClient::from_json(&data)?;
            info!(snapshot = %path.display(), "using guestinfo snapshot");
            run_command(
                VmwareProvider::with_parts(client, StaticOracle(true)),
                cli.command,
            )
            .await
        }
        None => {
            let mut client = RpcToolClient::new().with_program(cli.rpctool);
            if let Some(secs) = cli.timeout {
                client = client.with_timeout(Duration::from_secs(secs));
            }
            run_command(
                VmwareProvider::with_parts(client, DmiOracle::new()),
                cli.command,
            )
            .await
        }
    }
}

async fn run_command<C, O>(
    provider: VmwareProvider<C, O>,
    command: Commands,
) -> Result<ExitCode, MetadataError>
where
    C: GuestInfoClient,
    O: VirtualizationOracle,
{
    match command {
        Commands::Probe => {
            let found = provider.probe().await?;
            println!("{}", found);
            Ok(if found {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Commands::Extract {
            config_dir,
            userdata_out,
        } => {
            if !provider.probe().await? {
                eprintln!("{}: no userdata available", provider.name());
                return Ok(ExitCode::FAILURE);
            }

            match provider.extract(&config_dir).await? {
                Some(userdata) => match userdata_out {
                    Some(path) => {
                        tokio::fs::write(&path, &userdata).await?;
                        info!(path = %path.display(), bytes = userdata.len(), "wrote userdata");
                    }
                    None => io::stdout().write_all(&userdata)?,
                },
                None => eprintln!("{}: metadata written, no userdata", provider.name()),
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Fetch {
            key,
            format,
            max_size,
        } => {
            let provider = match max_size {
                Some(size) => provider.with_max_size(size),
                None => provider,
            };

            match format {
                OutputFormat::Text => {
                    let text = provider.fetch_text(&key).await?;
                    println!("{}", text);
                }
                OutputFormat::Json => {
                    let value: serde_json::Value = provider.fetch_json(&key).await?;
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                OutputFormat::Raw => {
                    let data = provider.fetch(&key).await?;
                    io::stdout().write_all(&data)?;
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
