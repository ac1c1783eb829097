use std::{path::PathBuf, process};

use clap::{Args, Parser, Subcommand};
use pipewright::{
    apps::App,
    channel::ChannelsConfig,
    config::{ConfigManager, EnvConfigManager},
    logger::{convert_level, init_tracing},
    schema::write_schema,
    settings::Settings,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "pipewright",
    about = "Message pipelines with a remote admin protocol",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every channel and the admin listener
    Run(RunArgs),

    /// Check a channels file without running it
    Validate { file: PathBuf },

    /// Emit the JSON Schema of the channels file
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Channels file (YAML)
    #[arg(long, default_value = "channels.yaml")]
    channels: PathBuf,

    /// Optional .env file loaded before settings are resolved
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Optional log level override (e.g. error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Directory to write `channels.schema.json` into; stdout when omitted
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Validate { file } => {
            let config = ChannelsConfig::load(&file)?;
            match config.check() {
                Ok(()) => {
                    println!("✅ {} is valid ({} channels).", file.display(), config.channels.len());
                    Ok(())
                }
                Err(e) => {
                    eprintln!("❌ {}: {e}", file.display());
                    process::exit(1);
                }
            }
        }
        Commands::Schema(args) => write_schema(args.out.as_deref()),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = ConfigManager::new(EnvConfigManager::new(args.env_file));
    let mut settings = Settings::resolve(&config).await?;
    if let Some(level) = args.log_level {
        settings.log_level = convert_level(&level);
    }
    init_tracing(settings.log_dir.as_deref(), settings.log_level)?;

    info!("pipewright starting up");
    let mut app = App::new();
    if let Err(e) = app.bootstrap(&settings, &args.channels).await {
        error!("Failed to bootstrap pipewright: {e:#}");
        app.shutdown().await;
        process::exit(1);
    }

    if let Some(admin) = app.admin() {
        println!("pipewright running, admin on ws://{}; press Ctrl-C to exit", admin.local_addr());
    }

    tokio::signal::ctrl_c().await?;
    info!("pipewright shutting down");
    app.shutdown().await;
    Ok(())
}
