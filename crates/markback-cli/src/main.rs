use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use markback_cli::cli::{execute, init_logging, CliConfig, Command};
use markback_core::{BookmarkStore, StorageAreas};

#[derive(Parser)]
#[command(name = "markback")]
#[command(about = "Manage answer bookmarks")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    /// Path to JSON config file (contains dataDir)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Directory holding the bookmark stores (overrides the config file)
    #[arg(long, short = 'd')]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let Some(command) = cli.command.clone() else {
        eprintln!("No command specified. Use --help for usage.");
        std::process::exit(1);
    };

    if let Err(e) = run(&cli, command).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, command: Command) -> Result<()> {
    let file_config = match &cli.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };
    let config = file_config.into_core(cli.data_dir.clone());

    let areas = StorageAreas::open_dir(&config.data_dir).with_context(|| {
        format!("Failed to open bookmark stores in {}", config.data_dir.display())
    })?;
    let store = BookmarkStore::new(areas);

    let output = execute(command, &store).await?;
    println!("{}", output.render(cli.pretty)?);
    Ok(())
}
