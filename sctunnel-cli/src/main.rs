use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "sctunnel", about = "Open Sauce Labs tunnels for test runs")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    credentials: commands::CredentialArgs,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a tunnel and keep it up until Ctrl-C
    Start(commands::start::StartArgs),
    /// List the account's tunnels
    List,
    /// Delete a tunnel by id
    Delete(commands::delete::DeleteArgs),
    /// Manage configuration
    Config(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Start(args) => commands::start::run(args, &cli.credentials, cli.verbose).await,
        Commands::List => commands::list::run(&cli.credentials).await,
        Commands::Delete(args) => commands::delete::run(args, &cli.credentials).await,
        Commands::Config(args) => commands::config::run(args),
    }
}
