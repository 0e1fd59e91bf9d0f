use crate::dry_run::{run_dry_run, DryRunArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use recruit_query::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Recruit Query",
    about = "Run the recruiter query service or evaluate criteria from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Evaluate criteria against the scoring service without storing a query
    DryRun(DryRunArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::DryRun(args) => run_dry_run(args).await,
    }
}
