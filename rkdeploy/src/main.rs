use clap::{Parser, Subcommand};
use tracing::error;

use rkdeploy::commands::status::{StatusArgs, status_execute};

#[derive(Parser)]
#[command(name = "rkdeploy")]
#[command(
    about = "Deployment rollout status checks",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn run(self) -> Result<(), anyhow::Error> {
        match self.command {
            Command::Status(args) => status_execute(args),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Wait for a run's deployments to stabilize", alias = "st")]
    Status(StatusArgs),
}

fn main() -> Result<(), anyhow::Error> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    cli.run().inspect_err(|err| error!("Failed to run: {err}"))
}
