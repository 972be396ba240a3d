use crate::demo::{run_demo, run_estimate, run_fees, DemoArgs, EstimateArgs, FeesArgs};
use clap::{Parser, Subcommand};
use gacp_certify::config::AppConfig;
use gacp_certify::error::AppError;
use gacp_certify::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "GACP Certification",
    about = "Run and inspect the GACP farm certification workflow from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk applications through the workflow against in-memory adapters (default command)
    Demo(DemoArgs),
    /// Print the fee schedule for an application type
    Fees(FeesArgs),
    /// Estimate on-site inspection hours for a farm
    Estimate(EstimateArgs),
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let command = cli
        .command
        .unwrap_or_else(|| Command::Demo(DemoArgs::default()));

    match command {
        Command::Demo(args) => run_demo(&config, args).await,
        Command::Fees(args) => run_fees(&config, args),
        Command::Estimate(args) => {
            run_estimate(args);
            Ok(())
        }
    }
}
