mod cli;
mod demo;
mod infra;

use gacp_certify::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
