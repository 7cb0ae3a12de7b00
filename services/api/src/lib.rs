mod cli;
mod fees;
mod infra;
mod routes;
mod server;

use rebate_tracker::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
