mod cli;
mod dry_run;
mod infra;
mod routes;
mod server;

use recruit_query::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
