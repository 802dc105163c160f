use std::process::ExitCode;

use clap::Parser;
use mesh_node::Cli;

#[actix_web::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    mesh_o11y::init_logging("info");

    match mesh_node::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "meshrun exited with a fatal error");
            ExitCode::FAILURE
        }
    }
}
