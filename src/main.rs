use aux_runner::cli;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    aux_runner::init();

    match cli::run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
