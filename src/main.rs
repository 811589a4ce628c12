use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    flowscribe::cli::run().await
}
