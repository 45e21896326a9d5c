use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match app_lib::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("audit-bot: {e}");
            ExitCode::FAILURE
        }
    }
}
