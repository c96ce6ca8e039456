use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    queuectl::boot::boot().await
}
