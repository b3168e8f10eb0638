use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    trip_planner_lib::run().await
}
