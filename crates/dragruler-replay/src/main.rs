//! DragRuler scenario replay.
//!
//! Usage: `dragruler-replay <scenario.json>`
//!
//! Replays a scripted drag against the reference host ruler and prints the
//! resulting segments as JSON. Set `RUST_LOG=debug` to trace each step.

mod scenario;

use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("Usage: dragruler-replay <scenario.json>");
        return ExitCode::from(2);
    };

    let report = match scenario::replay_file(&path) {
        Ok(report) => report,
        Err(e) => {
            log::error!("Replay failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Failed to serialize report: {}", e);
            ExitCode::FAILURE
        }
    }
}
