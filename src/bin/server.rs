//! Whiskers agent server binary.
//! Run with: cargo run --bin whiskers-server

use std::process::ExitCode;

use whiskers_agent::startup;

fn main() -> ExitCode {
    startup::run()
}
