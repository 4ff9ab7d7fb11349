//! # cce
//!
//! Entry point: parse arguments, install tracing, run the command, exit with
//! its code.

use cce::cli::{execute, Cli};
use cce::logging::init_tracing;
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let code = execute(cli).await;
    std::process::exit(code);
}
