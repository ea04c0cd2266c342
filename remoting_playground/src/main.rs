// Copyright (c) Sean Lawlor
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree.

use std::env;

use clap::Parser;

mod calculator;
mod distributed;

#[derive(Debug, clap::Subcommand)]
enum Cli {
    /// Host a calculator and call it in-process through a loopback channel, with a scheduled
    /// callback auditing it in the background
    Loopback,

    /// Host a calculator behind a TCP listener until Ctrl-C
    Serve {
        /// The port to listen on
        port: u16,
        /// Serve binding channels (one connection per call) instead of streams
        #[arg(long)]
        binding: bool,
    },

    /// Call a calculator hosted by `serve`
    Call {
        /// The port of the serving process
        port: u16,
        /// The left operand
        left: i64,
        /// The right operand
        right: i64,
        /// Call through a binding channel (one connection per call) instead of a stream
        #[arg(long)]
        binding: bool,
    },

    /// Print the interface details the build cache registered for the calculator
    Describe,
}

#[derive(Parser, Debug)]
struct Args {
    #[command(subcommand)]
    command: Cli,
}

// MAIN //
#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let args = Args::parse();

    // if it's not set, set the log level to debug
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "debug");
    }
    env_logger::builder().format_timestamp_millis().init();

    // parse the CLI and run the correct playground scenario
    match args.command {
        Cli::Loopback => {
            calculator::run_loopback().await;
        }
        Cli::Serve { port, binding } => {
            distributed::serve(port, binding).await;
        }
        Cli::Call {
            port,
            left,
            right,
            binding,
        } => {
            distributed::call(port, left, right, binding).await;
        }
        Cli::Describe => {
            calculator::describe();
        }
    }
}
