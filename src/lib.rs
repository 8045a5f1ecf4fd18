#![forbid(unsafe_code)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro
)]

use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub mod api;
mod cli;
mod common;
pub mod config;
pub mod mock;

#[derive(Parser)]
#[command(
    name = "vack",
    version,
    about = "\x1b[33mvack\x1b[0m scaffolds frontend projects and serves their mock APIs ⚡"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// 🎬 Initialize a new project
    Init(cli::init::InitArgs),
    /// 🎭 Mock server commands
    #[command(subcommand)]
    Mock(MockCommands),
}

#[derive(Subcommand)]
enum MockCommands {
    /// Serve *.mock.json definitions with hot reload
    Serve(cli::mock_serve::ServeArgs),
}

pub async fn run() -> i32 {
    run_with_args(std::env::args()).await
}

async fn run_with_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => match cli.command {
            Some(Commands::Init(init_args)) => cli::init::run(init_args).await,
            Some(Commands::Mock(mock_cmd)) => match mock_cmd {
                MockCommands::Serve(serve_args) => cli::mock_serve::run(serve_args).await,
            },
            None => {
                let mut cmd = Cli::command();
                let _ = cmd.print_help();
                println!();
                0
            }
        },
        Err(e) => {
            let code = e.exit_code();
            let _ = e.print();
            code
        }
    }
}

pub fn init_tracing() {
    let crate_root = module_path!().to_string();

    // VACK_LOG controls log level: "trace", "debug", "info", "warn", "error"
    // or a full tracing filter spec like "vack=debug,tower=warn"
    let filter = match std::env::var("VACK_LOG") {
        Ok(level) if is_plain_level(&level) => {
            format!("{crate_root}={level}")
        }
        Ok(spec) => spec,
        Err(_) => format!("{crate_root}=info"),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_filter(EnvFilter::new(filter));

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        eprintln!("Warning: tracing subscriber already initialized");
    }
}

fn is_plain_level(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_is_plain_level() {
        assert!(is_plain_level("debug"));
        assert!(is_plain_level("WARN"));
        assert!(!is_plain_level("vack=debug"));
    }

    #[tokio::test]
    async fn test_unknown_subcommand_is_an_error() {
        let code = run_with_args(["vack", "frobnicate"]).await;
        assert_ne!(code, 0);
    }
}
