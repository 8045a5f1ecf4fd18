use clap::Args;
use std::path::PathBuf;
use tracing::debug;

use crate::cli::run_cli_async;
use crate::config::VackConfig;
use crate::mock::run_server;

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(
        value_name = "MOCK_DIR",
        help = "Directory holding *.mock.json files. Defaults to the configured mock dir"
    )]
    pub dir: Option<PathBuf>,
    #[arg(long, default_value = "127.0.0.1", help = "Address to bind")]
    pub host: String,
    #[arg(long, default_value_t = 3636, help = "Port to bind")]
    pub port: u16,
    #[arg(
        long,
        help = "Upstream to proxy unmatched requests to, e.g. http://127.0.0.1:8000"
    )]
    pub proxy: Option<String>,
}

pub async fn run(args: ServeArgs) -> i32 {
    run_cli_async(|| run_inner(args)).await
}

async fn run_inner(args: ServeArgs) -> Result<(), String> {
    let cwd = std::env::current_dir()
        .map_err(|err| format!("Failed to get current directory: {err}"))?;
    let config = VackConfig::load(&cwd)?;

    let mut settings = config.mock;
    if let Some(dir) = args.dir {
        settings.dir = dir;
    }
    if args.proxy.is_some() {
        settings.proxy = args.proxy;
    }

    if !settings.dir.is_dir() {
        return Err(format!(
            "Mock directory {} does not exist. Create it or pass a different MOCK_DIR.",
            settings.dir.display()
        ));
    }

    let addr = format!("{}:{}", args.host, args.port);
    debug!(addr = %addr, "Binding mock server.");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|err| format!("Failed to bind {addr}: {err}"))?;

    run_server(settings, listener).await
}
