//! ftpgate - HTTP gateway for an FTP server

use clap::Parser;
use ftpgate_cli::{GatewayConfig, run_server_with_shutdown};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ftpgate")]
#[command(about = "Serve an FTP server over HTTP as directory listings and downloads")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "FTPGATE_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8000", env = "FTPGATE_PORT")]
    port: u16,

    /// Backend FTP host
    #[arg(long, default_value = "127.0.0.1", env = "FTP_HOST")]
    ftp_host: String,

    /// Backend FTP control port
    #[arg(long, default_value = "21", env = "FTP_PORT")]
    ftp_port: u16,

    /// Backend login user (anonymous login when unset)
    #[arg(long, env = "FTP_USER")]
    ftp_user: Option<String>,

    /// Backend login password
    #[arg(long, env = "FTP_PASSWORD", hide_env_values = true)]
    ftp_password: Option<String>,

    /// Deadline for connecting and logging in, in milliseconds
    #[arg(long, default_value = "5000", env = "FTP_CONNECT_TIMEOUT_MS")]
    connect_timeout_ms: u64,

    /// Deadline for each backend reply or data read, in milliseconds (0 disables)
    #[arg(long, default_value = "30000", env = "FTP_IO_TIMEOUT_MS")]
    io_timeout_ms: u64,

    /// Enable debug logging
    #[arg(short, long, env = "FTPGATE_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "ftpgate_cli={0},ftpgate_ftp={0},tower_http=debug",
                log_level
            )
            .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ftpgate on {}:{}", args.host, args.port);
    tracing::info!(
        "FTP backend: {}:{} as {}",
        args.ftp_host,
        args.ftp_port,
        args.ftp_user.as_deref().unwrap_or("anonymous")
    );

    if args.io_timeout_ms == 0 {
        tracing::warn!("Backend I/O timeout disabled - a stalled server will hang requests");
    }

    let config = GatewayConfig {
        host: args.host,
        port: args.port,
        ftp_host: args.ftp_host,
        ftp_port: args.ftp_port,
        ftp_user: args.ftp_user,
        ftp_password: args.ftp_password,
        connect_timeout_ms: args.connect_timeout_ms,
        io_timeout_ms: args.io_timeout_ms,
    };

    run_server_with_shutdown(config, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
