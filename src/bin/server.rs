use clap::Parser;
use robolink::{Config, Controller, Framing, Server};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = robolink::config::DEFAULT_PORT)]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Number of reactor threads (0 = 2x number of CPUs)
    #[arg(short = 't', long, default_value_t = 0)]
    threads: usize,

    /// Use sentinel-terminated blob framing instead of fixed-width commands
    #[arg(long)]
    blob_framing: bool,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(format!("robolink={}", args.log_level))
        .init();

    info!(
        "Starting robolink server v{} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        args.bind,
        args.port
    );

    let config = if let Some(config_path) = args.config {
        Config::from_file(&config_path)?
    } else {
        let framing = if args.blob_framing {
            Framing::terminated_default()
        } else {
            Framing::default()
        };

        Config {
            bind_addr: args.bind,
            port: args.port,
            threads: args.threads,
            framing,
            ..Default::default()
        }
    };

    info!("Using {} reactor threads", config.effective_threads());

    let controller = Arc::new(Controller::new(
        config.worker_queue_capacity,
        Duration::from_millis(config.command_timeout_ms),
    )?);

    let server = Arc::new(Server::new(config, controller)?);

    // Shutdown trigger: the acceptor stops re-arming and every reactor
    // thread drains out of its run loop.
    let server_clone = Arc::clone(&server);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, shutting down gracefully...");
        server_clone.shutdown();
    })?;

    if let Err(e) = server.run() {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
