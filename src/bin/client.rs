use bytes::Bytes;
use clap::Parser;
use robolink::client::{AsyncTcpClient, RequestStatus};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:3333")]
    server: SocketAddr,

    /// Command to send (space-padded to the server's field width)
    #[arg(short, long, default_value = "UP")]
    command: String,

    /// Command field width
    #[arg(long, default_value_t = robolink::protocol::DEFAULT_COMMAND_LENGTH)]
    field_width: usize,

    /// Number of requests to send
    #[arg(short = 'n', long, default_value_t = 10)]
    count: u64,

    /// Delay between requests in milliseconds
    #[arg(long, default_value_t = 20)]
    interval_ms: u64,

    /// Cancel every Nth request mid-flight (0 = never)
    #[arg(long, default_value_t = 0)]
    cancel_every: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(format!("robolink={}", args.log_level))
        .init();

    if args.command.len() > args.field_width {
        anyhow::bail!(
            "command '{}' does not fit the {}-byte field",
            args.command,
            args.field_width
        );
    }
    let payload = Bytes::from(format!(
        "{:<width$}",
        args.command,
        width = args.field_width
    ));

    let mut client = AsyncTcpClient::new()?;
    let failures = Arc::new(AtomicU64::new(0));
    let (done_tx, done_rx) = mpsc::channel();

    info!(
        "Sending {} x '{}' to {} every {} ms",
        args.count, args.command, args.server, args.interval_ms
    );

    for id in 1..=args.count {
        let callback = {
            let failures = Arc::clone(&failures);
            let done_tx = done_tx.clone();
            Box::new(move |id: u64, response: String, status: RequestStatus| {
                match status {
                    RequestStatus::Completed => {
                        info!("Request #{} has completed. Response: {}", id, response);
                    }
                    RequestStatus::Aborted => {
                        info!("Request #{} has been cancelled by the user.", id);
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                    RequestStatus::Failed(e) => {
                        warn!("Request #{} failed: {}", id, e);
                        failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
                let _ = done_tx.send(());
            })
        };

        client.send_request(payload.clone(), args.server, callback, id)?;

        if args.cancel_every != 0 && id % args.cancel_every == 0 {
            client.cancel_request(id);
        }

        thread::sleep(Duration::from_millis(args.interval_ms));
    }

    for _ in 0..args.count {
        if done_rx.recv_timeout(Duration::from_secs(30)).is_err() {
            warn!("Timed out waiting for outstanding requests");
            break;
        }
    }

    client.close();

    let failed = failures.load(Ordering::Relaxed);
    info!(
        "Done: {}/{} requests succeeded",
        args.count - failed,
        args.count
    );
    Ok(())
}
