use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use sockline_core::api::{ErrorBody, Reply, Request, dispatch};
use sockline_core::observability::init_logging;
use sockline_core::{ClientConfig, ErrorKind, TcpSocket};

/// Line-oriented JSON host for the sockline TCP client.
///
/// Each stdin line is one call, e.g.
/// `{"id":1,"method":"connect","ipAddress":"127.0.0.1","port":9100}`.
/// Each reply is written to stdout as one JSON line. Logs go to stderr.
#[derive(Debug, Parser)]
#[command(name = "sockline", version)]
struct Args {
    /// TOML config file (see ClientConfig).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of I/O workers.
    #[arg(long)]
    workers: Option<usize>,

    /// Bounded job queue size.
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Default send/read timeout in milliseconds.
    #[arg(long)]
    io_timeout_ms: Option<u64>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log: String,
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("invalid SOCKLINE_* environment override")?;

    // CLI フラグが最優先
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(capacity) = args.queue_capacity {
        config.queue_capacity = capacity;
    }
    if let Some(ms) = args.io_timeout_ms {
        config.io_timeout_ms = Some(ms);
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log);

    let config = load_config(&args)?;
    info!(?config, "starting sockline host");
    let socket = Arc::new(TcpSocket::new(config));

    // (A) stdout への書き込みは 1 本のタスクに集約する
    let (reply_tx, mut reply_rx) = mpsc::channel::<Reply>(64);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(reply) = reply_rx.recv().await {
            let mut line = match serde_json::to_vec(&reply) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "failed to serialize reply");
                    continue;
                }
            };
            line.push(b'\n');
            if stdout.write_all(&line).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    // (B) 各リクエストは独立したタスクで処理（呼び出し元をブロックしない）
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            line = lines.next_line() => line.context("failed to read stdin")?,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                let body = ErrorBody {
                    kind: ErrorKind::InvalidArgument,
                    message: format!("malformed request: {e}"),
                };
                let _ = reply_tx.send(Reply::failure(None, body)).await;
                continue;
            }
        };

        let socket = Arc::clone(&socket);
        let reply_tx = reply_tx.clone();
        tokio::spawn(async move {
            let reply = dispatch(socket.as_ref(), request).await;
            let _ = reply_tx.send(reply).await;
        });
    }

    // (C) ホスト終了時はレジストリごと閉じる
    socket.shutdown().await;
    drop(reply_tx);
    let _ = writer.await;
    Ok(())
}
