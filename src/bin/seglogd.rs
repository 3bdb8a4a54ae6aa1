//! Production daemon for the seglog commit log.
//!
//! Loads configuration from (in precedence order): defaults, config file,
//! environment variables (`SEGLOG_*`), and CLI flags. Opens the log, serves
//! produce/consume and health/readiness endpoints, and runs until graceful
//! shutdown (SIGINT/SIGTERM).

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use std::convert::Infallible;

use bytes::Bytes;
use clap::Parser;
use config::{Config, Environment, File};
use http_body_util::{BodyExt, Full};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::graceful::GracefulShutdown;
use seglog::telemetry::noop_event_listener;
use seglog::{BincodeCodec, ChecksumCodec, Log, LogConfig, LogError, Record, SegmentConfig};

// ---------- CLI ----------

/// seglog commit log daemon.
#[derive(Parser, Debug)]
#[command(name = "seglogd", version, about)]
pub struct Cli {
    /// Path to config file (TOML). If omitted, no file is loaded unless default path exists.
    #[arg(long, env = "SEGLOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override data directory (storage for segment files).
    #[arg(long, env = "SEGLOG_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Do not load any config file; use defaults + env + CLI only.
    #[arg(long, default_value_t = false)]
    pub no_config: bool,

    /// Load and validate config (file + env + CLI), print effective settings, then exit. Does not open the log.
    #[arg(long, default_value_t = false)]
    pub validate_config: bool,

    /// HTTP listen address (e.g. 127.0.0.1:8080 or 0.0.0.0:8080).
    #[arg(long, env = "SEGLOG_HTTP_BIND")]
    pub http_bind: Option<String>,
}

// ---------- File/env config (all optional for partial config) ----------

/// Segment section in config file. All fields optional; serde deserializes from TOML.
#[derive(Debug, Default, serde::Deserialize)]
pub struct SegmentFileConfig {
    pub max_store_bytes: Option<u64>,
    pub max_index_bytes: Option<u64>,
}

/// Top-level daemon config as read from file + env. Every field optional for layering.
#[derive(Debug, Default, serde::Deserialize)]
pub struct DaemonFileConfig {
    /// HTTP listen address (e.g. "127.0.0.1:8080").
    pub http_bind: Option<String>,
    pub data_dir: Option<String>,
    /// Embed a crc32 checksum in every encoded record.
    pub checksum: Option<bool>,
    #[serde(rename = "segment")]
    pub segment: Option<SegmentFileConfig>,
}

/// Runtime options for the daemon derived from config + env + CLI.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    /// Address to bind the HTTP server.
    pub http_bind: SocketAddr,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            http_bind: "127.0.0.1:8080".parse().expect("default http_bind"),
        }
    }
}

/// Parse a listen address into a `SocketAddr`.
fn parse_listen_addr(value: &str) -> Result<SocketAddr, String> {
    value
        .parse()
        .map_err(|e| format!("invalid http_bind {value:?}: {e}"))
}

/// Load merged config and daemon options. CLI overrides file/env for both.
fn load_daemon_config(cli: &Cli) -> Result<(LogConfig, PathBuf, DaemonOptions), String> {
    let mut builder = Config::builder();

    if !cli.no_config {
        if let Some(ref path) = cli.config {
            if !path.exists() {
                return Err(format!("config file not found: {}", path.display()));
            }
            builder = builder.add_source(File::from(path.as_path()).required(false));
        } else {
            let default_path = PathBuf::from("seglogd.toml");
            if default_path.exists() {
                builder = builder.add_source(File::from(default_path.as_path()).required(false));
            }
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("SEGLOG")
            .separator("__")
            .try_parsing(true)
            .ignore_empty(true),
    );

    let merged = builder.build().map_err(|e| e.to_string())?;
    let partial: DaemonFileConfig = merged.try_deserialize().map_err(|e| e.to_string())?;

    let mut segment = SegmentConfig::default();
    if let Some(ref s) = partial.segment {
        if let Some(n) = s.max_store_bytes {
            segment.max_store_bytes = n;
        }
        if let Some(n) = s.max_index_bytes {
            segment.max_index_bytes = n;
        }
    }
    if segment.max_index_bytes < 12 {
        return Err(format!(
            "max_index_bytes must hold at least one 12-byte entry, got {}",
            segment.max_index_bytes
        ));
    }

    let log_config = LogConfig {
        segment,
        codec: if partial.checksum.unwrap_or(false) {
            Arc::new(ChecksumCodec::new(BincodeCodec))
        } else {
            Arc::new(BincodeCodec)
        },
        event_listener: noop_event_listener(),
    };

    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| partial.data_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./data"));

    let http_bind_str = cli
        .http_bind
        .as_deref()
        .or(partial.http_bind.as_deref())
        .unwrap_or("127.0.0.1:8080");
    let http_bind = parse_listen_addr(http_bind_str)?;

    Ok((log_config, data_dir, DaemonOptions { http_bind }))
}

// ---------- Safe startup checks ----------

/// Fail fast if the data directory cannot be created or written to. Opening
/// the log would hit the same problem later, with a less actionable error.
fn ensure_writable_data_dir(dir: &Path) -> Result<(), String> {
    fs::create_dir_all(dir)
        .map_err(|e| format!("data_dir {} cannot be created: {e}", dir.display()))?;

    let probe = dir.join(".write-probe");
    fs::write(&probe, b"probe")
        .map_err(|e| format!("data_dir {} not writable: {e}", dir.display()))?;
    fs::remove_file(&probe)
        .map_err(|e| format!("data_dir {} probe cleanup failed: {e}", dir.display()))?;
    Ok(())
}

// ---------- HTTP server ----------

/// Shared state for the HTTP service.
struct AppState {
    log: Arc<Log>,
    ready: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .expect("response build")
}

fn error_response(err: &LogError) -> Response<Full<Bytes>> {
    let status = match err {
        LogError::OffsetOutOfRange { .. } | LogError::EndOfFile => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    text_response(status, err.to_string())
}

/// Extract `offset=N` from a query string.
fn offset_param(query: Option<&str>) -> Option<u64> {
    query?
        .split('&')
        .find_map(|kv| kv.strip_prefix("offset="))
        .and_then(|v| v.parse().ok())
}

async fn log_service(
    state: std::sync::Arc<AppState>,
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let response = match (&parts.method, parts.uri.path()) {
        (&hyper::Method::GET, "/healthz") => {
            // Liveness: process is alive and responding.
            text_response(StatusCode::OK, "ok")
        }
        (&hyper::Method::GET, "/readyz") => {
            // Readiness: log opened; safe to send traffic.
            if state.ready.load(Ordering::Acquire) {
                text_response(StatusCode::OK, "ok")
            } else {
                text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready")
            }
        }
        (&hyper::Method::POST, "/produce") => {
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    return Ok(text_response(
                        StatusCode::BAD_REQUEST,
                        format!("body read failed: {}", e),
                    ))
                }
            };
            let log = Arc::clone(&state.log);
            // Log operations block on file I/O; keep them off the runtime threads.
            let result = tokio::task::spawn_blocking(move || {
                let mut record = Record::new(body.to_vec());
                log.append(&mut record)
            })
            .await;
            match result {
                Ok(Ok(offset)) => text_response(StatusCode::OK, format!("{}\n", offset)),
                Ok(Err(e)) => error_response(&e),
                Err(e) => text_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("append task failed: {}", e),
                ),
            }
        }
        (&hyper::Method::GET, "/consume") => match offset_param(parts.uri.query()) {
            Some(offset) => {
                let log = Arc::clone(&state.log);
                let result = tokio::task::spawn_blocking(move || log.read(offset)).await;
                match result {
                    Ok(Ok(record)) => Response::builder()
                        .status(StatusCode::OK)
                        .header("x-seglog-offset", record.offset.to_string())
                        .body(Full::new(Bytes::from(record.value)))
                        .expect("response build"),
                    Ok(Err(e)) => error_response(&e),
                    Err(e) => text_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("read task failed: {}", e),
                    ),
                }
            }
            None => text_response(StatusCode::BAD_REQUEST, "missing offset parameter"),
        },
        _ => text_response(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(response)
}

/// Completes once the process receives SIGINT (Ctrl+C) or SIGTERM.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.expect("install SIGINT handler"),
        _ = term.recv() => {}
    }
}

/// Completes once the process receives Ctrl+C.
#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("install SIGINT handler");
}

/// Runs the daemon: serves the HTTP API, waits for a shutdown signal, then
/// closes the log (flushing store buffers and truncating index files).
async fn run_server(
    log: Arc<Log>,
    data_dir: PathBuf,
    options: DaemonOptions,
    ready: std::sync::Arc<std::sync::atomic::AtomicBool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind(options.http_bind)
        .await
        .map_err(|e| format!("failed to bind {}: {}", options.http_bind, e))?;
    eprintln!(
        "seglogd running (data_dir={}, http={}). Press Ctrl+C or send SIGTERM to stop.",
        data_dir.display(),
        options.http_bind
    );

    let state = std::sync::Arc::new(AppState {
        log: Arc::clone(&log),
        ready,
    });
    let server = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut shutdown = std::pin::pin!(shutdown_signal());

    loop {
        tokio::select! {
            Ok((stream, _addr)) = listener.accept() => {
                let io = TokioIo::new(Box::pin(stream));
                let state = std::sync::Arc::clone(&state);
                let conn = server.serve_connection_with_upgrades(io, service_fn(move |req| {
                    let state = std::sync::Arc::clone(&state);
                    async move { log_service(state, req).await }
                }));
                let fut = graceful.watch(conn.into_owned());
                tokio::spawn(async move {
                    if let Err(e) = fut.await {
                        eprintln!("connection error: {:?}", e);
                    }
                });
            }
            _ = &mut shutdown => {
                eprintln!("shutdown signal received");
                break;
            }
        }
    }

    drop(listener);
    const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);
    tokio::select! {
        _ = graceful.shutdown() => {
            eprintln!("all connections closed");
        }
        _ = tokio::time::sleep(SHUTDOWN_TIMEOUT) => {
            eprintln!("shutdown timeout waiting for connections");
        }
    }

    eprintln!("closing log...");
    if let Err(e) = log.close() {
        eprintln!("close during shutdown: {}", e);
    }
    eprintln!("shutdown complete");
    Ok(())
}

// ---------- Main ----------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let (log_config, data_dir, options) = load_daemon_config(&cli).map_err(|e| {
        eprintln!("config error: {}", e);
        e
    })?;

    if cli.validate_config {
        println!("data_dir={}", data_dir.display());
        println!("max_store_bytes={}", log_config.segment.max_store_bytes);
        println!("max_index_bytes={}", log_config.segment.max_index_bytes);
        println!("http_bind={}", options.http_bind);
        return Ok(());
    }

    // Safe startup: data_dir must exist and be writable before opening the log.
    ensure_writable_data_dir(&data_dir).map_err(|e| {
        eprintln!("startup check failed: {}", e);
        e
    })?;

    let log = Arc::new(Log::open(&data_dir, log_config).map_err(|e| {
        eprintln!("failed to open log: {}", e);
        e
    })?);

    let ready = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    run_server(log, data_dir, options, ready).await
}
