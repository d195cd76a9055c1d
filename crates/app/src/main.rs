use std::fmt;
use std::net::SocketAddr;

use app::{AppState, router};
use services::{AppServices, Clock};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidAddr { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidAddr { raw } => write!(f, "invalid --addr value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  interview-server [--db <sqlite_url>] [--addr <host:port>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://interview.sqlite3");
    eprintln!("  --addr 127.0.0.1:8080");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  INTERVIEW_DB_URL, INTERVIEW_HTTP_ADDR, RUST_LOG");
    eprintln!(
        "  INTERVIEW_AI_API_KEY, INTERVIEW_AI_BASE_URL, INTERVIEW_AI_MODEL, INTERVIEW_AI_TIMEOUT_SECS"
    );
    eprintln!(
        "  INTERVIEW_TELEMETRY_INTERVAL_SECS, INTERVIEW_AUTO_SUBMIT_ON_EXPIRY, INTERVIEW_SIMULATE_TELEMETRY"
    );
}

struct Args {
    db_url: String,
    addr: SocketAddr,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("INTERVIEW_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://interview.sqlite3".into(), normalize_sqlite_url);
        let mut addr = match std::env::var("INTERVIEW_HTTP_ADDR") {
            Ok(raw) => parse_addr(raw)?,
            Err(_) => SocketAddr::from(([127, 0, 0, 1], 8080)),
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--addr" => addr = parse_addr(require_value(args, "--addr")?)?,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self { db_url, addr })
    }
}

fn parse_addr(raw: String) -> Result<SocketAddr, ArgsError> {
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidAddr { raw })
}

/// Turn `sqlite:relative.db` or a bare path into an absolute `sqlite://` URL.
fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") || raw.starts_with("sqlite:file:")
    {
        return raw;
    }

    let trimmed = raw.trim();
    let path = std::path::Path::new(trimmed.strip_prefix("sqlite:").unwrap_or(trimmed));
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the database file and its parent directories if they are missing.
fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_owned(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&args.db_url)?;
    let clock = Clock::default();
    let services = AppServices::new_sqlite(&args.db_url, clock).await?;
    let app = router(AppState::new(services.session_loop(), clock));

    let listener = tokio::net::TcpListener::bind(args.addr).await?;
    tracing::info!(addr = %args.addr, db = %args.db_url, "interview server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "server exited");
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_become_absolute_urls() {
        let url = normalize_sqlite_url("sqlite:data/interview.db".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/interview.db"));
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:".into()),
            "sqlite::memory:"
        );
    }

    #[test]
    fn flags_override_defaults() {
        let mut argv = ["--addr", "0.0.0.0:9000", "--db", "/tmp/x.db"]
            .into_iter()
            .map(String::from);
        let args = Args::parse(&mut argv).unwrap();
        assert_eq!(args.addr.port(), 9000);
        assert_eq!(args.db_url, "sqlite:///tmp/x.db");
    }

    #[test]
    fn missing_values_and_unknown_flags_fail() {
        let mut argv = ["--db".to_owned()].into_iter();
        assert!(matches!(
            Args::parse(&mut argv),
            Err(ArgsError::MissingValue { flag: "--db" })
        ));
        let mut argv = ["--verbose".to_owned()].into_iter();
        assert!(matches!(Args::parse(&mut argv), Err(ArgsError::UnknownArg(_))));
        assert!(parse_addr("nowhere".into()).is_err());
    }
}
