use clap::Parser;
use exchange_rs::config::{Config, LoggingConfig};
use exchange_rs::storage::CsvStorage;
use exchange_rs::{EventBus, Exchange, ExchangeEvent, ExchangeServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "exchange-server")]
#[command(about = "Store-and-forward mail exchange server", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("exchange_rs={}", logging.level)));
    let registry = tracing_subscriber::registry().with(filter);

    match logging.format.as_str() {
        "json" => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
    }
}

#[cfg(unix)]
async fn hangup() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut stream = signal(SignalKind::hangup())?;
    stream.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn hangup() -> std::io::Result<()> {
    std::future::pending().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(Some(cli.config.as_path()))?;
    init_logging(&config.logging);

    info!("Starting exchange-rs v{}", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", config.server.listen_addr);
    info!("  Storage file: {}", config.storage.csv_path);
    info!("  Max connections: {}", config.server.max_connections);

    // A missing or corrupt storage file is fatal
    let events = EventBus::new();
    let storage = CsvStorage::new(&config.storage.csv_path);
    let exchange = match Exchange::open(storage, events.clone()).await {
        Ok(exchange) => Arc::new(exchange),
        Err(e) => {
            error!("Error initializing server storage: {}", e);
            return Err(e.into());
        }
    };

    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                ExchangeEvent::Unauthorized { address } => {
                    warn!("Audit: request by unregistered address {}", address)
                }
                other => debug!("Event: {:?}", other),
            }
        }
    });

    let server = ExchangeServer::new(config.server.clone(), exchange);
    server.start().await?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                break;
            }
            result = hangup() => {
                match result {
                    Ok(()) => {
                        info!("SIGHUP received, reloading storage");
                        // Failure keeps the current store
                        let _ = server.reload().await;
                    }
                    Err(e) => {
                        error!("Failed to listen for SIGHUP: {}", e);
                        tokio::signal::ctrl_c().await?;
                        break;
                    }
                }
            }
        }
    }

    server.stop().await?;
    Ok(())
}
