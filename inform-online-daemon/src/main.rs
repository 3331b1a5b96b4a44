mod config;

use anyhow::{Context, Result};
use clap::Parser;
use inform_online_protocol::{
    ConnectionSupervisor, DeviceCacheStore, DeviceRegistry, HttpTransport, Registration,
    RemoteAccount,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use config::Config;

/// Inform Online background connectivity daemon
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Run a single probe, print the resulting state and exit
    #[arg(long)]
    once: bool,

    /// Print the cached device roster and exit
    #[arg(long, conflicts_with = "once")]
    list_devices: bool,
}

/// Main daemon state
struct Daemon {
    /// Device cache shared with the supervisor
    cache: DeviceCacheStore,

    /// Device roster
    registry: DeviceRegistry,

    /// Connection supervisor
    supervisor: ConnectionSupervisor<HttpTransport>,
}

impl Daemon {
    /// Create a new daemon
    fn new(config: Config) -> Result<Self> {
        config
            .ensure_directories()
            .context("Failed to create directories")?;

        let cache = DeviceCacheStore::new(config.device_cache_path())
            .with_policy(config.field_policy());
        let registry = DeviceRegistry::new();

        let transport = HttpTransport::new(config.connect_timeout(), config.request_timeout())
            .context("Failed to create HTTP client")?;

        let registration = Registration::load(&config.registration_path())
            .context("Failed to load registration")?;
        match &registration {
            Some(r) => info!("Registered as device {}", r.device_id),
            None => warn!("No registration stored; checkin will be skipped"),
        }

        let account = Arc::new(
            RemoteAccount::new(config.server.url.clone(), transport.clone(), cache.clone())
                .with_registration(registration),
        );

        let supervisor = ConnectionSupervisor::new(
            config.supervisor_config(),
            transport,
            account.clone(),
            account,
            cache.clone(),
            registry.clone(),
        );

        Ok(Self {
            cache,
            registry,
            supervisor,
        })
    }

    /// Print the cached roster without touching the network
    fn list_devices(&self) -> Result<()> {
        let count = self
            .cache
            .load(&self.registry)
            .context("Failed to load device cache")?;
        debug!("Loaded {} cached devices", count);

        for device in self.registry.snapshot() {
            println!(
                "{}\t{}\t{}",
                device.id(),
                device.display_name(),
                device.status().unwrap_or("-")
            );
        }
        Ok(())
    }

    /// Run one probe and print the resulting state
    async fn probe_once(&self) {
        let outcome = self.supervisor.connect().await;
        debug!("Probe outcome: {:?}", outcome);
        println!("{}", self.supervisor.state());
    }

    /// Run the daemon until Ctrl+C
    async fn run(&self) -> Result<()> {
        // Fall back to whatever roster we cached last time
        let cached = self.cache.load_into(&self.registry);
        info!("{} devices available from cache", cached);

        let mut status = self.supervisor.status();
        tokio::spawn(async move {
            while let Some(state) = status.changed().await {
                info!("Inform Online is now {}", state);
            }
        });

        self.supervisor.start();

        info!("Daemon initialized successfully");
        info!("Press Ctrl+C to stop");

        tokio::signal::ctrl_c().await?;

        info!("Received shutdown signal");

        Ok(())
    }

    /// Shutdown the daemon
    async fn shutdown(&self) {
        info!("Shutting down daemon...");
        self.supervisor.stop().await;
        info!("Daemon shutdown complete");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting Inform Online daemon...");

    // Load configuration
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    info!("Configuration loaded");
    info!("Server: {}", config.server.url);
    info!("Retry interval: {}s", config.supervisor.retry_interval_secs);

    let daemon = Daemon::new(config).context("Failed to create daemon")?;

    if args.list_devices {
        return daemon.list_devices();
    }

    if args.once {
        daemon.probe_once().await;
        return Ok(());
    }

    let result = daemon.run().await;

    daemon.shutdown().await;

    result
}
