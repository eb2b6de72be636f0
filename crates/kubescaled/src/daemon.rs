//! Run mode: config resolution, driver selection and task wiring.
//!
//! The daemon:
//! 1. Loads `kubescale.toml` (or defaults) and applies CLI overrides
//! 2. Picks the cluster driver
//! 3. Spawns the reconcile loop and, if configured, the prediction feed
//! 4. Serves the REST API until Ctrl-C, then stops the loops and drains
//!    in-flight cluster calls

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};

use kubescale_autoscale::DiurnalFeed;
use kubescale_cluster::{ClusterDriver, KubectlDriver, SimulatedDriver};
use kubescale_core::config::{ClusterConfig, DriverKind, FeedKind};
use kubescale_core::{HumanDuration, ScaleConfig};
use kubescale_reconciler::Platform;

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Path to kubescale.toml. Defaults apply when absent.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(long, default_value = "8080")]
    pub port: u16,

    /// Reconcile tick interval (e.g. "2s", "500ms").
    #[arg(long)]
    pub tick_interval: Option<HumanDuration>,

    /// Seed for the reconciler's RNG.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Cluster backend.
    #[arg(long, value_enum)]
    pub driver: Option<DriverArg>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DriverArg {
    Simulated,
    Kubectl,
}

impl From<DriverArg> for DriverKind {
    fn from(d: DriverArg) -> Self {
        match d {
            DriverArg::Simulated => DriverKind::Simulated,
            DriverArg::Kubectl => DriverKind::Kubectl,
        }
    }
}

/// File config with CLI overrides applied, validated.
pub fn effective_config(args: &RunArgs) -> anyhow::Result<ScaleConfig> {
    let mut config = match &args.config {
        Some(path) => ScaleConfig::from_file(path)?,
        None => ScaleConfig::default(),
    };
    if let Some(tick) = args.tick_interval {
        config.reconcile.tick_interval = tick;
    }
    if let Some(seed) = args.seed {
        config.reconcile.seed = Some(seed);
    }
    if let Some(driver) = args.driver {
        config.cluster.driver = driver.into();
    }
    config.validate()?;
    Ok(config)
}

pub fn driver_for(cluster: &ClusterConfig) -> Arc<dyn ClusterDriver> {
    match cluster.driver {
        DriverKind::Simulated => Arc::new(SimulatedDriver),
        DriverKind::Kubectl => Arc::new(KubectlDriver::new(
            cluster.kubectl_path.clone(),
            cluster.context.clone(),
        )),
    }
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = effective_config(&args)?;
    info!(
        tick_interval = %config.reconcile.tick_interval,
        driver = ?config.cluster.driver,
        traffic = ?config.traffic.mode,
        seed = ?config.reconcile.seed,
        "KubeScale daemon starting"
    );

    let driver = driver_for(&config.cluster);
    let platform = Platform::new(config.clone(), driver);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let reconcile_handle = {
        let platform = platform.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { platform.run(shutdown).await })
    };

    let feed_handle = match config.traffic.feed {
        FeedKind::Diurnal => {
            let platform = platform.clone();
            let shutdown = shutdown_rx.clone();
            let feed = Box::new(DiurnalFeed::new(config.reconcile.seed));
            let interval = config.reconcile.prediction_interval.as_duration();
            Some(tokio::spawn(async move {
                platform.run_feed(feed, interval, shutdown).await
            }))
        }
        FeedKind::None => None,
    };

    // ── Start API server ───────────────────────────────────────

    let router = kubescale_api::build_router(platform.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server_shutdown = shutdown_tx.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = server_shutdown.send(true);
    });

    let served = server.await;

    // The server may also stop on an I/O error; stop the loops either way.
    let _ = shutdown_tx.send(true);
    let _ = reconcile_handle.await;
    if let Some(handle) = feed_handle {
        let _ = handle.await;
    }
    platform.settle().await;

    served?;
    info!("KubeScale daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    fn config_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn defaults_without_file() {
        let config = effective_config(&RunArgs::default()).unwrap();
        assert_eq!(config, ScaleConfig::default());
    }

    #[test]
    fn flags_override_file() {
        let file = config_file(
            r#"
            [reconcile]
            tick_interval = "5s"
            seed = 1

            [cluster]
            driver = "kubectl"
            "#,
        );
        let args = RunArgs {
            config: Some(file.path().to_path_buf()),
            seed: Some(42),
            driver: Some(DriverArg::Simulated),
            ..RunArgs::default()
        };
        let config = effective_config(&args).unwrap();
        assert_eq!(config.reconcile.tick_interval.as_duration(), Duration::from_secs(5));
        assert_eq!(config.reconcile.seed, Some(42));
        assert_eq!(config.cluster.driver, DriverKind::Simulated);
    }

    #[test]
    fn override_is_validated() {
        // 500ms ticks leave no room for the default 1s call timeout.
        let args = RunArgs {
            tick_interval: Some(HumanDuration::from_millis(500)),
            ..RunArgs::default()
        };
        assert!(effective_config(&args).is_err());
    }

    #[test]
    fn invalid_file_is_rejected() {
        let file = config_file("[lifecycle]\npending_stay_probability = 1.5\n");
        let args = RunArgs {
            config: Some(file.path().to_path_buf()),
            ..RunArgs::default()
        };
        assert!(effective_config(&args).is_err());
    }

    #[test]
    fn driver_selection() {
        let mut cluster = ClusterConfig::default();
        assert!(!driver_for(&cluster).is_real());
        cluster.driver = DriverKind::Kubectl;
        let driver = driver_for(&cluster);
        assert!(driver.is_real());
        assert_eq!(driver.name(), "kubectl");
    }
}
