//! Contains the mirror CLI.

use anyhow::{Context, Result};
use clap::Parser;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;
use zond_mirror_cli::{LogArgs, MetricsArgs, cli_styles};
use zond_mirror_core::{MirrorConfig, MirrorService};
use zond_mirror_rpc::{MarketClient, NodeClient, NodeClientBuilder};
use zond_mirror_storage::{InMemoryStore, MirrorStore, RocksStore};

/// Zond chain mirror.
///
/// Follows a Zond node and keeps a local copy of its blocks, transactions, account state,
/// mempool and validator set.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, styles = cli_styles(), long_about = None)]
pub(crate) struct Cli {
    /// Logging arguments.
    #[clap(flatten)]
    pub log_args: LogArgs,
    /// Prometheus CLI arguments.
    #[clap(flatten)]
    pub metrics: MetricsArgs,
    /// URL of the Zond node JSON-RPC API.
    #[clap(long = "node.url", env = "NODE_URL", default_value = "http://127.0.0.1:8545")]
    pub node_url: Url,
    /// URL of the node queried for mempool contents. Defaults to `--node.url`.
    #[clap(long = "mempool.url", env = "MEMPOOL_NODE_URL")]
    pub mempool_url: Option<Url>,
    /// URL of the beacon API used for validator snapshots.
    #[clap(long = "beacon.url", env = "BEACONCHAIN_API")]
    pub beacon_url: Option<Url>,
    /// URL of the market data API.
    #[clap(long = "market.url", env = "MARKET_API_URL")]
    pub market_url: Option<Url>,
    /// Directory of the persistent store. Mirrors into memory when unset.
    #[clap(long, env = "MIRROR_DATADIR")]
    pub datadir: Option<PathBuf>,
    /// Timeout for a single upstream request, in seconds.
    #[clap(long = "rpc.timeout", env = "MIRROR_RPC_TIMEOUT", default_value_t = 10)]
    pub rpc_timeout: u64,
    /// Maximum number of block fetches in flight.
    #[clap(long = "sync.concurrency", env = "MIRROR_SYNC_CONCURRENCY", default_value_t = 8)]
    pub concurrency: usize,
    /// Deepest reorg resolved by rolling back to the fork point.
    #[clap(long = "reorg.max-depth", env = "MIRROR_REORG_MAX_DEPTH", default_value_t = 50)]
    pub max_reorg_depth: u64,
}

impl Cli {
    /// Runs the CLI.
    pub(crate) fn run(self) -> Result<()> {
        // Initialize the telemetry stack.
        self.init_stack()?;

        // Starts the mirror.
        Self::run_until_ctrl_c(self.start())
    }

    /// Initialize the tracing stack and Prometheus metrics recorder.
    pub(crate) fn init_stack(&self) -> Result<()> {
        self.log_args.init_tracing_subscriber(None::<EnvFilter>)?;
        self.metrics.init_metrics()?;
        Ok(())
    }

    /// Builds the engine configuration from the flags.
    pub(crate) fn mirror_config(&self) -> MirrorConfig {
        let mut config = MirrorConfig::default();
        config.fetch.max_concurrency = self.concurrency.max(1);
        config.reorg.max_depth = self.max_reorg_depth;
        config
    }

    /// Starts the mirror.
    pub(crate) async fn start(self) -> Result<()> {
        let timeout = Duration::from_secs(self.rpc_timeout);
        let client = NodeClientBuilder::new(self.node_url.clone())
            .mempool_url(self.mempool_url.clone())
            .beacon_url(self.beacon_url.clone())
            .timeout(timeout)
            .build()
            .context("failed to build node client")?;
        let market = self
            .market_url
            .clone()
            .map(|url| MarketClient::new(url, timeout))
            .transpose()
            .context("failed to build market client")?;
        if self.beacon_url.is_none() {
            warn!(target: "mirror", "No beacon API configured, validator snapshots are disabled");
        }

        let cancellation = CancellationToken::new();
        tokio::spawn(cancel_on_signal(cancellation.clone()));

        let config = self.mirror_config();
        let client = Arc::new(client);
        match &self.datadir {
            Some(path) => {
                info!(target: "mirror", path = %path.display(), "Opening store");
                let store = RocksStore::open(path)
                    .with_context(|| format!("failed to open store at {}", path.display()))?;
                let store = Arc::new(store);
                serve(config, client, store, market, cancellation).await
            }
            None => {
                warn!(target: "mirror", "No datadir configured, mirroring into memory");
                let store = Arc::new(InMemoryStore::new());
                serve(config, client, store, market, cancellation).await
            }
        }
    }

    /// Run until ctrl-c is pressed.
    pub(crate) fn run_until_ctrl_c<F>(fut: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        let rt = Self::tokio_runtime().map_err(|e| anyhow::anyhow!(e))?;
        rt.block_on(fut)
    }

    /// Creates a new default tokio multi-thread [Runtime](tokio::runtime::Runtime) with all
    /// features enabled
    pub(crate) fn tokio_runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
        tokio::runtime::Builder::new_multi_thread().enable_all().build()
    }
}

async fn serve<C, S>(
    config: MirrorConfig,
    client: Arc<C>,
    store: Arc<S>,
    market: Option<MarketClient>,
    cancellation: CancellationToken,
) -> Result<()>
where
    C: NodeClient + 'static,
    S: MirrorStore + 'static,
{
    MirrorService::new(config, client, store, market).run(cancellation).await?;
    info!(target: "mirror", "Shutdown complete");
    Ok(())
}

/// Cancels `cancellation` on SIGINT or SIGTERM.
async fn cancel_on_signal(cancellation: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(target: "mirror", %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(target: "mirror", %err, "Failed to listen for ctrl-c");
                return;
            }
        }
        _ = terminate => {}
    }
    info!(target: "mirror", "Shutdown signal received, stopping loops");
    cancellation.cancel();
}
