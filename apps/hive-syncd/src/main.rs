use clap::Parser;
use futures::StreamExt;
use hive_config::{HiveConfig, ProfileConfig};
use hive_remote::RemoteSyncClient;
use hive_remote_postgres::PgRemote;
use hive_storage::CacheStore;
use hive_store_sqlite::SqliteCache;
use hive_sync::{
    describe_metrics, Backoff, Identity, Reconciler, SessionContext, SessionLifecycleGate,
    SubscriptionManager, WorkspaceService,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hive-syncd")]
#[command(about = "Keep a local hive cache in sync with the remote store")]
struct Args {
    /// Path to the hive config file (defaults to ~/.hive/config.json)
    #[arg(long, env = "HIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Profile to sync as (defaults to the current profile)
    #[arg(long, env = "HIVE_PROFILE")]
    profile: Option<String>,

    /// Remote PostgreSQL URL; overrides the config file
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// SQLite cache file; overrides the config file
    #[arg(long, env = "HIVE_CACHE")]
    cache: Option<PathBuf>,
}

fn select_profile<'a>(
    config: &'a HiveConfig,
    name: Option<&str>,
) -> Result<&'a ProfileConfig, hive_config::ConfigError> {
    match name {
        Some(name) => config.get_profile(name),
        None => config.get_current_profile(),
    }
}

async fn open_cache(
    path: Option<PathBuf>,
    capacity: usize,
) -> Result<SqliteCache, hive_storage::StoreError> {
    let cache = match path {
        Some(path) => {
            info!("Opening cache at {}", path.display());
            SqliteCache::open_file(&path).await?
        }
        None => SqliteCache::open_default().await?,
    };
    Ok(cache.with_change_capacity(capacity))
}

async fn connect_remote(
    database_url: Option<String>,
) -> Result<RemoteSyncClient, hive_remote::RemoteError> {
    let Some(url) = database_url else {
        warn!("No remote store configured; serving the cache only");
        return Ok(RemoteSyncClient::unconfigured());
    };
    let remote = Arc::new(PgRemote::open(&url).await?);
    info!("Connected to remote store");
    Ok(RemoteSyncClient::new(remote.clone(), remote))
}

/// Resolves on the next periodic refresh; never when polling is disabled.
async fn next_poll(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down gracefully..."),
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received SIGINT, shutting down gracefully...");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    describe_metrics();

    let args = Args::parse();

    let config = match args.config {
        Some(path) => HiveConfig::load_from(&path)?,
        None => HiveConfig::load()?,
    };
    let profile = select_profile(&config, args.profile.as_deref())?;
    let identity = Identity::from_profile(profile)?;
    info!(
        "Loaded profile {} ({} in workspace {})",
        profile.name, identity.user_id, identity.workspace_id
    );

    let cache: Arc<dyn CacheStore> = Arc::new(
        open_cache(
            args.cache.or_else(|| config.cache.path.clone()),
            config.sync.channel_capacity,
        )
        .await?,
    );
    let remote = connect_remote(
        args.database_url
            .or_else(|| config.remote.as_ref().map(|r| r.database_url.clone())),
    )
    .await?;

    let mut changes = cache.subscribe_changes();
    let change_log = tokio::spawn(async move {
        while let Some(change) = changes.next().await {
            debug!(kind = %change.kind, key = %change.key, op = ?change.op, "cache changed");
        }
    });

    let session = SessionContext::new();
    let service = WorkspaceService::new(session.clone(), cache.clone(), remote.clone());
    let manager = Arc::new(SubscriptionManager::new(
        remote,
        Reconciler::new(cache),
        Backoff::from(&config.sync),
    ));

    session.login(identity);
    let gate = SessionLifecycleGate::new(manager).spawn(session.identities());

    for (kind, outcome) in service.refresh_all().await {
        debug!(kind = %kind, "initial refresh: {:?}", outcome);
    }

    let mut poll = config.sync.poll_interval().map(|period: Duration| {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = next_poll(&mut poll) => {
                let stale = service
                    .refresh_all()
                    .await
                    .into_iter()
                    .filter(|(_, outcome)| !outcome.is_fresh())
                    .count();
                if stale > 0 {
                    warn!("Periodic refresh left {} kinds stale", stale);
                }
            }
        }
    }

    session.logout();
    gate.shutdown().await;
    change_log.abort();
    info!("hive-syncd stopped");
    Ok(())
}
