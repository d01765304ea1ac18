use crate::config::ServiceConfig;
use crate::metrics::Metrics;
use crate::server;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// CLI arguments forwarded from `main()`.
pub struct BootstrapArgs {
    pub config_path: std::path::PathBuf,
    pub listen: String,
    pub admin_listen: String,
}

/// Service lifecycle: init → wire → serve → shutdown.
pub async fn run(args: BootstrapArgs) -> Result<()> {
    init_tracing();

    // Phase 1: configuration, metrics, shared state.
    let config = ServiceConfig::load(&args.config_path)?;
    let metrics = Metrics::install();
    let state = server::AppState::new(config, args.config_path, metrics);

    // Phase 2: background idle-key eviction, owned by the service so the
    // engine itself stays free of spawned work.
    {
        let eviction = state.config.load().eviction.clone();
        if eviction.enabled {
            state.engine.start_eviction(
                Duration::from_secs(eviction.interval_secs),
                Duration::from_secs(eviction.idle_expire_secs),
            );
            tracing::info!(
                "eviction: started, interval={}s, idle_expire={}s",
                eviction.interval_secs,
                eviction.idle_expire_secs
            );
        }
    }

    // Phase 3: admin listener.
    {
        let state = state.clone();
        let admin_listen = args.admin_listen.clone();
        tokio::spawn(async move {
            if let Err(e) = server::run_admin_server(&admin_listen, state).await {
                tracing::error!("server: admin server failed, error={}", e);
            }
        });
    }

    // Phase 4: main listener with graceful shutdown.
    let shutdown = Arc::new(Notify::new());
    tracing::info!("server: starting, listen={}", args.listen);

    let server_handle = tokio::spawn({
        let listen = args.listen.clone();
        let state = state.clone();
        let shutdown = shutdown.clone();
        async move { server::run_server(&listen, state, shutdown).await }
    });

    // Phase 5: block until signal, then drain.
    wait_for_shutdown(&shutdown).await;

    match server_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("server: exited with error={}", e),
        Err(e) => tracing::error!("server: task error={}", e),
    }

    tracing::info!("server: shutdown complete");
    Ok(())
}

fn init_tracing() {
    let (non_blocking, _guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .buffered_lines_limit(128_000)
        .lossy(true)
        .finish(std::io::stdout());

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .json(),
        )
        .init();

    std::mem::forget(_guard);
}

async fn wait_for_shutdown(shutdown: &Arc<Notify>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("server: received shutdown signal"),
        Err(e) => tracing::error!("server: failed to listen for shutdown signal, error={}", e),
    }
    shutdown.notify_waiters();
}
