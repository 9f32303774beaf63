//! respol operator
//!
//! - Reconciliation controller auditing deployments against ResourcePolicies
//! - Validating webhook at /validate-deployment (TLS)
//! - Probes on :8081, metrics on :8080
//! - `--features kube`: reads from reflector caches, schedules through
//!   `kube::runtime::Controller`

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, EnvFilter};

use respol_core::error::{PolicyError, Result};
use respol_operator::config::{OperatorConfig, StoreBackend};
use respol_operator::obs::OperatorMetrics;
#[cfg(feature = "kube")]
use respol_operator::store::kube::KubeStore;
use respol_operator::store::{ClusterStore, MemoryStore, StoreEvent};
use respol_operator::{app_state::AppState, config, controller, engine, router, tls};

#[derive(Debug, Parser)]
#[command(name = "respol-operator", about = "Resource policy enforcement operator")]
struct Args {
    /// Path to the operator config file.
    #[arg(long, default_value = "respol.yaml")]
    config: String,

    /// The address the metric endpoint binds to.
    #[arg(long)]
    metrics_bind_address: Option<String>,

    /// The address the probe endpoint binds to.
    #[arg(long)]
    health_probe_bind_address: Option<String>,

    /// The port the webhook server binds to.
    #[arg(long)]
    webhook_bind_port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tls::install_crypto_provider();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "operator terminated");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<OperatorConfig> {
    let mut cfg = config::load_from_file(&args.config)?;
    if let Some(addr) = &args.metrics_bind_address {
        cfg.operator.metrics_listen = addr.clone();
    }
    if let Some(addr) = &args.health_probe_bind_address {
        cfg.operator.probe_listen = addr.clone();
    }
    if let Some(port) = args.webhook_bind_port {
        let mut listen = cfg.operator.webhook_addr()?;
        listen.set_port(port);
        cfg.operator.webhook_listen = listen.to_string();
    }
    cfg.validate()?;
    Ok(cfg)
}

/// Backend-specific half of the process: where reads come from and what
/// schedules reconciliation.
enum Backend {
    Memory(broadcast::Receiver<StoreEvent>),
    #[cfg(feature = "kube")]
    Kube(Arc<KubeStore>),
}

async fn open_store(cfg: &OperatorConfig) -> Result<(Arc<dyn ClusterStore>, Backend, Vec<JoinHandle<()>>)> {
    match cfg.store.backend {
        StoreBackend::Memory => {
            let store = match &cfg.store.seed_path {
                Some(path) => MemoryStore::load_seed(path)?,
                None => MemoryStore::new(),
            };
            let events = store.subscribe();
            let shared: Arc<dyn ClusterStore> = Arc::new(store);
            Ok((shared, Backend::Memory(events), Vec::new()))
        }
        #[cfg(feature = "kube")]
        StoreBackend::Kubernetes => {
            let (store, watchers) = KubeStore::connect().await?;
            store.wait_synced().await?;
            let store = Arc::new(store);
            let shared: Arc<dyn ClusterStore> = store.clone();
            Ok((shared, Backend::Kube(store), watchers))
        }
        #[cfg(not(feature = "kube"))]
        StoreBackend::Kubernetes => Err(PolicyError::Config(
            "store.backend=kubernetes requires the `kube` feature".into(),
        )),
    }
}

/// In-process controller: store events and the resync timer feed the work queue.
async fn run_local(state: AppState, events: broadcast::Receiver<StoreEvent>, workers: usize, stop: oneshot::Receiver<()>) {
    let controller = state.controller();
    let triggers = tokio::spawn(controller::triggers::run(state.index().clone(), controller.queue(), events));
    let handles = controller.spawn(workers);
    tracing::info!(workers, "resource policy controller started");

    let _ = stop.await;
    triggers.abort();
    controller.shutdown(handles).await;
    tracing::info!("resource policy controller stopped");
}

async fn run(args: Args) -> Result<()> {
    let cfg = load_config(&args)?;
    let webhook_listen = cfg.operator.webhook_addr()?;
    let probe_listen = cfg.operator.probe_addr()?;
    let metrics_listen = cfg.operator.metrics_addr()?;

    let (store, backend, watchers) = open_store(&cfg).await?;
    tracing::info!(backend = ?cfg.store.backend, "cluster store ready");

    let metrics = Arc::new(OperatorMetrics::default());
    let engine = engine::build(&cfg.engine, Arc::clone(&metrics));
    tracing::info!(query = %cfg.engine.query, cache = cfg.engine.cache, "decision engine created");

    let tls = tls::load(&cfg.operator).await?;

    let controller_cfg = cfg.controller.clone();
    let state = AppState::new(cfg, store, engine, Arc::clone(&metrics));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let control = match backend {
        Backend::Memory(events) => tokio::spawn(run_local(state.clone(), events, controller_cfg.workers, stop_rx)),
        #[cfg(feature = "kube")]
        Backend::Kube(store) => {
            tracing::info!(workers = controller_cfg.workers, "resource policy controller started");
            tokio::spawn(controller::cluster::run(
                store,
                controller_cfg,
                state.reconciler(),
                Arc::clone(&metrics),
                async move {
                    let _ = stop_rx.await;
                },
            ))
        }
    };

    let probe_listener = bind(probe_listen).await?;
    let metrics_listener = bind(metrics_listen).await?;
    let probes = tokio::spawn(serve(probe_listener, router::build_probe_router(state.clone())));
    let metrics_srv = tokio::spawn(serve(metrics_listener, router::build_metrics_router(state.clone())));

    let webhook_app = router::build_webhook_router(state.clone());
    let handle = axum_server::Handle::new();
    let mut webhook = match tls {
        Some(tls) => {
            let server = axum_server::tls_rustls::bind_rustls(webhook_listen, tls).handle(handle.clone());
            tokio::spawn(async move { server.serve(webhook_app.into_make_service()).await })
        }
        None => {
            let server = axum_server::bind(webhook_listen).handle(handle.clone());
            tokio::spawn(async move { server.serve(webhook_app.into_make_service()).await })
        }
    };
    tracing::info!(%webhook_listen, path = %state.cfg().admission.path, "webhook registered");

    state.set_ready(true);
    tracing::info!(%probe_listen, %metrics_listen, "operator running");

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested, draining");
            handle.graceful_shutdown(Some(std::time::Duration::from_secs(5)));
            None
        }
        res = &mut webhook => Some(res),
    };
    state.set_ready(false);

    let _ = stop_tx.send(());
    if let Err(e) = control.await {
        tracing::error!(error = %e, "controller task failed");
    }
    for w in watchers {
        w.abort();
    }
    probes.abort();
    metrics_srv.abort();

    let res = match outcome {
        Some(res) => res,
        None => webhook.await,
    };
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(PolicyError::Internal(format!("webhook server failed: {e}"))),
        Err(e) => Err(PolicyError::Internal(format!("webhook task failed: {e}"))),
    }
}

async fn bind(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PolicyError::Internal(format!("failed to bind {addr}: {e}")))
}

async fn serve(listener: tokio::net::TcpListener, app: axum::Router) {
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "http server failed");
    }
}
