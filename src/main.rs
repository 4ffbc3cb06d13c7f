use std::sync::Arc;

use blogo::config::{Cli, Config, default_config_dir, default_config_path};
use blogo::db::Database;
use blogo::handler::{AppState, routes};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    // --config puts the local database next to the config file,
    // otherwise both live in ~/.blogo/
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("blogo.svc starting");

    let mut cfg = Config::load_or_default(&config_path).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    if let Some(port) = args.port {
        cfg.app.set_port(port);
    }
    tracing::info!(path = ?config_path, collection = %cfg.store.get_collection(), "config loaded");

    let db = Arc::new(Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %blogo::unpack_error(&e), "failed to setup database");
        std::process::exit(1);
    }));
    match db.count().await {
        Ok(n) => tracing::info!(collection = %db.collection(), articles = n, "store connected"),
        Err(e) => tracing::warn!(error = %e, "store connected, failed to count articles"),
    }

    let router = routes().unwrap_or_else(|e| {
        tracing::error!(error = %e, "invalid route pattern");
        std::process::exit(1);
    });
    for (idx, route) in router.routes().iter().enumerate() {
        tracing::debug!(order = idx, matcher = ?route.matcher(), "route registered");
    }
    tracing::info!(routes = router.routes().len(), "routes registered");

    let state = AppState::new(db.clone(), cfg.app.get_static_dir(), cfg.app.max_body_bytes);
    let app = router.into_service(state);

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    let cancellation_token = CancellationToken::new();
    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl+c");
            return;
        }
        tracing::info!("ctrl+c signal received, preparing to shutdown");
        shutdown_token.cancel();
    });

    tracing::info!("blogo.svc running on {}", &address);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await;
    if let Err(err) = result {
        tracing::error!(error = %err, "server error");
        std::process::exit(1);
    }

    drop(db);
    tracing::info!("blogo.svc going off, graceful shutdown complete");
}
