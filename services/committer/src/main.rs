mod anchor;
mod backend;
mod commit_loop;
mod config;
mod error;
mod pg_store;
mod routes_blocks;
mod routes_mining;
mod state;
mod types;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use minechain::{FileBackedStorage, Ledger};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::anchor::{HttpAnchor, PlaceholderAnchor, RootAnchor};
use crate::backend::{LedgerBackend, LocalBackend};
use crate::config::AppConfig;
use crate::pg_store::PgBackend;
use crate::state::{AppState, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;

    let backend = open_backend(&cfg).await?;
    let anchor: Arc<dyn RootAnchor> = match (&cfg.anchor_url, &cfg.anchor_secret) {
        (Some(url), Some(secret)) => {
            info!(url = %url, "anchor: http");
            Arc::new(HttpAnchor::new(url.clone(), secret.clone())?)
        }
        _ => {
            info!("anchor: placeholder (no ANCHOR_URL)");
            Arc::new(PlaceholderAnchor)
        }
    };

    let app_state: SharedState = Arc::new(AppState::new(cfg.clone(), backend, anchor));
    let cancel = CancellationToken::new();

    let commit_task = if cfg.commit_loop {
        Some(tokio::spawn(commit_loop::run_commit_loop(app_state.clone(), cancel.clone())))
    } else {
        info!("commit_loop: disabled (COMMIT_LOOP)");
        None
    };

    let app = router(app_state);

    let addr = &cfg.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("committer listening on http://{addr}");

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown requested");
            shutdown.cancel();
        })
        .await
        .context("http server")?;

    cancel.cancel();
    if let Some(task) = commit_task {
        task.await.ok();
    }
    Ok(())
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/mining/events", post(routes_mining::submit_event))
        .route("/mining/events/:id/receipt", get(routes_mining::get_receipt))
        .route("/mining/commit", post(routes_mining::commit_now))
        .route("/mining/verify", post(routes_mining::verify_inclusion))
        .route("/blocks", get(routes_blocks::list_blocks))
        .route("/blocks/:height", get(routes_blocks::get_block_by_height))
        .route("/blocks/hash/:hash", get(routes_blocks::get_block_by_hash))
        .route("/chain/audit", get(routes_blocks::get_audit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn open_backend(cfg: &AppConfig) -> Result<Arc<dyn LedgerBackend>> {
    if let Some(url) = &cfg.database_url {
        let pool = PgPool::connect(url).await.context("Failed to connect to Postgres")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;
        info!("backend: postgres");
        return Ok(Arc::new(PgBackend::new(pool)));
    }

    let storage = FileBackedStorage::new(&cfg.ledger_file)
        .with_context(|| format!("opening ledger file {}", cfg.ledger_file))?;
    let ledger = Ledger::open(storage)
        .context("stored chain failed verification")?
        .with_batch_limit(cfg.batch_limit);
    info!(file = %cfg.ledger_file, height = ?ledger.latest_block().map(|b| b.block_height), "backend: local ledger file");
    Ok(Arc::new(LocalBackend::new(ledger)))
}
